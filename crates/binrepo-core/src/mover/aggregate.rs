//! Collapsing sibling sets into their parent folder

use binrepo_fs::RepoPath;
use std::collections::{BTreeMap, BTreeSet};

/// Reduce a set of paths to the smallest equivalent set of moves.
///
/// Duplicates and paths below another path of the set are dropped. When
/// the paths sharing a parent are all of that parent's children, they are
/// replaced by the parent itself. The repository root is never produced.
/// The result is sorted by path identity.
pub fn aggregate_by_parent<F>(paths: &[RepoPath], children_of: F) -> Vec<RepoPath>
where
    F: Fn(&RepoPath) -> Vec<RepoPath>,
{
    let unique: BTreeMap<String, RepoPath> = paths
        .iter()
        .map(|p| (p.id(), p.clone()))
        .collect();
    let roots: Vec<RepoPath> = unique
        .values()
        .filter(|p| !unique.values().any(|other| p.is_descendant_of(other)))
        .cloned()
        .collect();

    let mut by_parent: BTreeMap<String, (RepoPath, BTreeSet<String>)> = BTreeMap::new();
    let mut result: BTreeMap<String, RepoPath> = BTreeMap::new();
    for path in roots {
        match path.parent() {
            Some(parent) if !parent.is_root() => {
                by_parent
                    .entry(parent.id())
                    .or_insert_with(|| (parent, BTreeSet::new()))
                    .1
                    .insert(path.id());
            }
            _ => {
                result.insert(path.id(), path);
            }
        }
    }

    for (parent, selected) in by_parent.into_values() {
        let all: BTreeSet<String> = children_of(&parent).iter().map(RepoPath::id).collect();
        if !all.is_empty() && all == selected {
            result.insert(parent.id(), parent);
        } else {
            for id in selected {
                if let Some(path) = unique.get(&id) {
                    result.insert(id, path.clone());
                }
            }
        }
    }

    result.into_values().collect()
}
