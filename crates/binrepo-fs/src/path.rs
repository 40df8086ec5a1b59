//! Repository-scoped item addressing

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical address of an item: repository key plus relative path.
///
/// Paths are normalized to forward slashes with no leading or trailing
/// separator and no `.`/`..` segments. An empty path is the repository root,
/// which is always a folder.
///
/// Ordering is by repository key, then path, which gives the canonical
/// lock-acquisition order used across the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoPath {
    repo_key: String,
    path: String,
    folder: bool,
}

impl RepoPath {
    /// Create a new path, normalizing the relative part.
    pub fn new(repo_key: impl Into<String>, path: &str, is_folder: bool) -> Self {
        let path = normalize(path);
        let folder = is_folder || path.is_empty();
        Self {
            repo_key: repo_key.into(),
            path,
            folder,
        }
    }

    pub fn file(repo_key: impl Into<String>, path: &str) -> Self {
        Self::new(repo_key, path, false)
    }

    pub fn folder(repo_key: impl Into<String>, path: &str) -> Self {
        Self::new(repo_key, path, true)
    }

    /// The root folder of a repository.
    pub fn root(repo_key: impl Into<String>) -> Self {
        Self::new(repo_key, "", true)
    }

    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    /// Relative path inside the repository (empty for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_folder(&self) -> bool {
        self.folder
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Last path segment, empty for the root.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// The containing folder, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let parent = match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        };
        Some(Self {
            repo_key: self.repo_key.clone(),
            path: parent.to_string(),
            folder: true,
        })
    }

    /// All containing folders, nearest first, ending with the root.
    pub fn ancestors(&self) -> impl Iterator<Item = RepoPath> {
        std::iter::successors(self.parent(), |p| p.parent())
    }

    /// A direct child of this path.
    pub fn child(&self, name: &str, is_folder: bool) -> Self {
        if self.is_root() {
            Self::new(self.repo_key.clone(), name, is_folder)
        } else {
            Self::new(self.repo_key.clone(), &format!("{}/{}", self.path, name), is_folder)
        }
    }

    /// Whether `self` lives strictly below `ancestor` in the same repository.
    pub fn is_descendant_of(&self, ancestor: &RepoPath) -> bool {
        if self.repo_key != ancestor.repo_key || self.path == ancestor.path {
            return false;
        }
        ancestor.is_root()
            || self
                .path
                .strip_prefix(&ancestor.path)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Same relative path in another repository.
    pub fn with_repo(&self, repo_key: impl Into<String>) -> Self {
        Self {
            repo_key: repo_key.into(),
            path: self.path.clone(),
            folder: self.folder,
        }
    }

    /// Same address flagged as a folder or a file.
    pub fn with_folder(&self, is_folder: bool) -> Self {
        Self {
            repo_key: self.repo_key.clone(),
            path: self.path.clone(),
            folder: is_folder || self.path.is_empty(),
        }
    }

    /// Map a path under `from` onto the same relative location under `to`.
    ///
    /// Returns `None` when `self` is neither `from` nor one of its descendants.
    pub fn rebase(&self, from: &RepoPath, to: &RepoPath) -> Option<RepoPath> {
        if self.repo_key == from.repo_key && self.path == from.path {
            return Some(to.with_folder(self.folder));
        }
        if !self.is_descendant_of(from) {
            return None;
        }
        let rest = if from.is_root() {
            self.path.as_str()
        } else {
            &self.path[from.path.len() + 1..]
        };
        let joined = if to.is_root() {
            rest.to_string()
        } else {
            format!("{}/{}", to.path, rest)
        };
        Some(Self::new(to.repo_key.clone(), &joined, self.folder))
    }

    /// Stable string identity, `key:path`.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo_key, self.path)
    }
}

impl FromStr for RepoPath {
    type Err = Error;

    /// Parse `key:path`; a trailing `/` marks a folder.
    fn from_str(s: &str) -> Result<Self> {
        let (key, path) = s.split_once(':').ok_or_else(|| Error::InvalidRepoPath {
            value: s.to_string(),
        })?;
        validate_repo_key(key)?;
        let is_folder = path.is_empty() || path.ends_with('/') || path.ends_with('\\');
        Ok(Self::new(key, path, is_folder))
    }
}

/// Check that a repository key is usable as an identifier.
///
/// Keys are non-empty, contain no path separators or `:` and do not start
/// with a dot.
pub fn validate_repo_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidRepoKey {
            key: key.to_string(),
        })
    }
}

fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_always_a_folder() {
        let root = RepoPath::new("libs", "/", false);
        assert!(root.is_root());
        assert!(root.is_folder());
        assert_eq!(root.name(), "");
        assert!(root.parent().is_none());
    }

    #[test]
    fn parent_chain_ends_at_root() {
        let path = RepoPath::file("libs", "com/x/1.0/x-1.0.jar");
        let chain: Vec<String> = path.ancestors().map(|p| p.path().to_string()).collect();
        assert_eq!(chain, vec!["com/x/1.0", "com/x", "com", ""]);
    }

    #[test]
    fn rebase_maps_descendants() {
        let from = RepoPath::folder("r1", "grp/art");
        let to = RepoPath::folder("r2", "other");
        let item = RepoPath::file("r1", "grp/art/1.0/a.jar");
        assert_eq!(
            item.rebase(&from, &to),
            Some(RepoPath::file("r2", "other/1.0/a.jar"))
        );
        assert_eq!(RepoPath::file("r1", "grp/artifact").rebase(&from, &to), None);
    }
}
