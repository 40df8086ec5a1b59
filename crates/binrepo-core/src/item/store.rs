//! In-memory item index of one repository

use super::ItemInfo;
use binrepo_fs::{ChecksumType, RepoPath};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Item metadata keyed by repository-relative path.
///
/// The root folder is implicit and never stored. Snapshots are shared as
/// `Arc<ItemInfo>`; committing replaces the whole entry.
#[derive(Debug, Default)]
pub struct ItemIndex {
    items: RwLock<BTreeMap<String, Arc<ItemInfo>>>,
}

fn child_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    }
}

impl ItemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Arc<ItemInfo>> {
        self.items.read().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        path.is_empty() || self.items.read().contains_key(path)
    }

    pub fn insert(&self, info: ItemInfo) -> Arc<ItemInfo> {
        let info = Arc::new(info);
        self.items
            .write()
            .insert(info.repo_path.path().to_string(), Arc::clone(&info));
        info
    }

    /// Remove `path` and everything below it, returning the removed entries.
    pub fn remove_subtree(&self, path: &str) -> Vec<Arc<ItemInfo>> {
        let mut items = self.items.write();
        if path.is_empty() {
            return std::mem::take(&mut *items).into_values().collect();
        }
        let prefix = child_prefix(path);
        let keys: Vec<String> = items
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        let mut removed: Vec<Arc<ItemInfo>> =
            keys.iter().filter_map(|k| items.remove(k)).collect();
        if let Some(own) = items.remove(path) {
            removed.push(own);
        }
        removed
    }

    /// Direct children of `path`, sorted by name.
    pub fn children(&self, path: &str) -> Vec<Arc<ItemInfo>> {
        let prefix = child_prefix(path);
        self.items
            .read()
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('/'))
            .map(|(_, v)| Arc::clone(v))
            .collect()
    }

    /// Every item strictly below `path`, in path order.
    pub fn descendants(&self, path: &str) -> Vec<Arc<ItemInfo>> {
        let prefix = child_prefix(path);
        self.items
            .read()
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| Arc::clone(v))
            .collect()
    }

    /// Files whose computed checksum of `checksum_type` equals `value`.
    pub fn find_by_checksum(&self, checksum_type: ChecksumType, value: &str) -> Vec<RepoPath> {
        self.items
            .read()
            .values()
            .filter(|info| {
                info.file()
                    .and_then(|f| f.actual(checksum_type))
                    .is_some_and(|actual| actual.eq_ignore_ascii_case(value))
            })
            .map(|info| info.repo_path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn clear(&self) {
        self.items.write().clear();
    }
}
