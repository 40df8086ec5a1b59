//! File and folder items
//!
//! Items are plain values: an [`ItemInfo`] tagged as file or folder, wrapped
//! in an [`FsItem`] that records whether the view is an immutable snapshot,
//! a write-locked mutable copy, or deleted. Behaviour that needs storage
//! (reading content, listing children, writing) lives behind the
//! [`Readable`], [`Writable`] and [`Listable`] capabilities implemented by
//! the repository handles in [`crate::repo`].

mod policy;
mod store;

pub use policy::{ChecksumPolicy, ChecksumPolicyType, FailOnMismatch, FlagMismatch, IgnoreAndGenerate};
pub use store::ItemIndex;

use crate::{Error, Result};
use binrepo_fs::{ChecksumInfo, ChecksumPair, ChecksumType, RepoPath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

/// Multi-valued item properties.
pub type Properties = BTreeMap<String, Vec<String>>;

/// File-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Length of the persisted stream
    pub size: u64,
    pub mime_type: String,
    /// At most one entry per checksum type
    pub checksums: BTreeMap<ChecksumType, ChecksumInfo>,
}

impl FileInfo {
    pub fn checksum(&self, checksum_type: ChecksumType) -> Option<&ChecksumInfo> {
        self.checksums.get(&checksum_type)
    }

    /// Computed value of one checksum type.
    pub fn actual(&self, checksum_type: ChecksumType) -> Option<&str> {
        self.checksum(checksum_type)?.actual.as_deref()
    }

    pub fn sha1(&self) -> Option<&str> {
        self.actual(ChecksumType::Sha1)
    }

    pub fn md5(&self) -> Option<&str> {
        self.actual(ChecksumType::Md5)
    }

    /// Both computed checksums, when known.
    pub fn checksum_pair(&self) -> Option<ChecksumPair> {
        Some(ChecksumPair::new(self.sha1()?, self.md5()?))
    }

    pub fn checksums_match(&self) -> bool {
        self.checksums.values().all(ChecksumInfo::checksums_match)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemKind {
    File(FileInfo),
    Folder,
}

/// Metadata common to files and folders.
///
/// Folder children are never stored on the folder; they are discovered
/// through the repository index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub repo_path: RepoPath,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub created_by: String,
    pub modified_by: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(flatten)]
    pub kind: ItemKind,
}

impl ItemInfo {
    pub fn new_folder(repo_path: RepoPath, user: &str) -> Self {
        Self::new(repo_path.with_folder(true), user, ItemKind::Folder)
    }

    pub fn new_file(repo_path: RepoPath, user: &str, file: FileInfo) -> Self {
        Self::new(repo_path.with_folder(false), user, ItemKind::File(file))
    }

    fn new(repo_path: RepoPath, user: &str, kind: ItemKind) -> Self {
        let now = Utc::now();
        Self {
            repo_path,
            created: now,
            last_modified: now,
            last_updated: now,
            created_by: user.to_string(),
            modified_by: user.to_string(),
            properties: Properties::new(),
            kind,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, ItemKind::File(_))
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder)
    }

    pub fn file(&self) -> Option<&FileInfo> {
        match &self.kind {
            ItemKind::File(file) => Some(file),
            ItemKind::Folder => None,
        }
    }

    pub fn name(&self) -> &str {
        self.repo_path.name()
    }

    pub fn property(&self, name: &str) -> Option<&[String]> {
        self.properties.get(name).map(Vec::as_slice)
    }

    /// Same metadata relocated to `repo_path`.
    pub fn relocated(&self, repo_path: RepoPath) -> Self {
        Self {
            repo_path: repo_path.with_folder(self.is_folder()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemState {
    Immutable,
    Mutable,
    Deleted,
}

/// An item view.
///
/// Immutable views are snapshots handed out without locking. A mutable view
/// is a private deep copy that exists only while its write lock is held;
/// its changes reach the index only through an explicit save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsItem {
    info: ItemInfo,
    state: ItemState,
}

impl FsItem {
    pub fn immutable(info: ItemInfo) -> Self {
        Self {
            info,
            state: ItemState::Immutable,
        }
    }

    /// A mutable deep copy of this view.
    pub(crate) fn to_mutable(&self) -> Self {
        Self {
            info: self.info.clone(),
            state: ItemState::Mutable,
        }
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.state = ItemState::Deleted;
    }

    pub(crate) fn into_info(self) -> ItemInfo {
        self.info
    }

    pub fn info(&self) -> &ItemInfo {
        &self.info
    }

    pub fn repo_path(&self) -> &RepoPath {
        &self.info.repo_path
    }

    pub fn is_file(&self) -> bool {
        self.info.is_file()
    }

    pub fn is_folder(&self) -> bool {
        self.info.is_folder()
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        self.info.file()
    }

    pub fn is_mutable(&self) -> bool {
        self.state == ItemState::Mutable
    }

    pub fn is_deleted(&self) -> bool {
        self.state == ItemState::Deleted
    }

    fn info_mut(&mut self) -> Result<&mut ItemInfo> {
        match self.state {
            ItemState::Mutable => Ok(&mut self.info),
            ItemState::Immutable => Err(Error::ImmutableItem {
                path: self.info.repo_path.to_string(),
            }),
            ItemState::Deleted => Err(Error::ItemDeleted {
                path: self.info.repo_path.to_string(),
            }),
        }
    }

    fn file_mut(&mut self) -> Result<&mut FileInfo> {
        let info = self.info_mut()?;
        let path = info.repo_path.to_string();
        match &mut info.kind {
            ItemKind::File(file) => Ok(file),
            ItemKind::Folder => Err(Error::invalid_path(path, "folders carry no file metadata")),
        }
    }

    /// Replace all values of a property.
    pub fn set_property(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        self.info_mut()?.properties.insert(name.to_string(), values);
        Ok(())
    }

    pub fn add_property_value(&mut self, name: &str, value: &str) -> Result<()> {
        self.info_mut()?
            .properties
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    /// Remove a property, returning its previous values.
    pub fn remove_property(&mut self, name: &str) -> Result<Option<Vec<String>>> {
        Ok(self.info_mut()?.properties.remove(name))
    }

    pub fn set_modified_by(&mut self, user: &str) -> Result<()> {
        self.info_mut()?.modified_by = user.to_string();
        Ok(())
    }

    pub fn set_mime_type(&mut self, mime_type: &str) -> Result<()> {
        self.file_mut()?.mime_type = mime_type.to_string();
        Ok(())
    }

    /// Declare the expected value of one checksum type.
    pub fn set_original_checksum(&mut self, checksum_type: ChecksumType, value: &str) -> Result<()> {
        if !checksum_type.is_valid(value) {
            return Err(Error::InvalidChecksum {
                checksum_type: checksum_type.to_string(),
                value: value.to_string(),
            });
        }
        let file = self.file_mut()?;
        let actual = file.actual(checksum_type).map(str::to_string);
        file.checksums.insert(
            checksum_type,
            ChecksumInfo::new(checksum_type, Some(value.to_string()), actual),
        );
        Ok(())
    }

    /// Record a metadata change at the current time.
    pub(crate) fn touch(&mut self) -> Result<()> {
        let info = self.info_mut()?;
        let now = Utc::now();
        info.last_modified = now;
        info.last_updated = now;
        Ok(())
    }
}

/// Items whose content can be streamed out.
pub trait Readable {
    fn open(&self) -> Result<Box<dyn Read + Send>>;
}

/// Items whose content can be replaced.
pub trait Writable {
    /// Stream new content, returning the resulting file metadata.
    fn write_content(&mut self, content: &mut dyn Read) -> Result<ItemInfo>;
}

/// Items with children.
pub trait Listable {
    fn list_children(&self) -> Result<Vec<Arc<ItemInfo>>>;
}

/// Mime type guessed from a file name.
pub fn mime_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jar" | "war" | "ear" => "application/java-archive",
        "pom" | "xml" => "application/xml",
        "json" => "application/json",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "txt" | "md5" | "sha1" => "text/plain",
        _ => "application/octet-stream",
    }
}
