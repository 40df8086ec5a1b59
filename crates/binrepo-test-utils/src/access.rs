//! Access control and audit doubles.
//!
//! [`RuleAccess`] allows everything except explicitly denied
//! (action, path prefix) pairs. [`RecordingAuditSink`] keeps every audit
//! record so tests can assert that a denial was audited.

use binrepo_core::{AccessControl, Action, AuditRecord, AuditSink};
use binrepo_fs::RepoPath;
use parking_lot::Mutex;

/// Allow-by-default access control with deny rules.
///
/// A rule matches a path in the named repository when the path equals the
/// prefix or lies below it. An empty prefix covers the whole repository.
///
/// # Example
///
/// ```rust
/// use binrepo_core::{AccessControl, Action};
/// use binrepo_fs::RepoPath;
/// use binrepo_test_utils::RuleAccess;
///
/// let access = RuleAccess::new("alice").deny(Action::Read, "libs", "secret");
/// assert!(!access.can_read(&RepoPath::file("libs", "secret/key.pem")));
/// assert!(access.can_read(&RepoPath::file("libs", "public/a.jar")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleAccess {
    user: String,
    denied: Vec<(Action, String, String)>,
    hide_folders: bool,
}

impl RuleAccess {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            ..Self::default()
        }
    }

    /// Deny `action` on `repo_key:prefix` and everything below it.
    pub fn deny(mut self, action: Action, repo_key: &str, prefix: &str) -> Self {
        self.denied
            .push((action, repo_key.to_string(), prefix.trim_matches('/').to_string()));
        self
    }

    /// Deny every action on `repo_key`.
    pub fn deny_repo(self, repo_key: &str) -> Self {
        [Action::Read, Action::Deploy, Action::Delete, Action::Annotate]
            .into_iter()
            .fold(self, |access, action| access.deny(action, repo_key, ""))
    }

    /// Apply read denials to folders too, instead of only to files.
    pub fn hide_denied_folders(mut self) -> Self {
        self.hide_folders = true;
        self
    }

    fn allows(&self, action: Action, path: &RepoPath) -> bool {
        !self.denied.iter().any(|(denied, repo_key, prefix)| {
            *denied == action
                && repo_key == path.repo_key()
                && (prefix.is_empty()
                    || path.path() == prefix
                    || path
                        .path()
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/')))
        })
    }
}

impl AccessControl for RuleAccess {
    fn can_read(&self, path: &RepoPath) -> bool {
        self.allows(Action::Read, path)
    }

    fn can_deploy(&self, path: &RepoPath) -> bool {
        self.allows(Action::Deploy, path)
    }

    fn can_delete(&self, path: &RepoPath) -> bool {
        self.allows(Action::Delete, path)
    }

    fn can_annotate(&self, path: &RepoPath) -> bool {
        self.allows(Action::Annotate, path)
    }

    fn can_implicitly_read_parent_path(&self, path: &RepoPath) -> bool {
        !self.hide_folders || self.can_read(path)
    }

    fn current_user(&self) -> String {
        if self.user.is_empty() {
            "anonymous".to_string()
        } else {
            self.user.clone()
        }
    }
}

/// Audit sink keeping every record in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn denials(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| !r.allowed)
            .cloned()
            .collect()
    }

    /// Whether a denial of `action` on `path` was recorded.
    pub fn was_denied(&self, action: Action, path: &RepoPath) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| !r.allowed && r.action == action && r.path.id() == path.id())
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, record: &AuditRecord) {
        self.records.lock().push(record.clone());
    }
}
