//! Access control and auditing
//!
//! The core never decides permissions itself. It asks an injected
//! [`AccessControl`] collaborator and records every enforced decision in an
//! [`AuditSink`] before acting on it.

use crate::{Error, Result};
use binrepo_fs::RepoPath;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Actions guarded by permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Deploy,
    Delete,
    Annotate,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Deploy => "deploy",
            Self::Delete => "delete",
            Self::Annotate => "annotate",
        };
        f.write_str(name)
    }
}

/// Permission predicates supplied by the security subsystem.
pub trait AccessControl: Send + Sync {
    fn can_read(&self, path: &RepoPath) -> bool;
    fn can_deploy(&self, path: &RepoPath) -> bool;
    fn can_delete(&self, path: &RepoPath) -> bool;
    fn can_annotate(&self, path: &RepoPath) -> bool;

    /// Whether a folder may be listed because something below it is readable.
    fn can_implicitly_read_parent_path(&self, path: &RepoPath) -> bool {
        self.can_read(path)
    }

    /// Name of the principal the decisions are made for.
    fn current_user(&self) -> String {
        "anonymous".to_string()
    }
}

/// One enforced permission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub user: String,
    pub action: Action,
    pub path: RepoPath,
    pub allowed: bool,
}

/// Destination of permission decisions.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Writes audit records to the `binrepo::audit` tracing target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        if record.allowed {
            tracing::debug!(
                target: "binrepo::audit",
                user = %record.user,
                action = %record.action,
                path = %record.path,
                "allowed"
            );
        } else {
            tracing::warn!(
                target: "binrepo::audit",
                user = %record.user,
                action = %record.action,
                path = %record.path,
                "denied"
            );
        }
    }
}

/// Grants everything.
#[derive(Debug, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn can_read(&self, _path: &RepoPath) -> bool {
        true
    }

    fn can_deploy(&self, _path: &RepoPath) -> bool {
        true
    }

    fn can_delete(&self, _path: &RepoPath) -> bool {
        true
    }

    fn can_annotate(&self, _path: &RepoPath) -> bool {
        true
    }
}

/// Per-repository grants for a single user; anything not granted is denied.
#[derive(Debug, Clone, Default)]
pub struct PermissionMatrix {
    user: String,
    grants: HashMap<String, HashSet<Action>>,
}

impl PermissionMatrix {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            grants: HashMap::new(),
        }
    }

    pub fn grant(mut self, repo_key: &str, actions: &[Action]) -> Self {
        self.grants
            .entry(repo_key.to_string())
            .or_default()
            .extend(actions.iter().copied());
        self
    }

    fn allows(&self, action: Action, path: &RepoPath) -> bool {
        self.grants
            .get(path.repo_key())
            .is_some_and(|actions| actions.contains(&action))
    }
}

impl AccessControl for PermissionMatrix {
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

    fn current_user(&self) -> String {
        self.user.clone()
    }
}

/// Pairs the access predicates with the audit sink.
#[derive(Clone)]
pub struct Authorizer {
    access: Arc<dyn AccessControl>,
    audit: Arc<dyn AuditSink>,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("user", &self.access.current_user())
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    pub fn new(access: Arc<dyn AccessControl>, audit: Arc<dyn AuditSink>) -> Self {
        Self { access, audit }
    }

    pub fn allow_all() -> Self {
        Self::new(Arc::new(AllowAll), Arc::new(TracingAuditSink))
    }

    pub fn user(&self) -> String {
        self.access.current_user()
    }

    /// Evaluate a permission without auditing it; used to filter listings.
    pub fn permits(&self, action: Action, path: &RepoPath) -> bool {
        match action {
            Action::Read => self.access.can_read(path),
            Action::Deploy => self.access.can_deploy(path),
            Action::Delete => self.access.can_delete(path),
            Action::Annotate => self.access.can_annotate(path),
        }
    }

    /// Whether a listing may include `path`.
    pub fn can_list(&self, path: &RepoPath) -> bool {
        if path.is_folder() {
            self.access.can_implicitly_read_parent_path(path)
        } else {
            self.access.can_read(path)
        }
    }

    /// Enforce a permission, auditing the decision either way.
    pub fn require(&self, action: Action, path: &RepoPath) -> Result<()> {
        let allowed = self.permits(action, path);
        let user = self.user();
        self.audit.record(&AuditRecord {
            user: user.clone(),
            action,
            path: path.clone(),
            allowed,
        });
        if allowed {
            Ok(())
        } else {
            Err(Error::AccessDenied {
                user,
                action: action.to_string(),
                path: path.to_string(),
            })
        }
    }
}
