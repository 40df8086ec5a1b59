//! [`TestService`] builder for repository service scenarios.
//!
//! Builds a [`RepositoryService`] over in-memory storage (or a temporary
//! directory) with a recording audit sink, plus helpers to deploy and read
//! text content.

use crate::access::RecordingAuditSink;
use binrepo_core::{
    AccessControl, CentralConfig, DeployRequest, FsStorageProvider, ItemInfo, MetadataCalculator,
    RepoDescriptor, RepositoryService,
};
use binrepo_fs::RepoPath;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A repository service ready for a test, with its audit trail.
///
/// Dereferences to [`RepositoryService`].
///
/// # Example
///
/// ```rust
/// use binrepo_test_utils::TestService;
///
/// let service = TestService::builder().local("libs-release").build();
/// service.deploy_text("libs-release", "org/acme/1.0/acme.jar", "jar");
/// assert_eq!(service.list_names("libs-release", "org/acme"), vec!["1.0"]);
/// ```
pub struct TestService {
    service: RepositoryService,
    audit: Arc<RecordingAuditSink>,
    storage_dir: Option<TempDir>,
}

impl Deref for TestService {
    type Target = RepositoryService;

    fn deref(&self) -> &RepositoryService {
        &self.service
    }
}

impl TestService {
    pub fn builder() -> TestServiceBuilder {
        TestServiceBuilder::default()
    }

    pub fn service(&self) -> &RepositoryService {
        &self.service
    }

    pub fn audit(&self) -> &RecordingAuditSink {
        &self.audit
    }

    /// Root of on-disk storage, when built with [`TestServiceBuilder::on_disk`].
    pub fn storage_root(&self) -> Option<&Path> {
        self.storage_dir.as_ref().map(TempDir::path)
    }

    /// Deploy `text` as a file.
    ///
    /// # Panics
    /// Panics if the deploy fails.
    pub fn deploy_text(&self, repo_key: &str, path: &str, text: &str) -> Arc<ItemInfo> {
        let repo_path = RepoPath::file(repo_key, path);
        self.service
            .deploy(&repo_path, &mut text.as_bytes(), DeployRequest::default())
            .unwrap_or_else(|e| panic!("deploy_text: failed to deploy {repo_path}: {e}"))
    }

    /// Read a file as UTF-8 text.
    ///
    /// # Panics
    /// Panics if the file cannot be read.
    pub fn read_text(&self, repo_key: &str, path: &str) -> String {
        let repo_path = RepoPath::file(repo_key, path);
        let mut reader = self
            .service
            .read(&repo_path)
            .unwrap_or_else(|e| panic!("read_text: failed to open {repo_path}: {e}"));
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .unwrap_or_else(|e| panic!("read_text: failed to read {repo_path}: {e}"));
        text
    }

    /// Names of a folder's visible children, without the `..` entry.
    ///
    /// # Panics
    /// Panics if the folder cannot be listed.
    pub fn list_names(&self, repo_key: &str, path: &str) -> Vec<String> {
        let folder = RepoPath::folder(repo_key, path);
        self.service
            .list_children(&folder, false)
            .unwrap_or_else(|e| panic!("list_names: failed to list {folder}: {e}"))
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    pub fn exists(&self, repo_key: &str, path: &str) -> bool {
        self.service.item_exists(&RepoPath::file(repo_key, path))
    }
}

/// Builder for [`TestService`].
#[derive(Default)]
pub struct TestServiceBuilder {
    config: CentralConfig,
    access: Option<Arc<dyn AccessControl>>,
    calculator: Option<Arc<dyn MetadataCalculator>>,
    on_disk: bool,
}

impl TestServiceBuilder {
    pub fn config(mut self, config: CentralConfig) -> Self {
        self.config = config;
        self
    }

    pub fn local(mut self, key: &str) -> Self {
        self.config = self.config.with_local(key);
        self
    }

    pub fn remote(mut self, key: &str, url: &str) -> Self {
        self.config = self.config.with_remote(key, url);
        self
    }

    pub fn virtual_repo(mut self, key: &str, members: &[&str]) -> Self {
        self.config = self.config.with_virtual(key, members);
        self
    }

    pub fn repository(mut self, descriptor: RepoDescriptor) -> Self {
        self.config = self.config.with_repository(descriptor);
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.storage.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn access(mut self, access: impl AccessControl + 'static) -> Self {
        self.access = Some(Arc::new(access));
        self
    }

    pub fn calculator(mut self, calculator: Arc<dyn MetadataCalculator>) -> Self {
        self.calculator = Some(calculator);
        self
    }

    /// Store content in a temporary directory instead of memory.
    pub fn on_disk(mut self) -> Self {
        self.on_disk = true;
        self
    }

    /// # Panics
    /// Panics if the service cannot be built.
    pub fn build(self) -> TestService {
        let audit = Arc::new(RecordingAuditSink::new());
        let mut builder = RepositoryService::builder(self.config).audit_sink(audit.clone());

        let storage_dir = if self.on_disk {
            let dir = TempDir::new().unwrap_or_else(|e| panic!("TestService: no temp dir: {e}"));
            builder = builder.storage(Arc::new(FsStorageProvider::new(dir.path())));
            Some(dir)
        } else {
            None
        };
        if let Some(access) = self.access {
            builder = builder.access_control(access);
        }
        if let Some(calculator) = self.calculator {
            builder = builder.metadata_calculator(calculator);
        }

        let service = builder
            .build()
            .unwrap_or_else(|e| panic!("TestService: failed to build service: {e}"));
        TestService {
            service,
            audit,
            storage_dir,
        }
    }
}
