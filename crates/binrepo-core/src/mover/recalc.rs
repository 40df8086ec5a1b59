//! Deferred metadata recalculation
//!
//! Structural changes mark artifact folders; the marks of one call are
//! handed to the [`MetadataRecalculator`] as a single batch and processed
//! on its worker pool.

use crate::registry::RepoRegistry;
use crate::{Error, Result};
use binrepo_fs::RepoPath;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use threadpool::ThreadPool;

/// Property listing the version folders of an artifact folder.
pub const VERSIONS_PROPERTY: &str = "maven.versions";

/// Regenerates the metadata of one folder.
pub trait MetadataCalculator: Send + Sync {
    fn recalculate(&self, folder: &RepoPath) -> Result<()>;
}

/// Records the names of a folder's subfolders as its version index.
pub struct VersionIndexCalculator {
    registry: Arc<RepoRegistry>,
}

impl VersionIndexCalculator {
    pub fn new(registry: Arc<RepoRegistry>) -> Self {
        Self { registry }
    }
}

impl MetadataCalculator for VersionIndexCalculator {
    fn recalculate(&self, folder: &RepoPath) -> Result<()> {
        if folder.is_root() {
            return Ok(());
        }
        let repo = self
            .registry
            .local_or_cached_repository_by_key(folder.repo_key())
            .ok_or_else(|| Error::not_found(folder.repo_key()))?;
        if !repo.item_exists(folder) {
            tracing::debug!(folder = %folder, "folder gone before recalculation");
            return Ok(());
        }

        let mut item = repo.get_mutable(folder)?;
        let versions: Vec<String> = repo
            .children(folder)
            .iter()
            .filter(|c| c.is_folder())
            .map(|c| c.name().to_string())
            .collect();
        if versions.is_empty() {
            item.remove_property(VERSIONS_PROPERTY)?;
        } else {
            item.set_property(VERSIONS_PROPERTY, versions)?;
        }
        item.save()?;
        Ok(())
    }
}

/// How many processed folders [`MetadataRecalculator::recalculated`] keeps.
pub const RECENT_RECALCULATIONS: usize = 1024;

/// Processed folders: a running total and the most recent ones.
#[derive(Debug)]
struct History {
    total: u64,
    recent: VecDeque<RepoPath>,
    limit: usize,
}

impl History {
    fn new(limit: usize) -> Self {
        Self {
            total: 0,
            recent: VecDeque::with_capacity(limit.min(64)),
            limit,
        }
    }

    fn record(&mut self, folder: RepoPath) {
        self.total += 1;
        if self.recent.len() == self.limit {
            self.recent.pop_front();
        }
        if self.limit > 0 {
            self.recent.push_back(folder);
        }
    }
}

/// Runs metadata recalculation batches in the background.
pub struct MetadataRecalculator {
    calculator: Arc<dyn MetadataCalculator>,
    pool: Mutex<ThreadPool>,
    pending: Arc<Mutex<BTreeSet<RepoPath>>>,
    history: Arc<Mutex<History>>,
}

impl fmt::Debug for MetadataRecalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRecalculator")
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl MetadataRecalculator {
    pub fn new(calculator: Arc<dyn MetadataCalculator>, workers: usize) -> Self {
        Self {
            calculator,
            pool: Mutex::new(
                threadpool::Builder::new()
                    .num_threads(workers.max(1))
                    .thread_name("metadata-recalc".to_string())
                    .build(),
            ),
            pending: Arc::new(Mutex::new(BTreeSet::new())),
            history: Arc::new(Mutex::new(History::new(RECENT_RECALCULATIONS))),
        }
    }

    /// Queue one batch of marked folders as a single job.
    pub fn schedule(&self, batch: BTreeSet<RepoPath>) {
        if batch.is_empty() {
            return;
        }
        tracing::debug!(folders = batch.len(), "metadata recalculation scheduled");
        self.pending.lock().extend(batch.iter().cloned());

        let calculator = Arc::clone(&self.calculator);
        let pending = Arc::clone(&self.pending);
        let history = Arc::clone(&self.history);
        self.pool.lock().execute(move || {
            for folder in batch {
                if let Err(e) = calculator.recalculate(&folder) {
                    tracing::warn!(folder = %folder, error = %e, "metadata recalculation failed");
                }
                pending.lock().remove(&folder);
                history.lock().record(folder);
            }
        });
    }

    /// Block until every scheduled batch has run.
    pub fn wait_idle(&self) {
        let pool = self.pool.lock().clone();
        pool.join();
    }

    pub fn pending(&self) -> BTreeSet<RepoPath> {
        self.pending.lock().clone()
    }

    /// The most recently processed folders, oldest first, at most
    /// [`RECENT_RECALCULATIONS`] of them.
    pub fn recalculated(&self) -> Vec<RepoPath> {
        self.history.lock().recent.iter().cloned().collect()
    }

    /// Number of folders processed since creation.
    pub fn recalculated_count(&self) -> u64 {
        self.history.lock().total
    }
}
