//! Path-scoped read/write locks
//!
//! A [`LockManager`] owns one lock table shared by every repository of a
//! registry. Entries are keyed by the path identity (`key:path`, folder flag
//! ignored), so locking one path never blocks another. Read locks are
//! reference counted; a write lock excludes readers and other writers.
//! The thread holding a write lock may re-enter it and may read under it.
//!
//! Guards release on drop, so every exit path (including unwinding) frees
//! the lock.

use crate::{Error, Result};
use binrepo_fs::RepoPath;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: Option<ThreadId>,
    write_holds: usize,
}

impl LockState {
    fn is_idle(&self) -> bool {
        self.readers == 0 && self.writer.is_none()
    }
}

/// Mode of a held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// Snapshot of one lock table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub path: String,
    pub mode: LockMode,
    /// Number of read holds, or re-entrant write holds
    pub holds: usize,
    pub holder: Option<ThreadId>,
}

/// Table of per-path locks.
pub struct LockManager {
    table: Mutex<HashMap<String, LockState>>,
    released: Condvar,
    timeout_ms: AtomicU64,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("timeout", &self.timeout())
            .field("held", &self.table.lock().len())
            .finish()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Change the acquisition budget; applies to later acquisitions.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    /// Acquire a shared lock, waiting while another thread writes.
    pub fn read(&self, path: &RepoPath) -> Result<ReadGuard<'_>> {
        let id = path.id();
        let me = thread::current().id();
        self.acquire(&id, |state| {
            if state.writer.is_none() || state.writer == Some(me) {
                state.readers += 1;
                true
            } else {
                false
            }
        })?;
        tracing::trace!(path = %id, "read lock acquired");
        Ok(ReadGuard { manager: self, id })
    }

    /// Acquire the exclusive lock, waiting up to the configured timeout.
    ///
    /// A thread that holds only a read lock on the same path cannot upgrade;
    /// it times out instead.
    pub fn write(&self, path: &RepoPath) -> Result<WriteGuard<'_>> {
        self.write_with_timeout(path, self.timeout())
    }

    /// Acquire the exclusive lock only if it is free right now.
    pub fn try_write(&self, path: &RepoPath) -> Option<WriteGuard<'_>> {
        self.write_with_timeout(path, Duration::ZERO).ok()
    }

    fn write_with_timeout(&self, path: &RepoPath, timeout: Duration) -> Result<WriteGuard<'_>> {
        let id = path.id();
        let me = thread::current().id();
        self.acquire_within(&id, timeout, |state| {
            if state.writer == Some(me) {
                state.write_holds += 1;
                true
            } else if state.is_idle() {
                state.writer = Some(me);
                state.write_holds = 1;
                true
            } else {
                false
            }
        })?;
        tracing::trace!(path = %id, "write lock acquired");
        Ok(WriteGuard { manager: self, id })
    }

    /// Acquire write locks on several paths in canonical order.
    ///
    /// Paths are sorted by identity and deduplicated before locking, so two
    /// batches over overlapping sets cannot deadlock each other. On failure
    /// every lock taken so far is released.
    pub fn write_many<'a, I>(&'a self, paths: I) -> Result<WriteGuards<'a>>
    where
        I: IntoIterator<Item = &'a RepoPath>,
    {
        let mut ordered: Vec<&RepoPath> = paths.into_iter().collect();
        ordered.sort_by_key(|p| p.id());
        ordered.dedup_by_key(|p| p.id());

        let mut guards = Vec::with_capacity(ordered.len());
        for path in ordered {
            guards.push(self.write(path)?);
        }
        Ok(WriteGuards { guards })
    }

    /// Write-lock `paths` and read-lock every folder above them.
    ///
    /// The read holds keep an ancestor from being deleted while content is
    /// created below it. Everything is taken in one canonical order; a path
    /// that is both written and an ancestor of another is only written.
    pub fn write_many_with_ancestors<'p, I>(&self, paths: I) -> Result<PathGuards<'_>>
    where
        I: IntoIterator<Item = &'p RepoPath>,
    {
        let writes: Vec<&RepoPath> = paths.into_iter().collect();
        let mut plan: BTreeMap<String, (RepoPath, LockMode)> = BTreeMap::new();
        for path in &writes {
            for ancestor in path.ancestors().filter(|a| !a.is_root()) {
                plan.entry(ancestor.id())
                    .or_insert((ancestor, LockMode::Read));
            }
        }
        for path in writes {
            plan.insert(path.id(), (path.clone(), LockMode::Write));
        }

        let mut held = Vec::with_capacity(plan.len());
        for (path, mode) in plan.into_values() {
            held.push(match mode {
                LockMode::Read => HeldGuard::Read(self.read(&path)?),
                LockMode::Write => HeldGuard::Write(self.write(&path)?),
            });
        }
        Ok(PathGuards { held })
    }

    /// Run `f` under a read lock on `path`.
    pub fn with_read_lock<T>(&self, path: &RepoPath, f: impl FnOnce() -> T) -> Result<T> {
        let _guard = self.read(path)?;
        Ok(f())
    }

    /// Run `f` under the write lock on `path`.
    pub fn with_write_lock<T>(&self, path: &RepoPath, f: impl FnOnce() -> T) -> Result<T> {
        let _guard = self.write(path)?;
        Ok(f())
    }

    /// Whether some thread holds the write lock on `path`.
    pub fn is_write_locked(&self, path: &RepoPath) -> bool {
        self.table
            .lock()
            .get(&path.id())
            .is_some_and(|s| s.writer.is_some())
    }

    /// Whether the current thread holds the write lock on `path`.
    pub fn is_write_locked_by_current_thread(&self, path: &RepoPath) -> bool {
        let me = thread::current().id();
        self.table
            .lock()
            .get(&path.id())
            .is_some_and(|s| s.writer == Some(me))
    }

    /// Current number of read holds on `path`.
    pub fn readers(&self, path: &RepoPath) -> usize {
        self.table.lock().get(&path.id()).map_or(0, |s| s.readers)
    }

    /// Snapshot of every held lock, sorted by path.
    pub fn entries(&self) -> Vec<LockEntry> {
        let table = self.table.lock();
        let mut entries: Vec<LockEntry> = table
            .iter()
            .map(|(path, state)| match state.writer {
                Some(holder) => LockEntry {
                    path: path.clone(),
                    mode: LockMode::Write,
                    holds: state.write_holds,
                    holder: Some(holder),
                },
                None => LockEntry {
                    path: path.clone(),
                    mode: LockMode::Read,
                    holds: state.readers,
                    holder: None,
                },
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    fn acquire(&self, id: &str, grant: impl FnMut(&mut LockState) -> bool) -> Result<()> {
        self.acquire_within(id, self.timeout(), grant)
    }

    fn acquire_within(
        &self,
        id: &str,
        timeout: Duration,
        mut grant: impl FnMut(&mut LockState) -> bool,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut table = self.table.lock();
        loop {
            let state = table.entry(id.to_string()).or_default();
            if grant(state) {
                return Ok(());
            }
            if self.released.wait_until(&mut table, deadline).timed_out() {
                let state = table.entry(id.to_string()).or_default();
                if grant(state) {
                    return Ok(());
                }
                if state.is_idle() {
                    table.remove(id);
                }
                tracing::warn!(path = %id, ?timeout, "lock acquisition timed out");
                return Err(Error::LockTimeout {
                    path: id.to_string(),
                    timeout,
                });
            }
        }
    }

    fn release(&self, id: &str, mode: LockMode) {
        let mut table = self.table.lock();
        let Some(state) = table.get_mut(id) else {
            return;
        };
        match mode {
            LockMode::Read => state.readers = state.readers.saturating_sub(1),
            LockMode::Write => {
                state.write_holds = state.write_holds.saturating_sub(1);
                if state.write_holds == 0 {
                    state.writer = None;
                }
            }
        }
        if state.is_idle() {
            table.remove(id);
        }
        drop(table);
        self.released.notify_all();
    }
}

/// Shared hold on one path.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    manager: &'a LockManager,
    id: String,
}

impl ReadGuard<'_> {
    pub fn path_id(&self) -> &str {
        &self.id
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.id, LockMode::Read);
    }
}

impl fmt::Debug for ReadGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadGuard").field(&self.id).finish()
    }
}

/// Exclusive hold on one path.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    manager: &'a LockManager,
    id: String,
}

impl WriteGuard<'_> {
    pub fn path_id(&self) -> &str {
        &self.id
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.id, LockMode::Write);
    }
}

impl fmt::Debug for WriteGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteGuard").field(&self.id).finish()
    }
}

/// Write locks taken together by [`LockManager::write_many`].
#[must_use = "the locks are released as soon as the guards are dropped"]
#[derive(Debug)]
pub struct WriteGuards<'a> {
    guards: Vec<WriteGuard<'a>>,
}

impl WriteGuards<'_> {
    /// Locked path identities in acquisition order.
    pub fn path_ids(&self) -> Vec<&str> {
        self.guards.iter().map(|g| g.path_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

#[derive(Debug)]
enum HeldGuard<'a> {
    Read(ReadGuard<'a>),
    Write(WriteGuard<'a>),
}

/// Locks taken together by [`LockManager::write_many_with_ancestors`].
#[must_use = "the locks are released as soon as the guards are dropped"]
#[derive(Debug)]
pub struct PathGuards<'a> {
    held: Vec<HeldGuard<'a>>,
}

impl PathGuards<'_> {
    /// Locked path identities and modes in acquisition order.
    pub fn held(&self) -> Vec<(&str, LockMode)> {
        self.held
            .iter()
            .map(|guard| match guard {
                HeldGuard::Read(g) => (g.path_id(), LockMode::Read),
                HeldGuard::Write(g) => (g.path_id(), LockMode::Write),
            })
            .collect()
    }
}
