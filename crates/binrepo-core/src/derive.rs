//! Checksum derivation cache
//!
//! An upload may declare only one of its checksums. The other one is
//! derived by searching stored content for the known value. Derivations are
//! single-flight: concurrent requests for the same known value share one
//! task running on the worker pool, and every caller observes its result.
//!
//! Successful results are cached under both checksums. Misses and failures
//! are evicted before waiters are released, so a negative result never
//! outlives the request that produced it.

use crate::{Error, Result};
use binrepo_fs::{ChecksumPair, ChecksumType, RepoPath};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use threadpool::ThreadPool;

/// Content-checksum search over stored items.
pub trait ChecksumSearch: Send + Sync {
    /// Paths of files whose computed checksum of `checksum_type` is `value`.
    fn find_by_checksum(&self, checksum_type: ChecksumType, value: &str) -> Result<Vec<RepoPath>>;

    /// Both computed checksums of the file at `path`.
    fn checksums_of(&self, path: &RepoPath) -> Result<Option<ChecksumPair>>;
}

#[derive(Debug, Clone)]
enum DerivationState {
    Pending,
    Found(ChecksumPair),
    Missing,
    Failed(String),
}

#[derive(Debug)]
struct Derivation {
    created: Instant,
    state: Mutex<DerivationState>,
    done: Condvar,
}

impl Derivation {
    fn pending() -> Arc<Self> {
        Arc::new(Self {
            created: Instant::now(),
            state: Mutex::new(DerivationState::Pending),
            done: Condvar::new(),
        })
    }

    fn found(pair: ChecksumPair) -> Arc<Self> {
        Arc::new(Self {
            created: Instant::now(),
            state: Mutex::new(DerivationState::Found(pair)),
            done: Condvar::new(),
        })
    }

    fn complete(&self, state: DerivationState) {
        *self.state.lock() = state;
        self.done.notify_all();
    }

    fn wait(&self) -> DerivationState {
        let mut state = self.state.lock();
        while matches!(*state, DerivationState::Pending) {
            self.done.wait(&mut state);
        }
        state.clone()
    }

    fn is_completed(&self) -> bool {
        self.state
            .try_lock()
            .is_some_and(|s| !matches!(*s, DerivationState::Pending))
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.is_completed() && self.created.elapsed() >= ttl
    }
}

type DerivationMap = DashMap<String, Arc<Derivation>>;

struct Inner {
    search: Arc<dyn ChecksumSearch>,
    by_sha1: DerivationMap,
    by_md5: DerivationMap,
    ttl: Duration,
    capacity: usize,
    computations: AtomicU64,
}

impl Inner {
    fn map(&self, checksum_type: ChecksumType) -> &DerivationMap {
        match checksum_type {
            ChecksumType::Sha1 => &self.by_sha1,
            ChecksumType::Md5 => &self.by_md5,
        }
    }

    fn search(&self, checksum_type: ChecksumType, value: &str) -> Result<Option<ChecksumPair>> {
        for path in self.search.find_by_checksum(checksum_type, value)? {
            if let Some(pair) = self.search.checksums_of(&path)? {
                if pair.get(checksum_type).eq_ignore_ascii_case(value) {
                    return Ok(Some(pair));
                }
            }
        }
        Ok(None)
    }

    fn run(&self, checksum_type: ChecksumType, value: &str, task: &Arc<Derivation>) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.search(checksum_type, value)));
        let state = match outcome {
            Ok(Ok(Some(pair))) => DerivationState::Found(pair),
            Ok(Ok(None)) => DerivationState::Missing,
            Ok(Err(e)) => DerivationState::Failed(e.to_string()),
            Err(_) => DerivationState::Failed("derivation panicked".to_string()),
        };

        match &state {
            DerivationState::Found(pair) => {
                let other = checksum_type.other();
                self.map(other)
                    .entry(pair.get(other).to_string())
                    .or_insert_with(|| Derivation::found(pair.clone()));
                self.enforce_capacity(other);
                tracing::debug!(checksum = %checksum_type, value, "checksum derived");
            }
            DerivationState::Failed(message) => {
                self.evict(checksum_type, value, task);
                tracing::warn!(checksum = %checksum_type, value, %message, "checksum derivation failed");
            }
            _ => {
                self.evict(checksum_type, value, task);
                tracing::debug!(checksum = %checksum_type, value, "no content with this checksum");
            }
        }
        task.complete(state);
    }

    fn evict(&self, checksum_type: ChecksumType, value: &str, task: &Arc<Derivation>) {
        self.map(checksum_type)
            .remove_if(value, |_, current| Arc::ptr_eq(current, task));
    }

    /// Drop the oldest completed entries beyond the capacity bound.
    fn enforce_capacity(&self, checksum_type: ChecksumType) {
        let map = self.map(checksum_type);
        if map.len() <= self.capacity {
            return;
        }
        let mut completed: Vec<(Instant, String, Arc<Derivation>)> = map
            .iter()
            .filter(|e| e.value().is_completed())
            .map(|e| (e.value().created, e.key().clone(), Arc::clone(e.value())))
            .collect();
        completed.sort_by_key(|(created, _, _)| *created);
        let excess = map.len().saturating_sub(self.capacity);
        for (_, key, task) in completed.into_iter().take(excess) {
            map.remove_if(&key, |_, current| Arc::ptr_eq(current, &task));
        }
    }
}

/// Memoizing, single-flight derivation of missing checksums.
#[derive(Clone)]
pub struct ChecksumDerivationCache {
    inner: Arc<Inner>,
    pool: Arc<Mutex<ThreadPool>>,
}

impl fmt::Debug for ChecksumDerivationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumDerivationCache")
            .field("by_sha1", &self.inner.by_sha1.len())
            .field("by_md5", &self.inner.by_md5.len())
            .field("ttl", &self.inner.ttl)
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl ChecksumDerivationCache {
    pub fn new(
        search: Arc<dyn ChecksumSearch>,
        ttl: Duration,
        capacity: usize,
        workers: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                search,
                by_sha1: DashMap::new(),
                by_md5: DashMap::new(),
                ttl,
                capacity: capacity.max(1),
                computations: AtomicU64::new(0),
            }),
            pool: Arc::new(Mutex::new(
                threadpool::Builder::new()
                    .num_threads(workers.max(1))
                    .thread_name("checksum-derivation".to_string())
                    .build(),
            )),
        }
    }

    /// Given one checksum of some content, find both.
    ///
    /// Returns `Ok(None)` when no stored content has the known checksum.
    pub fn derive_missing(
        &self,
        known_type: ChecksumType,
        known_value: &str,
    ) -> Result<Option<ChecksumPair>> {
        if !known_type.is_valid(known_value) {
            return Err(Error::InvalidChecksum {
                checksum_type: known_type.to_string(),
                value: known_value.to_string(),
            });
        }
        let value = known_value.to_ascii_lowercase();
        let map = self.inner.map(known_type);

        let (task, owner) = match map.entry(value.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(self.inner.ttl) {
                    let task = Derivation::pending();
                    occupied.insert(Arc::clone(&task));
                    (task, true)
                } else {
                    (Arc::clone(occupied.get()), false)
                }
            }
            Entry::Vacant(vacant) => {
                let task = Derivation::pending();
                vacant.insert(Arc::clone(&task));
                (task, true)
            }
        };

        if owner {
            self.inner.computations.fetch_add(1, Ordering::Relaxed);
            self.inner.enforce_capacity(known_type);
            let inner = Arc::clone(&self.inner);
            let job_task = Arc::clone(&task);
            let job_value = value.clone();
            self.pool
                .lock()
                .execute(move || inner.run(known_type, &job_value, &job_task));
        }

        match task.wait() {
            DerivationState::Found(pair) => Ok(Some(pair)),
            DerivationState::Missing => Ok(None),
            DerivationState::Failed(message) => Err(Error::DerivationFailed {
                checksum_type: known_type.to_string(),
                value,
                message,
            }),
            DerivationState::Pending => Err(Error::DerivationFailed {
                checksum_type: known_type.to_string(),
                value,
                message: "derivation did not complete".to_string(),
            }),
        }
    }

    /// A cached result, without triggering a derivation.
    pub fn cached(&self, known_type: ChecksumType, known_value: &str) -> Option<ChecksumPair> {
        let value = known_value.to_ascii_lowercase();
        let task = self.inner.map(known_type).get(&value)?.value().clone();
        match &*task.state.try_lock()? {
            DerivationState::Found(pair) if task.created.elapsed() < self.inner.ttl => {
                Some(pair.clone())
            }
            _ => None,
        }
    }

    /// Number of derivations started so far.
    pub fn computations(&self) -> u64 {
        self.inner.computations.load(Ordering::Relaxed)
    }

    /// Entries currently held, per checksum type.
    pub fn len(&self, checksum_type: ChecksumType) -> usize {
        self.inner.map(checksum_type).len()
    }

    /// Remove completed entries older than the time-to-live.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.inner.ttl;
        let mut purged = 0;
        for checksum_type in ChecksumType::ALL {
            let map = self.inner.map(checksum_type);
            let before = map.len();
            map.retain(|_, task| !task.is_expired(ttl));
            purged += before.saturating_sub(map.len());
        }
        purged
    }

    pub fn clear(&self) {
        self.inner.by_sha1.retain(|_, task| !task.is_completed());
        self.inner.by_md5.retain(|_, task| !task.is_completed());
    }
}
