//! Remote repositories
//!
//! The transport to the remote side is not part of the core; a remote is
//! represented by its descriptor, the key of its cache repository and an
//! online flag. When the remote is marked offline after a failure, a
//! monitor thread brings it back online once the assumed-offline period
//! has passed.

use crate::config::RemoteRepoDescriptor;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct OnlineState {
    online: AtomicBool,
    offline_since: Mutex<Option<Instant>>,
}

struct Monitor {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct RemoteRepo {
    descriptor: RemoteRepoDescriptor,
    offline_period: Duration,
    state: Arc<OnlineState>,
    monitor: Mutex<Option<Monitor>>,
    blacked_out: AtomicBool,
}

impl fmt::Debug for RemoteRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRepo")
            .field("key", &self.descriptor.key)
            .field("url", &self.descriptor.url)
            .field("online", &self.is_online())
            .finish()
    }
}

impl RemoteRepo {
    pub fn new(descriptor: &RemoteRepoDescriptor) -> Self {
        let period = Duration::from_secs(descriptor.assumed_offline_secs);
        Self::with_offline_period(descriptor, period)
    }

    pub fn with_offline_period(descriptor: &RemoteRepoDescriptor, offline_period: Duration) -> Self {
        Self {
            descriptor: descriptor.clone(),
            offline_period,
            state: Arc::new(OnlineState {
                online: AtomicBool::new(!descriptor.offline),
                offline_since: Mutex::new(None),
            }),
            monitor: Mutex::new(None),
            blacked_out: AtomicBool::new(descriptor.blacked_out),
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn url(&self) -> &str {
        &self.descriptor.url
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn cache_key(&self) -> String {
        self.descriptor.cache_key()
    }

    pub fn descriptor(&self) -> &RemoteRepoDescriptor {
        &self.descriptor
    }

    pub fn is_blacked_out(&self) -> bool {
        self.blacked_out.load(Ordering::Acquire)
    }

    pub fn black_out(&self, reason: &str) {
        tracing::error!(repo = %self.descriptor.key, reason, "repository blacked out");
        self.blacked_out.store(true, Ordering::Release);
    }

    pub fn ensure_available(&self) -> Result<()> {
        if self.is_blacked_out() {
            Err(Error::BlackedOut {
                key: self.descriptor.key.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Whether requests may be forwarded to the remote side.
    pub fn is_online(&self) -> bool {
        !self.descriptor.offline && self.state.online.load(Ordering::Acquire)
    }

    /// Take the remote offline after a failure; the monitor retries later.
    pub fn mark_offline(&self, reason: &str) {
        if self.state.online.swap(false, Ordering::AcqRel) {
            *self.state.offline_since.lock() = Some(Instant::now());
            tracing::warn!(
                repo = %self.descriptor.key,
                reason,
                period = ?self.offline_period,
                "remote assumed offline"
            );
        }
    }

    pub fn mark_online(&self) {
        *self.state.offline_since.lock() = None;
        self.state.online.store(true, Ordering::Release);
    }

    /// Start the online monitor.
    pub fn init(&self) -> Result<()> {
        if self.descriptor.offline {
            return Ok(());
        }
        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            return Ok(());
        }
        let (stop, stopped) = mpsc::channel();
        let state = Arc::clone(&self.state);
        let period = self.offline_period;
        let tick = (period / 4).clamp(Duration::from_millis(10), Duration::from_secs(1));
        let key = self.descriptor.key.clone();

        let handle = thread::Builder::new()
            .name(format!("remote-monitor-{key}"))
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(tick) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let mut since = state.offline_since.lock();
                    if since.is_some_and(|t| t.elapsed() >= period) {
                        *since = None;
                        state.online.store(true, Ordering::Release);
                        tracing::info!(repo = %key, "remote back online");
                    }
                }
            })
            .map_err(|e| {
                Error::configuration(format!("cannot start monitor for '{}': {e}", self.descriptor.key))
            })?;

        *monitor = Some(Monitor { stop, handle });
        Ok(())
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.lock().is_some()
    }

    /// Stop and join the monitor. Safe to call more than once.
    pub fn destroy(&self) {
        let Some(monitor) = self.monitor.lock().take() else {
            return;
        };
        let _ = monitor.stop.send(());
        if monitor.handle.join().is_err() {
            tracing::error!(repo = %self.descriptor.key, "remote monitor panicked");
        }
        tracing::debug!(repo = %self.descriptor.key, "remote monitor stopped");
    }
}

impl Drop for RemoteRepo {
    fn drop(&mut self) {
        self.destroy();
    }
}
