//! Cooperative pause/stop signal for long-running operations

use crate::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<RunState>,
    changed: Condvar,
}

/// Handle shared between an operation and whoever controls it.
///
/// Operations call [`StopSignal::check`] at every item boundary. While
/// paused, `check` blocks; once stopped, it fails with `Cancelled` and the
/// operation unwinds, releasing its locks.
#[derive(Debug, Clone)]
pub struct StopSignal {
    shared: Arc<Shared>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::Running),
                changed: Condvar::new(),
            }),
        }
    }

    fn set(&self, next: RunState) {
        let mut state = self.shared.state.lock();
        if *state != RunState::Stopped {
            *state = next;
        }
        drop(state);
        self.shared.changed.notify_all();
    }

    pub fn pause(&self) {
        tracing::debug!("pause requested");
        self.set(RunState::Paused);
    }

    pub fn resume(&self) {
        self.set(RunState::Running);
    }

    /// Request a stop. Final; a stopped signal cannot be resumed.
    pub fn stop(&self) {
        tracing::debug!("stop requested");
        self.set(RunState::Stopped);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shared.state.lock() == RunState::Stopped
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.state.lock() == RunState::Paused
    }

    /// Block while paused; fail once stopped.
    pub fn check(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        while *state == RunState::Paused {
            self.shared.changed.wait(&mut state);
        }
        match *state {
            RunState::Stopped => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}
