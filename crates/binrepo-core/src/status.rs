//! Accumulated outcome of batch operations

use crate::Error;
use binrepo_fs::RepoPath;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Warning,
    Error,
}

/// A single warning or error with an optional HTTP-analogous status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub level: StatusLevel,
    pub message: String,
    pub status_code: Option<u16>,
    pub path: Option<RepoPath>,
}

/// Status sink for move/copy and other batch operations.
///
/// Per-item failures are collected here instead of unwinding the batch.
/// When `fail_fast` is set, callers stop at the first recorded error
/// (see [`MultiStatus::should_stop`]).
#[derive(Debug, Clone, Default)]
pub struct MultiStatus {
    entries: Vec<StatusEntry>,
    moved: Vec<(RepoPath, RepoPath)>,
    marked_for_recalculation: BTreeSet<RepoPath>,
    fail_fast: bool,
    dry_run: bool,
}

impl MultiStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(fail_fast: bool, dry_run: bool) -> Self {
        Self {
            fail_fast,
            dry_run,
            ..Self::default()
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.entries.push(StatusEntry {
            level: StatusLevel::Warning,
            message,
            status_code: None,
            path: None,
        });
    }

    pub fn error(&mut self, message: impl Into<String>, status_code: u16) {
        let message = message.into();
        tracing::error!(status = status_code, "{}", message);
        self.entries.push(StatusEntry {
            level: StatusLevel::Error,
            message,
            status_code: Some(status_code),
            path: None,
        });
    }

    /// Record a failure of one item.
    pub fn item_error(&mut self, path: &RepoPath, error: &Error) {
        let status_code = error.status_code();
        tracing::error!(path = %path, status = status_code, "{}", error);
        self.entries.push(StatusEntry {
            level: StatusLevel::Error,
            message: format!("{path}: {error}"),
            status_code: Some(status_code),
            path: Some(path.clone()),
        });
    }

    /// Record a failure that is not tied to one item.
    pub fn fatal(&mut self, error: &Error) {
        self.error(error.to_string(), error.status_code());
    }

    pub fn record_moved(&mut self, from: RepoPath, to: RepoPath) {
        self.moved.push((from, to));
    }

    pub fn mark_for_recalculation(&mut self, folder: RepoPath) {
        self.marked_for_recalculation.insert(folder);
    }

    pub fn is_error(&self) -> bool {
        self.entries.iter().any(|e| e.level == StatusLevel::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.entries.iter().any(|e| e.level == StatusLevel::Warning)
    }

    /// Whether a batch honoring `fail_fast` must stop now.
    pub fn should_stop(&self) -> bool {
        self.fail_fast && self.is_error()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| e.level == StatusLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| e.level == StatusLevel::Warning)
    }

    pub fn last_error(&self) -> Option<&StatusEntry> {
        self.errors().last()
    }

    /// Status of the whole batch: the last error's code, or 200.
    pub fn status_code(&self) -> u16 {
        self.last_error()
            .and_then(|e| e.status_code)
            .unwrap_or(200)
    }

    /// Items relocated (or, in a dry run, that would have been).
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }

    pub fn moved(&self) -> &[(RepoPath, RepoPath)] {
        &self.moved
    }

    pub fn marked_for_recalculation(&self) -> &BTreeSet<RepoPath> {
        &self.marked_for_recalculation
    }

    pub fn merge(&mut self, other: MultiStatus) {
        self.entries.extend(other.entries);
        self.moved.extend(other.moved);
        self.marked_for_recalculation
            .extend(other.marked_for_recalculation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_follows_last_error() {
        let mut status = MultiStatus::new();
        assert_eq!(status.status_code(), 200);
        status.warn("just a warning");
        assert_eq!(status.status_code(), 200);
        status.error("first", 404);
        status.error("second", 403);
        assert_eq!(status.status_code(), 403);
        assert!(status.is_error());
        assert!(status.has_warnings());
    }

    #[test]
    fn fail_fast_stops_after_first_error() {
        let mut status = MultiStatus::with_options(true, false);
        assert!(!status.should_stop());
        status.item_error(
            &RepoPath::file("libs", "a.jar"),
            &Error::not_found("libs:a.jar"),
        );
        assert!(status.should_stop());
    }
}
