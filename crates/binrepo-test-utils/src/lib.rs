//! Shared test utilities for the binrepo workspace.
//!
//! This crate provides standardised test fixtures to eliminate duplication
//! across crate test suites. It is a dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`access`]: access control and audit doubles
//! - [`service`]: [`TestService`] builder for a ready-to-use repository service

pub mod access;
pub mod service;

pub use access::{RecordingAuditSink, RuleAccess};
pub use service::{TestService, TestServiceBuilder};
