//! Checksum policies
//!
//! A policy runs after content has been staged and digested, before the
//! staged blob is published. It sees the declared and computed checksums
//! and may rewrite the declared values or reject the write.

use binrepo_fs::{ChecksumInfo, ChecksumType, RepoPath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Decides whether computed checksums are acceptable for a write.
pub trait ChecksumPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Inspect (and possibly adjust) the checksums of `path`.
    ///
    /// Returning `Err` rejects the write with the given reason.
    fn process(
        &self,
        path: &RepoPath,
        checksums: &mut BTreeMap<ChecksumType, ChecksumInfo>,
    ) -> Result<(), String>;
}

/// Accept mismatches but log them, keeping the declared value.
#[derive(Debug, Default)]
pub struct FlagMismatch;

impl ChecksumPolicy for FlagMismatch {
    fn name(&self) -> &'static str {
        "flag-mismatch"
    }

    fn process(
        &self,
        path: &RepoPath,
        checksums: &mut BTreeMap<ChecksumType, ChecksumInfo>,
    ) -> Result<(), String> {
        for info in checksums.values().filter(|i| !i.checksums_match()) {
            tracing::warn!(
                path = %path,
                checksum = %info.checksum_type,
                declared = info.original.as_deref().unwrap_or_default(),
                actual = info.actual.as_deref().unwrap_or_default(),
                "checksum mismatch"
            );
        }
        Ok(())
    }
}

/// Reject any declared checksum that differs from the computed one.
#[derive(Debug, Default)]
pub struct FailOnMismatch;

impl ChecksumPolicy for FailOnMismatch {
    fn name(&self) -> &'static str {
        "fail-on-mismatch"
    }

    fn process(
        &self,
        _path: &RepoPath,
        checksums: &mut BTreeMap<ChecksumType, ChecksumInfo>,
    ) -> Result<(), String> {
        match checksums.values().find(|i| !i.checksums_match()) {
            Some(info) => Err(format!(
                "declared {} {} does not match actual {}",
                info.checksum_type,
                info.original.as_deref().unwrap_or_default(),
                info.actual.as_deref().unwrap_or_default()
            )),
            None => Ok(()),
        }
    }
}

/// Overwrite declared checksums with the computed ones.
#[derive(Debug, Default)]
pub struct IgnoreAndGenerate;

impl ChecksumPolicy for IgnoreAndGenerate {
    fn name(&self) -> &'static str {
        "ignore-and-generate"
    }

    fn process(
        &self,
        _path: &RepoPath,
        checksums: &mut BTreeMap<ChecksumType, ChecksumInfo>,
    ) -> Result<(), String> {
        for info in checksums.values_mut() {
            info.original = info.actual.clone();
        }
        Ok(())
    }
}

/// Configurable selection of a built-in policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChecksumPolicyType {
    #[default]
    FlagMismatch,
    FailOnMismatch,
    IgnoreAndGenerate,
}

impl ChecksumPolicyType {
    pub fn build(self) -> Arc<dyn ChecksumPolicy> {
        match self {
            Self::FlagMismatch => Arc::new(FlagMismatch),
            Self::FailOnMismatch => Arc::new(FailOnMismatch),
            Self::IgnoreAndGenerate => Arc::new(IgnoreAndGenerate),
        }
    }
}
