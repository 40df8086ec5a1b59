//! Tests for checksum derivation and deploy-by-checksum

use binrepo_core::{
    Action, CentralConfig, ChecksumDerivationCache, ChecksumSearch, Error, Result,
};
use binrepo_fs::{ChecksumPair, ChecksumType, RepoPath};
use binrepo_test_utils::{RuleAccess, TestService};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
const UNKNOWN_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

fn seeded() -> TestService {
    let service = TestService::builder().local("libs").local("mirror").build();
    service.deploy_text("libs", "org/acme/1.0/acme.jar", "hello world");
    service
}

mod derivation {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn derives_md5_from_sha1() {
        let service = seeded();
        let pair = service
            .derive_missing_checksum(ChecksumType::Sha1, HELLO_SHA1)
            .unwrap();
        assert_eq!(pair, Some(ChecksumPair::new(HELLO_SHA1, HELLO_MD5)));
    }

    #[test]
    fn known_value_is_case_insensitive() {
        let service = seeded();
        let pair = service
            .derive_missing_checksum(ChecksumType::Md5, &HELLO_MD5.to_uppercase())
            .unwrap()
            .unwrap();
        assert_eq!(pair.sha1, HELLO_SHA1);
    }

    #[test]
    fn result_is_cached_under_both_checksums() {
        let service = seeded();
        service
            .derive_missing_checksum(ChecksumType::Sha1, HELLO_SHA1)
            .unwrap();

        let cache = service.derivation_cache();
        assert_eq!(
            cache.cached(ChecksumType::Md5, HELLO_MD5),
            Some(ChecksumPair::new(HELLO_SHA1, HELLO_MD5))
        );
        service
            .derive_missing_checksum(ChecksumType::Md5, HELLO_MD5)
            .unwrap();
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn misses_are_not_cached() {
        let service = seeded();
        let cache = service.derivation_cache();

        assert_eq!(
            service
                .derive_missing_checksum(ChecksumType::Sha1, UNKNOWN_SHA1)
                .unwrap(),
            None
        );
        assert_eq!(cache.len(ChecksumType::Sha1), 0);

        service.derive_missing_checksum(ChecksumType::Sha1, UNKNOWN_SHA1).unwrap();
        assert_eq!(cache.computations(), 2);
    }

    #[test]
    fn malformed_value_is_rejected() {
        let service = seeded();
        let err = service
            .derive_missing_checksum(ChecksumType::Md5, "xyz")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidChecksum { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn concurrent_callers_share_one_derivation() {
        let service = Arc::new(seeded());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.derive_missing_checksum(ChecksumType::Sha1, HELLO_SHA1)
                })
            })
            .collect();
        for handle in handles {
            let pair = handle.join().unwrap().unwrap().unwrap();
            assert_eq!(pair.md5, HELLO_MD5);
        }
        assert_eq!(service.derivation_cache().computations(), 1);
    }

    #[test]
    fn reload_drops_cached_results() {
        let service = seeded();
        service
            .derive_missing_checksum(ChecksumType::Sha1, HELLO_SHA1)
            .unwrap();

        service
            .reload(&CentralConfig::new().with_local("mirror"))
            .unwrap();
        assert_eq!(service.derivation_cache().len(ChecksumType::Sha1), 0);
        assert_eq!(
            service
                .derive_missing_checksum(ChecksumType::Sha1, HELLO_SHA1)
                .unwrap(),
            None
        );
    }
}

mod failures {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FailingSearch {
        calls: AtomicUsize,
    }

    impl ChecksumSearch for FailingSearch {
        fn find_by_checksum(&self, _: ChecksumType, _: &str) -> Result<Vec<RepoPath>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::not_found("index unavailable"))
        }

        fn checksums_of(&self, _: &RepoPath) -> Result<Option<ChecksumPair>> {
            Ok(None)
        }
    }

    struct PanickingSearch;

    impl ChecksumSearch for PanickingSearch {
        fn find_by_checksum(&self, _: ChecksumType, _: &str) -> Result<Vec<RepoPath>> {
            panic!("search exploded")
        }

        fn checksums_of(&self, _: &RepoPath) -> Result<Option<ChecksumPair>> {
            Ok(None)
        }
    }

    #[test]
    fn failure_is_reported_and_not_cached() {
        let search = Arc::new(FailingSearch {
            calls: AtomicUsize::new(0),
        });
        let cache = ChecksumDerivationCache::new(search.clone(), Duration::from_secs(60), 16, 2);

        let err = cache.derive_missing(ChecksumType::Sha1, HELLO_SHA1).unwrap_err();
        assert!(matches!(err, Error::DerivationFailed { .. }));
        assert_eq!(err.status_code(), 500);
        assert_eq!(cache.len(ChecksumType::Sha1), 0);

        let _ = cache.derive_missing(ChecksumType::Sha1, HELLO_SHA1);
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_search_releases_waiters() {
        let cache = ChecksumDerivationCache::new(Arc::new(PanickingSearch), Duration::from_secs(60), 16, 1);

        let err = cache.derive_missing(ChecksumType::Md5, HELLO_MD5).unwrap_err();
        assert!(err.to_string().contains("panicked"), "got: {err}");
        assert_eq!(cache.len(ChecksumType::Md5), 0);
    }
}

mod deploy_by_checksum {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn copies_existing_content() {
        let service = seeded();
        let target = RepoPath::file("mirror", "copies/acme.jar");

        let info = service
            .deploy_by_checksum(&target, ChecksumType::Sha1, HELLO_SHA1)
            .unwrap();
        assert_eq!(info.repo_path, target);
        assert_eq!(info.file().unwrap().md5(), Some(HELLO_MD5));
        assert_eq!(service.read_text("mirror", "copies/acme.jar"), "hello world");
        assert!(service.exists("libs", "org/acme/1.0/acme.jar"));
    }

    #[test]
    fn unknown_checksum_is_not_found() {
        let service = seeded();
        let err = service
            .deploy_by_checksum(&RepoPath::file("mirror", "x.jar"), ChecksumType::Sha1, UNKNOWN_SHA1)
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(!service.exists("mirror", "x.jar"));
    }

    #[test]
    fn unreadable_sources_are_not_used() {
        let service = TestService::builder()
            .local("libs")
            .local("mirror")
            .access(RuleAccess::new("bob").deny(Action::Read, "libs", ""))
            .build();
        service.deploy_text("libs", "org/acme/1.0/acme.jar", "hello world");

        let err = service
            .deploy_by_checksum(&RepoPath::file("mirror", "x.jar"), ChecksumType::Md5, HELLO_MD5)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn malformed_checksum_is_rejected() {
        let service = seeded();
        let err = service
            .deploy_by_checksum(&RepoPath::file("mirror", "x.jar"), ChecksumType::Sha1, HELLO_MD5)
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
