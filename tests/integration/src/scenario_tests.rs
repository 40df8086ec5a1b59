//! Cross-crate scenario tests
//!
//! Each module drives the service the way a deployment would: several
//! repositories, concurrent callers, reloads and reopened storage.

use binrepo_core::{
    CentralConfig, DeployRequest, FsStorageProvider, MoveOptions, MoverConfig, RepositoryService,
};
use binrepo_fs::{ChecksumPair, ChecksumType, RepoPath};
use binrepo_test_utils::TestService;
use pretty_assertions::assert_eq;
use std::io::Read;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// Test Infrastructure
// =============================================================================

const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

fn on_disk_service(root: &TempDir, config: CentralConfig) -> RepositoryService {
    RepositoryService::builder(config)
        .storage(Arc::new(FsStorageProvider::new(root.path())))
        .build()
        .unwrap()
}

fn deploy(service: &RepositoryService, path: &RepoPath, text: &str) {
    service
        .deploy(path, &mut text.as_bytes(), DeployRequest::default())
        .unwrap();
}

// =============================================================================
// S1: content outlives the process
// =============================================================================

mod s1_persistence {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reopened_storage_serves_the_same_files() {
        let root = TempDir::new().unwrap();
        let config = CentralConfig::new().with_local("libs-release");
        let jar = RepoPath::file("libs-release", "org/acme/1.0/acme.jar");

        let first = on_disk_service(&root, config.clone());
        deploy(&first, &jar, "hello world");
        first.shutdown();
        drop(first);

        let second = on_disk_service(&root, config);
        let info = second.item_info(&jar).unwrap();
        assert_eq!(
            info.file().unwrap().checksum_pair(),
            Some(ChecksumPair::new(HELLO_SHA1, HELLO_MD5))
        );
        assert!(second.item_exists(&RepoPath::folder("libs-release", "org/acme/1.0")));
        assert_eq!(
            second.derive_missing_checksum(ChecksumType::Md5, HELLO_MD5).unwrap(),
            Some(ChecksumPair::new(HELLO_SHA1, HELLO_MD5))
        );
    }

    #[test]
    fn moved_files_stay_moved_after_reopen() {
        let root = TempDir::new().unwrap();
        let config = CentralConfig::new().with_local("staging").with_local("release");

        let first = on_disk_service(&root, config.clone());
        deploy(&first, &RepoPath::file("staging", "grp/art/1.0/a.jar"), "jar");
        let status = first.move_or_copy(&MoverConfig::to_repo(
            RepoPath::folder("staging", "grp/art/1.0"),
            "release",
            MoveOptions::moving(),
        ));
        assert!(!status.is_error(), "errors: {:?}", status.entries());
        first.shutdown();
        drop(first);

        let second = on_disk_service(&root, config);
        assert!(second.item_exists(&RepoPath::file("release", "grp/art/1.0/a.jar")));
        assert!(!second.item_exists(&RepoPath::file("staging", "grp/art/1.0/a.jar")));
    }
}

// =============================================================================
// S2: promotion through a virtual view
// =============================================================================

mod s2_promotion {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn promoted_build_appears_once_in_the_virtual_view() {
        let service = TestService::builder()
            .local("libs-staging")
            .local("libs-release")
            .virtual_repo("libs", &["libs-release", "libs-staging"])
            .build();
        service.deploy_text("libs-staging", "com/x/1.0/x-1.0.jar", "staged");
        service.deploy_text("libs-release", "com/x/0.9/x-0.9.jar", "old");
        assert_eq!(service.list_names("libs", "com/x"), vec!["0.9", "1.0"]);

        let files = [RepoPath::file("libs-staging", "com/x/1.0/x-1.0.jar")];
        let status = service.move_or_copy_set(
            &files,
            "libs-release",
            MoveOptions::moving().recalc_maven_metadata(true).prune_empty_folders(true),
        );
        assert!(!status.is_error(), "errors: {:?}", status.entries());

        assert_eq!(service.list_names("libs", "com/x"), vec!["0.9", "1.0"]);
        let children = service
            .list_children(&RepoPath::folder("libs", "com/x"), false)
            .unwrap();
        assert!(children.iter().all(|c| c.backing_path.repo_key() == "libs-release"));
        assert!(service.list_names("libs-staging", "").is_empty());

        service.recalculator().wait_idle();
        let art = service.item_info(&RepoPath::folder("libs-release", "com/x")).unwrap();
        assert_eq!(
            art.property("maven.versions"),
            Some(&["0.9".to_string(), "1.0".to_string()][..])
        );
    }
}

// =============================================================================
// S3: concurrency
// =============================================================================

mod s3_concurrency {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn crossing_copies_do_not_deadlock() {
        let service = Arc::new(
            TestService::builder()
                .local("r1")
                .local("r2")
                .lock_timeout(Duration::from_secs(10))
                .build(),
        );
        service.deploy_text("r1", "a.jar", "a");
        service.deploy_text("r2", "b.jar", "b");
        let barrier = Arc::new(Barrier::new(2));

        let spawn = |from: RepoPath, to: RepoPath| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..20)
                    .map(|_| {
                        let config = MoverConfig::new(
                            from.clone(),
                            binrepo_core::MoveTarget::Path(to.clone()),
                            MoveOptions::copying(),
                        );
                        service.move_or_copy(&config).is_error()
                    })
                    .filter(|failed| *failed)
                    .count()
            })
        };
        let forward = spawn(RepoPath::file("r1", "a.jar"), RepoPath::file("r2", "b.jar"));
        let backward = spawn(RepoPath::file("r2", "b.jar"), RepoPath::file("r1", "a.jar"));

        assert_eq!(forward.join().unwrap(), 0);
        assert_eq!(backward.join().unwrap(), 0);
        assert!(service.registry().locks().entries().is_empty());
        assert_eq!(service.read_text("r1", "a.jar"), service.read_text("r2", "b.jar"));
    }

    #[test]
    fn readers_see_whole_content_during_a_move() {
        let service = Arc::new(TestService::builder().local("r1").local("r2").build());
        for i in 0..20 {
            service.deploy_text("r1", &format!("lib/1.0/f{i}.jar"), "payload");
        }

        let reader = {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let mut observed = 0;
                for round in 0..200 {
                    let path = RepoPath::file("r1", &format!("lib/1.0/f{}.jar", round % 20));
                    if let Ok(mut content) = service.read(&path) {
                        let mut text = String::new();
                        if content.read_to_string(&mut text).is_ok() {
                            assert_eq!(text, "payload");
                            observed += 1;
                        }
                    }
                }
                observed
            })
        };

        let status = service.move_or_copy(&MoverConfig::to_repo(
            RepoPath::folder("r1", "lib"),
            "r2",
            MoveOptions::moving(),
        ));
        reader.join().unwrap();

        assert!(!status.is_error(), "errors: {:?}", status.entries());
        assert_eq!(status.moved_count(), 20);
        assert_eq!(service.list_names("r2", "lib/1.0").len(), 20);
        assert!(!service.exists("r1", "lib"));
    }

    #[test]
    fn folder_deletes_racing_deploys_leave_no_orphans() {
        let service = Arc::new(TestService::builder().local("libs").build());
        let barrier = Arc::new(Barrier::new(2));

        let deployer = {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..50 {
                    service.deploy_text("libs", &format!("a/{i}/f.jar"), "payload");
                }
            })
        };
        let deleter = {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..50 {
                    let _ = service.undeploy(&RepoPath::folder("libs", "a"));
                }
            })
        };
        deployer.join().unwrap();
        deleter.join().unwrap();

        for i in 0..50 {
            let path = format!("a/{i}/f.jar");
            if service.exists("libs", &path) {
                assert_eq!(service.read_text("libs", &path), "payload");
                assert!(service.item_exists(&RepoPath::folder("libs", &format!("a/{i}"))));
            }
        }
        assert!(service.registry().locks().entries().is_empty());
    }

    #[test]
    fn derivation_during_deploys_sees_committed_content() {
        let service = Arc::new(TestService::builder().local("libs").build());
        let barrier = Arc::new(Barrier::new(5));

        let deployer = {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.deploy_text("libs", "org/acme/1.0/acme.jar", "hello world");
            })
        };
        let lookups: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.derive_missing_checksum(ChecksumType::Sha1, HELLO_SHA1)
                })
            })
            .collect();

        deployer.join().unwrap();
        for lookup in lookups {
            if let Some(pair) = lookup.join().unwrap().unwrap() {
                assert_eq!(pair.md5, HELLO_MD5);
            }
        }
        let pair = service
            .derive_missing_checksum(ChecksumType::Sha1, HELLO_SHA1)
            .unwrap();
        assert_eq!(pair, Some(ChecksumPair::new(HELLO_SHA1, HELLO_MD5)));
    }
}

// =============================================================================
// S4: reconfiguration
// =============================================================================

mod s4_reload {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reload_adds_a_member_to_a_virtual_view() {
        let service = TestService::builder()
            .local("libs-release")
            .local("libs-snapshot")
            .virtual_repo("libs", &["libs-release"])
            .build();
        service.deploy_text("libs-snapshot", "com/x/2.0-SNAPSHOT/x.jar", "snap");
        service.deploy_text("libs-release", "com/x/1.0/x.jar", "release");
        assert_eq!(service.list_names("libs", "com/x"), vec!["1.0"]);

        let report = service
            .reload(
                &CentralConfig::new()
                    .with_local("libs-release")
                    .with_local("libs-snapshot")
                    .with_virtual("libs", &["libs-release", "libs-snapshot"]),
            )
            .unwrap();
        assert!(report.added.is_empty());
        assert!(report.removed.is_empty());
        assert_eq!(service.list_names("libs", "com/x"), vec!["1.0", "2.0-SNAPSHOT"]);
    }

    #[test]
    fn removed_repository_is_gone_for_every_operation() {
        let service = TestService::builder().local("keep").local("drop").build();
        service.deploy_text("drop", "a.jar", "a");

        service
            .reload(&CentralConfig::new().with_local("keep"))
            .unwrap();

        let path = RepoPath::file("drop", "a.jar");
        assert!(!service.item_exists(&path));
        assert!(service.read(&path).err().unwrap().is_not_found());
        let status = service.move_or_copy(&MoverConfig::to_repo(path, "keep", MoveOptions::copying()));
        assert_eq!(status.status_code(), 404);
    }
}
