//! Tests for the move/copy engine

use binrepo_core::config::{LocalRepoDescriptor, RepoDescriptor};
use binrepo_core::mover::{VERSIONS_PROPERTY, aggregate_by_parent};
use binrepo_core::{Action, MoveOptions, MoveTarget, MoverConfig, StopSignal};
use binrepo_fs::RepoPath;
use binrepo_test_utils::{RuleAccess, TestService, TestServiceBuilder};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn two_repos() -> TestServiceBuilder {
    TestService::builder().local("r1").local("r2")
}

fn seed_artifact(service: &TestService) {
    service.deploy_text("r1", "grp/art/1.0/a.jar", "jar");
    service.deploy_text("r1", "grp/art/1.0/a.pom", "pom");
}

fn artifact_files() -> Vec<RepoPath> {
    vec![
        RepoPath::file("r1", "grp/art/1.0/a.jar"),
        RepoPath::file("r1", "grp/art/1.0/a.pom"),
    ]
}

fn error_codes(status: &binrepo_core::MultiStatus) -> Vec<u16> {
    status.errors().filter_map(|e| e.status_code).collect()
}

mod scenarios {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sibling_set_moves_as_its_folder_and_marks_artifact_level() {
        let service = two_repos().build();
        seed_artifact(&service);

        let options = MoveOptions::moving().recalc_maven_metadata(true);
        let status = service.move_or_copy_set(&artifact_files(), "r2", options);

        assert!(!status.is_error(), "errors: {:?}", status.entries());
        assert_eq!(status.moved_count(), 2);
        let expected: BTreeSet<RepoPath> = [
            RepoPath::folder("r1", "grp/art"),
            RepoPath::folder("r2", "grp/art"),
        ]
        .into_iter()
        .collect();
        assert_eq!(status.marked_for_recalculation(), &expected);

        assert!(!service.exists("r1", "grp/art/1.0"));
        assert_eq!(service.list_names("r1", "grp/art"), Vec::<String>::new());
        assert_eq!(service.list_names("r2", "grp/art/1.0"), vec!["a.jar", "a.pom"]);
        assert_eq!(service.read_text("r2", "grp/art/1.0/a.pom"), "pom");

        service.recalculator().wait_idle();
        let art = service.item_info(&RepoPath::folder("r2", "grp/art")).unwrap();
        assert_eq!(art.property(VERSIONS_PROPERTY), Some(&["1.0".to_string()][..]));
        assert_eq!(
            service.recalculator().recalculated().len(),
            2,
            "both marked folders are recalculated"
        );
    }

    #[test]
    fn aggregation_selects_the_folder_once() {
        let service = two_repos().build();
        seed_artifact(&service);
        let repo = service.registry().local_or_cached_repository_by_key("r1").unwrap();
        let children_of = |p: &RepoPath| -> Vec<RepoPath> {
            repo.children(p).iter().map(|c| c.repo_path.clone()).collect()
        };

        let once = aggregate_by_parent(&artifact_files(), children_of);
        assert_eq!(once, vec![RepoPath::folder("r1", "grp/art/1.0")]);
        let twice = aggregate_by_parent(&once, children_of);
        assert_eq!(twice, once);
    }

    /// Every item below `folder` as `key:path/` or `key:path = content`.
    fn tree(service: &TestService, folder: &RepoPath) -> Vec<String> {
        let mut entries = Vec::new();
        for child in service.list_children(folder, false).unwrap() {
            if child.is_folder {
                entries.push(format!("{}/", child.repo_path));
                entries.extend(tree(service, &child.repo_path));
            } else {
                let path = &child.repo_path;
                entries.push(format!("{path} = {}", service.read_text(path.repo_key(), path.path())));
            }
        }
        entries
    }

    #[test]
    fn moving_children_one_by_one_matches_moving_their_folder() {
        let options = MoveOptions::moving()
            .recalc_maven_metadata(true)
            .prune_empty_folders(true);

        let one_by_one = two_repos().build();
        seed_artifact(&one_by_one);
        let mut marks = BTreeSet::new();
        for file in artifact_files() {
            let status = one_by_one.move_or_copy(&MoverConfig::to_repo(file, "r2", options));
            assert!(!status.is_error(), "errors: {:?}", status.entries());
            marks.extend(status.marked_for_recalculation().iter().cloned());
        }

        let at_once = two_repos().build();
        seed_artifact(&at_once);
        let folder = MoverConfig::to_repo(RepoPath::folder("r1", "grp/art/1.0"), "r2", options);
        let status = at_once.move_or_copy(&folder);
        assert!(!status.is_error(), "errors: {:?}", status.entries());

        assert_eq!(&marks, status.marked_for_recalculation());
        for repo in ["r1", "r2"] {
            let root = RepoPath::root(repo);
            assert_eq!(tree(&one_by_one, &root), tree(&at_once, &root), "contents of {repo}");
        }

        one_by_one.recalculator().wait_idle();
        at_once.recalculator().wait_idle();
        let art = RepoPath::folder("r2", "grp/art");
        assert_eq!(
            one_by_one.item_info(&art).unwrap().property(VERSIONS_PROPERTY),
            at_once.item_info(&art).unwrap().property(VERSIONS_PROPERTY)
        );
    }

    #[test]
    fn copy_keeps_source_and_metadata() {
        let service = two_repos().build();
        seed_artifact(&service);
        let jar = RepoPath::file("r1", "grp/art/1.0/a.jar");
        service
            .set_property(&jar, "qa", vec!["passed".to_string()])
            .unwrap();

        let config = MoverConfig::to_repo(jar.clone(), "r2", MoveOptions::copying());
        let status = service.move_or_copy(&config);

        assert!(!status.is_error(), "errors: {:?}", status.entries());
        assert!(service.exists("r1", "grp/art/1.0/a.jar"));
        let copied = service
            .item_info(&RepoPath::file("r2", "grp/art/1.0/a.jar"))
            .unwrap();
        let original = service.item_info(&jar).unwrap();
        assert_eq!(copied.property("qa"), Some(&["passed".to_string()][..]));
        assert_eq!(copied.created, original.created);
        assert_eq!(copied.file().unwrap().sha1(), original.file().unwrap().sha1());
    }

    #[test]
    fn explicit_target_path_renames() {
        let service = two_repos().build();
        seed_artifact(&service);

        let config = MoverConfig::new(
            RepoPath::folder("r1", "grp/art/1.0"),
            MoveTarget::Path(RepoPath::folder("r1", "grp/art/1.1")),
            MoveOptions::moving(),
        );
        let status = service.move_or_copy(&config);

        assert!(!status.is_error(), "errors: {:?}", status.entries());
        assert_eq!(service.list_names("r1", "grp/art"), vec!["1.1"]);
        assert_eq!(service.read_text("r1", "grp/art/1.1/a.jar"), "jar");
    }

    #[test]
    fn empty_folders_travel_with_their_parent() {
        let service = two_repos().build();
        seed_artifact(&service);
        let repo = service.registry().local_or_cached_repository_by_key("r1").unwrap();
        repo.ensure_folders(&RepoPath::folder("r1", "grp/art/1.0/docs"), "tester")
            .unwrap();

        let config = MoverConfig::to_repo(RepoPath::folder("r1", "grp"), "r2", MoveOptions::moving());
        let status = service.move_or_copy(&config);

        assert!(!status.is_error(), "errors: {:?}", status.entries());
        assert_eq!(status.moved_count(), 3);
        assert!(service.item_exists(&RepoPath::folder("r2", "grp/art/1.0/docs")));
        assert_eq!(service.list_names("r1", ""), Vec::<String>::new());
    }

    #[test]
    fn locks_are_released_afterwards() {
        let service = two_repos().build();
        seed_artifact(&service);

        service.move_or_copy_set(&artifact_files(), "r2", MoveOptions::moving());
        assert!(service.registry().locks().entries().is_empty());
    }
}

mod dry_run {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reports_without_changing_anything() {
        let service = two_repos().build();
        seed_artifact(&service);

        let options = MoveOptions::moving().dry_run(true).recalc_maven_metadata(true);
        let status = service.move_or_copy_set(&artifact_files(), "r2", options);

        assert!(status.is_dry_run());
        assert!(!status.is_error(), "errors: {:?}", status.entries());
        assert_eq!(status.moved_count(), 2);
        assert!(status.marked_for_recalculation().is_empty());
        assert!(service.exists("r1", "grp/art/1.0/a.jar"));
        assert!(!service.exists("r2", "grp"));
        assert!(service.recalculator().pending().is_empty());
    }

    #[test]
    fn still_reports_per_path_failures() {
        let service = two_repos()
            .access(RuleAccess::new("bob").deny(Action::Delete, "r2", ""))
            .build();
        seed_artifact(&service);
        service.deploy_text("r2", "grp/art/1.0/a.jar", "existing");

        let options = MoveOptions::copying().dry_run(true);
        let status = service.move_or_copy_set(&artifact_files(), "r2", options);

        assert_eq!(error_codes(&status), vec![403]);
        assert_eq!(status.moved_count(), 1);
        assert_eq!(service.read_text("r2", "grp/art/1.0/a.jar"), "existing");
    }
}

mod failures {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nothing_to_do_is_an_error() {
        let service = two_repos().build();
        let status = service.move_or_copy_set(&[], "r2", MoveOptions::moving());

        assert!(status.is_error());
        assert_eq!(status.moved_count(), 0);
        assert_eq!(status.status_code(), 400);
    }

    #[test]
    fn missing_source_is_404() {
        let service = two_repos().build();
        let config = MoverConfig::to_repo(RepoPath::file("r1", "nope.jar"), "r2", MoveOptions::moving());
        let status = service.move_or_copy(&config);

        assert_eq!(error_codes(&status), vec![404]);
        assert_eq!(status.status_code(), 404);
    }

    #[test]
    fn batch_continues_past_failures() {
        let service = two_repos().build();
        service.deploy_text("r1", "b/x.jar", "x");
        let paths = [RepoPath::file("r1", "a/missing.jar"), RepoPath::file("r1", "b/x.jar")];

        let status = service.move_or_copy_set(&paths, "r2", MoveOptions::moving());
        assert_eq!(error_codes(&status), vec![404]);
        assert!(service.exists("r2", "b/x.jar"));
    }

    #[test]
    fn fail_fast_stops_at_first_failure() {
        let service = two_repos().build();
        service.deploy_text("r1", "b/x.jar", "x");
        let paths = [RepoPath::file("r1", "a/missing.jar"), RepoPath::file("r1", "b/x.jar")];

        let options = MoveOptions::moving().fail_fast(true);
        let status = service.move_or_copy_set(&paths, "r2", options);
        assert_eq!(error_codes(&status), vec![404]);
        assert!(!service.exists("r2", "b/x.jar"));
        assert!(service.exists("r1", "b/x.jar"));
    }

    #[test]
    fn cannot_move_into_own_subtree() {
        let service = two_repos().build();
        seed_artifact(&service);
        let config = MoverConfig::new(
            RepoPath::folder("r1", "grp"),
            MoveTarget::Path(RepoPath::folder("r1", "grp/nested")),
            MoveOptions::moving(),
        );

        let status = service.move_or_copy(&config);
        assert_eq!(error_codes(&status), vec![400]);
        assert!(service.exists("r1", "grp/art/1.0/a.jar"));
    }

    #[test]
    fn kind_conflict_is_409() {
        let service = two_repos().build();
        seed_artifact(&service);
        service.deploy_text("r2", "grp/art/1.0", "a file where a folder would go");

        let config = MoverConfig::to_repo(RepoPath::folder("r1", "grp/art/1.0"), "r2", MoveOptions::moving());
        let status = service.move_or_copy(&config);
        assert_eq!(error_codes(&status), vec![409]);
        assert!(service.exists("r1", "grp/art/1.0/a.jar"));
    }

    #[test]
    fn overwrite_without_delete_permission_keeps_both_sides() {
        let service = two_repos()
            .access(RuleAccess::new("bob").deny(Action::Delete, "r2", ""))
            .build();
        seed_artifact(&service);
        service.deploy_text("r2", "grp/art/1.0/a.jar", "existing");

        let status = service.move_or_copy_set(&artifact_files(), "r2", MoveOptions::moving());
        assert_eq!(error_codes(&status), vec![403]);
        assert_eq!(service.read_text("r2", "grp/art/1.0/a.jar"), "existing");
        assert!(service.exists("r1", "grp/art/1.0/a.jar"));
        assert!(!service.exists("r1", "grp/art/1.0/a.pom"));
        assert_eq!(service.read_text("r2", "grp/art/1.0/a.pom"), "pom");
    }
}

mod structural {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single(service: &TestService, target: &str) -> binrepo_core::MultiStatus {
        let config = MoverConfig::to_repo(
            RepoPath::file("r1", "grp/art/1.0/a.jar"),
            target,
            MoveOptions::moving(),
        );
        service.move_or_copy(&config)
    }

    #[test]
    fn virtual_target_is_rejected() {
        let service = two_repos().virtual_repo("all", &["r1", "r2"]).build();
        seed_artifact(&service);

        let status = single(&service, "all");
        assert_eq!(error_codes(&status), vec![400]);
        assert!(service.exists("r1", "grp/art/1.0/a.jar"));
    }

    #[test]
    fn remote_target_is_rejected() {
        let service = two_repos().remote("central", "https://repo.example.com").build();
        seed_artifact(&service);
        assert_eq!(error_codes(&single(&service, "central")), vec![400]);
    }

    #[test]
    fn unknown_repositories_are_404() {
        let service = two_repos().build();
        seed_artifact(&service);
        assert_eq!(error_codes(&single(&service, "nowhere")), vec![404]);

        let config = MoverConfig::to_repo(RepoPath::file("ghost", "a.jar"), "r2", MoveOptions::moving());
        assert_eq!(error_codes(&service.move_or_copy(&config)), vec![404]);
    }

    #[test]
    fn blacked_out_target_is_503() {
        let mut r2 = LocalRepoDescriptor::new("r2");
        r2.blacked_out = true;
        let service = TestService::builder()
            .local("r1")
            .repository(RepoDescriptor::Local(r2))
            .build();
        seed_artifact(&service);
        assert_eq!(error_codes(&single(&service, "r2")), vec![503]);
    }

    #[test]
    fn missing_deploy_permission_aborts_before_any_change() {
        let service = two_repos()
            .access(RuleAccess::new("bob").deny(Action::Deploy, "r2", ""))
            .build();
        seed_artifact(&service);
        service.deploy_text("r1", "grp/other.jar", "other");

        let paths = [
            RepoPath::file("r1", "grp/art/1.0/a.jar"),
            RepoPath::file("r1", "grp/other.jar"),
            RepoPath::file("r1", "grp/art/1.0/a.pom"),
        ];
        let status = service.move_or_copy_set(&paths, "r2", MoveOptions::moving());

        assert_eq!(error_codes(&status), vec![403]);
        assert_eq!(status.moved_count(), 0);
        assert!(service.exists("r1", "grp/art/1.0/a.jar"));
        assert!(service.exists("r1", "grp/other.jar"));
        assert!(service.audit().was_denied(Action::Deploy, &RepoPath::folder("r2", "grp/art/1.0")));
    }

    #[test]
    fn files_inside_a_folder_are_authorized_one_by_one() {
        let service = two_repos()
            .access(RuleAccess::new("bob").deny(Action::Deploy, "r2", "grp/art/1.0/a.pom"))
            .build();
        seed_artifact(&service);

        let status = service.move_or_copy_set(&artifact_files(), "r2", MoveOptions::moving());

        assert_eq!(error_codes(&status), vec![403]);
        assert_eq!(status.moved_count(), 1);
        assert!(service.exists("r2", "grp/art/1.0/a.jar"));
        assert!(!service.exists("r2", "grp/art/1.0/a.pom"));
        assert!(service.exists("r1", "grp/art/1.0/a.pom"));
    }

    #[test]
    fn move_requires_delete_on_source_but_copy_does_not() {
        let service = two_repos()
            .access(RuleAccess::new("bob").deny(Action::Delete, "r1", ""))
            .build();
        seed_artifact(&service);

        assert_eq!(error_codes(&single(&service, "r2")), vec![403]);

        let config = MoverConfig::to_repo(
            RepoPath::file("r1", "grp/art/1.0/a.jar"),
            "r2",
            MoveOptions::copying(),
        );
        assert!(!service.move_or_copy(&config).is_error());
    }
}

mod pruning {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_source_ancestors_are_removed() {
        let service = two_repos().build();
        service.deploy_text("r1", "grp/art/1.0/a.jar", "jar");
        service.deploy_text("r1", "keep/b.jar", "b");

        let config = MoverConfig::to_repo(
            RepoPath::file("r1", "grp/art/1.0/a.jar"),
            "r2",
            MoveOptions::moving().prune_empty_folders(true),
        );
        let status = service.move_or_copy(&config);

        assert!(!status.is_error(), "errors: {:?}", status.entries());
        assert_eq!(service.list_names("r1", ""), vec!["keep"]);
    }

    #[test]
    fn without_pruning_empty_folders_stay() {
        let service = two_repos().build();
        service.deploy_text("r1", "grp/art/1.0/a.jar", "jar");

        let config = MoverConfig::to_repo(
            RepoPath::file("r1", "grp/art/1.0/a.jar"),
            "r2",
            MoveOptions::moving(),
        );
        service.move_or_copy(&config);
        assert_eq!(service.list_names("r1", "grp/art/1.0"), Vec::<String>::new());
    }
}

mod cancellation {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stopped_signal_cancels_before_any_change() {
        let service = two_repos().build();
        seed_artifact(&service);
        let stop = StopSignal::new();
        stop.stop();

        let status = service.move_or_copy_set_with_stop(&artifact_files(), "r2", MoveOptions::moving(), &stop);
        assert_eq!(status.status_code(), 499);
        assert_eq!(status.moved_count(), 0);
        assert!(service.exists("r1", "grp/art/1.0/a.jar"));
        assert!(service.registry().locks().entries().is_empty());
    }

    #[test]
    fn paused_move_resumes() {
        let service = Arc::new(two_repos().build());
        seed_artifact(&service);
        let stop = StopSignal::new();
        stop.pause();

        let worker = {
            let service = Arc::clone(&service);
            let stop = stop.clone();
            thread::spawn(move || {
                service.move_or_copy_set_with_stop(&artifact_files(), "r2", MoveOptions::moving(), &stop)
            })
        };
        thread::sleep(Duration::from_millis(30));
        assert!(!worker.is_finished());
        assert!(service.exists("r1", "grp/art/1.0/a.jar"));

        stop.resume();
        let status = worker.join().unwrap();
        assert!(!status.is_error(), "errors: {:?}", status.entries());
        assert!(service.exists("r2", "grp/art/1.0/a.jar"));
    }
}
