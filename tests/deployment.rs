// ABOUTME: Integration tests for the deploy state machine.
// ABOUTME: Full deploys against local git repositories, failure rollback, and runner wrapping.

mod support;

use std::sync::Arc;

use stagehand::deploy::{
    DeployErrorKind, DeployState, RollbackOutcome, StepStatus, deploy, restart, rollback, unlock,
};
use stagehand::diagnostics::WarningKind;
use stagehand::exec::ContainerRunner;
use support::{GitRepo, MANAGE_BAD_PLAN, MANAGE_OK, RecordingRunner, SharedRecorder, Tree};

mod success {
    use super::*;

    #[tokio::test]
    async fn deploy_runs_every_state_in_order() {
        support::init_tracing();
        let repo = GitRepo::with_files(&[("manage.py", MANAGE_OK)]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site("app", &repo.url(), root.path(), &["python: sh"]);
        let runner = support::local_runner();

        let report = deploy(&site, &runner, &support::quiet()).await;
        assert!(report.success, "{:?}", report.failure);
        assert_eq!(
            report.states(),
            vec![
                DeployState::Locking,
                DeployState::BackingUp,
                DeployState::Cloning,
                DeployState::Linking,
                DeployState::Installing,
                DeployState::Validating,
                DeployState::Migrating,
                DeployState::CollectingStatic,
                DeployState::Activating,
                DeployState::Restarting,
                DeployState::Pruning,
                DeployState::Unlocking,
                DeployState::Done,
            ]
        );
        assert_eq!(report.final_state(), DeployState::Done);
        assert_eq!(report.rollback, RollbackOutcome::NotAttempted);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);

        let tree = Tree::new(root.path());
        let id = report.release.unwrap();
        assert_eq!(tree.current(), Some(id.to_string()));
        assert!(!tree.lock_file().exists(), "lock must be released");

        let log = std::fs::read_to_string(tree.release(id.as_str()).join("manage.log")).unwrap();
        assert_eq!(
            log.lines().collect::<Vec<_>>(),
            vec![
                "migrate --plan",
                "migrate --noinput",
                "collectstatic --noinput"
            ]
        );
        assert!(tree.release(id.as_str()).join(".stagehand-release").is_file());
    }

    #[tokio::test]
    async fn seed_runs_after_migrate() {
        let repo = GitRepo::with_files(&[("manage.py", MANAGE_OK)]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site("app", &repo.url(), root.path(), &["python: sh", "seed: true"]);
        let runner = support::local_runner();

        let report = deploy(&site, &runner, &support::quiet()).await;
        assert!(report.success, "{:?}", report.failure);

        let id = report.release.unwrap();
        let log = std::fs::read_to_string(Tree::new(root.path()).release(id.as_str()).join("manage.log"))
            .unwrap();
        assert!(log.contains("migrate --noinput\ndb_seed\n"), "{}", log);
    }

    #[tokio::test]
    async fn non_django_release_skips_app_steps() {
        let repo = GitRepo::with_files(&[("index.html", "<h1>hi</h1>\n")]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site("static.example.com", &repo.url(), root.path(), &[]);
        let runner = support::local_runner();

        let report = deploy(&site, &runner, &support::quiet()).await;
        assert!(report.success, "{:?}", report.failure);
        for state in [
            DeployState::Installing,
            DeployState::Validating,
            DeployState::Migrating,
            DeployState::CollectingStatic,
        ] {
            assert_eq!(report.step(state).unwrap().status, StepStatus::Skipped);
        }
        assert_eq!(
            std::fs::read_to_string(root.path().join("current/index.html")).unwrap(),
            "<h1>hi</h1>\n"
        );
    }

    #[tokio::test]
    async fn deploy_prunes_old_releases() {
        let repo = GitRepo::with_files(&[("app.py", "x\n")]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site("app", &repo.url(), root.path(), &["max_releases: 2"]);
        let runner = support::local_runner();
        let output = support::quiet();

        let mut last = None;
        for _ in 0..4 {
            let report = deploy(&site, &runner, &output).await;
            assert!(report.success, "{:?}", report.failure);
            last = report.release;
        }

        let tree = Tree::new(root.path());
        let releases = tree.releases();
        assert_eq!(releases.len(), 2, "{:?}", releases);
        assert_eq!(tree.current(), last.map(|id| id.to_string()));
        assert_eq!(releases.last(), tree.current().as_ref());
    }

    #[tokio::test]
    async fn restart_scripts_get_site_name() {
        let repo = GitRepo::with_files(&[("app.py", "x\n")]);
        let root = tempfile::tempdir().unwrap();
        let scripts = tempfile::tempdir().unwrap();
        let marker = scripts.path().join("restarted");
        let script = scripts.path().join("restart.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$1\" >> {}\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(
            &script,
            std::os::unix::fs::PermissionsExt::from_mode(0o755),
        )
        .unwrap();

        let mut site = support::site("app.example.com", &repo.url(), root.path(), &[]);
        site.restart_scripts = vec![
            script.display().to_string(),
            "/no/such/script.sh".to_string(),
        ];
        let runner = support::local_runner();

        let report = deploy(&site, &runner, &support::quiet()).await;
        assert!(report.success, "a missing restart script must not fail the deploy");
        assert_eq!(
            std::fs::read_to_string(&marker).unwrap(),
            "app.example.com\n"
        );
        assert_eq!(
            report.step(DeployState::Restarting).unwrap().status,
            StepStatus::Warned
        );
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::Restart);

        let report = restart(&site, &runner, &support::quiet()).await;
        assert!(report.success);
        assert_eq!(
            std::fs::read_to_string(&marker).unwrap(),
            "app.example.com\napp.example.com\n"
        );
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn failed_migration_plan_rolls_back() {
        support::init_tracing();
        let repo = GitRepo::with_files(&[("manage.py", MANAGE_OK)]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site("app", &repo.url(), root.path(), &["python: sh"]);
        let runner = support::local_runner();
        let output = support::quiet();
        let tree = Tree::new(root.path());

        let good = deploy(&site, &runner, &output).await;
        assert!(good.success, "{:?}", good.failure);
        let good_id = good.release.unwrap();
        let before = support::snapshot(&root.path().join("current"));
        assert!(before.contains_key(std::path::Path::new("manage.log")));

        repo.commit(&[("manage.py", MANAGE_BAD_PLAN)], "break migrations");
        let report = deploy(&site, &runner, &output).await;

        assert!(!report.success);
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.state, DeployState::Validating);
        assert_eq!(failure.kind, DeployErrorKind::CommandFailure);
        assert_eq!(failure.exit_code, Some(3));
        assert!(failure.message.contains("conflicting migrations"), "{}", failure.message);

        assert_eq!(
            report.rollback,
            RollbackOutcome::Restored {
                release: good_id.clone()
            }
        );
        assert_eq!(report.previous, Some(good_id.clone()));
        assert!(report.states().contains(&DeployState::RollingBack));
        assert!(report.states().contains(&DeployState::Unlocking));

        // The live release never changed and the failed one is gone.
        assert_eq!(tree.current(), Some(good_id.to_string()));
        assert_eq!(tree.releases(), vec![good_id.to_string()]);
        assert!(!tree.lock_file().exists(), "lock must be released");
        assert_eq!(
            support::snapshot(&root.path().join("current")),
            before,
            "the live tree must match the pre-deploy state"
        );
    }

    #[tokio::test]
    async fn leftover_failed_release_does_not_undo_the_rollback() {
        let repo = GitRepo::with_files(&[("manage.py", MANAGE_OK)]);
        let root = tempfile::tempdir().unwrap();
        let scripts = tempfile::tempdir().unwrap();
        let marker = scripts.path().join("restarted");
        let script = scripts.path().join("restart.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$1\" >> {}\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(
            &script,
            std::os::unix::fs::PermissionsExt::from_mode(0o755),
        )
        .unwrap();

        let mut site = support::site("app", &repo.url(), root.path(), &["python: sh"]);
        site.restart_scripts = vec![script.display().to_string()];
        let runner = support::StuckReleases::default();
        let output = support::quiet();
        let tree = Tree::new(root.path());

        let good = deploy(&site, &runner, &output).await;
        assert!(good.success, "{:?}", good.failure);
        let good_id = good.release.unwrap();
        std::fs::remove_file(&marker).unwrap();

        runner.arm();
        repo.commit(&[("manage.py", MANAGE_BAD_PLAN)], "break migrations");
        let report = deploy(&site, &runner, &output).await;

        assert!(!report.success);
        assert_eq!(report.failure.as_ref().unwrap().state, DeployState::Validating);
        assert_eq!(
            report.rollback,
            RollbackOutcome::Restored {
                release: good_id.clone()
            }
        );
        assert_ne!(report.final_state(), DeployState::Failed);
        assert_eq!(tree.current(), Some(good_id.to_string()));

        // The failed release stays on disk and is reported, not fatal.
        let failed_id = report.release.clone().unwrap();
        assert!(tree.release(failed_id.as_str()).exists());
        let step = report.step(DeployState::RollingBack).unwrap();
        assert_eq!(step.status, StepStatus::Warned);
        assert!(report.warnings.iter().any(|w| w.kind == WarningKind::Prune
            && w.message.contains(failed_id.as_str())
            && w.message.contains("Operation not permitted")));

        // Services were still restarted against the restored release.
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "app\n");
        assert!(!tree.lock_file().exists());
    }

    #[tokio::test]
    async fn panic_during_rollback_still_releases_the_lock() {
        let repo = GitRepo::with_files(&[("manage.py", MANAGE_OK)]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site("app", &repo.url(), root.path(), &["python: sh"]);
        let runner = support::StuckReleases::default();
        let output = support::quiet();

        let good = deploy(&site, &runner, &output).await;
        assert!(good.success, "{:?}", good.failure);

        runner.arm_panic();
        repo.commit(&[("manage.py", MANAGE_BAD_PLAN)], "break migrations");
        let report = deploy(&site, &runner, &output).await;

        assert!(!report.success);
        let RollbackOutcome::Failed { reason } = &report.rollback else {
            panic!("expected a failed rollback, got {:?}", report.rollback);
        };
        assert!(reason.contains("release removal blew up"), "{}", reason);
        assert_eq!(report.final_state(), DeployState::Failed);
        assert!(!Tree::new(root.path()).lock_file().exists());
    }

    #[tokio::test]
    async fn first_deploy_failure_has_no_rollback_target() {
        let repo = GitRepo::with_files(&[("manage.py", MANAGE_BAD_PLAN)]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site("app", &repo.url(), root.path(), &["python: sh"]);
        let runner = support::local_runner();

        let report = deploy(&site, &runner, &support::quiet()).await;

        assert!(!report.success);
        assert_eq!(report.failure.as_ref().unwrap().state, DeployState::Validating);
        assert_eq!(report.rollback, RollbackOutcome::NoTarget);
        assert_eq!(report.final_state(), DeployState::Failed);

        let tree = Tree::new(root.path());
        assert_eq!(tree.current(), None);
        assert!(tree.releases().is_empty(), "{:?}", tree.releases());
        assert!(!tree.lock_file().exists());
    }

    #[tokio::test]
    async fn clone_failure_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let missing = tempfile::tempdir().unwrap();
        let url = format!("file://{}/nope", missing.path().display());
        let site = support::site("app", &url, root.path(), &[]);
        let runner = support::local_runner();

        let report = deploy(&site, &runner, &support::quiet()).await;

        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.state, DeployState::Cloning);
        assert_eq!(failure.kind, DeployErrorKind::CloneFailure);
        assert!(failure.exit_code.is_some());
        assert_eq!(report.rollback, RollbackOutcome::NoTarget);
        assert!(Tree::new(root.path()).releases().is_empty());
        assert!(!Tree::new(root.path()).lock_file().exists());
    }

    #[tokio::test]
    async fn held_lock_touches_nothing() {
        let repo = GitRepo::with_files(&[("app.py", "x\n")]);
        let root = tempfile::tempdir().unwrap();
        let tree = Tree::new(root.path());
        std::fs::write(tree.lock_file(), "someone else\n").unwrap();

        let site = support::site("app", &repo.url(), root.path(), &[]);
        let runner = support::local_runner();

        let report = deploy(&site, &runner, &support::quiet()).await;

        assert!(!report.success);
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.state, DeployState::Locking);
        assert_eq!(failure.kind, DeployErrorKind::AlreadyLocked);
        assert_eq!(report.states(), vec![DeployState::Locking]);
        assert_eq!(report.rollback, RollbackOutcome::NotAttempted);

        assert!(!root.path().join("releases").exists());
        assert_eq!(
            std::fs::read_to_string(tree.lock_file()).unwrap(),
            "someone else\n",
            "another holder's lock must survive"
        );

        let report = unlock(&site, &runner, &support::quiet()).await;
        assert!(report.success);
        assert!(!tree.lock_file().exists());

        let report = deploy(&site, &runner, &support::quiet()).await;
        assert!(report.success, "{:?}", report.failure);
    }

    #[tokio::test]
    async fn fatal_permission_failure_rolls_back() {
        let repo = GitRepo::with_files(&[("app.py", "x\n")]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site(
            "app",
            &repo.url(),
            root.path(),
            &[
                "writable_dirs: [media]",
                "writable_failure: fatal",
                "writable_use_sudo: true",
            ],
        );
        // Without a password-less sudo the chmod fails; with one it succeeds.
        let sudo_works = std::process::Command::new("sudo")
            .args(["-n", "true"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        let runner = support::local_runner();

        let report = deploy(&site, &runner, &support::quiet()).await;

        if sudo_works {
            assert!(report.success, "{:?}", report.failure);
        } else {
            let failure = report.failure.as_ref().unwrap();
            assert_eq!(failure.state, DeployState::Linking);
            assert_eq!(failure.kind, DeployErrorKind::PermissionFailure);
            assert_eq!(report.rollback, RollbackOutcome::NoTarget);
            assert!(Tree::new(root.path()).releases().is_empty());
        }
    }
}

mod writable {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn mode(path: &std::path::Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    #[tokio::test]
    async fn every_deploy_leaves_writable_dirs_group_writable() {
        let repo = GitRepo::with_files(&[
            ("manage.py", MANAGE_OK),
            ("media/img/logo.png", "png"),
        ]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site(
            "app.writeable.cl",
            &repo.url(),
            root.path(),
            &[
                "python: sh",
                "writable_dirs: [media, logs]",
                "writable_chmod_mode: 775",
                "writable_recursive: true",
            ],
        );
        let runner = support::local_runner();
        let output = support::quiet();

        for _ in 0..2 {
            let report = deploy(&site, &runner, &output).await;
            assert!(report.success, "{:?}", report.failure);
            assert!(report.warnings.is_empty(), "{:?}", report.warnings);

            let current = root.path().join("current");
            for path in ["media", "media/img", "media/img/logo.png", "logs"] {
                assert_eq!(mode(&current.join(path)), 0o775, "{}", path);
            }
        }
    }
}

mod manual {
    use super::*;

    #[tokio::test]
    async fn rollback_restores_previous_release() {
        let repo = GitRepo::with_files(&[("version.txt", "1\n")]);
        let root = tempfile::tempdir().unwrap();
        let site = support::site("app", &repo.url(), root.path(), &[]);
        let runner = support::local_runner();
        let output = support::quiet();

        let first = deploy(&site, &runner, &output).await;
        repo.commit(&[("version.txt", "2\n")], "bump");
        let second = deploy(&site, &runner, &output).await;
        assert!(first.success && second.success);
        assert_eq!(
            std::fs::read_to_string(root.path().join("current/version.txt")).unwrap(),
            "2\n"
        );

        let report = rollback(&site, &runner, &output).await;
        assert!(report.success, "{:?}", report.failure);
        assert_eq!(report.release, first.release);
        assert_eq!(report.previous, second.release);
        assert_eq!(
            std::fs::read_to_string(root.path().join("current/version.txt")).unwrap(),
            "1\n"
        );

        let tree = Tree::new(root.path());
        assert_eq!(tree.releases(), vec![first.release.unwrap().to_string()]);
        assert!(!tree.lock_file().exists());

        let report = rollback(&site, &runner, &output).await;
        assert!(!report.success);
        assert_eq!(report.rollback, RollbackOutcome::NoTarget);
        assert_eq!(
            report.failure.as_ref().unwrap().kind,
            DeployErrorKind::NoRollbackTarget
        );
    }

    #[tokio::test]
    async fn unlock_without_lock_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        let site = support::site("app", "file:///nowhere", root.path(), &[]);
        let runner = support::local_runner();

        let report = unlock(&site, &runner, &support::quiet()).await;
        assert!(report.success);
        assert_eq!(
            report.step(DeployState::Unlocking).unwrap().status,
            StepStatus::Skipped
        );
    }
}

mod docker {
    use super::*;

    #[tokio::test]
    async fn every_command_runs_inside_the_container() {
        let recorder = Arc::new(RecordingRunner::new());
        let runner = ContainerRunner::new(
            Box::new(SharedRecorder(Arc::clone(&recorder))),
            "web-app",
            "admin",
        );
        let root = tempfile::tempdir().unwrap();
        let site = support::site(
            "app",
            "https://git.example.com/app.git",
            root.path(),
            &[
                "runner: docker",
                "docker_container: web-app",
                "docker_user: admin",
                "shared_files: [.env]",
                "writable_dirs: [media]",
            ],
        );

        let report = deploy(&site, &runner, &support::quiet()).await;
        assert!(report.success, "{:?}", report.failure);

        let commands = recorder.commands();
        assert!(commands.len() > 10, "{:?}", commands);
        for command in &commands {
            assert!(command.starts_with("docker exec "), "{}", command);
            assert!(command.contains(" 'web-app' sh -c "), "{}", command);
            assert!(
                command.contains("-u 'admin'") || command.contains("-u 'root'"),
                "{}",
                command
            );
        }
        assert!(commands.iter().any(|c| c.contains("git clone")));
        // Nothing touched the controller's filesystem.
        assert!(std::fs::read_dir(root.path()).unwrap().next().is_none());
    }
}
