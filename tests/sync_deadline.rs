//! A synchronizer whose `git reset` never returns must still give up in time.
//!
//! Kept in its own test binary: it swaps `git` on `PATH` for a wrapper.

#![cfg(unix)]

mod common;

use common::Fixture;
use mycelium::config::SupervisorConfig;
use mycelium::error::SyncError;
use mycelium::types::{RevisionPointer, SyncOutcome};
use mycelium::upstream::{GitSynchronizer, Synchronizer};
use std::os::unix::fs::PermissionsExt;
use std::process::Command;
use std::time::{Duration, Instant};

/// Put a `git` on `PATH` that hangs on `reset` and defers to the real one
/// for everything else.
fn install_hanging_reset(bin: &std::path::Path) {
    let real = Command::new("sh")
        .args(["-c", "command -v git"])
        .output()
        .expect("locate git");
    let real = String::from_utf8_lossy(&real.stdout).trim().to_string();
    assert!(!real.is_empty(), "git not found on PATH");

    let script = format!(
        "#!/bin/sh\nfor a in \"$@\"; do\n  [ \"$a\" = reset ] && exec sleep 100\ndone\nexec {real} \"$@\"\n"
    );
    let wrapper = bin.join("git");
    std::fs::write(&wrapper, script).unwrap();
    std::fs::set_permissions(&wrapper, std::fs::Permissions::from_mode(0o755)).unwrap();

    let path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{path}", bin.display()));
}

#[tokio::test]
async fn hanging_checkout_returns_within_poll_interval() {
    let Some(fx) = Fixture::new() else { return };
    let b = fx.commit_origin(&[("app.txt", "v2\n")], &[], "second");
    let before = fx.snapshot();
    let head = fx.work_head();

    let config = SupervisorConfig {
        repo_url: fx.url(),
        repo_path: fx.work.to_string_lossy().into_owned(),
        poll_interval_secs: 3,
        git_timeout_secs: Some(2),
        ..Default::default()
    };
    config.validate().unwrap();
    let sync = GitSynchronizer::from_config(&config);

    let bin = tempfile::tempdir().unwrap();
    install_hanging_reset(bin.path());

    let started = Instant::now();
    let outcome = sync.apply(&RevisionPointer::new(&b)).await;
    let elapsed = started.elapsed();

    assert!(
        elapsed < config.poll_interval(),
        "apply took {elapsed:?}, poll interval is {:?}",
        config.poll_interval()
    );
    match outcome {
        SyncOutcome::Failed(SyncError::Apply { reason, .. }) => {
            assert!(reason.contains("rollback"), "{reason}");
        }
        other => panic!("expected an apply failure, got {other:?}"),
    }

    // The wrapper never ran a reset, so nothing on disk moved.
    assert!(elapsed >= Duration::from_secs(1));
    assert_eq!(fx.snapshot(), before);
    assert_eq!(fx.work_head(), head);
}
