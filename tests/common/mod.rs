//! Scratch git repositories for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git in `dir`, panicking on failure. Returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "mycelium-test")
        .env("GIT_AUTHOR_EMAIL", "test@mycelium.invalid")
        .env("GIT_COMMITTER_NAME", "mycelium-test")
        .env("GIT_COMMITTER_EMAIL", "test@mycelium.invalid")
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// An "origin" repository plus a working copy cloned from it.
pub struct Fixture {
    _tmp: TempDir,
    pub origin: PathBuf,
    pub work: PathBuf,
    pub state: PathBuf,
}

impl Fixture {
    /// `None` when git is not installed; callers skip the test.
    pub fn new() -> Option<Self> {
        if !git_available() {
            eprintln!("git not available, skipping");
            return None;
        }

        let tmp = tempfile::tempdir().expect("tempdir");
        let origin = tmp.path().join("origin");
        let work = tmp.path().join("work");
        let state = tmp.path().join("state");
        std::fs::create_dir_all(&origin).expect("mkdir origin");

        git(&origin, &["init", "-q"]);
        git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        let fixture = Self {
            _tmp: tmp,
            origin,
            work,
            state,
        };
        fixture.commit_origin(
            &[("app.txt", "v1\n"), ("lib/helper.txt", "helper v1\n"), ("old.txt", "legacy\n")],
            &[],
            "initial",
        );

        git(
            fixture.origin.parent().expect("parent"),
            &["clone", "-q", "origin", "work"],
        );
        Some(fixture)
    }

    pub fn url(&self) -> String {
        self.origin.to_string_lossy().into_owned()
    }

    /// Write `files`, delete `removed`, commit on origin's main. Returns the hash.
    pub fn commit_origin(&self, files: &[(&str, &str)], removed: &[&str], message: &str) -> String {
        for (name, contents) in files {
            let path = self.origin.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(path, contents).expect("write file");
        }
        for name in removed {
            std::fs::remove_file(self.origin.join(name)).expect("remove file");
        }
        git(&self.origin, &["add", "-A"]);
        git(&self.origin, &["commit", "-q", "-m", message]);
        git(&self.origin, &["rev-parse", "HEAD"])
    }

    pub fn work_head(&self) -> String {
        git(&self.work, &["rev-parse", "HEAD"])
    }

    /// Every file of the working copy outside `.git`, with contents.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        collect(&self.work, &self.work, &mut files);
        files
    }
}

fn collect(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
    for entry in std::fs::read_dir(dir).expect("read_dir") {
        let path = entry.expect("dir entry").path();
        if path.file_name().is_some_and(|n| n == ".git") {
            continue;
        }
        if path.is_dir() {
            collect(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).expect("relative").to_path_buf();
            out.insert(rel, std::fs::read(&path).expect("read file"));
        }
    }
}
