//! Thin async wrapper around the `git` binary.
//!
//! Every invocation is bounded by a timeout and killed on expiry, so a stalled
//! remote cannot hold the supervisor past its tick.

use crate::error::GitError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a successful git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `git [-C repo] args...` and fail on non-zero exit.
pub async fn run_git(
    repo: Option<&Path>,
    args: &[&str],
    timeout: Duration,
) -> Result<GitOutput, GitError> {
    let mut cmd = Command::new("git");
    if let Some(repo) = repo {
        cmd.arg("-C").arg(repo);
    }
    cmd.args(args)
        // Never block on a credential prompt.
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let joined = args.join(" ");
    debug!("git {}", joined);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(GitError::Spawn)?,
        Err(_) => {
            return Err(GitError::Timeout {
                args: joined,
                timeout,
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        return Err(GitError::Failed {
            args: joined,
            code: output.status.code(),
            stderr,
        });
    }

    Ok(GitOutput { stdout, stderr })
}

/// Resolve the tip of `refs/heads/<branch>` on a remote without touching
/// any local repository. `None` when the branch does not exist.
pub async fn ls_remote_branch(
    url: &str,
    branch: &str,
    timeout: Duration,
) -> Result<Option<String>, GitError> {
    let refname = format!("refs/heads/{branch}");
    let out = run_git(None, &["ls-remote", "--", url, &refname], timeout).await?;
    Ok(parse_ls_remote(&out.stdout, &refname))
}

/// Pick the hash for exactly `refname` out of `ls-remote` output.
pub fn parse_ls_remote(stdout: &str, refname: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (hash, name) = line.split_once('\t')?;
        (name.trim() == refname && !hash.trim().is_empty()).then(|| hash.trim().to_string())
    })
}

/// Commit currently checked out in the working copy.
pub async fn head_revision(repo: &Path, timeout: Duration) -> Result<String, GitError> {
    let out = run_git(Some(repo), &["rev-parse", "--verify", "HEAD"], timeout).await?;
    Ok(out.stdout.trim().to_string())
}

/// Paths with staged, unstaged or untracked changes. Empty means clean.
pub async fn dirty_paths(repo: &Path, timeout: Duration) -> Result<Vec<String>, GitError> {
    let out = run_git(
        Some(repo),
        &["status", "--porcelain=v1", "-z", "--untracked-files=normal"],
        timeout,
    )
    .await?;
    Ok(parse_porcelain(&out.stdout))
}

/// Parse NUL-separated `status --porcelain=v1 -z` output. Renames and copies
/// contribute both the new and the original path.
pub fn parse_porcelain(stdout: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut fields = stdout.split('\0');
    while let Some(entry) = fields.next() {
        if entry.len() < 4 {
            continue;
        }
        let (status, path) = entry.split_at(3);
        paths.push(path.to_string());
        if status.contains(['R', 'C']) {
            if let Some(original) = fields.next().filter(|f| !f.is_empty()) {
                paths.push(original.to_string());
            }
        }
    }
    paths
}

/// Download `branch` from `url` into the object store. Only `FETCH_HEAD`
/// moves; the index and working tree are untouched.
pub async fn fetch_branch(
    repo: &Path,
    url: &str,
    branch: &str,
    timeout: Duration,
) -> Result<(), GitError> {
    let refspec = format!("refs/heads/{branch}");
    run_git(
        Some(repo),
        &["fetch", "--no-tags", "--quiet", "--", url, &refspec],
        timeout,
    )
    .await?;
    Ok(())
}

/// Whether `rev` names a commit present in the local object store.
pub async fn has_commit(repo: &Path, rev: &str, timeout: Duration) -> Result<bool, GitError> {
    let spec = format!("{rev}^{{commit}}");
    match run_git(Some(repo), &["cat-file", "-e", &spec], timeout).await {
        Ok(_) => Ok(true),
        Err(GitError::Failed { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Point the current branch, index and working tree at `rev`.
pub async fn reset_hard(repo: &Path, rev: &str, timeout: Duration) -> Result<(), GitError> {
    run_git(Some(repo), &["reset", "--hard", "--quiet", rev], timeout).await?;
    Ok(())
}

/// Remove untracked files left behind by an interrupted checkout.
pub async fn clean_untracked(repo: &Path, timeout: Duration) -> Result<(), GitError> {
    run_git(Some(repo), &["clean", "-fd", "--quiet"], timeout).await?;
    Ok(())
}

/// Whether a failure means the remote answered but could not serve the ref,
/// as opposed to being unreachable.
pub fn is_protocol_failure(err: &GitError) -> bool {
    const MARKERS: &[&str] = &[
        "does not appear to be a git repository",
        "repository not found",
        "not a git repository",
        "couldn't find remote ref",
        "invalid refspec",
    ];
    match err {
        GitError::Failed { stderr, .. } => {
            let lower = stderr.to_ascii_lowercase();
            MARKERS.iter().any(|m| lower.contains(m))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ls_remote_exact_ref_match() {
        let out = "1111111111111111111111111111111111111111\trefs/heads/main-old\n\
                   2222222222222222222222222222222222222222\trefs/heads/main\n";
        assert_eq!(
            parse_ls_remote(out, "refs/heads/main").as_deref(),
            Some("2222222222222222222222222222222222222222")
        );
    }

    #[test]
    fn ls_remote_missing_ref() {
        assert_eq!(parse_ls_remote("", "refs/heads/main"), None);
        assert_eq!(parse_ls_remote("garbage line\n", "refs/heads/main"), None);
    }

    #[test]
    fn porcelain_paths() {
        let out = " M src/main.rs\0?? scratch.txt\0A  added.rs\0";
        assert_eq!(
            parse_porcelain(out),
            vec!["src/main.rs", "scratch.txt", "added.rs"]
        );
    }

    #[test]
    fn porcelain_renames_and_unquoted_names() {
        let out = "R  docs/new name.md\0docs/old.md\0?? caf\u{e9} \"notes\".txt\0";
        assert_eq!(
            parse_porcelain(out),
            vec!["docs/new name.md", "docs/old.md", "caf\u{e9} \"notes\".txt"]
        );
    }

    #[test]
    fn porcelain_clean_tree() {
        assert!(parse_porcelain("").is_empty());
    }

    #[test]
    fn protocol_failures_are_recognised() {
        let err = GitError::Failed {
            args: "ls-remote".into(),
            code: Some(128),
            stderr: "fatal: '/nope' does not appear to be a git repository".into(),
        };
        assert!(is_protocol_failure(&err));

        let err = GitError::Failed {
            args: "ls-remote".into(),
            code: Some(128),
            stderr: "fatal: unable to access 'https://x/': Could not resolve host: x".into(),
        };
        assert!(!is_protocol_failure(&err));

        let err = GitError::Timeout {
            args: "ls-remote".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(!is_protocol_failure(&err));
    }
}
