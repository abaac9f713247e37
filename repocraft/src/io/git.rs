//! Git adapter for workspace operations.
//!
//! Every call runs a real `git` subprocess against the local clone. Nothing in
//! here talks to a remote except [`clone_repository`].

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::process::run_command_with_timeout;

/// Identity used for commits made inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// Clone `url` at `branch` into `dest` (which must not exist or be empty).
#[instrument(skip_all, fields(url, branch))]
pub fn clone_repository(
    url: &str,
    branch: &str,
    dest: &Path,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<()> {
    debug!(dest = %dest.display(), "cloning");
    let mut cmd = Command::new("git");
    cmd.arg("clone")
        .arg("--branch")
        .arg(branch)
        .arg("--")
        .arg(url)
        .arg(dest)
        .env("GIT_TERMINAL_PROMPT", "0");
    let output = run_command_with_timeout(cmd, None, timeout, output_limit_bytes)
        .context("run git clone")?;
    output.ensure_success("git clone", timeout)
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Current branch name, or `None` on detached HEAD.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.run_capture(&["branch", "--show-current"])?;
        let name = out.trim();
        if name.is_empty() {
            return Ok(None);
        }
        Ok(Some(name.to_string()))
    }

    /// URL of the `origin` remote, or `None` when there is no such remote.
    pub fn remote_url(&self) -> Result<Option<String>> {
        let out = self.run(&["remote", "get-url", "origin"])?;
        if !out.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&out.stdout).trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }

    /// Number of commits reachable from HEAD (0 for an unborn branch).
    pub fn commit_count(&self) -> Result<u64> {
        let out = self.run(&["rev-list", "--count", "HEAD"])?;
        if !out.status.success() {
            return Ok(0);
        }
        let raw = String::from_utf8_lossy(&out.stdout);
        raw.trim()
            .parse::<u64>()
            .with_context(|| format!("parse commit count '{}'", raw.trim()))
    }

    /// Full SHA of HEAD.
    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Create and checkout a new branch at current HEAD.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        if self.branch_exists(branch)? {
            return Err(anyhow!("branch '{branch}' already exists"));
        }
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Stage exactly the given paths (additions and modifications), ignore
    /// rules included.
    pub fn add_paths(&self, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--force", "--"];
        args.extend_from_slice(paths);
        self.run_checked(&args)?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run_checked(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str, author: &CommitAuthor) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        let name = format!("user.name={}", author.name);
        let email = format!("user.email={}", author.email);
        self.run_checked(&[
            "-c",
            &name,
            "-c",
            &email,
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--no-verify",
            "-m",
            message,
        ])?;
        Ok(true)
    }

    /// Render HEAD as a `git format-patch` mailbox.
    pub fn format_patch_head(&self) -> Result<String> {
        self.run_capture(&["format-patch", "-1", "HEAD", "--stdout"])
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
