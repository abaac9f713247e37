//! Test-only fixtures: local git origins and scripted model transports.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::config::{ModelConfig, RepocraftConfig};
use crate::io::git::CommitAuthor;
use crate::io::transport::{ModelRequest, ModelTransport};
use crate::pipeline::CancelFlag;

/// Model id registered by [`test_config`].
pub const TEST_MODEL: &str = "scripted";

/// A throwaway git repository with one commit on `main` and no remotes.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create the repository and commit `files` (path, content) on `main`.
    pub fn with_files(files: &[(&str, &str)]) -> Result<Self> {
        let dir = tempfile::tempdir().context("create test repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        for (path, content) in files {
            repo.write(path, content)?;
        }
        repo.git(&["add", "--all"])?;
        repo.commit("initial")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Clone URL for this repository (a local path).
    pub fn url(&self) -> String {
        self.dir.path().display().to_string()
    }

    pub fn author() -> CommitAuthor {
        CommitAuthor {
            name: "Repocraft Test".to_string(),
            email: "repocraft-test@local.invalid".to_string(),
        }
    }

    pub fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).with_context(|| format!("mkdir {}", parent.display()))?;
        }
        fs::write(&full, content).with_context(|| format!("write {}", full.display()))
    }

    /// Commit everything staged (allowing an empty commit).
    pub fn commit(&self, message: &str) -> Result<()> {
        let author = Self::author();
        let name = format!("user.name={}", author.name);
        let email = format!("user.email={}", author.email);
        self.git(&[
            "-c",
            &name,
            "-c",
            &email,
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "--allow-empty",
            "-m",
            message,
        ])
        .map(|_| ())
    }

    /// Run git in the repository and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Config with one scripted model and workspaces created under `workspace_root`.
pub fn test_config(workspace_root: &Path) -> RepocraftConfig {
    let mut cfg = RepocraftConfig::default();
    cfg.default_model = TEST_MODEL.to_string();
    cfg.git.workspace_root = Some(workspace_root.to_path_buf());
    cfg.git.author_name = TestRepo::author().name;
    cfg.git.author_email = TestRepo::author().email;
    cfg.limits.clone_timeout_secs = 60;
    cfg.limits.model_timeout_secs = 60;
    cfg.models.insert(
        TEST_MODEL.to_string(),
        ModelConfig {
            command: vec!["cat".to_string()],
            model_name: "scripted-model".to_string(),
            api_url: "http://localhost".to_string(),
            api_key: Some("test-key".to_string()),
            api_key_env: None,
        },
    );
    cfg
}

/// Transport returning queued responses in order and recording every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: RefCell<VecDeque<Result<String, String>>>,
    requests: RefCell<Vec<ModelRequest>>,
    cancel_on_call: Option<CancelFlag>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: impl Into<String>) -> Self {
        self.responses.borrow_mut().push_back(Ok(response.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.responses.borrow_mut().push_back(Err(message.into()));
        self
    }

    /// Flip `flag` while the model call is in flight.
    pub fn cancel_during_call(mut self, flag: CancelFlag) -> Self {
        self.cancel_on_call = Some(flag);
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.borrow().clone()
    }
}

impl ModelTransport for ScriptedTransport {
    fn complete(&self, request: &ModelRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(flag) = &self.cancel_on_call {
            flag.cancel();
        }
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted response left")),
        }
    }
}
