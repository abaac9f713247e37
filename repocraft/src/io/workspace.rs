//! Disposable workspaces holding one clone for one operation.
//!
//! A [`Workspace`] owns its temporary directory. Dropping it (on any exit
//! path, including error returns and unwinding) deletes the directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::core::remote::strip_userinfo;
use crate::error::PipelineError;
use crate::io::git::{Git, clone_repository};

const WORKSPACE_PREFIX: &str = "repocraft-";

/// Parameters for cloning a repository into a fresh workspace.
#[derive(Debug, Clone)]
pub struct CloneRequest<'a> {
    pub url: &'a str,
    pub branch: &'a str,
    /// Parent for the temporary directory; system temp dir when `None`.
    pub parent_dir: Option<&'a Path>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// A temporary clone of one repository.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    root: PathBuf,
    url: String,
    base_branch: String,
}

impl Workspace {
    /// Clone the repository into a fresh, uniquely named temporary directory.
    #[instrument(skip_all, fields(url = %strip_userinfo(request.url), branch = request.branch))]
    pub fn acquire(request: &CloneRequest<'_>) -> Result<Self, PipelineError> {
        let clone_error = |message: String| PipelineError::Clone {
            url: strip_userinfo(request.url),
            message,
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match request.parent_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|err| clone_error(format!("create temporary directory: {err}")))?;

        let root = dir.path().join(repo_dir_name(request.url));
        clone_repository(
            request.url,
            request.branch,
            &root,
            request.timeout,
            request.output_limit_bytes,
        )
        .map_err(|err| clone_error(format!("{err:#}")))?;

        info!(root = %root.display(), "workspace ready");
        Ok(Self {
            dir,
            root,
            url: request.url.to_string(),
            base_branch: request.branch.to_string(),
        })
    }

    /// Root of the cloned working tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    pub fn git(&self) -> Git {
        Git::new(&self.root)
    }

    /// Delete the workspace now, logging (not failing) on removal errors.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "workspace released"),
            Err(err) => warn!(path = %path.display(), err = %err, "failed to remove workspace"),
        }
    }
}

/// Directory name for the clone: last URL segment without a `.git` suffix.
pub fn repo_dir_name(url: &str) -> String {
    let trimmed = url.trim_end_matches(['/', '\\']);
    let last = trimmed
        .rsplit(['/', '\\', ':'])
        .next()
        .unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);
    let safe: String = name
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        .collect();
    if safe.is_empty() || safe.chars().all(|ch| ch == '.') {
        return "repo".to_string();
    }
    safe
}
