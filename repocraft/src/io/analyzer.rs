//! Structure analysis: one traversal of the cloned tree.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::ranking::histogram_key;
use crate::core::relpath::depth;
use crate::core::remote::strip_userinfo;
use crate::core::types::{FileRecord, RepositoryProfile, RepositoryScan};
use crate::error::PipelineError;
use crate::io::git::Git;

/// Walk `root` once and return its profile plus file inventory.
///
/// `.git` is pruned and symlinks are neither followed nor counted. Git metadata
/// that cannot be read is recorded as absent.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn analyze(root: &Path) -> Result<RepositoryScan, PipelineError> {
    let mut files = Vec::new();
    let mut histogram: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_size_bytes = 0u64;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            let source = err
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop"));
            PipelineError::Analysis { path, source }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata().map_err(|err| {
            let path = entry.path().to_path_buf();
            let source = err
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("metadata unavailable"));
            PipelineError::Analysis { path, source }
        })?;

        let Some(relative_path) = relative_key(root, entry.path()) else {
            warn!(path = %entry.path().display(), "skipping non-UTF-8 path");
            continue;
        };
        let size_bytes = metadata.len();
        total_size_bytes += size_bytes;
        *histogram.entry(histogram_key(&relative_path)).or_default() += 1;
        files.push(FileRecord {
            depth: depth(&relative_path),
            relative_path,
            size_bytes,
        });
    }
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let git = Git::new(root);
    let current_branch = git.current_branch().unwrap_or_else(|err| {
        warn!(err = %err, "current branch unavailable");
        None
    });
    let remote_url = git
        .remote_url()
        .unwrap_or_else(|err| {
            warn!(err = %err, "remote url unavailable");
            None
        })
        .map(|url| strip_userinfo(&url));
    let commit_count = git.commit_count().unwrap_or_else(|err| {
        warn!(err = %err, "commit count unavailable");
        0
    });

    debug!(files = files.len(), total_size_bytes, "analysis complete");
    Ok(RepositoryScan {
        profile: RepositoryProfile {
            file_count: files.len(),
            total_size_bytes,
            language_histogram: histogram,
            current_branch,
            remote_url,
            commit_count,
        },
        files,
    })
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
