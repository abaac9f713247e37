//! Workspace-boundary validation and application of change plans.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::plan::{ActionRejection, ParsedPlan, PlanError, validate_actions};
use crate::core::relpath::PathRejection;
use crate::core::types::{ChangeAction, ChangePlan};
use crate::error::PipelineError;

/// Paths written by a successful apply, in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub written: Vec<String>,
}

/// Validate every action of a parsed plan against the workspace at `root`.
///
/// Lexical rules run first, then filesystem rules: no existing symlink on the
/// path, nothing resolving outside the workspace, no existing directory at the
/// target. The first failure rejects the whole plan.
#[instrument(skip_all, fields(actions = parsed.files.len()))]
pub fn validate_plan(parsed: ParsedPlan, root: &Path) -> Result<ChangePlan, PlanError> {
    let actions = validate_actions(&parsed.files)?;
    let canonical_root = root
        .canonicalize()
        .map_err(|err| PlanError::Malformed(format!("resolve workspace root: {err}")))?;

    for (index, action) in actions.iter().enumerate() {
        check_on_disk(&canonical_root, action).map_err(|rejection| PlanError::Invalid {
            index,
            path: action.relative_path.clone(),
            reason: ActionRejection::Path(rejection),
        })?;
    }

    debug!(actions = actions.len(), "plan validated");
    Ok(ChangePlan::new(
        parsed.summary,
        actions,
        parsed.dependencies,
        parsed.tests,
        parsed.notes,
    ))
}

fn check_on_disk(root: &Path, action: &ChangeAction) -> Result<(), PathRejection> {
    let mut current = root.to_path_buf();
    let segments: Vec<&str> = action.relative_path.split('/').collect();
    for (position, segment) in segments.iter().enumerate() {
        current.push(segment);
        let metadata = match fs::symlink_metadata(&current) {
            Ok(metadata) => metadata,
            // Nothing below a missing (or non-directory) component exists yet.
            Err(_) => break,
        };
        if metadata.file_type().is_symlink() {
            return Err(PathRejection::Symlink);
        }
        let is_target = position + 1 == segments.len();
        if is_target && metadata.is_dir() {
            return Err(PathRejection::Directory);
        }
    }

    let existing = deepest_existing(&current);
    match existing.canonicalize() {
        Ok(resolved) if resolved.starts_with(root) => Ok(()),
        _ => Err(PathRejection::OutsideWorkspace),
    }
}

fn deepest_existing(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    while fs::symlink_metadata(&candidate).is_err() {
        if !candidate.pop() {
            break;
        }
    }
    candidate
}

/// Write every action in plan order, creating parent directories.
///
/// Stops at the first failure and reports which paths were written, which one
/// failed and which were never attempted.
#[instrument(skip_all, fields(actions = plan.actions().len()))]
pub fn apply_plan(plan: &ChangePlan, root: &Path) -> Result<ApplyReport, PipelineError> {
    let paths = plan.paths();
    let mut written = Vec::with_capacity(paths.len());

    for (index, action) in plan.actions().iter().enumerate() {
        if let Err(source) = write_action(root, action) {
            warn!(path = %action.relative_path, err = %source, "apply failed");
            return Err(PipelineError::Apply {
                completed: written,
                failed: action.relative_path.clone(),
                not_attempted: paths[index + 1..].iter().map(|p| p.to_string()).collect(),
                source,
            });
        }
        debug!(path = %action.relative_path, kind = action.kind.as_str(), "wrote file");
        written.push(action.relative_path.clone());
    }

    Ok(ApplyReport { written })
}

fn write_action(root: &Path, action: &ChangeAction) -> io::Result<()> {
    let target = root.join(&action.relative_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, action.content.as_bytes())
}
