//! Lexical rules for workspace-relative paths proposed by a model.
//!
//! Checks here are pure string operations. Filesystem-dependent checks
//! (symlinks, existing directories) live in `io::apply` and report through the
//! same [`PathRejection`] type.

use thiserror::Error;

/// Why a proposed path cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("path is empty")]
    Empty,
    #[error("path contains NUL or control characters")]
    ControlCharacter,
    #[error("absolute paths are not allowed")]
    Absolute,
    #[error("'..' segments are not allowed")]
    ParentSegment,
    #[error("writes into the .git directory are not allowed")]
    GitDirectory,
    #[error("path passes through a symlink")]
    Symlink,
    #[error("path resolves outside the workspace")]
    OutsideWorkspace,
    #[error("target is an existing directory")]
    Directory,
}

/// Normalize a model-supplied path into a `/`-separated relative path.
///
/// Backslashes are treated as separators, `.` and empty segments are dropped.
/// The result never starts with `/`, never contains `..`, and never names
/// anything under `.git`.
pub fn normalize_relative(raw: &str) -> Result<String, PathRejection> {
    if raw.trim().is_empty() {
        return Err(PathRejection::Empty);
    }
    if raw.chars().any(char::is_control) {
        return Err(PathRejection::ControlCharacter);
    }

    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') || unified.starts_with('~') || has_drive_prefix(&unified) {
        return Err(PathRejection::Absolute);
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathRejection::ParentSegment),
            seg if seg.eq_ignore_ascii_case(".git") => return Err(PathRejection::GitDirectory),
            seg => segments.push(seg),
        }
    }

    if segments.is_empty() {
        return Err(PathRejection::Empty);
    }
    Ok(segments.join("/"))
}

/// Depth of a normalized relative path (number of parent directories).
pub fn depth(relative: &str) -> usize {
    relative.matches('/').count()
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
