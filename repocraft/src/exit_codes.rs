//! Stable exit codes for the repocraft CLI.

/// Operation completed.
pub const OK: i32 = 0;
/// Operation stopped at a pipeline stage (clone, model call, plan, git).
pub const FAILED: i32 = 1;
/// Configuration could not be loaded or the selected model is unusable.
pub const INVALID_CONFIG: i32 = 2;
/// Interrupted by Ctrl-C; the workspace was still removed.
pub const CANCELLED: i32 = 130;
