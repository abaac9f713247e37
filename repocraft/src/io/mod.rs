//! I/O adapters for repocraft operations.

pub mod analyzer;
pub mod apply;
pub mod config;
pub mod context;
pub mod git;
pub mod process;
pub mod prompt;
pub mod transport;
pub mod workspace;
