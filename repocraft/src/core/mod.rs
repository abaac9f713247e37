//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod naming;
pub mod plan;
pub mod ranking;
pub mod relpath;
pub mod remote;
pub mod types;
