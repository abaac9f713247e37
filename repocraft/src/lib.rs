//! LLM-driven modification of git repositories.
//!
//! One operation clones a repository into a disposable workspace, builds a
//! bounded context from its tree, asks a language model for a summary,
//! suggestions or a structured change plan, and applies and commits that plan
//! locally. Nothing is ever pushed. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (types, path rules, ranking, plan
//!   parsing, naming). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, processes, model
//!   transport). Isolated behind small types and traits to enable fakes in tests.
//!
//! [`pipeline`] sequences the stages of one operation on top of both.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
