//! Pipeline error taxonomy.
//!
//! Every error is fatal at the stage it occurs. [`PipelineError::failure`]
//! flattens an error into the structured `(stage, kind, message)` triple
//! reported to callers.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::core::plan::{ActionRejection, PlanError};

/// Pipeline stage at which an operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configuration,
    Clone,
    Analysis,
    Context,
    ModelCall,
    Parse,
    Validation,
    Apply,
    Branch,
    Add,
    Commit,
    Export,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Clone => "clone",
            Self::Analysis => "analysis",
            Self::Context => "context",
            Self::ModelCall => "model_call",
            Self::Parse => "parse",
            Self::Validation => "validation",
            Self::Apply => "apply",
            Self::Branch => "branch",
            Self::Add => "add",
            Self::Commit => "commit",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Git step that failed inside the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GitOp {
    Branch,
    Add,
    Commit,
    Export,
}

impl fmt::Display for GitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Branch => "branch",
            Self::Add => "add",
            Self::Commit => "commit",
            Self::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("clone of {url} failed: {message}")]
    Clone { url: String, message: String },

    #[error("analysis failed at {}: {source}", path.display())]
    Analysis {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("model call failed: {0}")]
    ModelCall(String),

    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    #[error("plan rejected: action #{index} ({path}): {reason}")]
    PlanValidation {
        index: usize,
        path: String,
        reason: ActionRejection,
    },

    #[error("apply failed writing {failed} after {} completed action(s): {source}", completed.len())]
    Apply {
        completed: Vec<String>,
        failed: String,
        not_attempted: Vec<String>,
        #[source]
        source: io::Error,
    },

    #[error("git {op} failed: {message}")]
    GitOperation { op: GitOp, message: String },

    #[error("cancelled before {stage}")]
    Cancelled { stage: Stage },
}

impl PipelineError {
    pub fn git(op: GitOp, err: anyhow::Error) -> Self {
        Self::GitOperation {
            op,
            message: format!("{err:#}"),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) => Stage::Configuration,
            Self::Clone { .. } => Stage::Clone,
            Self::Analysis { .. } => Stage::Analysis,
            Self::ModelCall(_) => Stage::ModelCall,
            Self::MalformedPlan(_) => Stage::Parse,
            Self::PlanValidation { .. } => Stage::Validation,
            Self::Apply { .. } => Stage::Apply,
            Self::GitOperation { op, .. } => match op {
                GitOp::Branch => Stage::Branch,
                GitOp::Add => Stage::Add,
                GitOp::Commit => Stage::Commit,
                GitOp::Export => Stage::Export,
            },
            Self::Cancelled { stage } => *stage,
        }
    }

    /// Stable identifier for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Clone { .. } => "clone_error",
            Self::Analysis { .. } => "analysis_error",
            Self::ModelCall(_) => "model_call_error",
            Self::MalformedPlan(_) => "malformed_plan_error",
            Self::PlanValidation { .. } => "plan_validation_error",
            Self::Apply { .. } => "apply_error",
            Self::GitOperation { .. } => "git_operation_error",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    pub fn failure(&self) -> Failure {
        let (completed, not_attempted) = match self {
            Self::Apply {
                completed,
                not_attempted,
                ..
            } => (completed.clone(), not_attempted.clone()),
            _ => (Vec::new(), Vec::new()),
        };
        Failure {
            stage: self.stage(),
            kind: self.kind(),
            message: self.to_string(),
            completed,
            not_attempted,
        }
    }
}

impl From<PlanError> for PipelineError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Malformed(message) => Self::MalformedPlan(message),
            PlanError::Invalid {
                index,
                path,
                reason,
            } => Self::PlanValidation {
                index,
                path,
                reason,
            },
        }
    }
}

/// Structured failure reported to callers instead of a partial success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub stage: Stage,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub completed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_attempted: Vec<String>,
}
