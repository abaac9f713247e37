//! Parsing and lexical validation of model-produced change plans.
//!
//! A response moves through `RawText -> ParsedPlan -> ChangePlan`. Parsing is
//! strict: the extracted object must satisfy the plan schema or the response is
//! rejected. Validation is all-or-nothing over every action.

use std::sync::LazyLock;

use jsonschema::Draft;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::relpath::{PathRejection, normalize_relative};
use crate::core::types::{ActionKind, ChangeAction};

pub const PLAN_SCHEMA: &str = include_str!("../../schemas/change_plan.schema.json");

/// Why a single plan entry was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionRejection {
    #[error(transparent)]
    Path(#[from] PathRejection),
    #[error("missing string field 'path'")]
    MissingPath,
    #[error("missing string field 'action'")]
    MissingAction,
    #[error("unknown action '{0}' (expected create or modify)")]
    UnknownAction(String),
    #[error("missing string field 'content'")]
    MissingContent,
    #[error("field 'description' must be a string")]
    InvalidDescription,
}

/// Plan rejection, either structural or per action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("malformed plan: {0}")]
    Malformed(String),
    #[error("action #{index} ({path}): {reason}")]
    Invalid {
        index: usize,
        path: String,
        reason: ActionRejection,
    },
}

/// One `files[]` entry after parsing, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftAction {
    pub index: usize,
    pub path: Option<String>,
    pub action: Option<String>,
    pub content: Option<String>,
    /// `Some(None)` when present with a non-string value.
    pub description: Option<Option<String>>,
}

impl DraftAction {
    /// Path as shown in error messages.
    pub fn display_path(&self) -> String {
        self.path.clone().unwrap_or_else(|| "<missing>".to_string())
    }
}

/// A schema-conforming plan whose actions have not been validated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPlan {
    pub summary: String,
    pub files: Vec<DraftAction>,
    pub dependencies: Vec<String>,
    pub tests: Vec<String>,
    pub notes: String,
}

/// Parse one model response into a [`ParsedPlan`].
pub fn parse_plan(raw: &str) -> Result<ParsedPlan, PlanError> {
    let value = extract_plan_value(raw)?;
    validate_schema(&value)?;

    let summary = string_field(&value, "plan");
    let notes = string_field(&value, "notes");
    let dependencies = string_list(&value, "dependencies");
    let tests = string_list(&value, "tests");
    let files = value
        .get("files")
        .and_then(Value::as_array)
        .ok_or_else(|| PlanError::Malformed("'files' must be an array".to_string()))?
        .iter()
        .enumerate()
        .map(|(index, entry)| DraftAction {
            index,
            path: entry.get("path").and_then(Value::as_str).map(str::to_string),
            action: entry.get("action").and_then(Value::as_str).map(str::to_string),
            content: entry
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string),
            description: entry
                .get("description")
                .map(|d| d.as_str().map(str::to_string)),
        })
        .collect::<Vec<_>>();

    debug!(actions = files.len(), "parsed plan");
    Ok(ParsedPlan {
        summary,
        files,
        dependencies,
        tests,
        notes,
    })
}

/// Check every draft action without touching the filesystem.
///
/// Returns the actions in plan order, or the first rejection.
pub fn validate_actions(files: &[DraftAction]) -> Result<Vec<ChangeAction>, PlanError> {
    files.iter().map(validate_action).collect()
}

fn validate_action(draft: &DraftAction) -> Result<ChangeAction, PlanError> {
    let reject = |reason: ActionRejection| PlanError::Invalid {
        index: draft.index,
        path: draft.display_path(),
        reason,
    };

    let raw_path = draft
        .path
        .as_deref()
        .ok_or_else(|| reject(ActionRejection::MissingPath))?;
    let relative_path =
        normalize_relative(raw_path).map_err(|err| reject(ActionRejection::Path(err)))?;
    let action = draft
        .action
        .as_deref()
        .ok_or_else(|| reject(ActionRejection::MissingAction))?;
    let kind = ActionKind::parse(action)
        .ok_or_else(|| reject(ActionRejection::UnknownAction(action.to_string())))?;
    let content = draft
        .content
        .clone()
        .ok_or_else(|| reject(ActionRejection::MissingContent))?;
    let description = match &draft.description {
        None => String::new(),
        Some(Some(text)) => text.clone(),
        Some(None) => return Err(reject(ActionRejection::InvalidDescription)),
    };

    Ok(ChangeAction {
        relative_path,
        kind,
        content,
        description,
    })
}

/// Locate the plan object: the whole response, a single fenced block, or the
/// outermost `{...}` span.
fn extract_plan_value(raw: &str) -> Result<Value, PlanError> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*)```$").expect("fence regex is valid")
    });

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PlanError::Malformed("response is empty".to_string()));
    }

    let mut candidates = vec![trimmed];
    if let Some(inner) = FENCE_RE.captures(trimmed).and_then(|caps| caps.get(1)) {
        candidates.push(inner.as_str().trim());
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
    {
        candidates.push(&trimmed[start..=end]);
    }

    let mut last_error = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => last_error = Some("top-level value is not an object".to_string()),
            Err(err) => last_error = Some(format!("invalid JSON: {err}")),
        }
    }
    Err(PlanError::Malformed(
        last_error.unwrap_or_else(|| "no JSON object found".to_string()),
    ))
}

/// Validate the plan against the bundled JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<(), PlanError> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA)
        .map_err(|err| PlanError::Malformed(format!("parse plan schema: {err}")))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| PlanError::Malformed(format!("compile plan schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(PlanError::Malformed(format!(
            "plan does not match schema:\n- {}",
            messages.join("\n- ")
        )));
    }
    Ok(())
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
