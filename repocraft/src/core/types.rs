//! Shared deterministic types for the repocraft pipeline.
//!
//! These types are the contracts between pipeline components. Each is produced
//! by exactly one component and is read-only for everything downstream.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Histogram bucket for files whose extension is not in the language table.
pub const OTHER_BUCKET: &str = "other";

/// Immutable snapshot of one cloned repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryProfile {
    pub file_count: usize,
    pub total_size_bytes: u64,
    /// Extension (with leading dot) to file count; unknown extensions under [`OTHER_BUCKET`].
    pub language_histogram: BTreeMap<String, usize>,
    pub current_branch: Option<String>,
    pub remote_url: Option<String>,
    pub commit_count: u64,
}

impl RepositoryProfile {
    /// Histogram entries ordered by descending count, then extension.
    pub fn top_languages(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self
            .language_histogram
            .iter()
            .map(|(ext, count)| (ext.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries.truncate(limit);
        entries
    }
}

/// One file discovered by the structure analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// `/`-separated path relative to the workspace root.
    pub relative_path: String,
    /// Number of parent directories (0 for files at the root).
    pub depth: usize,
    pub size_bytes: u64,
}

/// Output of a single tree traversal: the profile plus the file inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryScan {
    pub profile: RepositoryProfile,
    /// Sorted lexically by `relative_path`.
    pub files: Vec<FileRecord>,
}

/// One selected file's contribution to the model payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    pub relative_path: String,
    pub truncated_content: String,
    pub was_truncated: bool,
}

/// Bounded textual summary of a repository sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPayload {
    pub profile: RepositoryProfile,
    /// Priority order.
    pub entries: Vec<ContextEntry>,
    pub max_files: usize,
    pub max_chars_per_file: usize,
}

impl ContextPayload {
    /// Render the payload as the text embedded in model prompts.
    pub fn render(&self) -> String {
        let profile = &self.profile;
        let mut out = String::new();
        out.push_str("=== REPOSITORY ANALYSIS ===\n");
        out.push_str(&format!("Total files: {}\n", profile.file_count));
        out.push_str(&format!("Size: {} bytes\n", profile.total_size_bytes));
        let languages = profile
            .top_languages(usize::MAX)
            .into_iter()
            .map(|(ext, count)| format!("{ext} ({count})"))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("Languages: {languages}\n"));
        out.push_str(&format!(
            "Current branch: {}\n",
            profile.current_branch.as_deref().unwrap_or("unknown")
        ));
        out.push_str(&format!(
            "Remote: {}\n",
            profile.remote_url.as_deref().unwrap_or("unknown")
        ));
        out.push_str(&format!("Commits: {}\n", profile.commit_count));
        out.push_str("\n=== FILE STRUCTURE ===\n");
        for entry in &self.entries {
            out.push_str(&format!("\n--- {} ---\n", entry.relative_path));
            out.push_str(&entry.truncated_content);
            if !entry.truncated_content.ends_with('\n') {
                out.push('\n');
            }
            if entry.was_truncated {
                out.push_str("[truncated]\n");
            }
        }
        out
    }
}

/// Planned mutation kind. Informational only: both kinds write full content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Modify,
}

impl ActionKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(Self::Create),
            "modify" => Some(Self::Modify),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
        }
    }

    /// Title-cased verb for commit messages and reports.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Modify => "Modify",
        }
    }
}

/// One validated filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeAction {
    /// Normalized, `/`-separated, guaranteed inside the workspace.
    pub relative_path: String,
    pub kind: ActionKind,
    pub content: String,
    pub description: String,
}

/// A fully validated unit of work. Only constructed by plan validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangePlan {
    summary: String,
    actions: Vec<ChangeAction>,
    dependencies: Vec<String>,
    tests: Vec<String>,
    notes: String,
}

impl ChangePlan {
    pub(crate) fn new(
        summary: String,
        actions: Vec<ChangeAction>,
        dependencies: Vec<String>,
        tests: Vec<String>,
        notes: String,
    ) -> Self {
        Self {
            summary,
            actions,
            dependencies,
            tests,
            notes,
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn actions(&self) -> &[ChangeAction] {
        &self.actions
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn tests(&self) -> &[String] {
        &self.tests
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn paths(&self) -> Vec<&str> {
        self.actions
            .iter()
            .map(|action| action.relative_path.as_str())
            .collect()
    }
}

/// Local branch bookkeeping for branch-isolated operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchState {
    pub branch_name: String,
    pub created: bool,
    pub commit_sha: Option<String>,
}

/// Operation requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Analyze,
    Summary,
    Improve,
    Feature,
    Fix,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Summary => "summary",
            Self::Improve => "improve",
            Self::Feature => "feature",
            Self::Fix => "fix",
        }
    }

    /// True when the model response is a change plan applied to the workspace.
    pub fn produces_plan(self) -> bool {
        matches!(self, Self::Feature | Self::Fix)
    }

    pub fn calls_model(self) -> bool {
        !matches!(self, Self::Analyze)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
