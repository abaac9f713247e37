//! Operation orchestration: clone, analyze, prompt, plan, apply, commit.
//!
//! Each [`Orchestrator::run`] call owns exactly one [`Workspace`]. Stages run in
//! a fixed order and the first failure halts the operation; the workspace is
//! deleted on every path. Nothing is ever pushed.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::naming::{branch_name, commit_message};
use crate::core::plan::parse_plan;
use crate::core::remote::strip_userinfo;
use crate::core::types::{BranchState, ChangePlan, OperationKind, RepositoryProfile};
use crate::error::{GitOp, PipelineError, Stage};
use crate::io::analyzer::analyze;
use crate::io::apply::{apply_plan, validate_plan};
use crate::io::config::{ModelSettings, RepocraftConfig};
use crate::io::context::build_context;
use crate::io::prompt::{PromptEngine, PromptInputs};
use crate::io::transport::{ModelRequest, ModelTransport};
use crate::io::workspace::{CloneRequest, Workspace};

/// Shared cancellation flag, checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`PipelineError::Cancelled`] if cancellation was requested.
    pub fn check(&self, next: Stage) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            warn!(stage = next.as_str(), "operation cancelled");
            return Err(PipelineError::Cancelled { stage: next });
        }
        Ok(())
    }
}

/// One repository operation as requested by the caller.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub repo_url: String,
    /// Base branch to clone.
    pub branch: String,
    /// Model id; the configured default when `None`.
    pub model: Option<String>,
    /// Feature or issue description (required for feature/fix).
    pub instruction: Option<String>,
    /// Focus area for improve.
    pub focus: Option<String>,
    /// Create `<kind>/<slug>` before applying the plan.
    pub create_branch: bool,
    /// Write the resulting commit as a `git format-patch` mailbox here.
    pub patch_out: Option<PathBuf>,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, repo_url: impl Into<String>) -> Self {
        Self {
            kind,
            repo_url: repo_url.into(),
            branch: "main".to_string(),
            model: None,
            instruction: None,
            focus: None,
            create_branch: false,
            patch_out: None,
        }
    }
}

/// Result of a completed operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub operation: OperationKind,
    pub repo_url: String,
    pub base_branch: String,
    pub profile: RepositoryProfile,
    /// Files embedded in the model context, in priority order.
    pub context_files: Vec<String>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// Analysis only; no model call.
    Profile,
    /// Summary or improvement text returned by the model.
    Text { model: String, response: String },
    /// An applied and committed change plan.
    Changes(ChangeOutcome),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeOutcome {
    pub model: String,
    pub plan: ChangePlan,
    pub written: Vec<String>,
    pub branch: Option<BranchState>,
    /// `None` when the plan produced no diff.
    pub commit_sha: Option<String>,
    pub patch_path: Option<PathBuf>,
}

/// Runs operations against one configuration and one model transport.
pub struct Orchestrator<T> {
    config: RepocraftConfig,
    transport: T,
    prompts: PromptEngine,
}

impl<T: ModelTransport> Orchestrator<T> {
    pub fn new(config: RepocraftConfig, transport: T) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|err| PipelineError::Configuration(format!("{err:#}")))?;
        let prompts =
            PromptEngine::new().map_err(|err| PipelineError::Configuration(format!("{err:#}")))?;
        Ok(Self {
            config,
            transport,
            prompts,
        })
    }

    pub fn config(&self) -> &RepocraftConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one operation end to end.
    ///
    /// Model configuration is resolved before cloning, so configuration errors
    /// never cost a clone.
    #[instrument(skip_all, fields(kind = %request.kind, url = %strip_userinfo(&request.repo_url)))]
    pub fn run(
        &self,
        request: &OperationRequest,
        cancel: &CancelFlag,
    ) -> Result<OperationReport, PipelineError> {
        let model = if request.kind.calls_model() {
            Some(self.config.resolve_model(request.model.as_deref())?)
        } else {
            None
        };
        if request.kind.produces_plan() && instruction_text(request).is_none() {
            return Err(PipelineError::Configuration(format!(
                "{} requires a description",
                request.kind
            )));
        }

        cancel.check(Stage::Clone)?;
        let workspace = Workspace::acquire(&CloneRequest {
            url: &request.repo_url,
            branch: &request.branch,
            parent_dir: self.config.git.workspace_root.as_deref(),
            timeout: self.config.clone_timeout(),
            output_limit_bytes: self.config.limits.output_limit_bytes,
        })?;

        let result = self.run_in_workspace(&workspace, request, model, cancel);
        workspace.release();
        if let Err(err) = &result {
            warn!(stage = err.stage().as_str(), kind = err.kind(), "operation failed");
        }
        result
    }

    fn run_in_workspace(
        &self,
        workspace: &Workspace,
        request: &OperationRequest,
        model: Option<ModelSettings>,
        cancel: &CancelFlag,
    ) -> Result<OperationReport, PipelineError> {
        let root = workspace.root();
        cancel.check(Stage::Analysis)?;
        let scan = analyze(root)?;

        let mut report = OperationReport {
            operation: request.kind,
            repo_url: strip_userinfo(&request.repo_url),
            base_branch: request.branch.clone(),
            profile: scan.profile.clone(),
            context_files: Vec::new(),
            outcome: Outcome::Profile,
        };
        let Some(model) = model else {
            return Ok(report);
        };

        cancel.check(Stage::Context)?;
        let limits = &self.config.limits;
        let payload = build_context(root, &scan, limits.max_files, limits.max_chars_per_file);
        report.context_files = payload
            .entries
            .iter()
            .map(|entry| entry.relative_path.clone())
            .collect();

        cancel.check(Stage::ModelCall)?;
        let inputs = PromptInputs {
            instruction: instruction_text(request),
            focus: request.focus.as_deref(),
        };
        let prompt = self
            .prompts
            .render(request.kind, &payload, inputs)
            .map_err(|err| PipelineError::ModelCall(format!("render prompt: {err:#}")))?;
        let model_id = model.id.clone();
        let response = self
            .transport
            .complete(&ModelRequest {
                model,
                prompt,
                timeout: self.config.model_timeout(),
            })
            .map_err(|err| PipelineError::ModelCall(format!("{err:#}")))?;

        if !request.kind.produces_plan() {
            report.outcome = Outcome::Text {
                model: model_id,
                response,
            };
            return Ok(report);
        }

        let changes = self.apply_response(workspace, request, model_id, &response, cancel)?;
        report.outcome = Outcome::Changes(changes);
        Ok(report)
    }

    fn apply_response(
        &self,
        workspace: &Workspace,
        request: &OperationRequest,
        model: String,
        response: &str,
        cancel: &CancelFlag,
    ) -> Result<ChangeOutcome, PipelineError> {
        let root = workspace.root();
        let git = workspace.git();
        let instruction = instruction_text(request).unwrap_or_default();

        cancel.check(Stage::Parse)?;
        let parsed = parse_plan(response)?;
        cancel.check(Stage::Validation)?;
        let plan = validate_plan(parsed, root)?;

        cancel.check(Stage::Branch)?;
        let mut branch = None;
        if request.create_branch {
            let name = branch_name(request.kind, instruction);
            git.checkout_new_branch(&name)
                .map_err(|err| PipelineError::git(GitOp::Branch, err))?;
            info!(branch = %name, "created branch");
            branch = Some(BranchState {
                branch_name: name,
                created: true,
                commit_sha: None,
            });
        }

        cancel.check(Stage::Apply)?;
        let applied = apply_plan(&plan, root)?;

        cancel.check(Stage::Add)?;
        git.add_paths(&plan.paths())
            .map_err(|err| PipelineError::git(GitOp::Add, err))?;

        cancel.check(Stage::Commit)?;
        let message = commit_message(request.kind, instruction, &plan);
        let committed = git
            .commit_staged(&message, &self.config.commit_author())
            .map_err(|err| PipelineError::git(GitOp::Commit, err))?;
        let commit_sha = if committed {
            let sha = git
                .head_sha()
                .map_err(|err| PipelineError::git(GitOp::Commit, err))?;
            info!(sha = %sha, "committed plan");
            Some(sha)
        } else {
            warn!("plan produced no changes, nothing committed");
            None
        };
        if let Some(state) = branch.as_mut() {
            state.commit_sha = commit_sha.clone();
        }

        let mut patch_path = None;
        if let Some(path) = &request.patch_out {
            if commit_sha.is_some() {
                cancel.check(Stage::Export)?;
                let patch = git
                    .format_patch_head()
                    .map_err(|err| PipelineError::git(GitOp::Export, err))?;
                fs::write(path, patch).map_err(|err| {
                    PipelineError::git(
                        GitOp::Export,
                        anyhow::Error::new(err).context(format!("write {}", path.display())),
                    )
                })?;
                info!(path = %path.display(), "wrote patch");
                patch_path = Some(path.clone());
            } else {
                warn!(path = %path.display(), "no commit to export, patch not written");
            }
        }

        Ok(ChangeOutcome {
            model,
            plan,
            written: applied.written,
            branch,
            commit_sha,
            patch_path,
        })
    }
}

fn instruction_text(request: &OperationRequest) -> Option<&str> {
    request
        .instruction
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}
