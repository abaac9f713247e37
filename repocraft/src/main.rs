//! LLM-driven repository analysis and modification.
//!
//! Clones a repository into a disposable workspace, asks the configured model
//! for a summary, improvement suggestions, or a change plan, and applies and
//! commits plans locally. Nothing is ever pushed.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::warn;

use repocraft::core::remote::strip_userinfo;
use repocraft::core::types::OperationKind;
use repocraft::error::{Failure, PipelineError};
use repocraft::exit_codes;
use repocraft::io::config::{DEFAULT_CONFIG_FILE, load_config};
use repocraft::io::transport::CommandTransport;
use repocraft::logging;
use repocraft::pipeline::{
    CancelFlag, ChangeOutcome, OperationReport, OperationRequest, Orchestrator, Outcome,
};

const BANNER_WIDTH: usize = 60;

#[derive(Parser)]
#[command(
    name = "repocraft",
    version,
    about = "Analyze and modify git repositories with a language model"
)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, env = "REPOCRAFT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Print the report (or failure) as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RepoArgs {
    /// Git repository URL (or local path).
    repo_url: String,
    /// Base branch to clone.
    #[arg(long, default_value = "main")]
    branch: String,
}

#[derive(Args)]
struct ChangeArgs {
    #[command(flatten)]
    repo: RepoArgs,
    /// Feature or issue description.
    description: String,
    /// Model id from the configuration.
    #[arg(long)]
    model: Option<String>,
    /// Commit on a new local `<kind>/<slug>` branch.
    #[arg(long)]
    create_pr: bool,
    /// Write the resulting commit as a format-patch mailbox.
    #[arg(long)]
    patch_out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Print repository statistics (no model call).
    Analyze {
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Ask the model for a repository summary.
    Summary {
        #[command(flatten)]
        repo: RepoArgs,
        #[arg(long)]
        model: Option<String>,
    },
    /// Ask the model for improvement suggestions.
    Improve {
        #[command(flatten)]
        repo: RepoArgs,
        #[arg(long)]
        model: Option<String>,
        /// Area to focus on (e.g. performance, security, testing).
        #[arg(long)]
        focus: Option<String>,
    },
    /// Implement a feature from a description.
    Feature(ChangeArgs),
    /// Fix issues from a description.
    Fix(ChangeArgs),
}

impl Command {
    fn into_request(self) -> OperationRequest {
        match self {
            Self::Analyze { repo } => repo.request(OperationKind::Analyze),
            Self::Summary { repo, model } => OperationRequest {
                model,
                ..repo.request(OperationKind::Summary)
            },
            Self::Improve { repo, model, focus } => OperationRequest {
                model,
                focus,
                ..repo.request(OperationKind::Improve)
            },
            Self::Feature(args) => args.request(OperationKind::Feature),
            Self::Fix(args) => args.request(OperationKind::Fix),
        }
    }
}

impl RepoArgs {
    fn request(self, kind: OperationKind) -> OperationRequest {
        OperationRequest {
            branch: self.branch,
            ..OperationRequest::new(kind, self.repo_url)
        }
    }
}

impl ChangeArgs {
    fn request(self, kind: OperationKind) -> OperationRequest {
        OperationRequest {
            model: self.model,
            instruction: Some(self.description),
            create_branch: self.create_pr,
            patch_out: self.patch_out,
            ..self.repo.request(kind)
        }
    }
}

#[derive(Serialize)]
struct FailureReport<'a> {
    error: &'a Failure,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let json = cli.json;
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_flag.cancel()) {
        warn!(err = %err, "failed to install Ctrl-C handler");
    }

    let request = cli.command.into_request();
    if !json {
        println!("{}", intro_line(&request));
    }

    let result = load_config(&cli.config)
        .map_err(|err| PipelineError::Configuration(format!("{err:#}")))
        .and_then(|config| {
            let transport = CommandTransport::new(config.limits.output_limit_bytes);
            Orchestrator::new(config, transport)
        })
        .and_then(|orchestrator| orchestrator.run(&request, &cancel));

    match result {
        Ok(report) => {
            if json {
                print_json(&report);
            } else {
                print!("{}", render_report(&report));
            }
            exit_codes::OK
        }
        Err(err) => {
            let failure = err.failure();
            if json {
                print_json(&FailureReport { error: &failure });
            } else {
                eprint!("{}", render_failure(&failure));
            }
            exit_code(&err, cancel.is_cancelled())
        }
    }
}

/// An interrupted child process fails its stage; the interrupt still wins.
fn exit_code(err: &PipelineError, cancelled: bool) -> i32 {
    match err {
        _ if cancelled => exit_codes::CANCELLED,
        PipelineError::Cancelled { .. } => exit_codes::CANCELLED,
        PipelineError::Configuration(_) => exit_codes::INVALID_CONFIG,
        _ => exit_codes::FAILED,
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("Error: serialize report: {err}"),
    }
}

fn intro_line(request: &OperationRequest) -> String {
    let url = strip_userinfo(&request.repo_url);
    let detail = request.instruction.as_deref().unwrap_or_default();
    match request.kind {
        OperationKind::Analyze => format!("Analyzing repository: {url}"),
        OperationKind::Summary => format!("Generating summary for: {url}"),
        OperationKind::Improve => match request.focus.as_deref() {
            Some(focus) => format!("Generating improvements for: {url}\nFocus area: {focus}"),
            None => format!("Generating improvements for: {url}"),
        },
        OperationKind::Feature => format!("Implementing feature in: {url}\nFeature: {detail}"),
        OperationKind::Fix => format!("Fixing issues in: {url}\nIssues: {detail}"),
    }
}

fn banner(out: &mut String, title: &str) {
    let rule = "=".repeat(BANNER_WIDTH);
    out.push_str(&format!("\n{rule}\n{title}\n{rule}\n"));
}

fn render_report(report: &OperationReport) -> String {
    let mut out = String::new();
    match &report.outcome {
        Outcome::Profile => {
            let profile = &report.profile;
            banner(&mut out, "REPOSITORY ANALYSIS");
            let languages: Vec<&str> = profile
                .top_languages(usize::MAX)
                .into_iter()
                .map(|(ext, _)| ext)
                .collect();
            out.push_str(&format!("Repository: {}\n", report.repo_url));
            out.push_str(&format!("Files: {}\n", profile.file_count));
            out.push_str(&format!("Size: {} bytes\n", profile.total_size_bytes));
            out.push_str(&format!("Languages: {}\n", languages.join(", ")));
            out.push_str(&format!(
                "Branch: {}\n",
                profile.current_branch.as_deref().unwrap_or("unknown")
            ));
            out.push_str(&format!(
                "Remote: {}\n",
                profile.remote_url.as_deref().unwrap_or("unknown")
            ));
            out.push_str(&format!("Commits: {}\n", profile.commit_count));
            let top = profile.top_languages(5);
            if !top.is_empty() {
                out.push_str("\nTop file types:\n");
                for (ext, count) in top {
                    out.push_str(&format!("  {ext}: {count} files\n"));
                }
            }
        }
        Outcome::Text { response, .. } => {
            let title = match report.operation {
                OperationKind::Improve => "IMPROVEMENT SUGGESTIONS",
                _ => "REPOSITORY SUMMARY",
            };
            banner(&mut out, title);
            out.push_str(response.trim_end());
            out.push('\n');
        }
        Outcome::Changes(changes) => render_changes(&mut out, report.operation, changes),
    }
    out
}

fn render_changes(out: &mut String, kind: OperationKind, changes: &ChangeOutcome) {
    let is_fix = kind == OperationKind::Fix;
    banner(out, if is_fix { "ISSUE FIXES" } else { "FEATURE IMPLEMENTATION" });
    let (headline, files_label) = if is_fix {
        ("Issues fixed successfully.", "Fixed files")
    } else {
        ("Feature implemented successfully.", "Modified files")
    };
    out.push_str(&format!("{headline}\n"));
    out.push_str(&format!("{files_label}: {}\n", changes.written.join(", ")));
    if let Some(branch) = &changes.branch {
        out.push_str(&format!("Created branch: {}\n", branch.branch_name));
    }
    match &changes.commit_sha {
        Some(sha) => out.push_str(&format!("Commit: {sha}\n")),
        None => out.push_str("No changes to commit.\n"),
    }
    if let Some(path) = &changes.patch_path {
        out.push_str(&format!("Patch written to: {}\n", path.display()));
    }

    let plan = &changes.plan;
    if !plan.summary().trim().is_empty() {
        let label = if is_fix { "Problem analysis" } else { "Implementation plan" };
        out.push_str(&format!("\n{label}:\n{}\n", plan.summary().trim()));
    }
    if is_fix && !plan.actions().is_empty() {
        out.push_str("\nFixes applied:\n");
        for action in plan.actions() {
            out.push_str(&format!("- {}: {}\n", action.relative_path, action.description));
        }
    }
    if !plan.dependencies().is_empty() {
        out.push_str(&format!(
            "\nNew dependencies: {}\n",
            plan.dependencies().join(", ")
        ));
    }
    if !plan.tests().is_empty() {
        out.push_str(&format!("\nSuggested tests: {}\n", plan.tests().join(", ")));
    }
    if !plan.notes().trim().is_empty() {
        out.push_str(&format!("\nNotes:\n{}\n", plan.notes().trim()));
    }
}

fn render_failure(failure: &Failure) -> String {
    let mut out = format!("Error [{}/{}]: {}\n", failure.stage, failure.kind, failure.message);
    if !failure.completed.is_empty() {
        out.push_str(&format!("Completed: {}\n", failure.completed.join(", ")));
    }
    if !failure.not_attempted.is_empty() {
        out.push_str(&format!("Not attempted: {}\n", failure.not_attempted.join(", ")));
    }
    out
}
