//! End-to-end pipeline scenarios against local git origins.
//!
//! Every scenario runs the real orchestrator (clone, analysis, context, plan,
//! apply, git) with a scripted model transport, then checks both the report and
//! that the workspace directory is gone.

use std::fs;
use std::path::Path;

use repocraft::core::plan::ActionRejection;
use repocraft::core::relpath::PathRejection;
use repocraft::core::types::OperationKind;
use repocraft::error::{PipelineError, Stage};
use repocraft::pipeline::{CancelFlag, OperationRequest, Orchestrator, Outcome};
use repocraft::test_support::{ScriptedTransport, TestRepo, test_config};

fn orchestrator(scratch: &Path, transport: ScriptedTransport) -> Orchestrator<ScriptedTransport> {
    Orchestrator::new(test_config(scratch), transport).expect("orchestrator")
}

fn change_request(kind: OperationKind, origin: &TestRepo, instruction: &str) -> OperationRequest {
    let mut request = OperationRequest::new(kind, origin.url());
    request.instruction = Some(instruction.to_string());
    request
}

fn assert_no_workspaces(scratch: &Path) {
    let leftovers: Vec<_> = fs::read_dir(scratch)
        .expect("read scratch")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name())
        .filter(|name| name.to_string_lossy().starts_with("repocraft-"))
        .collect();
    assert!(leftovers.is_empty(), "workspace left behind: {leftovers:?}");
}

#[test]
fn plan_on_empty_repository_creates_one_file_and_one_commit() {
    let origin = TestRepo::with_files(&[]).expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let patch = scratch.path().join("change.patch");
    let transport = ScriptedTransport::new().respond(
        r#"{"plan": "add entry point", "files": [{"path": "a.py", "action": "create", "content": "print(1)"}]}"#,
    );
    let orchestrator = orchestrator(scratch.path(), transport);
    let mut request = change_request(OperationKind::Feature, &origin, "add entry point");
    request.patch_out = Some(patch.clone());

    let report = orchestrator
        .run(&request, &CancelFlag::new())
        .expect("feature");
    let Outcome::Changes(changes) = report.outcome else {
        panic!("expected changes outcome");
    };
    assert_eq!(changes.written, vec!["a.py"]);
    assert!(changes.branch.is_none());
    let sha = changes.commit_sha.expect("commit sha");
    assert_eq!(sha.len(), 40);

    let mailbox = fs::read_to_string(&patch).expect("read patch");
    assert_eq!(mailbox.matches("diff --git").count(), 1);
    assert!(mailbox.contains("diff --git a/a.py b/a.py"));
    assert!(mailbox.contains("+print(1)"));
    assert!(mailbox.contains("Subject: [PATCH] Implement add entry point"));

    assert_no_workspaces(scratch.path());
    assert_eq!(origin.git(&["rev-list", "--count", "HEAD"]).expect("count"), "1");
}

#[test]
fn response_without_files_is_malformed_and_writes_nothing() {
    let origin = TestRepo::with_files(&[("README.md", "# demo\n")]).expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let patch = scratch.path().join("change.patch");
    let transport = ScriptedTransport::new().respond(r#"{"plan": "forgot the files"}"#);
    let orchestrator = orchestrator(scratch.path(), transport);
    let mut request = change_request(OperationKind::Feature, &origin, "anything");
    request.patch_out = Some(patch.clone());

    let err = orchestrator
        .run(&request, &CancelFlag::new())
        .expect_err("malformed");
    assert!(matches!(err, PipelineError::MalformedPlan(_)));
    assert_eq!(err.stage(), Stage::Parse);
    assert!(!patch.exists());
    assert_no_workspaces(scratch.path());
}

#[test]
fn failed_clone_stops_before_context_and_model() {
    let scratch = tempfile::tempdir().expect("scratch");
    let missing = scratch.path().join("no-such-origin");
    let orchestrator = orchestrator(scratch.path(), ScriptedTransport::new().respond("unused"));
    let request = OperationRequest::new(OperationKind::Summary, missing.display().to_string());

    let err = orchestrator
        .run(&request, &CancelFlag::new())
        .expect_err("clone fails");
    assert!(matches!(err, PipelineError::Clone { .. }));
    assert_eq!(err.failure().kind, "clone_error");
    assert!(orchestrator.transport().requests().is_empty());
    assert_no_workspaces(scratch.path());
}

#[test]
fn create_pr_commits_on_kind_slug_branch() {
    let origin = TestRepo::with_files(&[("app.py", "print('hi')\n")]).expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let transport = ScriptedTransport::new().respond(
        "```json\n{\"plan\": \"greet\", \"files\": [{\"path\": \"app.py\", \"action\": \"modify\", \"content\": \"print('hello')\\n\", \"description\": \"friendlier greeting\"}]}\n```",
    );
    let orchestrator = orchestrator(scratch.path(), transport);
    let mut request = change_request(OperationKind::Feature, &origin, "Add Greeting!");
    request.create_branch = true;

    let report = orchestrator
        .run(&request, &CancelFlag::new())
        .expect("feature");
    let Outcome::Changes(changes) = report.outcome else {
        panic!("expected changes outcome");
    };
    let branch = changes.branch.expect("branch state");
    assert_eq!(branch.branch_name, "feature/add-greeting");
    assert!(branch.created);
    assert_eq!(branch.commit_sha, changes.commit_sha);
    assert!(branch.commit_sha.is_some());
    assert_eq!(origin.git(&["branch", "--list", "feature/*"]).expect("branches"), "");
}

#[test]
fn fix_uses_fix_commit_message() {
    let origin = TestRepo::with_files(&[("calc.py", "def div(a, b):\n    return a / b\n")])
        .expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let patch = scratch.path().join("fix.patch");
    let transport = ScriptedTransport::new().respond(
        r#"{"plan": "guard zero", "files": [{"path": "calc.py", "action": "modify", "content": "def div(a, b):\n    return a / b if b else 0\n", "description": "guard zero"}], "tests": ["test_calc.py"]}"#,
    );
    let orchestrator = orchestrator(scratch.path(), transport);
    let mut request = change_request(OperationKind::Fix, &origin, "division by zero");
    request.create_branch = true;
    request.patch_out = Some(patch.clone());

    let report = orchestrator
        .run(&request, &CancelFlag::new())
        .expect("fix");
    let Outcome::Changes(changes) = report.outcome else {
        panic!("expected changes outcome");
    };
    assert_eq!(changes.plan.tests(), ["test_calc.py"]);
    assert_eq!(
        changes.branch.map(|b| b.branch_name).as_deref(),
        Some("fix/division-by-zero")
    );

    let mailbox = fs::read_to_string(&patch).expect("read patch");
    assert!(mailbox.contains("Subject: [PATCH] Fix: division by zero"));
    assert!(mailbox.contains("- Modify calc.py: guard zero"));

    let requests = orchestrator.transport().requests();
    let prompt = &requests[0].prompt;
    assert!(prompt.contains("ISSUES: division by zero"));
    assert!(prompt.contains("--- calc.py ---"));
}

#[test]
fn traversal_in_plan_rejects_everything() {
    let origin = TestRepo::with_files(&[("keep.txt", "keep\n")]).expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let patch = scratch.path().join("change.patch");
    let transport = ScriptedTransport::new().respond(
        r#"{"plan": "sneaky", "files": [
            {"path": "ok.txt", "action": "create", "content": "fine"},
            {"path": "../../etc/passwd", "action": "modify", "content": "root::0:0"}
        ]}"#,
    );
    let orchestrator = orchestrator(scratch.path(), transport);
    let mut request = change_request(OperationKind::Feature, &origin, "sneaky");
    request.create_branch = true;
    request.patch_out = Some(patch.clone());

    let err = orchestrator
        .run(&request, &CancelFlag::new())
        .expect_err("rejected");
    match &err {
        PipelineError::PlanValidation {
            index,
            path,
            reason,
        } => {
            assert_eq!(*index, 1);
            assert_eq!(path, "../../etc/passwd");
            assert_eq!(*reason, ActionRejection::Path(PathRejection::ParentSegment));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.stage(), Stage::Validation);
    assert!(!patch.exists());
    assert_no_workspaces(scratch.path());
}

#[test]
fn git_directory_write_is_rejected() {
    let origin = TestRepo::with_files(&[("a.txt", "a\n")]).expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let transport = ScriptedTransport::new().respond(
        r#"{"plan": "hook", "files": [{"path": ".git/hooks/pre-commit", "action": "create", "content": "exit 0"}]}"#,
    );
    let orchestrator = orchestrator(scratch.path(), transport);
    let request = change_request(OperationKind::Feature, &origin, "hook");

    let err = orchestrator
        .run(&request, &CancelFlag::new())
        .expect_err("rejected");
    assert!(matches!(
        err,
        PipelineError::PlanValidation {
            reason: ActionRejection::Path(PathRejection::GitDirectory),
            ..
        }
    ));
}

#[test]
fn unchanged_content_skips_commit_and_patch() {
    let origin = TestRepo::with_files(&[("a.txt", "same\n")]).expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let patch = scratch.path().join("change.patch");
    let transport = ScriptedTransport::new().respond(
        r#"{"plan": "noop", "files": [{"path": "a.txt", "action": "modify", "content": "same\n"}]}"#,
    );
    let orchestrator = orchestrator(scratch.path(), transport);
    let mut request = change_request(OperationKind::Feature, &origin, "noop");
    request.patch_out = Some(patch.clone());

    let report = orchestrator
        .run(&request, &CancelFlag::new())
        .expect("feature");
    let Outcome::Changes(changes) = report.outcome else {
        panic!("expected changes outcome");
    };
    assert_eq!(changes.written, vec!["a.txt"]);
    assert_eq!(changes.commit_sha, None);
    assert_eq!(changes.patch_path, None);
    assert!(!patch.exists());
}

#[test]
fn configuration_error_precedes_clone() {
    let scratch = tempfile::tempdir().expect("scratch");
    let orchestrator = orchestrator(scratch.path(), ScriptedTransport::new().respond("unused"));
    let mut request = OperationRequest::new(OperationKind::Summary, "/definitely/not/a/repo");
    request.model = Some("unknown-model".to_string());

    let err = orchestrator
        .run(&request, &CancelFlag::new())
        .expect_err("config error");
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert_eq!(err.stage(), Stage::Configuration);
    assert!(orchestrator.transport().requests().is_empty());
    assert_eq!(fs::read_dir(scratch.path()).expect("read").count(), 0);
}

#[test]
fn cancellation_during_model_call_still_removes_workspace() {
    let origin = TestRepo::with_files(&[("a.txt", "a\n")]).expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let cancel = CancelFlag::new();
    let transport = ScriptedTransport::new()
        .respond(r#"{"plan": "p", "files": [{"path": "b.txt", "action": "create", "content": "b"}]}"#)
        .cancel_during_call(cancel.clone());
    let orchestrator = orchestrator(scratch.path(), transport);
    let request = change_request(OperationKind::Feature, &origin, "add b");

    let err = orchestrator.run(&request, &cancel).expect_err("cancelled");
    assert!(matches!(err, PipelineError::Cancelled { stage: Stage::Parse }));
    assert_eq!(err.failure().kind, "cancelled");
    assert_no_workspaces(scratch.path());
}

#[test]
fn cancellation_before_start_never_clones() {
    let origin = TestRepo::with_files(&[("a.txt", "a\n")]).expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let cancel = CancelFlag::new();
    cancel.cancel();
    let orchestrator = orchestrator(scratch.path(), ScriptedTransport::new());
    let request = OperationRequest::new(OperationKind::Analyze, origin.url());

    let err = orchestrator.run(&request, &cancel).expect_err("cancelled");
    assert!(matches!(err, PipelineError::Cancelled { stage: Stage::Clone }));
    assert_eq!(fs::read_dir(scratch.path()).expect("read").count(), 0);
}

#[test]
fn identical_trees_produce_identical_prompts() {
    let origin = TestRepo::with_files(&[
        ("README.md", "# demo\n"),
        ("src/main.rs", "fn main() {}\n"),
        ("Cargo.toml", "[package]\nname = \"demo\"\n"),
    ])
    .expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let transport = ScriptedTransport::new().respond("one").respond("two");
    let orchestrator = orchestrator(scratch.path(), transport);
    let request = OperationRequest::new(OperationKind::Summary, origin.url());

    let first = orchestrator
        .run(&request, &CancelFlag::new())
        .expect("first");
    orchestrator
        .run(&request, &CancelFlag::new())
        .expect("second");
    assert_eq!(first.context_files, vec!["Cargo.toml", "README.md", "src/main.rs"]);

    let requests = orchestrator.transport().requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].prompt, requests[1].prompt);
    assert!(!requests[0].prompt.contains(&scratch.path().display().to_string()));
}

#[test]
fn gitignored_plan_path_is_still_committed() {
    let origin = TestRepo::with_files(&[(".gitignore", "*.log\n")]).expect("origin");
    let scratch = tempfile::tempdir().expect("scratch");
    let patch = scratch.path().join("change.patch");
    let transport = ScriptedTransport::new().respond(
        r#"{"plan": "add log", "files": [{"path": "debug.log", "action": "create", "content": "started\n"}]}"#,
    );
    let orchestrator = orchestrator(scratch.path(), transport);
    let mut request = change_request(OperationKind::Feature, &origin, "add debug log");
    request.patch_out = Some(patch.clone());

    let report = orchestrator
        .run(&request, &CancelFlag::new())
        .expect("feature");
    let Outcome::Changes(changes) = report.outcome else {
        panic!("expected changes outcome");
    };
    assert_eq!(changes.written, vec!["debug.log"]);
    assert!(changes.commit_sha.is_some());

    let mailbox = fs::read_to_string(&patch).expect("read patch");
    assert!(mailbox.contains("diff --git a/debug.log b/debug.log"));
    assert!(mailbox.contains("+started"));
    assert_no_workspaces(scratch.path());
}
