//! Operation prompts rendered from bundled minijinja templates.

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::{ContextPayload, OperationKind};

const SUMMARY_TEMPLATE: &str = include_str!("prompts/summary.md");
const IMPROVE_TEMPLATE: &str = include_str!("prompts/improve.md");
const FEATURE_TEMPLATE: &str = include_str!("prompts/feature.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const PLAN_FORMAT_TEMPLATE: &str = include_str!("prompts/plan_format.md");

/// Caller-supplied text for one operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptInputs<'a> {
    /// Feature or issue description (feature/fix).
    pub instruction: Option<&'a str>,
    /// Focus area (improve).
    pub focus: Option<&'a str>,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("summary", SUMMARY_TEMPLATE),
            ("improve", IMPROVE_TEMPLATE),
            ("feature", FEATURE_TEMPLATE),
            ("fix", FIX_TEMPLATE),
            ("plan_format", PLAN_FORMAT_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load prompt template {name}"))?;
        }
        Ok(Self { env })
    }

    /// Render the prompt for `kind` around the given context payload.
    pub fn render(
        &self,
        kind: OperationKind,
        payload: &ContextPayload,
        inputs: PromptInputs<'_>,
    ) -> Result<String> {
        if !kind.calls_model() {
            return Err(anyhow!("operation '{kind}' has no prompt"));
        }
        let template = self.env.get_template(kind.as_str())?;
        let rendered = template.render(context! {
            context => payload.render(),
            instruction => inputs.instruction.map(str::trim).filter(|s| !s.is_empty()),
            focus => inputs.focus.map(str::trim).filter(|s| !s.is_empty()),
        })?;
        debug!(kind = kind.as_str(), bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContextEntry, RepositoryProfile};
    use std::collections::BTreeMap;

    fn payload() -> ContextPayload {
        ContextPayload {
            profile: RepositoryProfile {
                file_count: 1,
                total_size_bytes: 5,
                language_histogram: BTreeMap::from([(".py".to_string(), 1)]),
                current_branch: Some("main".to_string()),
                remote_url: Some("https://example.com/demo.git".to_string()),
                commit_count: 3,
            },
            entries: vec![ContextEntry {
                relative_path: "app.py".to_string(),
                truncated_content: "x = 1".to_string(),
                was_truncated: false,
            }],
            max_files: 20,
            max_chars_per_file: 2000,
        }
    }

    #[test]
    fn summary_embeds_rendered_context() {
        let engine = PromptEngine::new().expect("engine");
        let prompt = engine
            .render(OperationKind::Summary, &payload(), PromptInputs::default())
            .expect("render");
        assert!(prompt.contains("=== REPOSITORY ANALYSIS ==="));
        assert!(prompt.contains("--- app.py ---\nx = 1\n"));
        assert!(prompt.contains("Project overview and purpose"));
    }

    #[test]
    fn improve_uses_focus_when_given() {
        let engine = PromptEngine::new().expect("engine");
        let focused = engine
            .render(
                OperationKind::Improve,
                &payload(),
                PromptInputs {
                    focus: Some("security"),
                    ..PromptInputs::default()
                },
            )
            .expect("render");
        assert!(focused.contains("Focus specifically on: security"));

        let general = engine
            .render(OperationKind::Improve, &payload(), PromptInputs::default())
            .expect("render");
        assert!(general.contains("Consider all aspects"));
    }

    #[test]
    fn feature_and_fix_embed_plan_format() {
        let engine = PromptEngine::new().expect("engine");
        let inputs = PromptInputs {
            instruction: Some("add dark mode"),
            ..PromptInputs::default()
        };
        for kind in [OperationKind::Feature, OperationKind::Fix] {
            let prompt = engine.render(kind, &payload(), inputs).expect("render");
            assert!(prompt.contains("add dark mode"), "{kind}");
            assert!(prompt.contains("\"action\": \"create|modify\""), "{kind}");
            assert!(prompt.contains("\"files\": ["), "{kind}");
        }
    }

    #[test]
    fn prompts_are_byte_identical_for_identical_inputs() {
        let engine = PromptEngine::new().expect("engine");
        let inputs = PromptInputs {
            instruction: Some("x"),
            ..PromptInputs::default()
        };
        let a = engine.render(OperationKind::Feature, &payload(), inputs).expect("a");
        let b = engine.render(OperationKind::Feature, &payload(), inputs).expect("b");
        assert_eq!(a, b);
    }

    #[test]
    fn analyze_has_no_prompt() {
        let engine = PromptEngine::new().expect("engine");
        assert!(
            engine
                .render(OperationKind::Analyze, &payload(), PromptInputs::default())
                .is_err()
        );
    }
}
