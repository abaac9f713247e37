//! Model transport abstraction.
//!
//! The [`ModelTransport`] trait decouples the pipeline from the backend that
//! actually talks to a language model. Tests use scripted transports that
//! return predetermined responses without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::config::ModelSettings;
use crate::io::process::run_command_with_timeout;

/// Parameters for one model call.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Resolved model entry; `model.id` names the model.
    pub model: ModelSettings,
    /// Rendered instruction embedding the context payload.
    pub prompt: String,
    pub timeout: Duration,
}

/// Abstraction over model backends.
pub trait ModelTransport {
    /// Send the prompt and return the raw response text.
    fn complete(&self, request: &ModelRequest) -> Result<String>;
}

/// Transport that pipes the prompt through the configured command.
///
/// The command reads the prompt on stdin and prints the response on stdout.
/// `REPOCRAFT_MODEL`, `REPOCRAFT_API_URL` and `REPOCRAFT_API_KEY` are exported
/// to the child.
#[derive(Debug, Clone)]
pub struct CommandTransport {
    output_limit_bytes: usize,
}

impl CommandTransport {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl ModelTransport for CommandTransport {
    #[instrument(skip_all, fields(model = %request.model.id, timeout_secs = request.timeout.as_secs()))]
    fn complete(&self, request: &ModelRequest) -> Result<String> {
        let (program, args) = request
            .model
            .command
            .split_first()
            .ok_or_else(|| anyhow!("model '{}' has no command", request.model.id))?;
        info!(program = %program, prompt_bytes = request.prompt.len(), "calling model");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env("REPOCRAFT_MODEL", &request.model.model_name)
            .env("REPOCRAFT_API_URL", &request.model.api_url)
            .env("REPOCRAFT_API_KEY", &request.model.credential);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run model command '{program}'"))?;
        output.ensure_success(&format!("model command '{program}'"), request.timeout)?;

        let response = String::from_utf8(output.stdout).context("model response is not UTF-8")?;
        if response.trim().is_empty() {
            return Err(anyhow!("model returned an empty response"));
        }
        debug!(response_bytes = response.len(), "model responded");
        Ok(response)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn settings(command: &[&str]) -> ModelSettings {
        ModelSettings {
            id: "test".to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            model_name: "test-model".to_string(),
            api_url: "http://localhost".to_string(),
            credential: "secret".to_string(),
        }
    }

    fn request(command: &[&str], prompt: &str, timeout: Duration) -> ModelRequest {
        ModelRequest {
            model: settings(command),
            prompt: prompt.to_string(),
            timeout,
        }
    }

    #[test]
    fn pipes_prompt_through_command() {
        let transport = CommandTransport::new(1024);
        let response = transport
            .complete(&request(&["cat"], "echo me", Duration::from_secs(10)))
            .expect("complete");
        assert_eq!(response, "echo me");
    }

    #[test]
    fn exports_model_environment() {
        let transport = CommandTransport::new(1024);
        let response = transport
            .complete(&request(
                &["sh", "-c", "cat >/dev/null; printf '%s %s' \"$REPOCRAFT_MODEL\" \"$REPOCRAFT_API_KEY\""],
                "prompt",
                Duration::from_secs(10),
            ))
            .expect("complete");
        assert_eq!(response, "test-model secret");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let transport = CommandTransport::new(1024);
        let err = transport
            .complete(&request(
                &["sh", "-c", "echo quota exceeded >&2; exit 1"],
                "p",
                Duration::from_secs(10),
            ))
            .expect_err("failure");
        assert!(format!("{err:#}").contains("quota exceeded"));
    }

    #[test]
    fn timeout_is_an_error() {
        let transport = CommandTransport::new(1024);
        let err = transport
            .complete(&request(&["sleep", "5"], "p", Duration::from_millis(100)))
            .expect_err("timeout");
        assert!(format!("{err:#}").contains("timed out"));
    }

    #[test]
    fn missing_program_is_an_error() {
        let transport = CommandTransport::new(1024);
        let err = transport
            .complete(&request(
                &["repocraft-definitely-missing-binary"],
                "p",
                Duration::from_secs(10),
            ))
            .expect_err("spawn failure");
        assert!(format!("{err:#}").contains("spawn"));
    }
}
