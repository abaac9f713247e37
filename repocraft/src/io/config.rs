//! Configuration loaded from `repocraft.toml`.
//!
//! The configuration is read once and passed explicitly into each operation.
//! Missing files and missing fields fall back to defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::io::git::CommitAuthor;

pub const DEFAULT_CONFIG_FILE: &str = "repocraft.toml";

/// Repocraft configuration (TOML).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepocraftConfig {
    /// Model id used when the caller does not name one.
    pub default_model: String,
    pub limits: LimitsConfig,
    pub git: GitConfig,
    pub models: BTreeMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum number of files embedded in the context payload.
    pub max_files: usize,
    /// Per-file character cap inside the context payload.
    pub max_chars_per_file: usize,
    /// Wall-clock budget for one model call.
    pub model_timeout_secs: u64,
    /// Wall-clock budget for `git clone`.
    pub clone_timeout_secs: u64,
    /// Truncate captured subprocess output beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    pub author_name: String,
    pub author_email: String,
    /// Parent directory for temporary clones (system temp dir when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
}

/// One model entry under `[models.<id>]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ModelConfig {
    /// Transport command; receives the prompt on stdin and prints the response.
    pub command: Vec<String>,
    pub model_name: String,
    pub api_url: String,
    /// Inline credential. Prefer `api_key_env`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Fully resolved settings for one model call.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub id: String,
    pub command: Vec<String>,
    pub model_name: String,
    pub api_url: String,
    pub credential: String,
}

impl std::fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSettings")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("model_name", &self.model_name)
            .field("api_url", &self.api_url)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files: 20,
            max_chars_per_file: 2000,
            model_timeout_secs: 5 * 60,
            clone_timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            author_name: "repocraft".to_string(),
            author_email: "repocraft@local.invalid".to_string(),
            workspace_root: None,
        }
    }
}

impl Default for RepocraftConfig {
    fn default() -> Self {
        let models = [
            (
                "openai",
                "gpt-4o-mini",
                "https://api.openai.com/v1/chat/completions",
                "OPENAI_API_KEY",
            ),
            (
                "claude",
                "claude-3-5-sonnet-latest",
                "https://api.anthropic.com/v1/messages",
                "ANTHROPIC_API_KEY",
            ),
            (
                "gemini",
                "gemini-1.5-flash",
                "https://generativelanguage.googleapis.com/v1beta/models",
                "GEMINI_API_KEY",
            ),
        ]
        .into_iter()
        .map(|(id, model_name, api_url, key_env)| {
            let model = ModelConfig {
                command: vec!["llm".to_string(), "-m".to_string(), model_name.to_string()],
                model_name: model_name.to_string(),
                api_url: api_url.to_string(),
                api_key: None,
                api_key_env: Some(key_env.to_string()),
            };
            (id.to_string(), model)
        })
        .collect();
        Self {
            default_model: "openai".to_string(),
            limits: LimitsConfig::default(),
            git: GitConfig::default(),
            models,
        }
    }
}

impl RepocraftConfig {
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_files == 0 {
            return Err(anyhow!("limits.max_files must be > 0"));
        }
        if self.limits.max_chars_per_file == 0 {
            return Err(anyhow!("limits.max_chars_per_file must be > 0"));
        }
        if self.limits.model_timeout_secs == 0 {
            return Err(anyhow!("limits.model_timeout_secs must be > 0"));
        }
        if self.limits.clone_timeout_secs == 0 {
            return Err(anyhow!("limits.clone_timeout_secs must be > 0"));
        }
        if self.limits.output_limit_bytes == 0 {
            return Err(anyhow!("limits.output_limit_bytes must be > 0"));
        }
        if self.git.author_name.trim().is_empty() || self.git.author_email.trim().is_empty() {
            return Err(anyhow!("git.author_name and git.author_email must be non-empty"));
        }
        Ok(())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.model_timeout_secs)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.clone_timeout_secs)
    }

    pub fn commit_author(&self) -> CommitAuthor {
        CommitAuthor {
            name: self.git.author_name.clone(),
            email: self.git.author_email.clone(),
        }
    }

    /// Resolve a model id (or the default) into callable settings.
    ///
    /// Fails when the model is unknown, has no transport command, or no
    /// non-empty credential can be found.
    pub fn resolve_model(&self, id: Option<&str>) -> Result<ModelSettings, PipelineError> {
        self.resolve_model_with(id, |name| std::env::var(name).ok())
    }

    /// [`Self::resolve_model`] with an explicit environment lookup.
    pub fn resolve_model_with(
        &self,
        id: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<ModelSettings, PipelineError> {
        let id = id.unwrap_or(&self.default_model);
        let model = self.models.get(id).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "model '{id}' not found in config (available: {})",
                self.models.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
        if model.command.is_empty() || model.command[0].trim().is_empty() {
            return Err(PipelineError::Configuration(format!(
                "models.{id}.command must be a non-empty array"
            )));
        }

        let inline = model
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        let from_env = || {
            model
                .api_key_env
                .as_deref()
                .and_then(&env)
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
        };
        let credential = inline.or_else(from_env).ok_or_else(|| {
            let hint = match &model.api_key_env {
                Some(var) => format!("set models.{id}.api_key or the {var} environment variable"),
                None => format!("set models.{id}.api_key or models.{id}.api_key_env"),
            };
            PipelineError::Configuration(format!("missing credential for model '{id}': {hint}"))
        })?;

        Ok(ModelSettings {
            id: id.to_string(),
            command: model.command.clone(),
            model_name: model.model_name.clone(),
            api_url: model.api_url.clone(),
            credential,
        })
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RepocraftConfig::default()`.
pub fn load_config(path: &Path) -> Result<RepocraftConfig> {
    if !path.exists() {
        let cfg = RepocraftConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RepocraftConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
