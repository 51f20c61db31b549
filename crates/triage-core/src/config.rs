use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TriageError};

/// Top-level triage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub log_analyzer: LogAnalyzerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Thresholds and limits of the triage workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Root-cause confidence below this escalates.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Maximum log analysis retries when no anomalies are found.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound for any single collaborator call.
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,
    /// Pause between log analysis retries.
    #[serde(default)]
    pub retry_backoff_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_retries: default_max_retries(),
            collaborator_timeout_secs: default_collaborator_timeout(),
            retry_backoff_ms: 0,
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(TriageError::Config(format!(
                "workflow.confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.collaborator_timeout_secs == 0 {
            return Err(TriageError::Config(
                "workflow.collaborator_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_confidence_threshold() -> f64 { 0.8 }
fn default_max_retries() -> u32 { 3 }
fn default_collaborator_timeout() -> u64 { 30 }

/// Which AI analyzer backs alert parsing and root-cause inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Heuristic,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub provider: AiProvider,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::default(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
        }
    }
}

fn default_model_id() -> String { "gemini-2.0-flash".to_string() }

/// Where notifications go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Settings of the built-in pattern log analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogAnalyzerConfig {
    /// Simulated log backend round trip; 0 answers immediately.
    #[serde(default)]
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default tracing filter; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TriageError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let (expanded, unset) = expand_env_vars(&content);
        for var in &unset {
            warn!(path = %path.display(), var = %var, "Environment variable not set, leaving reference unexpanded");
        }

        toml::from_str(&expanded).map_err(|e| TriageError::Config(e.to_string()))
    }

    /// Check settings the workflow cannot start without.
    pub fn validate(&self) -> Result<()> {
        self.workflow.validate()?;

        if self.ai.provider == AiProvider::Gemini {
            match self.ai.api_key.as_deref() {
                None | Some("") => {
                    return Err(TriageError::Config(
                        "ai.api_key is required for the gemini provider".into(),
                    ))
                }
                Some(key) if key.starts_with("${") => {
                    return Err(TriageError::Config(format!(
                        "ai.api_key references an unset environment variable: {}",
                        key
                    )))
                }
                Some(_) => {}
            }
        }

        if self.notifier.kind == NotifierKind::Webhook
            && self.notifier.webhook_url.as_deref().map_or(true, str::is_empty)
        {
            return Err(TriageError::Config(
                "notifier.webhook_url is required for the webhook notifier".into(),
            ));
        }

        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string. Also returns the names of
/// referenced variables that are not set.
fn expand_env_vars(input: &str) -> (String, Vec<String>) {
    let mut result = String::with_capacity(input.len());
    let mut unset = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                    unset.push(var_name);
                }
            }
        } else {
            result.push(c);
        }
    }
    (result, unset)
}
