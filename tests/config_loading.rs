use std::io::Write;

use triage_core::config::{AiProvider, AppConfig, NotifierKind};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[workflow]
confidence_threshold = 0.7
max_retries = 2
collaborator_timeout_secs = 10
retry_backoff_ms = 250

[ai]
provider = "gemini"
model_id = "gemini-1.5-pro"
api_key = "test-key"
base_url = "http://localhost:8080/v1beta"

[notifier]
kind = "webhook"
webhook_url = "https://hooks.example.com/incidents"

[log_analyzer]
latency_ms = 750

[log]
level = "debug"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.workflow.confidence_threshold, 0.7);
    assert_eq!(config.workflow.max_retries, 2);
    assert_eq!(config.workflow.collaborator_timeout_secs, 10);
    assert_eq!(config.workflow.retry_backoff_ms, 250);
    assert_eq!(config.ai.provider, AiProvider::Gemini);
    assert_eq!(config.ai.model_id, "gemini-1.5-pro");
    assert_eq!(config.ai.api_key, Some("test-key".to_string()));
    assert_eq!(config.notifier.kind, NotifierKind::Webhook);
    assert_eq!(
        config.notifier.webhook_url.as_deref(),
        Some("https://hooks.example.com/incidents")
    );
    assert_eq!(config.log_analyzer.latency_ms, 750);
    assert_eq!(config.log.level, "debug");
    config.validate().expect("valid config");
}

#[test]
fn test_empty_file_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().expect("create temp file");
    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.workflow.confidence_threshold, 0.8);
    assert_eq!(config.workflow.max_retries, 3);
    assert_eq!(config.ai.provider, AiProvider::Heuristic);
    assert_eq!(config.notifier.kind, NotifierKind::Log);
    config.validate().expect("defaults are valid");
}

#[test]
fn test_env_var_expansion_in_api_key() {
    std::env::set_var("TRIAGE_TEST_GEMINI_KEY", "from-env");
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[ai]\nprovider = \"gemini\"\napi_key = \"${TRIAGE_TEST_GEMINI_KEY}\"\n")
        .expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    std::env::remove_var("TRIAGE_TEST_GEMINI_KEY");

    assert_eq!(config.ai.api_key.as_deref(), Some("from-env"));
    config.validate().expect("key resolved");
}

#[test]
fn test_unset_env_var_fails_validation() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[ai]\nprovider = \"gemini\"\napi_key = \"${TRIAGE_TEST_UNSET_KEY_XYZ}\"\n")
        .expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(config.validate().is_err());
}

#[test]
fn test_out_of_range_threshold_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[workflow]\nconfidence_threshold = 1.2\n")
        .expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(config.validate().is_err());
}

#[test]
fn test_webhook_without_url_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[notifier]\nkind = \"webhook\"\n").expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(config.validate().is_err());
}

#[test]
fn test_missing_file_is_reported() {
    let result = AppConfig::load(std::path::Path::new("/nonexistent/triage.toml"));
    assert!(result.is_err());
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[workflow\nmax_retries = ").expect("write toml");
    assert!(AppConfig::load(tmp.path()).is_err());
}
