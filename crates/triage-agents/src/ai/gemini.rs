use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use triage_core::config::AiConfig;
use triage_core::error::CollaboratorError;
use triage_core::results::{LogAnalysisResults, ParsedAlert, RootCauseReport};
use triage_core::traits::{AiAnalyzer, CollaboratorResult};
use triage_core::types::Severity;

use super::heuristic::{truncate_chars, MAX_DESCRIPTION_CHARS};

const COLLABORATOR: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini `generateContent` client for alert parsing and root-cause
/// inference.
pub struct GeminiAnalyzer {
    http: Client,
    api_key: String,
    model_id: String,
    base_url: String,
}

impl GeminiAnalyzer {
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            model_id: model_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn from_config(config: &AiConfig) -> Self {
        let mut analyzer = Self::new(
            config.api_key.clone().unwrap_or_default(),
            config.model_id.clone(),
        );
        if let Some(ref url) = config.base_url {
            analyzer.base_url = url.trim_end_matches('/').to_string();
        }
        analyzer
    }

    async fn generate(&self, prompt: String) -> CollaboratorResult<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model_id
        );
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".into()),
                parts: vec![GeminiPart { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::unavailable(COLLABORATOR, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("{}: {}", status, truncate_chars(&text, 200));
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                CollaboratorError::transient(COLLABORATOR, message)
            } else {
                CollaboratorError::unavailable(COLLABORATOR, message)
            });
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::malformed(COLLABORATOR, e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(CollaboratorError::malformed(COLLABORATOR, "empty response"));
        }
        debug!(model = %self.model_id, chars = text.len(), "Gemini response received");
        Ok(text)
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

// ── Prompting and parsing ────────────────────────────────────────

fn parse_prompt(raw_alert: &str) -> String {
    format!(
        "Parse this incident alert and extract structured information.\n\n\
         Alert: {}\n\n\
         Provide:\n\
         1. Service name (e.g., \"Payment API\", \"Auth Service\")\n\
         2. Severity level (HIGH, MEDIUM, LOW)\n\
         3. Brief description (1-2 sentences)\n\n\
         Format your response as:\n\
         Service: <service_name>\n\
         Severity: <severity_level>\n\
         Description: <description>\n",
        raw_alert
    )
}

fn root_cause_prompt(
    service: &str,
    description: &str,
    log_results: Option<&LogAnalysisResults>,
) -> String {
    let context = match log_results {
        Some(results) if !results.report.anomalies.is_empty() => {
            let mut lines = vec![format!(
                "Anomalies detected: {}",
                results.report.anomalies.len()
            )];
            for anomaly in results.report.anomalies.iter().take(2) {
                lines.push(format!("  - {}: {}", anomaly.kind, anomaly.pattern));
            }
            lines.join("\n")
        }
        _ => "No additional context available".to_string(),
    };

    format!(
        "Analyze this incident and determine the root cause.\n\n\
         Service: {}\n\
         Description: {}\n\n\
         Context:\n{}\n\n\
         Format your response as:\n\
         Root cause: <one sentence>\n\
         Confidence: <0.0 to 1.0>\n\
         Contributing factors: <comma separated>\n\
         Recommended solution: <actionable steps>\n\
         Urgency: <HIGH, MEDIUM, LOW>\n\
         Resolution time: <estimate>\n",
        service, description, context
    )
}

/// Value of a `Label: value` line, case-insensitive on the label.
fn labelled<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let line = line.trim().trim_start_matches(['*', '-', ' ']);
        let (key, value) = line.split_once(':')?;
        let key = key.trim().trim_matches('*');
        key.eq_ignore_ascii_case(label)
            .then(|| value.trim().trim_matches('*').trim())
            .filter(|v| !v.is_empty())
    })
}

fn confidence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)confidence[*:\s]+(\d+(?:\.\d+)?)").expect("valid confidence regex")
    })
}

pub(crate) fn parse_alert_response(text: &str, raw_alert: &str) -> CollaboratorResult<ParsedAlert> {
    let service = labelled(text, "service")
        .ok_or_else(|| CollaboratorError::malformed(COLLABORATOR, "missing Service line"))?;
    let severity = labelled(text, "severity")
        .and_then(|s| s.parse::<Severity>().ok())
        .unwrap_or_default();
    let description = labelled(text, "description")
        .map(str::to_string)
        .unwrap_or_else(|| truncate_chars(raw_alert, MAX_DESCRIPTION_CHARS));

    Ok(ParsedAlert {
        service: service.to_string(),
        severity,
        description,
    })
}

pub(crate) fn parse_root_cause_response(text: &str) -> CollaboratorResult<RootCauseReport> {
    let captured = confidence_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| CollaboratorError::malformed(COLLABORATOR, "missing confidence"))?;
    // Percentages are normalised to [0, 1].
    let confidence = if captured > 1.0 { captured / 100.0 } else { captured }.clamp(0.0, 1.0);

    let root_cause = labelled(text, "root cause")
        .map(|s| truncate_chars(s, 200))
        .or_else(|| {
            text.lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(|l| truncate_chars(l, 200))
        })
        .unwrap_or_else(|| "Unknown root cause".to_string());

    let contributing_factors = labelled(text, "contributing factors")
        .map(|s| {
            s.split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let recommendations = labelled(text, "recommended solution")
        .map(|s| vec![s.to_string()])
        .unwrap_or_else(|| vec!["Manual investigation required".to_string()]);

    Ok(RootCauseReport {
        root_cause,
        confidence,
        contributing_factors,
        recommendations,
        urgency: labelled(text, "urgency")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        estimated_resolution: labelled(text, "resolution time")
            .unwrap_or("30 minutes")
            .to_string(),
    })
}

impl AiAnalyzer for GeminiAnalyzer {
    fn parse(&self, raw_alert: &str) -> BoxFuture<'_, CollaboratorResult<ParsedAlert>> {
        let raw_alert = raw_alert.to_string();
        Box::pin(async move {
            let text = self.generate(parse_prompt(&raw_alert)).await?;
            parse_alert_response(&text, &raw_alert).inspect_err(|e| {
                warn!(error = %e, "Could not parse Gemini alert response");
            })
        })
    }

    fn analyze<'a>(
        &'a self,
        service: &'a str,
        description: &'a str,
        log_results: Option<&'a LogAnalysisResults>,
    ) -> BoxFuture<'a, CollaboratorResult<RootCauseReport>> {
        Box::pin(async move {
            let prompt = root_cause_prompt(service, description, log_results);
            let text = self.generate(prompt).await?;
            parse_root_cause_response(&text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alert_response() {
        let text = "Service: Payment API\nSeverity: high\nDescription: DB timeouts on checkout";
        let parsed = parse_alert_response(text, "raw").unwrap();
        assert_eq!(parsed.service, "Payment API");
        assert_eq!(parsed.severity, Severity::High);
        assert_eq!(parsed.description, "DB timeouts on checkout");
    }

    #[test]
    fn test_parse_alert_response_markdown_bold() {
        let text = "**Service:** Auth Service\n**Severity:** LOW";
        let parsed = parse_alert_response(text, "raw alert").unwrap();
        assert_eq!(parsed.service, "Auth Service");
        assert_eq!(parsed.severity, Severity::Low);
        assert_eq!(parsed.description, "raw alert");
    }

    #[test]
    fn test_parse_alert_response_missing_service() {
        let err = parse_alert_response("I cannot help with that.", "raw").unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed { .. }));
    }

    #[test]
    fn test_parse_root_cause_percentage() {
        let text = "Root cause: Pool exhaustion\nConfidence: 85\nContributing factors: spike, small pool\nRecommended solution: Scale the pool\nUrgency: HIGH\nResolution time: 10 minutes";
        let report = parse_root_cause_response(text).unwrap();
        assert_eq!(report.root_cause, "Pool exhaustion");
        assert!((report.confidence - 0.85).abs() < 1e-9);
        assert_eq!(report.contributing_factors, vec!["spike", "small pool"]);
        assert_eq!(report.recommendations, vec!["Scale the pool"]);
        assert_eq!(report.urgency, Severity::High);
        assert_eq!(report.estimated_resolution, "10 minutes");
    }

    #[test]
    fn test_parse_root_cause_clamps() {
        let report = parse_root_cause_response("Something broke.\nconfidence 250").unwrap();
        assert_eq!(report.confidence, 1.0);
        assert_eq!(report.root_cause, "Something broke.");
    }

    #[test]
    fn test_parse_root_cause_without_confidence_is_malformed() {
        let err = parse_root_cause_response("Root cause: unknown").unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed { .. }));
    }

    #[test]
    fn test_from_config_trims_base_url() {
        let config = AiConfig {
            api_key: Some("k".into()),
            base_url: Some("http://localhost:9000/v1beta/".into()),
            ..AiConfig::default()
        };
        let analyzer = GeminiAnalyzer::from_config(&config);
        assert_eq!(analyzer.base_url, "http://localhost:9000/v1beta");
        assert_eq!(analyzer.model_id, "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let config = AiConfig {
            api_key: Some("k".into()),
            base_url: Some("http://127.0.0.1:9".into()),
            ..AiConfig::default()
        };
        let analyzer = GeminiAnalyzer::from_config(&config);
        let err = analyzer.parse("Payment API down").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable { .. }));
    }
}
