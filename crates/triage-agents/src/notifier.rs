use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use triage_core::config::{NotifierConfig, NotifierKind};
use triage_core::traits::Notifier;
use triage_core::types::{NotificationKind, NotifyStatus};

const FOOTER: &str = "This is an automated notification.";

fn str_field<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or("Unknown")
}

fn bullet_list(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|item| format!("  - {}", item))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Render a notification into `(subject, body)`.
///
/// Payload keys per kind:
/// - `IncidentAlert`: `incident_id`, `service`, `severity`, `description`
/// - `MitigationReport`: `incident_id`, `status`, `actions`
/// - `EscalationAlert`: `incident_id`, `reason`, `context.{service,severity,confidence}`
pub fn render(kind: NotificationKind, payload: &Value) -> (String, String) {
    let incident_id = str_field(payload, "incident_id");
    match kind {
        NotificationKind::IncidentAlert => {
            let service = str_field(payload, "service");
            let subject = format!("INCIDENT ALERT: {} - {}", incident_id, service);
            let body = format!(
                "INCIDENT DETECTED\n=================\n\n\
                 Incident ID: {}\nService: {}\nSeverity: {}\n\n\
                 Description:\n{}\n\n\
                 Automated triage is analyzing this incident.\n\n{}",
                incident_id,
                service,
                str_field(payload, "severity"),
                str_field(payload, "description"),
                FOOTER
            );
            (subject, body)
        }
        NotificationKind::MitigationReport => {
            let subject = format!("MITIGATION COMPLETE: {}", incident_id);
            let body = format!(
                "AUTOMATED MITIGATION EXECUTED\n=============================\n\n\
                 Incident ID: {}\nStatus: {}\n\n\
                 Actions Taken:\n{}\n\n\
                 Incident has been automatically resolved.\n\n{}",
                incident_id,
                str_field(payload, "status"),
                bullet_list(payload, "actions"),
                FOOTER
            );
            (subject, body)
        }
        NotificationKind::EscalationAlert => {
            let context = payload.get("context").cloned().unwrap_or(Value::Null);
            let confidence = context
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let subject = format!("ESCALATION REQUIRED: {}", incident_id);
            let body = format!(
                "HUMAN INTERVENTION REQUIRED\n===========================\n\n\
                 Incident ID: {}\n\n\
                 Escalation Reason:\n{}\n\n\
                 Context:\n  Service: {}\n  Severity: {}\n  Confidence: {:.0}%\n\n\
                 Please review and take appropriate action.\n\n{}",
                incident_id,
                str_field(payload, "reason"),
                str_field(&context, "service"),
                str_field(&context, "severity"),
                confidence * 100.0,
                FOOTER
            );
            (subject, body)
        }
    }
}

/// Emits notifications through `tracing`.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, kind: NotificationKind, payload: Value) -> BoxFuture<'_, NotifyStatus> {
        Box::pin(async move {
            let (subject, body) = render(kind, &payload);
            info!(kind = kind.as_str(), subject = %subject, "Notification sent:\n{}", body);
            NotifyStatus::sent()
        })
    }
}

/// POSTs `{subject, text, kind}` JSON to a webhook.
pub struct WebhookNotifier {
    http: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, kind: NotificationKind, payload: Value) -> BoxFuture<'_, NotifyStatus> {
        Box::pin(async move {
            let (subject, text) = render(kind, &payload);
            let result = self
                .http
                .post(&self.url)
                .json(&serde_json::json!({
                    "subject": subject,
                    "text": text,
                    "kind": kind.as_str(),
                }))
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    info!(kind = kind.as_str(), subject = %subject, "Webhook notification delivered");
                    NotifyStatus::sent()
                }
                Ok(resp) => {
                    let status = resp.status();
                    warn!(kind = kind.as_str(), status = %status, "Webhook rejected notification");
                    NotifyStatus::failed(format!("webhook returned {}", status))
                }
                Err(e) => {
                    warn!(kind = kind.as_str(), error = %e, "Webhook notification failed");
                    NotifyStatus::failed(e.to_string())
                }
            }
        })
    }
}

/// Build the configured notifier. A webhook kind without a URL falls back to
/// logging; `AppConfig::validate` rejects that combination up front.
pub fn build_notifier(config: &NotifierConfig) -> Arc<dyn Notifier> {
    match (config.kind, config.webhook_url.as_deref()) {
        (NotifierKind::Webhook, Some(url)) if !url.is_empty() => Arc::new(WebhookNotifier::new(url)),
        _ => Arc::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_incident_alert() {
        let (subject, body) = render(
            NotificationKind::IncidentAlert,
            &json!({
                "incident_id": "INC-1",
                "service": "Payment API",
                "severity": "HIGH",
                "description": "db timeouts",
            }),
        );
        assert_eq!(subject, "INCIDENT ALERT: INC-1 - Payment API");
        assert!(body.contains("Severity: HIGH"));
        assert!(body.contains("db timeouts"));
    }

    #[test]
    fn test_render_mitigation_lists_actions() {
        let (subject, body) = render(
            NotificationKind::MitigationReport,
            &json!({
                "incident_id": "INC-2",
                "status": "SUCCESS",
                "actions": ["Restarted Payment API service instances", "Cleared cache"],
            }),
        );
        assert_eq!(subject, "MITIGATION COMPLETE: INC-2");
        assert!(body.contains("  - Restarted Payment API service instances\n  - Cleared cache"));
    }

    #[test]
    fn test_render_escalation_confidence_percent() {
        let (_, body) = render(
            NotificationKind::EscalationAlert,
            &json!({
                "incident_id": "INC-3",
                "reason": "Low confidence",
                "context": {"service": "Auth Service", "severity": "MEDIUM", "confidence": 0.5},
            }),
        );
        assert!(body.contains("Confidence: 50%"));
        assert!(body.contains("Service: Auth Service"));
    }

    #[test]
    fn test_render_missing_fields() {
        let (subject, _) = render(NotificationKind::EscalationAlert, &json!({}));
        assert_eq!(subject, "ESCALATION REQUIRED: Unknown");
    }

    #[tokio::test]
    async fn test_log_notifier_always_sends() {
        let status = LogNotifier
            .notify(NotificationKind::IncidentAlert, json!({"incident_id": "INC-4"}))
            .await;
        assert!(status.sent);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_webhook_failure_is_reported() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook");
        let status = notifier
            .notify(NotificationKind::MitigationReport, json!({"incident_id": "INC-5"}))
            .await;
        assert!(!status.sent);
        assert!(status.error.is_some());
    }

    #[test]
    fn test_build_notifier_fallback() {
        let config = NotifierConfig {
            kind: NotifierKind::Webhook,
            webhook_url: None,
        };
        // Falls back to the log notifier rather than panicking.
        let _ = build_notifier(&config);
    }
}
