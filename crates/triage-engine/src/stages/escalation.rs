use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tracing::info;

use triage_core::results::EscalationResults;
use triage_core::traits::Notifier;
use triage_core::types::{NotificationKind, Severity, Stage};

use crate::stage::{send_notification, StageHandler, StageOutput};
use crate::state::{FieldValue, IncidentState, PartialUpdate};

pub const ESCALATION_ASSIGNEE: &str = "Senior Operations Team";

/// Hands the incident to human operators with the gathered context.
pub struct Escalation {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl Escalation {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }
}

pub(crate) fn escalation_reason(state: &IncidentState) -> String {
    state
        .decision_metrics
        .as_ref()
        .and_then(|m| m.escalation_reason)
        .map(|r| r.to_string())
        .unwrap_or_else(|| "Unknown reason".to_string())
}

fn context(state: &IncidentState) -> serde_json::Value {
    let severity = state.severity_or_default();
    let mut context = serde_json::json!({
        "service": state.service_name(),
        "severity": severity.as_str(),
        "description": state.description_text(),
        "confidence": state.root_cause_results.as_ref().map_or(0.0, |r| r.confidence()),
    });

    if let Some(ref logs) = state.log_analysis_results {
        context["anomalies_detected"] = logs.report.anomalies.len().into();
    }
    if let Some(ref knowledge) = state.knowledge_lookup_results {
        context["similar_incidents"] = knowledge.similar_count().into();
    }
    if let Some(ref root_cause) = state.root_cause_results {
        context["ai_root_cause"] = root_cause.report.root_cause.clone().into();
        context["suggested_solution"] = root_cause
            .report
            .recommendations
            .first()
            .cloned()
            .unwrap_or_else(|| "Manual investigation".to_string())
            .into();
    }
    context
}

impl StageHandler for Escalation {
    fn stage(&self) -> Stage {
        Stage::Escalation
    }

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput> {
        Box::pin(async move {
            let reason = escalation_reason(state);
            let priority = if state.severity_or_default().is_urgent() {
                Severity::High
            } else {
                Severity::Medium
            };
            let context = context(state);

            info!(
                incident_id = %state.incident_id,
                reason = %reason,
                priority = %priority,
                "Incident escalated to human operators"
            );

            let record = send_notification(
                self.notifier.as_ref(),
                Stage::Escalation,
                NotificationKind::EscalationAlert,
                serde_json::json!({
                    "incident_id": state.incident_id.to_string(),
                    "reason": reason,
                    "context": context,
                }),
                self.timeout,
            )
            .await;

            let results = EscalationResults {
                escalation_reason: reason,
                assigned_to: ESCALATION_ASSIGNEE.to_string(),
                priority,
                context,
                escalated_at: Utc::now().to_rfc3339(),
            };

            StageOutput::new(
                PartialUpdate::new(Stage::Escalation)
                    .with(FieldValue::EscalationResults(results))
                    .with(FieldValue::Notifications(vec![record])),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::config::WorkflowConfig;
    use triage_core::results::{RootCauseResults, DecisionRule};
    use triage_test_utils::{root_cause_report, RecordingNotifier};

    use crate::decision::{evaluate, DecisionInputs};

    fn escalated_state(severity: Severity) -> IncidentState {
        let mut state = IncidentState::new("alert");
        state.service = Some("Auth Service".into());
        state.severity = Some(severity);
        state.root_cause_results = Some(RootCauseResults {
            report: root_cause_report(0.5),
            error: None,
        });
        let inputs = DecisionInputs {
            retry_count: 0,
            anomalies_found: true,
            confidence: 0.5,
            similar_incidents: 2,
        };
        state.decision_metrics = Some(evaluate(&inputs, &WorkflowConfig::default()));
        state
    }

    #[tokio::test]
    async fn test_high_severity_gets_high_priority() {
        let notifier = Arc::new(RecordingNotifier::new());
        let stage = Escalation::new(notifier.clone(), Duration::from_secs(5));
        for (severity, expected) in [
            (Severity::Critical, Severity::High),
            (Severity::High, Severity::High),
            (Severity::Medium, Severity::Medium),
            (Severity::Low, Severity::Medium),
        ] {
            let state = escalated_state(severity);
            let merged = state.merge(&[stage.run(&state).await.update]).unwrap();
            let results = merged.escalation_results.unwrap();
            assert_eq!(results.priority, expected);
            assert_eq!(results.assigned_to, ESCALATION_ASSIGNEE);
        }
        assert_eq!(notifier.kinds().len(), 4);
    }

    #[tokio::test]
    async fn test_reason_and_context() {
        let state = escalated_state(Severity::High);
        assert_eq!(
            state.decision_metrics.as_ref().unwrap().rule,
            DecisionRule::LowConfidence
        );
        let stage = Escalation::new(Arc::new(RecordingNotifier::new()), Duration::from_secs(5));
        let merged = state.merge(&[stage.run(&state).await.update]).unwrap();
        let results = merged.escalation_results.unwrap();
        assert_eq!(results.escalation_reason, "low confidence in root cause analysis");
        assert_eq!(results.context["service"], "Auth Service");
        assert_eq!(results.context["confidence"], 0.5);
        assert!(results.context.get("anomalies_detected").is_none());
        assert_eq!(results.context["ai_root_cause"], "Database connection pool exhausted");
    }
}
