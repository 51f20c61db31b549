use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use triage_agents::HeuristicAnalyzer;
use triage_core::traits::{AiAnalyzer, Notifier};
use triage_core::types::{NotificationKind, Stage, StageFault};

use crate::stage::{call_with_timeout, send_notification, StageHandler, StageOutput};
use crate::state::{FieldValue, IncidentState, PartialUpdate};

/// Parses the raw alert into service, severity and description, and sends
/// the initial incident alert.
pub struct Trigger {
    ai: Arc<dyn AiAnalyzer>,
    notifier: Arc<dyn Notifier>,
    fallback: HeuristicAnalyzer,
    timeout: Duration,
}

impl Trigger {
    pub fn new(ai: Arc<dyn AiAnalyzer>, notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            ai,
            notifier,
            fallback: HeuristicAnalyzer::new(),
            timeout,
        }
    }
}

impl StageHandler for Trigger {
    fn stage(&self) -> Stage {
        Stage::Trigger
    }

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput> {
        Box::pin(async move {
            let mut faults = Vec::new();

            let parsed = match call_with_timeout(
                "ai_analyzer",
                self.timeout,
                self.ai.parse(&state.raw_alert),
            )
            .await
            {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(incident_id = %state.incident_id, error = %e, "Alert parsing failed, using keyword parser");
                    faults.push(StageFault::recoverable(
                        Stage::Trigger,
                        format!("alert parsing failed, keyword parser used: {}", e),
                    ));
                    self.fallback.parse_alert(&state.raw_alert)
                }
            };

            if parsed.is_unknown_service() {
                warn!(incident_id = %state.incident_id, "Could not identify the affected service");
                faults.push(StageFault::fatal(
                    Stage::Trigger,
                    "could not identify the affected service",
                ));
            } else {
                info!(
                    incident_id = %state.incident_id,
                    service = %parsed.service,
                    severity = %parsed.severity,
                    "Incident triggered"
                );
            }

            let record = send_notification(
                self.notifier.as_ref(),
                Stage::Trigger,
                NotificationKind::IncidentAlert,
                serde_json::json!({
                    "incident_id": state.incident_id.to_string(),
                    "service": parsed.service,
                    "severity": parsed.severity.as_str(),
                    "description": parsed.description,
                }),
                self.timeout,
            )
            .await;

            let update = PartialUpdate::new(Stage::Trigger)
                .with(FieldValue::Service(parsed.service))
                .with(FieldValue::Severity(parsed.severity))
                .with(FieldValue::Description(parsed.description))
                .with(FieldValue::Notifications(vec![record]));

            StageOutput { update, faults }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::results::UNKNOWN_SERVICE;
    use triage_core::types::{Field, Severity};
    use triage_test_utils::{parsed_alert, unavailable, RecordingNotifier, ScriptedAiAnalyzer};

    fn trigger(ai: ScriptedAiAnalyzer, notifier: Arc<RecordingNotifier>) -> Trigger {
        Trigger::new(Arc::new(ai), notifier, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_parses_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::new());
        let stage = trigger(ScriptedAiAnalyzer::confident(0.9), notifier.clone());
        let state = IncidentState::new("Payment API database timeout");

        let output = stage.run(&state).await;
        assert!(output.faults.is_empty());
        assert_eq!(
            output.update.fields(),
            vec![Field::Service, Field::Severity, Field::Description, Field::Notifications]
        );
        assert_eq!(notifier.kinds(), vec![NotificationKind::IncidentAlert]);

        let merged = state.merge(&[output.update]).unwrap();
        assert_eq!(merged.service.as_deref(), Some("Payment API"));
        assert_eq!(merged.severity, Some(Severity::High));
    }

    #[tokio::test]
    async fn test_parse_failure_falls_back_to_keywords() {
        let ai = ScriptedAiAnalyzer::new(Err(unavailable("gemini")), Err(unavailable("gemini")));
        let stage = trigger(ai, Arc::new(RecordingNotifier::new()));
        let state = IncidentState::new("Auth Service memory leak, high severity");

        let output = stage.run(&state).await;
        assert_eq!(output.faults.len(), 1);
        assert!(output.faults[0].recoverable);
        let merged = state.merge(&[output.update]).unwrap();
        assert_eq!(merged.service.as_deref(), Some("Auth Service"));
    }

    #[tokio::test]
    async fn test_unknown_service_is_fatal() {
        let ai = ScriptedAiAnalyzer::new(Ok(parsed_alert(UNKNOWN_SERVICE)), Err(unavailable("ai")));
        let stage = trigger(ai, Arc::new(RecordingNotifier::new()));
        let output = stage.run(&IncidentState::new("something odd")).await;
        assert!(output.has_fatal_fault());
    }
}
