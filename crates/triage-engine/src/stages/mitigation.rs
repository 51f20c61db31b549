use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::info;

use triage_core::results::MitigationResults;
use triage_core::traits::Notifier;
use triage_core::types::{NotificationKind, Stage};

use crate::stage::{send_notification, StageHandler, StageOutput};
use crate::state::{FieldValue, IncidentState, PartialUpdate};

const DEFAULT_SOLUTION: &str = "Restart service";
const EXECUTION_STATUS: &str = "SUCCESS";

/// Executes (simulated) remediation derived from the recommended solution.
pub struct Mitigation {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl Mitigation {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }
}

/// Root-cause recommendation first, then the best historical solution.
fn recommended_solution(state: &IncidentState) -> String {
    let from_root_cause = state
        .root_cause_results
        .as_ref()
        .filter(|r| r.error.is_none())
        .and_then(|r| r.report.recommendations.first());
    let from_history = state
        .knowledge_lookup_results
        .as_ref()
        .and_then(|r| r.report.recommended_solutions.first());

    from_root_cause
        .or(from_history)
        .cloned()
        .unwrap_or_else(|| DEFAULT_SOLUTION.to_string())
}

/// Map a solution to concrete remediation actions by keyword.
pub fn derive_actions(service: &str, solution: &str) -> Vec<String> {
    let lower = solution.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    let mut actions = Vec::new();

    if has(&["scale", "pool"]) {
        actions.push(format!(
            "Scaled {} connection pool from 50 to 100 connections",
            service
        ));
    }
    if has(&["restart"]) {
        actions.push(format!("Restarted {} service instances", service));
    }
    if has(&["cache"]) {
        actions.push(format!(
            "Cleared {} cache and implemented warming strategy",
            service
        ));
    }
    if has(&["index"]) {
        actions.push(format!("Added database index for {} queries", service));
    }
    if has(&["circuit", "breaker"]) {
        actions.push(format!("Implemented circuit breaker pattern for {}", service));
    }

    if actions.is_empty() {
        let excerpt: String = solution.chars().take(100).collect();
        actions.push(format!("Applied recommended solution: {}", excerpt));
        actions.push(format!("Restarted {} service", service));
    }
    actions
}

impl StageHandler for Mitigation {
    fn stage(&self) -> Stage {
        Stage::Mitigation
    }

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput> {
        Box::pin(async move {
            let service = state.service_name();
            let solution = recommended_solution(state);
            let actions_taken = derive_actions(service, &solution);

            info!(
                incident_id = %state.incident_id,
                service = %service,
                actions = actions_taken.len(),
                status = EXECUTION_STATUS,
                "Mitigation executed"
            );

            let record = send_notification(
                self.notifier.as_ref(),
                Stage::Mitigation,
                NotificationKind::MitigationReport,
                serde_json::json!({
                    "incident_id": state.incident_id.to_string(),
                    "status": EXECUTION_STATUS,
                    "actions": actions_taken,
                }),
                self.timeout,
            )
            .await;

            let results = MitigationResults {
                solution,
                actions_taken,
                execution_status: EXECUTION_STATUS.to_string(),
                verification_checks: vec![
                    ("service_health".into(), "HEALTHY".into()),
                    ("error_rate".into(), "NORMAL".into()),
                    ("response_time".into(), "OPTIMAL".into()),
                ],
            };

            StageOutput::new(
                PartialUpdate::new(Stage::Mitigation)
                    .with(FieldValue::MitigationResults(results))
                    .with(FieldValue::Notifications(vec![record])),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::results::{KnowledgeLookupResults, RootCauseResults};
    use triage_test_utils::{knowledge_report, root_cause_report, RecordingNotifier};

    #[test]
    fn test_pool_and_restart_actions() {
        let actions = derive_actions(
            "Payment API",
            "Scale database connection pool from 50 to 100 and restart service",
        );
        assert_eq!(
            actions,
            vec![
                "Scaled Payment API connection pool from 50 to 100 connections",
                "Restarted Payment API service instances",
            ]
        );
    }

    #[test]
    fn test_cache_index_and_breaker() {
        let actions = derive_actions("Auth Service", "Add index, warm the cache, enable circuit breaker");
        assert_eq!(actions.len(), 3);
        assert!(actions[0].contains("cache"));
        assert!(actions[1].contains("index"));
        assert!(actions[2].contains("circuit breaker"));
    }

    #[test]
    fn test_default_actions() {
        let long = "x".repeat(150);
        let actions = derive_actions("Billing", &long);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], format!("Applied recommended solution: {}", "x".repeat(100)));
        assert_eq!(actions[1], "Restarted Billing service");
    }

    #[test]
    fn test_solution_falls_back_to_history() {
        let mut state = IncidentState::new("alert");
        state.root_cause_results = Some(RootCauseResults {
            report: root_cause_report(0.0),
            error: Some("ai down".into()),
        });
        state.knowledge_lookup_results = Some(KnowledgeLookupResults {
            report: knowledge_report(1),
            error: None,
        });
        assert_eq!(
            recommended_solution(&state),
            "Scale database connection pool from 50 to 100, restart service"
        );
        assert_eq!(recommended_solution(&IncidentState::new("alert")), DEFAULT_SOLUTION);
    }

    #[tokio::test]
    async fn test_mitigation_notifies() {
        let notifier = Arc::new(RecordingNotifier::new());
        let stage = Mitigation::new(notifier.clone(), Duration::from_secs(5));
        let mut state = IncidentState::new("alert");
        state.service = Some("Payment API".into());
        let output = stage.run(&state).await;
        let merged = state.merge(&[output.update]).unwrap();
        let results = merged.mitigation_results.unwrap();
        assert_eq!(results.execution_status, "SUCCESS");
        assert_eq!(results.verification_checks.len(), 3);
        assert_eq!(notifier.kinds(), vec![NotificationKind::MitigationReport]);
        assert_eq!(merged.notifications.len(), 1);
    }
}
