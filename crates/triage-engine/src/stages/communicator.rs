use chrono::Utc;
use futures::future::BoxFuture;
use tracing::info;

use triage_core::results::{FinalReport, ReportStatus, Verdict};
use triage_core::types::Stage;

use crate::stage::{StageHandler, StageOutput};
use crate::state::{FieldValue, IncidentState, PartialUpdate};

use super::escalation::escalation_reason;

/// Writes the final status report.
pub struct Communicator;

fn final_report(state: &IncidentState) -> FinalReport {
    let decision = state.decision.unwrap_or(Verdict::Escalation);
    let mut report = FinalReport {
        incident_id: state.incident_id.to_string(),
        service: state.service_name().to_string(),
        severity: state.severity_or_default(),
        decision,
        status: ReportStatus::Escalated,
        resolution: String::new(),
        actions_taken: Vec::new(),
        escalation_reason: None,
        assigned_to: None,
        metrics: state.decision_metrics.clone(),
        generated_at: Utc::now().to_rfc3339(),
    };

    match decision {
        Verdict::Mitigation => {
            report.status = ReportStatus::Resolved;
            report.resolution = "Automated mitigation executed successfully".into();
            report.actions_taken = state
                .mitigation_results
                .as_ref()
                .map(|m| m.actions_taken.clone())
                .unwrap_or_default();
        }
        Verdict::Escalation => {
            report.resolution = "Escalated to human operators".into();
            report.escalation_reason = Some(escalation_reason(state));
            report.assigned_to = Some(
                state
                    .escalation_results
                    .as_ref()
                    .map(|e| e.assigned_to.clone())
                    .unwrap_or_else(|| "Operations Team".into()),
            );
        }
    }
    report
}

impl StageHandler for Communicator {
    fn stage(&self) -> Stage {
        Stage::Communicator
    }

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput> {
        Box::pin(async move {
            let report = final_report(state);
            info!(
                incident_id = %state.incident_id,
                status = ?report.status,
                "Final report generated"
            );
            StageOutput::new(
                PartialUpdate::new(Stage::Communicator).with(FieldValue::FinalReport(report)),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::results::MitigationResults;

    #[test]
    fn test_resolved_report() {
        let mut state = IncidentState::new("alert");
        state.service = Some("Payment API".into());
        state.decision = Some(Verdict::Mitigation);
        state.mitigation_results = Some(MitigationResults {
            solution: "restart".into(),
            actions_taken: vec!["Restarted Payment API service instances".into()],
            execution_status: "SUCCESS".into(),
            verification_checks: vec![],
        });

        let report = final_report(&state);
        assert_eq!(report.status, ReportStatus::Resolved);
        assert_eq!(report.resolution, "Automated mitigation executed successfully");
        assert_eq!(report.actions_taken.len(), 1);
        assert!(report.escalation_reason.is_none());
    }

    #[test]
    fn test_escalated_report() {
        let mut state = IncidentState::new("alert");
        state.decision = Some(Verdict::Escalation);
        let report = final_report(&state);
        assert_eq!(report.status, ReportStatus::Escalated);
        assert_eq!(report.resolution, "Escalated to human operators");
        assert_eq!(report.assigned_to.as_deref(), Some("Operations Team"));
        assert_eq!(report.escalation_reason.as_deref(), Some("Unknown reason"));
    }
}
