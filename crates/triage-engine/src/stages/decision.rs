use futures::future::BoxFuture;
use tracing::info;

use triage_core::config::WorkflowConfig;
use triage_core::types::Stage;

use crate::decision::{evaluate, DecisionInputs};
use crate::stage::{StageHandler, StageOutput};
use crate::state::{FieldValue, IncidentState, PartialUpdate};

/// Applies the decision rules and writes the verdict with its metrics.
pub struct Decision {
    config: WorkflowConfig,
}

impl Decision {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }
}

fn inputs(state: &IncidentState) -> DecisionInputs {
    DecisionInputs {
        retry_count: state.retry_count,
        anomalies_found: state
            .log_analysis_results
            .as_ref()
            .is_some_and(|r| r.anomalies_found()),
        confidence: state
            .root_cause_results
            .as_ref()
            .map_or(0.0, |r| r.confidence()),
        similar_incidents: state
            .knowledge_lookup_results
            .as_ref()
            .map_or(0, |r| r.similar_count()),
    }
}

impl StageHandler for Decision {
    fn stage(&self) -> Stage {
        Stage::Decision
    }

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput> {
        Box::pin(async move {
            let metrics = evaluate(&inputs(state), &self.config);
            let verdict = metrics.rule.verdict();
            info!(
                incident_id = %state.incident_id,
                verdict = %verdict,
                rule = ?metrics.rule,
                confidence = metrics.confidence,
                "Decision made"
            );
            StageOutput::new(
                PartialUpdate::new(Stage::Decision)
                    .with(FieldValue::Decision(verdict))
                    .with(FieldValue::DecisionMetrics(metrics)),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::results::{
        DecisionRule, KnowledgeLookupResults, LogAnalysisResults, RootCauseResults, Verdict,
    };
    use triage_test_utils::{anomaly_report, knowledge_report, root_cause_report};

    #[tokio::test]
    async fn test_reads_merged_analyses() {
        let mut state = IncidentState::new("alert");
        state.log_analysis_results = Some(LogAnalysisResults {
            report: anomaly_report(),
            attempts: 1,
            error: None,
        });
        state.knowledge_lookup_results = Some(KnowledgeLookupResults {
            report: knowledge_report(3),
            error: None,
        });
        state.root_cause_results = Some(RootCauseResults {
            report: root_cause_report(0.92),
            error: None,
        });

        let output = Decision::new(WorkflowConfig::default()).run(&state).await;
        let merged = state.merge(&[output.update]).unwrap();
        assert_eq!(merged.decision, Some(Verdict::Mitigation));
        let metrics = merged.decision_metrics.unwrap();
        assert_eq!(metrics.rule, DecisionRule::AllChecksPassed);
        assert_eq!(metrics.similar_incidents_count, 3);
    }

    #[tokio::test]
    async fn test_missing_analyses_escalate() {
        let state = IncidentState::new("alert");
        let output = Decision::new(WorkflowConfig::default()).run(&state).await;
        let merged = state.merge(&[output.update]).unwrap();
        assert_eq!(merged.decision, Some(Verdict::Escalation));
    }
}
