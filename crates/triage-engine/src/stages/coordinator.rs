use futures::future::BoxFuture;
use tracing::info;

use triage_core::results::CoordinationSummary;
use triage_core::types::Stage;

use crate::stage::{StageHandler, StageOutput};
use crate::state::{FieldValue, IncidentState, PartialUpdate};

/// Summarises the three analyses once the barrier has merged them.
pub struct Coordinator;

pub(crate) fn summarise(state: &IncidentState) -> CoordinationSummary {
    let mut completed = Vec::new();
    let mut failed = Vec::new();
    let mut classify = |stage: Stage, error: Option<&String>| match error {
        None => completed.push(stage.name().to_string()),
        Some(_) => failed.push(stage.name().to_string()),
    };

    let logs = state.log_analysis_results.as_ref();
    let knowledge = state.knowledge_lookup_results.as_ref();
    let root_cause = state.root_cause_results.as_ref();

    if let Some(r) = logs {
        classify(Stage::LogAnalysis, r.error.as_ref());
    }
    if let Some(r) = knowledge {
        classify(Stage::KnowledgeLookup, r.error.as_ref());
    }
    if let Some(r) = root_cause {
        classify(Stage::RootCause, r.error.as_ref());
    }

    CoordinationSummary {
        total_anomalies: logs.map_or(0, |r| r.report.anomalies.len()),
        similar_incidents_count: knowledge.map_or(0, |r| r.similar_count()),
        ai_confidence: root_cause.map_or(0.0, |r| r.confidence()),
        analyses_completed: completed,
        analyses_failed: failed,
    }
}

impl StageHandler for Coordinator {
    fn stage(&self) -> Stage {
        Stage::Coordinator
    }

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput> {
        Box::pin(async move {
            let summary = summarise(state);
            info!(
                incident_id = %state.incident_id,
                anomalies = summary.total_anomalies,
                similar = summary.similar_incidents_count,
                confidence = summary.ai_confidence,
                failed = summary.analyses_failed.len(),
                "Analyses coordinated"
            );
            StageOutput::new(
                PartialUpdate::new(Stage::Coordinator).with(FieldValue::CoordinationSummary(summary)),
            )
        })
    }
}
