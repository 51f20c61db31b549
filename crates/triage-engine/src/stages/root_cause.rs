use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use triage_core::results::{RootCauseReport, RootCauseResults};
use triage_core::traits::AiAnalyzer;
use triage_core::types::{Stage, StageFault};

use crate::stage::{call_with_timeout, StageHandler, StageOutput};
use crate::state::{FieldValue, IncidentState, PartialUpdate};

/// AI root-cause inference. Runs alongside log analysis, so it never sees
/// log results.
pub struct RootCause {
    ai: Arc<dyn AiAnalyzer>,
    timeout: Duration,
}

impl RootCause {
    pub fn new(ai: Arc<dyn AiAnalyzer>, timeout: Duration) -> Self {
        Self { ai, timeout }
    }
}

impl StageHandler for RootCause {
    fn stage(&self) -> Stage {
        Stage::RootCause
    }

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput> {
        Box::pin(async move {
            let result = call_with_timeout(
                "ai_analyzer",
                self.timeout,
                self.ai
                    .analyze(state.service_name(), state.description_text(), None),
            )
            .await;

            let (results, fault) = match result {
                Ok(report) => {
                    info!(
                        incident_id = %state.incident_id,
                        confidence = report.confidence,
                        "Root cause analysis complete"
                    );
                    (RootCauseResults { report, error: None }, None)
                }
                Err(e) => {
                    warn!(incident_id = %state.incident_id, error = %e, "Root cause analysis failed");
                    let report = RootCauseReport {
                        root_cause: "Analysis failed".into(),
                        confidence: 0.0,
                        recommendations: vec!["Manual investigation required".into()],
                        ..RootCauseReport::default()
                    };
                    (
                        RootCauseResults {
                            report,
                            error: Some(e.to_string()),
                        },
                        Some(StageFault::recoverable(Stage::RootCause, e.to_string())),
                    )
                }
            };

            StageOutput {
                update: PartialUpdate::new(Stage::RootCause)
                    .with(FieldValue::RootCauseResults(results)),
                faults: fault.into_iter().collect(),
            }
        })
    }
}
