use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use triage_core::config::WorkflowConfig;
use triage_core::results::{LogAnalysisResults, LogReport};
use triage_core::traits::LogAnalyzer;
use triage_core::types::{Stage, StageFault};

use crate::stage::{call_with_timeout, StageHandler, StageOutput};
use crate::state::{FieldValue, IncidentState, PartialUpdate};

/// Scans logs for anomalies, re-invoking the analyzer while it finds
/// nothing and the retry budget allows.
pub struct LogAnalysis {
    analyzer: Arc<dyn LogAnalyzer>,
    max_retries: u32,
    backoff: Duration,
    timeout: Duration,
}

impl LogAnalysis {
    pub fn new(analyzer: Arc<dyn LogAnalyzer>, config: &WorkflowConfig) -> Self {
        Self {
            analyzer,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
            timeout: Duration::from_secs(config.collaborator_timeout_secs),
        }
    }
}

impl StageHandler for LogAnalysis {
    fn stage(&self) -> Stage {
        Stage::LogAnalysis
    }

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput> {
        Box::pin(async move {
            let service = state.service_name();
            let description = state.description_text();
            let mut retry_count = state.retry_count;
            let mut attempts = 0u32;
            let mut faults = Vec::new();

            let (report, error) = loop {
                attempts += 1;
                let result = call_with_timeout(
                    "log_analyzer",
                    self.timeout,
                    self.analyzer.analyze(service, description),
                )
                .await;

                match result {
                    Ok(report) if report.anomalies_found => break (report, None),
                    Ok(report) if retry_count >= self.max_retries => {
                        info!(
                            incident_id = %state.incident_id,
                            retry_count,
                            "No anomalies found, retries exhausted"
                        );
                        break (report, None);
                    }
                    Ok(_) => {
                        retry_count += 1;
                        debug!(
                            incident_id = %state.incident_id,
                            retry_count,
                            max_retries = self.max_retries,
                            "No anomalies found, retrying log analysis"
                        );
                        if !self.backoff.is_zero() {
                            tokio::time::sleep(self.backoff).await;
                        }
                    }
                    Err(e) => {
                        warn!(incident_id = %state.incident_id, error = %e, "Log analysis failed");
                        faults.push(StageFault::recoverable(Stage::LogAnalysis, e.to_string()));
                        break (LogReport::default(), Some(e.to_string()));
                    }
                }
            };

            info!(
                incident_id = %state.incident_id,
                anomalies = report.anomalies.len(),
                attempts,
                "Log analysis complete"
            );

            let update = PartialUpdate::new(Stage::LogAnalysis)
                .with(FieldValue::LogAnalysisResults(LogAnalysisResults {
                    report,
                    attempts,
                    error,
                }))
                .with(FieldValue::RetryCount(retry_count));

            StageOutput { update, faults }
        })
    }
}
