use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use triage_core::results::{KnowledgeLookupResults, KnowledgeReport};
use triage_core::traits::KnowledgeSearcher;
use triage_core::types::{Stage, StageFault};

use crate::stage::{call_with_timeout, StageHandler, StageOutput};
use crate::state::{FieldValue, IncidentState, PartialUpdate};

pub struct KnowledgeLookup {
    searcher: Arc<dyn KnowledgeSearcher>,
    timeout: Duration,
}

impl KnowledgeLookup {
    pub fn new(searcher: Arc<dyn KnowledgeSearcher>, timeout: Duration) -> Self {
        Self { searcher, timeout }
    }
}

impl StageHandler for KnowledgeLookup {
    fn stage(&self) -> Stage {
        Stage::KnowledgeLookup
    }

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput> {
        Box::pin(async move {
            let result = call_with_timeout(
                "knowledge_searcher",
                self.timeout,
                self.searcher
                    .search(state.service_name(), state.description_text()),
            )
            .await;

            let (results, fault) = match result {
                Ok(report) => {
                    info!(
                        incident_id = %state.incident_id,
                        similar = report.similar_incidents.len(),
                        "Knowledge lookup complete"
                    );
                    (KnowledgeLookupResults { report, error: None }, None)
                }
                Err(e) => {
                    warn!(incident_id = %state.incident_id, error = %e, "Knowledge lookup failed");
                    (
                        KnowledgeLookupResults {
                            report: KnowledgeReport::default(),
                            error: Some(e.to_string()),
                        },
                        Some(StageFault::recoverable(Stage::KnowledgeLookup, e.to_string())),
                    )
                }
            };

            StageOutput {
                update: PartialUpdate::new(Stage::KnowledgeLookup)
                    .with(FieldValue::KnowledgeLookupResults(results)),
                faults: fault.into_iter().collect(),
            }
        })
    }
}
