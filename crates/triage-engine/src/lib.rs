pub mod decision;
pub mod executor;
pub mod routing;
pub mod stage;
pub mod stages;
pub mod state;

pub use executor::{StageRecord, WorkflowEngine, WorkflowOutcome, WorkflowRun};
pub use routing::Phase;
pub use stage::{Collaborators, StageHandler, StageOutput, StageRegistry};
pub use state::{FieldValue, IncidentState, PartialUpdate};

use triage_core::config::WorkflowConfig;
use triage_core::error::Result;

/// Run one alert through a freshly built engine.
///
/// Configuration errors are returned before the workflow begins; anything
/// after that is reported through the run's outcome.
pub async fn run_workflow(
    raw_alert: &str,
    config: WorkflowConfig,
    collaborators: Collaborators,
) -> Result<WorkflowRun> {
    let engine = WorkflowEngine::new(collaborators, config)?;
    Ok(engine.run(raw_alert).await)
}
