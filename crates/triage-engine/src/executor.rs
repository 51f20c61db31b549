use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use triage_core::config::WorkflowConfig;
use triage_core::error::{Result, TriageError};
use triage_core::event::{EventBus, WorkflowEvent};
use triage_core::results::Verdict;
use triage_core::types::{IncidentId, Stage, StageFault};

use crate::routing::{self, Phase};
use crate::stage::{Collaborators, StageHandler, StageOutput, StageRegistry};
use crate::stages;
use crate::state::{IncidentState, PartialUpdate};

/// The phase graph is acyclic; more transitions than this means a bug.
const MAX_TRANSITIONS: usize = 16;

/// How a workflow run ended. Every run ends in exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    AutoMitigated,
    Escalated { reason: String },
    WorkflowError { reason: String },
}

impl WorkflowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AutoMitigated => "auto_mitigated",
            Self::Escalated { .. } => "escalated",
            Self::WorkflowError { .. } => "workflow_error",
        }
    }

    /// Human-readable explanation of the outcome.
    pub fn reason(&self) -> &str {
        match self {
            Self::AutoMitigated => "Automated mitigation executed successfully",
            Self::Escalated { reason } | Self::WorkflowError { reason } => reason,
        }
    }
}

impl fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label(), self.reason())
    }
}

/// Result of executing a single stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub elapsed_ms: u64,
    /// Faults the stage reported, recoverable or not.
    pub faults: usize,
}

/// Result of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    /// The final accumulated state.
    pub state: IncidentState,
    pub outcome: WorkflowOutcome,
    /// Phases entered, in order, ending with the terminal phase.
    pub phases: Vec<Phase>,
    /// Per-stage results in completion order.
    pub stage_records: Vec<StageRecord>,
    pub total_elapsed_ms: u64,
}

impl WorkflowRun {
    pub fn final_phase(&self) -> Phase {
        self.phases.last().copied().unwrap_or(Phase::ErrorTerminal)
    }

    pub fn incident_id(&self) -> &IncidentId {
        &self.state.incident_id
    }
}

/// Merged outcome of one round of stage executions.
struct Round {
    state: IncidentState,
    fatal: Option<StageFault>,
}

/// Drives an alert through the triage phases.
///
/// One engine may serve many runs; each run owns its state and nothing is
/// shared between runs except the stage handlers and their collaborators.
pub struct WorkflowEngine {
    registry: StageRegistry,
    config: WorkflowConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl WorkflowEngine {
    /// Build an engine with the standard stages. Fails on invalid config,
    /// before any run begins.
    pub fn new(collaborators: Collaborators, config: WorkflowConfig) -> Result<Self> {
        config.validate()?;
        let registry = StageRegistry::standard(&collaborators, &config);
        Ok(Self {
            registry,
            config,
            event_bus: None,
        })
    }

    /// Build an engine over a custom stage registry.
    pub fn with_registry(registry: StageRegistry, config: WorkflowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            config,
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Replace the handler for one stage.
    pub fn register_stage(&mut self, handler: Arc<dyn StageHandler>) {
        self.registry.register(handler);
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(ref bus) = self.event_bus {
            bus.publish(event);
        }
    }

    /// Run the workflow for one raw alert. Never fails: errors end the run in
    /// [`Phase::ErrorTerminal`] with a [`WorkflowOutcome::WorkflowError`].
    pub async fn run(&self, raw_alert: &str) -> WorkflowRun {
        let start = Instant::now();
        let mut state = IncidentState::new(raw_alert);
        let incident_id = state.incident_id.clone();
        let mut phases = Vec::new();
        let mut stage_records = Vec::new();
        let mut error_reason: Option<String> = None;
        let mut phase = Phase::Trigger;

        info!(incident_id = %incident_id, "Workflow started");
        self.publish(WorkflowEvent::RunStarted {
            incident_id: incident_id.clone(),
        });

        while !phase.is_terminal() {
            if phases.len() >= MAX_TRANSITIONS {
                error_reason = Some(format!(
                    "workflow exceeded {} phase transitions",
                    MAX_TRANSITIONS
                ));
                phase = Phase::ErrorTerminal;
                break;
            }
            phases.push(phase);
            debug!(incident_id = %incident_id, phase = %phase, "Entering phase");
            self.publish(WorkflowEvent::PhaseEntered {
                incident_id: incident_id.clone(),
                phase: phase.name().to_string(),
            });

            let round = match self.execute_phase(phase, &state, &mut stage_records).await {
                Ok(round) => round,
                Err(e) => {
                    error!(incident_id = %incident_id, phase = %phase, error = %e, "Phase failed");
                    error_reason = Some(e.to_string());
                    phase = Phase::ErrorTerminal;
                    break;
                }
            };
            state = round.state;

            phase = match round.fatal {
                Some(fault) => {
                    warn!(
                        incident_id = %incident_id,
                        stage = %fault.stage,
                        fault = %fault.message,
                        "Unrecoverable stage fault"
                    );
                    error_reason = Some(format!("{}: {}", fault.stage, fault.message));
                    Phase::ErrorTerminal
                }
                None => match routing::next(phase, &state) {
                    Ok(next) => next,
                    Err(e) => {
                        error!(incident_id = %incident_id, phase = %phase, error = %e, "Routing failed");
                        error_reason = Some(e.to_string());
                        Phase::ErrorTerminal
                    }
                },
            };
        }
        phases.push(phase);

        let outcome = outcome(phase, &state, error_reason);
        let total_elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            incident_id = %incident_id,
            outcome = outcome.label(),
            elapsed_ms = total_elapsed_ms,
            "Workflow finished"
        );
        self.publish(WorkflowEvent::RunFinished {
            incident_id,
            outcome: outcome.label().to_string(),
            elapsed_ms: total_elapsed_ms,
        });

        WorkflowRun {
            state,
            outcome,
            phases,
            stage_records,
            total_elapsed_ms,
        }
    }

    /// Run on a fresh multi-threaded runtime owned by this call.
    ///
    /// Must not be called from within an async context.
    pub fn run_blocking(&self, raw_alert: &str) -> Result<WorkflowRun> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| TriageError::Runtime(e.to_string()))?;
        Ok(runtime.block_on(self.run(raw_alert)))
    }

    /// Execute every stage of `phase` against `state` and merge the round.
    async fn execute_phase(
        &self,
        phase: Phase,
        state: &IncidentState,
        records: &mut Vec<StageRecord>,
    ) -> Result<Round> {
        let stages = phase.stages();
        let outputs = if stages.len() == 1 {
            let stage = stages[0];
            let handler = self.registry.get(stage)?;
            self.stage_started(state, stage);
            let started = Instant::now();
            let output = AssertUnwindSafe(handler.run(state)).catch_unwind().await.ok();
            if output.is_none() {
                error!(incident_id = %state.incident_id, stage = %stage, "Stage panicked");
            }
            vec![(stage, output, started.elapsed().as_millis() as u64)]
        } else {
            self.fan_out(stages, state).await?
        };

        let mut updates: Vec<PartialUpdate> = Vec::with_capacity(outputs.len());
        let mut faults: Vec<StageFault> = Vec::new();
        let mut completed: Vec<Stage> = Vec::with_capacity(outputs.len());

        for (stage, output, elapsed_ms) in outputs {
            let (update, stage_faults) = match output {
                Some(StageOutput { update, faults }) => (Some(update), faults),
                None => (None, vec![StageFault::fatal(stage, "stage panicked")]),
            };
            if update.is_some() {
                completed.push(stage);
            }
            records.push(StageRecord {
                stage,
                elapsed_ms,
                faults: stage_faults.len(),
            });
            self.publish(WorkflowEvent::StageCompleted {
                incident_id: state.incident_id.clone(),
                stage,
                elapsed_ms,
                fault: stage_faults.first().map(|f| f.message.clone()),
            });
            debug!(
                incident_id = %state.incident_id,
                stage = %stage,
                elapsed_ms,
                faults = stage_faults.len(),
                "Stage complete"
            );
            updates.extend(update);
            faults.extend(stage_faults);
        }

        let merged = match state.merge(&updates) {
            Ok(mut merged) => {
                merged.record_round(&completed, &faults);
                merged
            }
            Err(violation) => {
                // Merge is atomic: no update of this round lands and no stage
                // completes, but every fault the branches reported is kept.
                error!(incident_id = %state.incident_id, error = %violation, "Stage contract violation");
                let offender = violation.stage();
                faults.push(StageFault::fatal(
                    offender,
                    TriageError::from(violation).to_string(),
                ));
                let mut audited = state.clone();
                audited.record_round(&[], &faults);
                audited
            }
        };

        let fatal = faults.iter().find(|f| !f.recoverable).cloned();
        Ok(Round {
            state: merged,
            fatal,
        })
    }

    /// Dispatch a parallel group over a shared snapshot and await every
    /// branch. A branch that panics yields no output.
    async fn fan_out(
        &self,
        stages: &[Stage],
        state: &IncidentState,
    ) -> Result<Vec<(Stage, Option<StageOutput>, u64)>> {
        let snapshot = Arc::new(state.clone());
        let mut set = JoinSet::new();

        for &stage in stages {
            let handler = self.registry.get(stage)?;
            let snapshot = Arc::clone(&snapshot);
            self.stage_started(state, stage);
            set.spawn(async move {
                let started = Instant::now();
                let output = AssertUnwindSafe(handler.run(&snapshot))
                    .catch_unwind()
                    .await
                    .ok();
                (stage, output, started.elapsed().as_millis() as u64)
            });
        }

        let mut outputs = Vec::with_capacity(stages.len());
        while let Some(joined) = set.join_next().await {
            let (stage, output, elapsed_ms) =
                joined.map_err(|e| TriageError::Runtime(format!("analysis task failed: {}", e)))?;
            if output.is_none() {
                error!(incident_id = %state.incident_id, stage = %stage, "Stage panicked");
            }
            outputs.push((stage, output, elapsed_ms));
        }
        Ok(outputs)
    }

    fn stage_started(&self, state: &IncidentState, stage: Stage) {
        debug!(incident_id = %state.incident_id, stage = %stage, "Stage started");
        self.publish(WorkflowEvent::StageStarted {
            incident_id: state.incident_id.clone(),
            stage,
        });
    }
}

fn outcome(phase: Phase, state: &IncidentState, error_reason: Option<String>) -> WorkflowOutcome {
    if phase == Phase::ErrorTerminal {
        return WorkflowOutcome::WorkflowError {
            reason: error_reason.unwrap_or_else(|| "workflow ended in error".to_string()),
        };
    }
    match state.decision {
        Some(Verdict::Mitigation) => WorkflowOutcome::AutoMitigated,
        Some(Verdict::Escalation) => WorkflowOutcome::Escalated {
            reason: stages::escalation_reason(state),
        },
        None => WorkflowOutcome::WorkflowError {
            reason: "workflow finished without a decision".to_string(),
        },
    }
}
