use std::fmt;

use serde::{Deserialize, Serialize};

use triage_core::error::{Result, TriageError};
use triage_core::results::Verdict;
use triage_core::types::Stage;

use crate::state::IncidentState;

/// Engine state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Trigger,
    ParallelAnalysis,
    Coordinator,
    Decision,
    Mitigation,
    Escalation,
    Communicator,
    Terminal,
    ErrorTerminal,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::ParallelAnalysis => "parallel_analysis",
            Self::Coordinator => "coordinator",
            Self::Decision => "decision",
            Self::Mitigation => "mitigation",
            Self::Escalation => "escalation",
            Self::Communicator => "communicator",
            Self::Terminal => "terminal",
            Self::ErrorTerminal => "error_terminal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal | Self::ErrorTerminal)
    }

    /// Stages dispatched in this phase; more than one means a parallel group.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Self::Trigger => &[Stage::Trigger],
            Self::ParallelAnalysis => &Stage::ANALYSIS,
            Self::Coordinator => &[Stage::Coordinator],
            Self::Decision => &[Stage::Decision],
            Self::Mitigation => &[Stage::Mitigation],
            Self::Escalation => &[Stage::Escalation],
            Self::Communicator => &[Stage::Communicator],
            Self::Terminal | Self::ErrorTerminal => &[],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// After the trigger: stop on an unrecoverable trigger fault, otherwise fan
/// out to the analysis group.
pub fn route_after_trigger(state: &IncidentState) -> Phase {
    let fatal = state
        .errors
        .iter()
        .any(|f| f.stage == Stage::Trigger && !f.recoverable);
    if fatal {
        Phase::ErrorTerminal
    } else {
        Phase::ParallelAnalysis
    }
}

/// Completion barrier check: every analysis result must be merged before the
/// coordinator may run.
pub fn route_after_analysis(state: &IncidentState) -> Result<Phase> {
    let missing: Vec<&str> = [
        (state.log_analysis_results.is_none(), Stage::LogAnalysis),
        (state.knowledge_lookup_results.is_none(), Stage::KnowledgeLookup),
        (state.root_cause_results.is_none(), Stage::RootCause),
    ]
    .iter()
    .filter(|(absent, _)| *absent)
    .map(|(_, stage)| stage.name())
    .collect();

    if missing.is_empty() {
        Ok(Phase::Coordinator)
    } else {
        Err(TriageError::Routing(format!(
            "analysis barrier passed with missing results: {}",
            missing.join(", ")
        )))
    }
}

pub fn route_after_coordination(_state: &IncidentState) -> Phase {
    Phase::Decision
}

pub fn route_after_decision(state: &IncidentState) -> Result<Phase> {
    match state.decision {
        Some(Verdict::Mitigation) => Ok(Phase::Mitigation),
        Some(Verdict::Escalation) => Ok(Phase::Escalation),
        None => Err(TriageError::Routing(
            "decision stage completed without a verdict".into(),
        )),
    }
}

/// The phase following `phase`, given the state merged at its end.
pub fn next(phase: Phase, state: &IncidentState) -> Result<Phase> {
    match phase {
        Phase::Trigger => Ok(route_after_trigger(state)),
        Phase::ParallelAnalysis => route_after_analysis(state),
        Phase::Coordinator => Ok(route_after_coordination(state)),
        Phase::Decision => route_after_decision(state),
        Phase::Mitigation | Phase::Escalation => Ok(Phase::Communicator),
        Phase::Communicator => Ok(Phase::Terminal),
        Phase::Terminal | Phase::ErrorTerminal => Err(TriageError::Routing(format!(
            "no transition out of terminal phase {}",
            phase
        ))),
    }
}
