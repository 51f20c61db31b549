use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique incident identifier, e.g. `INC-20260114-3F9A1C2B`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct IncidentId(pub String);

impl IncidentId {
    pub fn new() -> Self {
        let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        Self(format!("INC-{}-{}", Utc::now().format("%Y%m%d"), suffix))
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incident severity as reported by the alert parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// HIGH and CRITICAL incidents get high-priority escalation.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" | "MED" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// A processing stage of the triage workflow.
///
/// Declaration order is the canonical order used when merging the updates of
/// one execution round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Trigger,
    LogAnalysis,
    KnowledgeLookup,
    RootCause,
    Coordinator,
    Decision,
    Mitigation,
    Escalation,
    Communicator,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Trigger,
        Stage::LogAnalysis,
        Stage::KnowledgeLookup,
        Stage::RootCause,
        Stage::Coordinator,
        Stage::Decision,
        Stage::Mitigation,
        Stage::Escalation,
        Stage::Communicator,
    ];

    /// The analysis group dispatched concurrently after the trigger.
    pub const ANALYSIS: [Stage; 3] = [Stage::LogAnalysis, Stage::KnowledgeLookup, Stage::RootCause];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::LogAnalysis => "log_analysis",
            Self::KnowledgeLookup => "knowledge_lookup",
            Self::RootCause => "root_cause",
            Self::Coordinator => "coordinator",
            Self::Decision => "decision",
            Self::Mitigation => "mitigation",
            Self::Escalation => "escalation",
            Self::Communicator => "communicator",
        }
    }

    /// Fields this stage may write. Anything else in its update is a
    /// contract violation.
    pub fn write_set(&self) -> &'static [Field] {
        match self {
            Self::Trigger => &[
                Field::Service,
                Field::Severity,
                Field::Description,
                Field::Notifications,
            ],
            Self::LogAnalysis => &[Field::LogAnalysisResults, Field::RetryCount],
            Self::KnowledgeLookup => &[Field::KnowledgeLookupResults],
            Self::RootCause => &[Field::RootCauseResults],
            Self::Coordinator => &[Field::CoordinationSummary],
            Self::Decision => &[Field::Decision, Field::DecisionMetrics],
            Self::Mitigation => &[Field::MitigationResults, Field::Notifications],
            Self::Escalation => &[Field::EscalationResults, Field::Notifications],
            Self::Communicator => &[Field::FinalReport],
        }
    }

    pub fn may_write(&self, field: Field) -> bool {
        self.write_set().contains(&field)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Writable fields of the incident state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Service,
    Severity,
    Description,
    LogAnalysisResults,
    RetryCount,
    KnowledgeLookupResults,
    RootCauseResults,
    CoordinationSummary,
    Decision,
    DecisionMetrics,
    MitigationResults,
    EscalationResults,
    FinalReport,
    Notifications,
    CompletedStages,
    Errors,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Severity => "severity",
            Self::Description => "description",
            Self::LogAnalysisResults => "log_analysis_results",
            Self::RetryCount => "retry_count",
            Self::KnowledgeLookupResults => "knowledge_lookup_results",
            Self::RootCauseResults => "root_cause_results",
            Self::CoordinationSummary => "coordination_summary",
            Self::Decision => "decision",
            Self::DecisionMetrics => "decision_metrics",
            Self::MitigationResults => "mitigation_results",
            Self::EscalationResults => "escalation_results",
            Self::FinalReport => "final_report",
            Self::Notifications => "notifications",
            Self::CompletedStages => "completed_stages",
            Self::Errors => "errors",
        }
    }

    /// Multi-writer fields combined with a merge function instead of being
    /// set once.
    pub fn is_accumulator(&self) -> bool {
        matches!(
            self,
            Self::Notifications | Self::CompletedStages | Self::Errors
        )
    }

    /// Fields only the engine may write.
    pub fn is_engine_owned(&self) -> bool {
        matches!(self, Self::CompletedStages | Self::Errors)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A caught failure reported by a stage alongside its update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFault {
    pub stage: Stage,
    pub message: String,
    /// Recoverable faults are recorded and routing continues; anything else
    /// sends the run to the error terminal.
    pub recoverable: bool,
}

impl StageFault {
    pub fn recoverable(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            recoverable: true,
        }
    }

    pub fn fatal(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            recoverable: false,
        }
    }
}

/// Template used by the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    IncidentAlert,
    MitigationReport,
    EscalationAlert,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncidentAlert => "incident_alert",
            Self::MitigationReport => "mitigation_report",
            Self::EscalationAlert => "escalation_alert",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status returned by a notifier. Never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyStatus {
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotifyStatus {
    pub fn sent() -> Self {
        Self {
            sent: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            sent: false,
            error: Some(error.into()),
        }
    }
}

/// One notification attempt, accumulated in the incident state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub stage: Stage,
    pub kind: NotificationKind,
    pub status: NotifyStatus,
}
