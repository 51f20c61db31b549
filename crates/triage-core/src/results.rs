//! Result blocks written into the incident state by each stage, and the
//! reports returned by collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Severity;

/// Service name used when an alert cannot be attributed to a known service.
pub const UNKNOWN_SERVICE: &str = "Unknown Service";

/// A single anomaly detected in service logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub pattern: String,
    pub frequency: u32,
    pub time_range: String,
}

/// Output of a log analyzer call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogReport {
    pub anomalies_found: bool,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
    pub confidence: f64,
    #[serde(default)]
    pub log_patterns: Vec<String>,
}

/// State block written by `log_analysis`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogAnalysisResults {
    #[serde(flatten)]
    pub report: LogReport,
    /// Analyzer invocations made by the stage, retries included.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogAnalysisResults {
    pub fn anomalies_found(&self) -> bool {
        self.report.anomalies_found
    }
}

/// A historical incident matched by the knowledge searcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarIncident {
    pub incident_id: String,
    pub service: String,
    pub similarity_score: f64,
    pub root_cause: String,
    pub solution: String,
    #[serde(default)]
    pub keywords_matched: Vec<String>,
}

/// Output of a knowledge searcher call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeReport {
    #[serde(default)]
    pub similar_incidents: Vec<SimilarIncident>,
    pub solutions_found: bool,
    #[serde(default)]
    pub recommended_solutions: Vec<String>,
    pub confidence: f64,
}

/// State block written by `knowledge_lookup`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeLookupResults {
    #[serde(flatten)]
    pub report: KnowledgeReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KnowledgeLookupResults {
    pub fn similar_count(&self) -> usize {
        self.report.similar_incidents.len()
    }
}

/// Structured attributes extracted from a raw alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAlert {
    pub service: String,
    pub severity: Severity,
    pub description: String,
}

impl ParsedAlert {
    pub fn is_unknown_service(&self) -> bool {
        self.service.trim().is_empty() || self.service == UNKNOWN_SERVICE
    }
}

/// Output of an AI root-cause inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootCauseReport {
    pub root_cause: String,
    pub confidence: f64,
    #[serde(default)]
    pub contributing_factors: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub urgency: Severity,
    #[serde(default)]
    pub estimated_resolution: String,
}

/// State block written by `root_cause`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootCauseResults {
    #[serde(flatten)]
    pub report: RootCauseReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RootCauseResults {
    pub fn confidence(&self) -> f64 {
        self.report.confidence
    }
}

/// Aggregate view produced by `coordinator` after the barrier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinationSummary {
    pub total_anomalies: usize,
    pub similar_incidents_count: usize,
    pub ai_confidence: f64,
    pub analyses_completed: Vec<String>,
    #[serde(default)]
    pub analyses_failed: Vec<String>,
}

/// Outcome of the decision rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[serde(rename = "auto_mitigation")]
    Mitigation,
    Escalation,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mitigation => f.write_str("auto_mitigation"),
            Self::Escalation => f.write_str("escalation"),
        }
    }
}

/// Why an incident was handed to humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    RetriesExhausted,
    NoAnomalies,
    LowConfidence,
    UnknownPattern,
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted => f.write_str("retries exhausted without finding anomalies"),
            Self::NoAnomalies => f.write_str("no anomalies detected in log analysis"),
            Self::LowConfidence => f.write_str("low confidence in root cause analysis"),
            Self::UnknownPattern => f.write_str("no similar historical incidents found"),
        }
    }
}

/// The rule of the decision list that fired, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    RetriesExhausted,
    NoAnomalies,
    LowConfidence,
    UnknownPattern,
    AllChecksPassed,
}

impl DecisionRule {
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::AllChecksPassed => Verdict::Mitigation,
            _ => Verdict::Escalation,
        }
    }

    pub fn escalation_reason(&self) -> Option<EscalationReason> {
        match self {
            Self::RetriesExhausted => Some(EscalationReason::RetriesExhausted),
            Self::NoAnomalies => Some(EscalationReason::NoAnomalies),
            Self::LowConfidence => Some(EscalationReason::LowConfidence),
            Self::UnknownPattern => Some(EscalationReason::UnknownPattern),
            Self::AllChecksPassed => None,
        }
    }
}

/// Inputs, thresholds, and the rule that fired, for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub rule: DecisionRule,
    pub confidence: f64,
    pub confidence_threshold: f64,
    pub anomalies_found: bool,
    pub similar_incidents_count: usize,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,
}

/// State block written by `mitigation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationResults {
    pub solution: String,
    pub actions_taken: Vec<String>,
    pub execution_status: String,
    pub verification_checks: Vec<(String, String)>,
}

/// State block written by `escalation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationResults {
    pub escalation_reason: String,
    pub assigned_to: String,
    pub priority: Severity,
    pub context: serde_json::Value,
    pub escalated_at: String,
}

/// Terminal status shown in the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Resolved,
    Escalated,
}

/// State block written by `communicator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub incident_id: String,
    pub service: String,
    pub severity: Severity,
    pub decision: Verdict,
    pub status: ReportStatus,
    pub resolution: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions_taken: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<DecisionMetrics>,
    pub generated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_verdicts() {
        assert_eq!(DecisionRule::AllChecksPassed.verdict(), Verdict::Mitigation);
        assert_eq!(DecisionRule::LowConfidence.verdict(), Verdict::Escalation);
        assert!(DecisionRule::AllChecksPassed.escalation_reason().is_none());
        assert_eq!(
            DecisionRule::UnknownPattern.escalation_reason(),
            Some(EscalationReason::UnknownPattern)
        );
    }

    #[test]
    fn test_flattened_result_block_json() {
        let results = LogAnalysisResults {
            report: LogReport {
                anomalies_found: false,
                anomalies: vec![],
                confidence: 0.3,
                log_patterns: vec![],
            },
            attempts: 2,
            error: Some("analyzer unavailable".into()),
        };
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["anomalies_found"], serde_json::json!(false));
        assert_eq!(json["attempts"], serde_json::json!(2));
        assert_eq!(json["error"], serde_json::json!("analyzer unavailable"));
    }

    #[test]
    fn test_verdict_wire_names() {
        assert_eq!(
            serde_json::to_string(&Verdict::Mitigation).unwrap(),
            "\"auto_mitigation\""
        );
        assert_eq!(Verdict::Escalation.to_string(), "escalation");
    }

    #[test]
    fn test_unknown_service_detection() {
        let parsed = ParsedAlert {
            service: UNKNOWN_SERVICE.into(),
            severity: Severity::Medium,
            description: "x".into(),
        };
        assert!(parsed.is_unknown_service());
    }
}
