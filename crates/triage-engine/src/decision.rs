//! Decision rules choosing between automated mitigation and escalation.

use triage_core::config::WorkflowConfig;
use triage_core::results::{DecisionMetrics, DecisionRule};

/// The inputs the rules look at, pulled out of the incident state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionInputs {
    pub retry_count: u32,
    pub anomalies_found: bool,
    pub confidence: f64,
    pub similar_incidents: usize,
}

/// Evaluate the rule list in priority order; the first rule that holds
/// decides.
pub fn evaluate(inputs: &DecisionInputs, config: &WorkflowConfig) -> DecisionMetrics {
    let rule = if inputs.retry_count >= config.max_retries {
        DecisionRule::RetriesExhausted
    } else if !inputs.anomalies_found {
        DecisionRule::NoAnomalies
    } else if inputs.confidence < config.confidence_threshold {
        DecisionRule::LowConfidence
    } else if inputs.similar_incidents == 0 {
        DecisionRule::UnknownPattern
    } else {
        DecisionRule::AllChecksPassed
    };

    DecisionMetrics {
        rule,
        confidence: inputs.confidence,
        confidence_threshold: config.confidence_threshold,
        anomalies_found: inputs.anomalies_found,
        similar_incidents_count: inputs.similar_incidents,
        retry_count: inputs.retry_count,
        max_retries: config.max_retries,
        escalation_reason: rule.escalation_reason(),
    }
}
