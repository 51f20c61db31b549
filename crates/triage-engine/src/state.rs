use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use triage_core::error::ContractViolation;
use triage_core::results::{
    CoordinationSummary, DecisionMetrics, EscalationResults, FinalReport, KnowledgeLookupResults,
    LogAnalysisResults, MitigationResults, RootCauseResults, Verdict, UNKNOWN_SERVICE,
};
use triage_core::types::{Field, IncidentId, NotificationRecord, Severity, Stage, StageFault};

/// The record threaded through every stage of one workflow run.
///
/// Stages only ever see a shared reference; all writes go through
/// [`IncidentState::merge`], which enforces write-set ownership.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentState {
    pub incident_id: IncidentId,
    pub raw_alert: String,
    pub created_at: DateTime<Utc>,

    pub service: Option<String>,
    pub severity: Option<Severity>,
    pub description: Option<String>,
    pub log_analysis_results: Option<LogAnalysisResults>,
    pub retry_count: u32,
    pub knowledge_lookup_results: Option<KnowledgeLookupResults>,
    pub root_cause_results: Option<RootCauseResults>,
    pub coordination_summary: Option<CoordinationSummary>,
    pub decision: Option<Verdict>,
    pub decision_metrics: Option<DecisionMetrics>,
    pub mitigation_results: Option<MitigationResults>,
    pub escalation_results: Option<EscalationResults>,
    pub final_report: Option<FinalReport>,

    pub notifications: Vec<NotificationRecord>,
    pub completed_stages: Vec<Stage>,
    pub errors: Vec<StageFault>,
}

/// A single field write carried by a [`PartialUpdate`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Service(String),
    Severity(Severity),
    Description(String),
    LogAnalysisResults(LogAnalysisResults),
    RetryCount(u32),
    KnowledgeLookupResults(KnowledgeLookupResults),
    RootCauseResults(RootCauseResults),
    CoordinationSummary(CoordinationSummary),
    Decision(Verdict),
    DecisionMetrics(DecisionMetrics),
    MitigationResults(MitigationResults),
    EscalationResults(EscalationResults),
    FinalReport(FinalReport),
    Notifications(Vec<NotificationRecord>),
    CompletedStages(Vec<Stage>),
    Errors(Vec<StageFault>),
}

impl FieldValue {
    pub fn field(&self) -> Field {
        match self {
            Self::Service(_) => Field::Service,
            Self::Severity(_) => Field::Severity,
            Self::Description(_) => Field::Description,
            Self::LogAnalysisResults(_) => Field::LogAnalysisResults,
            Self::RetryCount(_) => Field::RetryCount,
            Self::KnowledgeLookupResults(_) => Field::KnowledgeLookupResults,
            Self::RootCauseResults(_) => Field::RootCauseResults,
            Self::CoordinationSummary(_) => Field::CoordinationSummary,
            Self::Decision(_) => Field::Decision,
            Self::DecisionMetrics(_) => Field::DecisionMetrics,
            Self::MitigationResults(_) => Field::MitigationResults,
            Self::EscalationResults(_) => Field::EscalationResults,
            Self::FinalReport(_) => Field::FinalReport,
            Self::Notifications(_) => Field::Notifications,
            Self::CompletedStages(_) => Field::CompletedStages,
            Self::Errors(_) => Field::Errors,
        }
    }
}

/// The fields one stage execution wants to write.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialUpdate {
    pub stage: Stage,
    pub values: Vec<FieldValue>,
}

impl PartialUpdate {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            values: Vec::new(),
        }
    }

    pub fn with(mut self, value: FieldValue) -> Self {
        self.values.push(value);
        self
    }

    pub fn push(&mut self, value: FieldValue) {
        self.values.push(value);
    }

    /// Fields written by this update, in write order.
    pub fn fields(&self) -> Vec<Field> {
        self.values.iter().map(FieldValue::field).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IncidentState {
    pub fn new(raw_alert: impl Into<String>) -> Self {
        Self {
            incident_id: IncidentId::new(),
            raw_alert: raw_alert.into(),
            created_at: Utc::now(),
            service: None,
            severity: None,
            description: None,
            log_analysis_results: None,
            retry_count: 0,
            knowledge_lookup_results: None,
            root_cause_results: None,
            coordination_summary: None,
            decision: None,
            decision_metrics: None,
            mitigation_results: None,
            escalation_results: None,
            final_report: None,
            notifications: Vec::new(),
            completed_stages: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Service name, or the unknown marker before the trigger has run.
    pub fn service_name(&self) -> &str {
        self.service.as_deref().unwrap_or(UNKNOWN_SERVICE)
    }

    pub fn severity_or_default(&self) -> Severity {
        self.severity.unwrap_or_default()
    }

    /// Parsed description, falling back to the raw alert text.
    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.raw_alert)
    }

    /// Whether all three analysis results have been merged.
    pub fn analyses_complete(&self) -> bool {
        self.log_analysis_results.is_some()
            && self.knowledge_lookup_results.is_some()
            && self.root_cause_results.is_some()
    }

    fn is_set(&self, field: Field) -> bool {
        match field {
            Field::Service => self.service.is_some(),
            Field::Severity => self.severity.is_some(),
            Field::Description => self.description.is_some(),
            Field::LogAnalysisResults => self.log_analysis_results.is_some(),
            Field::KnowledgeLookupResults => self.knowledge_lookup_results.is_some(),
            Field::RootCauseResults => self.root_cause_results.is_some(),
            Field::CoordinationSummary => self.coordination_summary.is_some(),
            Field::Decision => self.decision.is_some(),
            Field::DecisionMetrics => self.decision_metrics.is_some(),
            Field::MitigationResults => self.mitigation_results.is_some(),
            Field::EscalationResults => self.escalation_results.is_some(),
            Field::FinalReport => self.final_report.is_some(),
            // Counter and accumulators are never "set once".
            Field::RetryCount | Field::Notifications | Field::CompletedStages | Field::Errors => {
                false
            }
        }
    }

    /// Merge one round of stage updates into a new state.
    ///
    /// Updates are applied in canonical stage order, so the result does not
    /// depend on the order in which concurrent stages finished. The merge is
    /// all-or-nothing: on a contract violation `self` is left untouched.
    pub fn merge(&self, updates: &[PartialUpdate]) -> Result<IncidentState, ContractViolation> {
        let mut ordered: Vec<&PartialUpdate> = updates.iter().collect();
        ordered.sort_by_key(|u| u.stage);

        let mut next = self.clone();
        let mut written: HashSet<Field> = HashSet::new();

        for update in ordered {
            let stage = update.stage;
            for value in &update.values {
                let field = value.field();
                if field.is_engine_owned() {
                    return Err(ContractViolation::EngineOwnedField { stage, field });
                }
                if !stage.may_write(field) {
                    return Err(ContractViolation::WriteOutsideWriteSet { stage, field });
                }
                if !field.is_accumulator() && (!written.insert(field) || next.is_set(field)) {
                    return Err(ContractViolation::DuplicateWrite { stage, field });
                }
                next.apply(stage, value.clone())?;
            }
        }

        Ok(next)
    }

    fn apply(&mut self, stage: Stage, value: FieldValue) -> Result<(), ContractViolation> {
        match value {
            FieldValue::Service(v) => self.service = Some(v),
            FieldValue::Severity(v) => self.severity = Some(v),
            FieldValue::Description(v) => self.description = Some(v),
            FieldValue::LogAnalysisResults(v) => self.log_analysis_results = Some(v),
            FieldValue::RetryCount(v) => {
                if v < self.retry_count {
                    return Err(ContractViolation::RetryCountDecreased {
                        stage,
                        from: self.retry_count,
                        to: v,
                    });
                }
                self.retry_count = v;
            }
            FieldValue::KnowledgeLookupResults(v) => self.knowledge_lookup_results = Some(v),
            FieldValue::RootCauseResults(v) => self.root_cause_results = Some(v),
            FieldValue::CoordinationSummary(v) => self.coordination_summary = Some(v),
            FieldValue::Decision(v) => self.decision = Some(v),
            FieldValue::DecisionMetrics(v) => self.decision_metrics = Some(v),
            FieldValue::MitigationResults(v) => self.mitigation_results = Some(v),
            FieldValue::EscalationResults(v) => self.escalation_results = Some(v),
            FieldValue::FinalReport(v) => self.final_report = Some(v),
            FieldValue::Notifications(v) => self.notifications.extend(v),
            // Rejected by `merge` before reaching here.
            other @ (FieldValue::CompletedStages(_) | FieldValue::Errors(_)) => {
                return Err(ContractViolation::EngineOwnedField {
                    stage,
                    field: other.field(),
                })
            }
        }
        Ok(())
    }

    /// Engine bookkeeping after a round: record which stages completed and
    /// the faults they reported, both in canonical stage order.
    pub(crate) fn record_round(&mut self, stages: &[Stage], faults: &[StageFault]) {
        let mut stages = stages.to_vec();
        stages.sort();
        let mut faults = faults.to_vec();
        faults.sort_by_key(|f| f.stage);

        for stage in stages {
            if !self.completed_stages.contains(&stage) {
                self.completed_stages.push(stage);
            }
        }
        self.errors.extend(faults);
    }

    /// Flat key to JSON view of the state, for logging and display.
    pub fn to_flat_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::results::{KnowledgeReport, LogReport, RootCauseReport};

    fn log_update(retries: u32) -> PartialUpdate {
        PartialUpdate::new(Stage::LogAnalysis)
            .with(FieldValue::LogAnalysisResults(LogAnalysisResults {
                report: LogReport::default(),
                attempts: retries + 1,
                error: None,
            }))
            .with(FieldValue::RetryCount(retries))
    }

    fn knowledge_update() -> PartialUpdate {
        PartialUpdate::new(Stage::KnowledgeLookup).with(FieldValue::KnowledgeLookupResults(
            KnowledgeLookupResults {
                report: KnowledgeReport::default(),
                error: None,
            },
        ))
    }

    fn root_cause_update() -> PartialUpdate {
        PartialUpdate::new(Stage::RootCause).with(FieldValue::RootCauseResults(RootCauseResults {
            report: RootCauseReport {
                confidence: 0.9,
                ..RootCauseReport::default()
            },
            error: None,
        }))
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = IncidentState::new("Payment API down");
        assert_eq!(state.raw_alert, "Payment API down");
        assert_eq!(state.retry_count, 0);
        assert!(state.service.is_none());
        assert!(state.completed_stages.is_empty());
        assert_eq!(state.service_name(), UNKNOWN_SERVICE);
        assert_eq!(state.description_text(), "Payment API down");
    }

    #[test]
    fn test_merge_analysis_round() {
        let state = IncidentState::new("alert");
        let next = state
            .merge(&[root_cause_update(), log_update(2), knowledge_update()])
            .unwrap();
        assert!(next.analyses_complete());
        assert_eq!(next.retry_count, 2);
        // The original is untouched.
        assert!(!state.analyses_complete());
    }

    #[test]
    fn test_merge_rejects_write_outside_write_set() {
        let state = IncidentState::new("alert");
        let rogue = PartialUpdate::new(Stage::Coordinator).with(FieldValue::Decision(Verdict::Mitigation));
        let err = state.merge(&[rogue]).unwrap_err();
        assert_eq!(
            err,
            ContractViolation::WriteOutsideWriteSet {
                stage: Stage::Coordinator,
                field: Field::Decision
            }
        );
    }

    #[test]
    fn test_merge_rejects_engine_owned_field() {
        let state = IncidentState::new("alert");
        let rogue = PartialUpdate::new(Stage::Decision).with(FieldValue::Errors(vec![]));
        assert!(matches!(
            state.merge(&[rogue]),
            Err(ContractViolation::EngineOwnedField { field: Field::Errors, .. })
        ));
    }

    #[test]
    fn test_merge_rejects_second_write() {
        let state = IncidentState::new("alert").merge(&[knowledge_update()]).unwrap();
        assert!(matches!(
            state.merge(&[knowledge_update()]),
            Err(ContractViolation::DuplicateWrite { .. })
        ));
        // Twice within one round as well.
        let fresh = IncidentState::new("alert");
        assert!(fresh.merge(&[knowledge_update(), knowledge_update()]).is_err());
    }

    #[test]
    fn test_merge_rejects_decreasing_retry_count() {
        let mut state = IncidentState::new("alert");
        state.retry_count = 2;
        let update = PartialUpdate::new(Stage::LogAnalysis).with(FieldValue::RetryCount(1));
        assert!(matches!(
            state.merge(&[update]),
            Err(ContractViolation::RetryCountDecreased { from: 2, to: 1, .. })
        ));
    }

    #[test]
    fn test_merge_failure_is_atomic() {
        let state = IncidentState::new("alert");
        let rogue = PartialUpdate::new(Stage::RootCause).with(FieldValue::Service("x".into()));
        assert!(state.merge(&[knowledge_update(), rogue]).is_err());
        assert!(state.knowledge_lookup_results.is_none());
    }

    #[test]
    fn test_notifications_accumulate() {
        use triage_core::types::{NotificationKind, NotifyStatus};
        let record = |stage| NotificationRecord {
            stage,
            kind: NotificationKind::IncidentAlert,
            status: NotifyStatus::sent(),
        };
        let state = IncidentState::new("alert")
            .merge(&[PartialUpdate::new(Stage::Trigger)
                .with(FieldValue::Notifications(vec![record(Stage::Trigger)]))])
            .unwrap()
            .merge(&[PartialUpdate::new(Stage::Escalation)
                .with(FieldValue::Notifications(vec![record(Stage::Escalation)]))])
            .unwrap();
        assert_eq!(state.notifications.len(), 2);
    }

    #[test]
    fn test_record_round_is_canonical() {
        let mut state = IncidentState::new("alert");
        state.record_round(
            &[Stage::RootCause, Stage::LogAnalysis, Stage::KnowledgeLookup],
            &[
                StageFault::recoverable(Stage::RootCause, "ai down"),
                StageFault::recoverable(Stage::KnowledgeLookup, "kb down"),
            ],
        );
        assert_eq!(state.completed_stages, Stage::ANALYSIS.to_vec());
        assert_eq!(state.errors[0].stage, Stage::KnowledgeLookup);
        assert_eq!(state.errors[1].stage, Stage::RootCause);

        // Ordered-set union: a repeated stage is not duplicated.
        state.record_round(&[Stage::LogAnalysis], &[]);
        assert_eq!(state.completed_stages.len(), 3);
    }

    #[test]
    fn test_flat_map_keys() {
        let map = IncidentState::new("alert").to_flat_map();
        assert_eq!(map["raw_alert"], serde_json::json!("alert"));
        assert_eq!(map["retry_count"], serde_json::json!(0));
        assert!(map["decision"].is_null());
        assert!(map.contains_key("completed_stages"));
        assert!(map.contains_key("incident_id"));
    }
}
