//! Scripted collaborators and fixtures shared by the triage test suites.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use triage_core::config::AppConfig;
use triage_core::error::CollaboratorError;
use triage_core::results::{
    Anomaly, KnowledgeReport, LogAnalysisResults, LogReport, ParsedAlert, RootCauseReport,
    SimilarIncident,
};
use triage_core::traits::{AiAnalyzer, CollaboratorResult, KnowledgeSearcher, LogAnalyzer, Notifier};
use triage_core::types::{NotificationKind, NotifyStatus, Severity};
use triage_core::WorkflowConfig;

// ── Fixtures ─────────────────────────────────────────────────────

pub const PAYMENT_ALERT: &str = "Payment API database timeout";

pub fn database_timeout_anomaly() -> Anomaly {
    Anomaly {
        kind: "database_timeout".into(),
        severity: Severity::High,
        pattern: "Connection timeout after 30s".into(),
        frequency: 15,
        time_range: "10:25-10:30".into(),
    }
}

/// A log report with one database timeout anomaly.
pub fn anomaly_report() -> LogReport {
    LogReport {
        anomalies_found: true,
        anomalies: vec![database_timeout_anomaly()],
        confidence: 0.85,
        log_patterns: vec!["ERROR: Payment API - Connection timeout after 30s".into()],
    }
}

/// A definitive "nothing found" log report.
pub fn empty_log_report() -> LogReport {
    LogReport {
        anomalies_found: false,
        anomalies: vec![],
        confidence: 0.3,
        log_patterns: vec![],
    }
}

/// A knowledge report with `count` similar incidents.
pub fn knowledge_report(count: usize) -> KnowledgeReport {
    let similar_incidents: Vec<SimilarIncident> = (0..count)
        .map(|i| SimilarIncident {
            incident_id: format!("INC-00{}", i + 1),
            service: "Payment API".into(),
            similarity_score: 0.75,
            root_cause: "Connection pool exhausted".into(),
            solution: "Scale database connection pool from 50 to 100, restart service".into(),
            keywords_matched: vec!["database".into(), "timeout".into()],
        })
        .collect();
    KnowledgeReport {
        solutions_found: count > 0,
        recommended_solutions: similar_incidents
            .first()
            .map(|i| vec![i.solution.clone()])
            .unwrap_or_default(),
        confidence: if count > 0 { 0.75 } else { 0.0 },
        similar_incidents,
    }
}

pub fn root_cause_report(confidence: f64) -> RootCauseReport {
    RootCauseReport {
        root_cause: "Database connection pool exhausted".into(),
        confidence,
        contributing_factors: vec!["Traffic spike".into()],
        recommendations: vec!["Scale database connection pool from 50 to 100".into()],
        urgency: Severity::High,
        estimated_resolution: "15 minutes".into(),
    }
}

pub fn parsed_alert(service: &str) -> ParsedAlert {
    ParsedAlert {
        service: service.into(),
        severity: Severity::High,
        description: PAYMENT_ALERT.into(),
    }
}

pub fn unavailable(collaborator: &str) -> CollaboratorError {
    CollaboratorError::unavailable(collaborator, "connection refused")
}

/// Workflow settings used by tests: defaults, with no backoff.
pub fn workflow_config() -> WorkflowConfig {
    WorkflowConfig {
        retry_backoff_ms: 0,
        ..WorkflowConfig::default()
    }
}

/// Write `content` to a `triage.toml` inside a fresh temp dir.
/// Keep the returned dir alive for as long as the file is needed.
pub fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("triage.toml");
    std::fs::write(&path, content).expect("write config");
    (dir, path)
}

/// Parse a TOML config string, panicking on error.
pub fn parse_config(content: &str) -> AppConfig {
    toml::from_str(content).expect("valid test config")
}

async fn maybe_delay(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

// ── Log analyzer ─────────────────────────────────────────────────

/// Log analyzer that answers from a script. Once the script is used up the
/// last entry repeats.
pub struct ScriptedLogAnalyzer {
    script: Mutex<VecDeque<CollaboratorResult<LogReport>>>,
    last: Mutex<Option<CollaboratorResult<LogReport>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedLogAnalyzer {
    pub fn new(script: Vec<CollaboratorResult<LogReport>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(report: LogReport) -> Self {
        Self::new(vec![Ok(report)])
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> CollaboratorResult<LogReport> {
        let mut script = self.script.lock().expect("script lock");
        let mut last = self.last.lock().expect("last lock");
        match script.pop_front() {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last.clone().unwrap_or_else(|| Ok(empty_log_report())),
        }
    }
}

impl LogAnalyzer for ScriptedLogAnalyzer {
    fn analyze(
        &self,
        _service: &str,
        _description: &str,
    ) -> BoxFuture<'_, CollaboratorResult<LogReport>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            maybe_delay(self.delay).await;
            self.next_response()
        })
    }
}

// ── Knowledge searcher ───────────────────────────────────────────

pub struct FixedKnowledgeSearcher {
    response: CollaboratorResult<KnowledgeReport>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FixedKnowledgeSearcher {
    pub fn returning(report: KnowledgeReport) -> Self {
        Self {
            response: Ok(report),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            response: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KnowledgeSearcher for FixedKnowledgeSearcher {
    fn search(
        &self,
        _service: &str,
        _description: &str,
    ) -> BoxFuture<'_, CollaboratorResult<KnowledgeReport>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            maybe_delay(self.delay).await;
            self.response.clone()
        })
    }
}

// ── AI analyzer ──────────────────────────────────────────────────

pub struct ScriptedAiAnalyzer {
    parse: CollaboratorResult<ParsedAlert>,
    analysis: CollaboratorResult<RootCauseReport>,
    delay: Option<Duration>,
    parse_calls: AtomicUsize,
    analyze_calls: AtomicUsize,
    saw_log_results: AtomicUsize,
}

impl ScriptedAiAnalyzer {
    pub fn new(
        parse: CollaboratorResult<ParsedAlert>,
        analysis: CollaboratorResult<RootCauseReport>,
    ) -> Self {
        Self {
            parse,
            analysis,
            delay: None,
            parse_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            saw_log_results: AtomicUsize::new(0),
        }
    }

    /// Parses every alert as the Payment API and diagnoses with `confidence`.
    pub fn confident(confidence: f64) -> Self {
        Self::new(Ok(parsed_alert("Payment API")), Ok(root_cause_report(confidence)))
    }

    /// Delays `analyze` only; parsing stays immediate.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn parse_calls(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    /// How many `analyze` calls received log analysis results.
    pub fn calls_with_log_results(&self) -> usize {
        self.saw_log_results.load(Ordering::SeqCst)
    }
}

impl AiAnalyzer for ScriptedAiAnalyzer {
    fn parse(&self, _raw_alert: &str) -> BoxFuture<'_, CollaboratorResult<ParsedAlert>> {
        Box::pin(async move {
            self.parse_calls.fetch_add(1, Ordering::SeqCst);
            self.parse.clone()
        })
    }

    fn analyze<'a>(
        &'a self,
        _service: &'a str,
        _description: &'a str,
        log_results: Option<&'a LogAnalysisResults>,
    ) -> BoxFuture<'a, CollaboratorResult<RootCauseReport>> {
        Box::pin(async move {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            if log_results.is_some() {
                self.saw_log_results.fetch_add(1, Ordering::SeqCst);
            }
            maybe_delay(self.delay).await;
            self.analysis.clone()
        })
    }
}

// ── Notifier ─────────────────────────────────────────────────────

/// Records every notification; optionally reports delivery failure.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(NotificationKind, Value)>>,
    fail_with: Option<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(error.into()),
        }
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn payloads(&self) -> Vec<(NotificationKind, Value)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NotificationKind, payload: Value) -> BoxFuture<'_, NotifyStatus> {
        Box::pin(async move {
            self.sent.lock().expect("sent lock").push((kind, payload));
            match &self.fail_with {
                Some(error) => NotifyStatus::failed(error.clone()),
                None => NotifyStatus::sent(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_log_analyzer_repeats_last() {
        let analyzer = ScriptedLogAnalyzer::new(vec![Ok(empty_log_report()), Ok(anomaly_report())]);
        assert!(!analyzer.analyze("s", "d").await.unwrap().anomalies_found);
        assert!(analyzer.analyze("s", "d").await.unwrap().anomalies_found);
        assert!(analyzer.analyze("s", "d").await.unwrap().anomalies_found);
        assert_eq!(analyzer.calls(), 3);
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::failing("smtp down");
        let status = notifier
            .notify(NotificationKind::EscalationAlert, serde_json::json!({}))
            .await;
        assert!(!status.sent);
        assert_eq!(notifier.kinds(), vec![NotificationKind::EscalationAlert]);
    }

    #[test]
    fn test_knowledge_fixture_counts() {
        assert_eq!(knowledge_report(3).similar_incidents.len(), 3);
        assert!(!knowledge_report(0).solutions_found);
    }

    #[test]
    fn test_write_config() {
        let (_dir, path) = write_config("[workflow]\nmax_retries = 1\n");
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.workflow.max_retries, 1);
    }
}
