use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use triage_agents::{build_ai_analyzer, build_notifier, KnowledgeBase, PatternLogAnalyzer};
use triage_core::config::{AppConfig, WorkflowConfig};
use triage_core::error::{CollaboratorError, Result, TriageError};
use triage_core::traits::{AiAnalyzer, CollaboratorResult, KnowledgeSearcher, LogAnalyzer, Notifier};
use triage_core::types::{NotificationKind, NotificationRecord, NotifyStatus, Stage, StageFault};

use crate::stages;
use crate::state::{IncidentState, PartialUpdate};

/// What a stage hands back to the engine: its field writes plus any faults
/// it caught on the way.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub update: PartialUpdate,
    pub faults: Vec<StageFault>,
}

impl StageOutput {
    pub fn new(update: PartialUpdate) -> Self {
        Self {
            update,
            faults: Vec::new(),
        }
    }

    pub fn with_fault(mut self, fault: StageFault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn has_fatal_fault(&self) -> bool {
        self.faults.iter().any(|f| !f.recoverable)
    }
}

/// One processing step of the workflow.
///
/// A handler reads the state and returns an update restricted to its
/// stage's write-set. It never routes and never fails: collaborator errors
/// are recorded in its result block and reported as faults.
pub trait StageHandler: Send + Sync + 'static {
    fn stage(&self) -> Stage;

    fn run<'a>(&'a self, state: &'a IncidentState) -> BoxFuture<'a, StageOutput>;
}

/// The external systems stages talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub log_analyzer: Arc<dyn LogAnalyzer>,
    pub knowledge: Arc<dyn KnowledgeSearcher>,
    pub ai: Arc<dyn AiAnalyzer>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn new(
        log_analyzer: Arc<dyn LogAnalyzer>,
        knowledge: Arc<dyn KnowledgeSearcher>,
        ai: Arc<dyn AiAnalyzer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            log_analyzer,
            knowledge,
            ai,
            notifier,
        }
    }

    /// Reference collaborators selected by the configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(log_analyzer(config)),
            Arc::new(KnowledgeBase::builtin()),
            build_ai_analyzer(&config.ai),
            build_notifier(&config.notifier),
        )
    }
}

fn log_analyzer(config: &AppConfig) -> PatternLogAnalyzer {
    match config.log_analyzer.latency_ms {
        0 => PatternLogAnalyzer::new(),
        ms => PatternLogAnalyzer::new().with_latency(Duration::from_millis(ms)),
    }
}

/// Stage handlers by stage.
#[derive(Clone, Default)]
pub struct StageRegistry {
    handlers: HashMap<Stage, Arc<dyn StageHandler>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The nine standard stages wired to `collaborators`.
    pub fn standard(collaborators: &Collaborators, config: &WorkflowConfig) -> Self {
        let timeout = Duration::from_secs(config.collaborator_timeout_secs);
        let mut registry = Self::new();
        registry.register(Arc::new(stages::Trigger::new(
            collaborators.ai.clone(),
            collaborators.notifier.clone(),
            timeout,
        )));
        registry.register(Arc::new(stages::LogAnalysis::new(
            collaborators.log_analyzer.clone(),
            config,
        )));
        registry.register(Arc::new(stages::KnowledgeLookup::new(
            collaborators.knowledge.clone(),
            timeout,
        )));
        registry.register(Arc::new(stages::RootCause::new(
            collaborators.ai.clone(),
            timeout,
        )));
        registry.register(Arc::new(stages::Coordinator));
        registry.register(Arc::new(stages::Decision::new(config.clone())));
        registry.register(Arc::new(stages::Mitigation::new(
            collaborators.notifier.clone(),
            timeout,
        )));
        registry.register(Arc::new(stages::Escalation::new(
            collaborators.notifier.clone(),
            timeout,
        )));
        registry.register(Arc::new(stages::Communicator));
        registry
    }

    /// Register a handler, replacing any existing one for its stage.
    pub fn register(&mut self, handler: Arc<dyn StageHandler>) {
        self.handlers.insert(handler.stage(), handler);
    }

    pub fn get(&self, stage: Stage) -> Result<Arc<dyn StageHandler>> {
        self.handlers
            .get(&stage)
            .cloned()
            .ok_or(TriageError::StageNotRegistered(stage))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Bound a collaborator call; an elapsed deadline becomes
/// [`CollaboratorError::Timeout`].
pub async fn call_with_timeout<T, F>(
    collaborator: &str,
    timeout: Duration,
    call: F,
) -> CollaboratorResult<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(collaborator, timeout_secs = timeout.as_secs(), "Collaborator call timed out");
            Err(CollaboratorError::Timeout {
                collaborator: collaborator.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}

/// Send a notification under the collaborator deadline and record the
/// outcome. Delivery failure is never an error.
pub async fn send_notification(
    notifier: &dyn Notifier,
    stage: Stage,
    kind: NotificationKind,
    payload: serde_json::Value,
    timeout: Duration,
) -> NotificationRecord {
    let status = match tokio::time::timeout(timeout, notifier.notify(kind, payload)).await {
        Ok(status) => status,
        Err(_) => NotifyStatus::failed(format!(
            "notifier timed out after {}s",
            timeout.as_secs()
        )),
    };
    if let Some(ref error) = status.error {
        warn!(stage = %stage, kind = kind.as_str(), error = %error, "Notification not delivered");
    }
    NotificationRecord {
        stage,
        kind,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_test_utils::{
        knowledge_report, RecordingNotifier, ScriptedAiAnalyzer, ScriptedLogAnalyzer,
        FixedKnowledgeSearcher, anomaly_report,
    };

    fn collaborators() -> Collaborators {
        Collaborators::new(
            Arc::new(ScriptedLogAnalyzer::always(anomaly_report())),
            Arc::new(FixedKnowledgeSearcher::returning(knowledge_report(3))),
            Arc::new(ScriptedAiAnalyzer::confident(0.92)),
            Arc::new(RecordingNotifier::new()),
        )
    }

    #[test]
    fn test_standard_registry_has_every_stage() {
        let registry = StageRegistry::standard(&collaborators(), &WorkflowConfig::default());
        assert_eq!(registry.len(), Stage::ALL.len());
        for stage in Stage::ALL {
            assert_eq!(registry.get(stage).unwrap().stage(), stage);
        }
    }

    #[test]
    fn test_missing_stage_is_an_error() {
        let registry = StageRegistry::new();
        assert!(matches!(
            registry.get(Stage::Decision),
            Err(TriageError::StageNotRegistered(Stage::Decision))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_with_timeout_elapses() {
        let result: CollaboratorResult<()> = call_with_timeout(
            "log_analyzer",
            Duration::from_secs(1),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "log_analyzer timed out after 1s");
    }

    #[tokio::test]
    async fn test_call_with_timeout_passes_errors_through() {
        let result: CollaboratorResult<()> = call_with_timeout(
            "knowledge_searcher",
            Duration::from_secs(1),
            async { Err(CollaboratorError::malformed("knowledge_searcher", "bad json")) },
        )
        .await;
        assert!(matches!(result, Err(CollaboratorError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_send_notification_records_failure() {
        let notifier = RecordingNotifier::failing("webhook down");
        let record = send_notification(
            &notifier,
            Stage::Escalation,
            NotificationKind::EscalationAlert,
            serde_json::json!({}),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(record.stage, Stage::Escalation);
        assert!(!record.status.sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_log_analyzer_latency() {
        let mut config = AppConfig::default();
        config.log_analyzer.latency_ms = 1_000;
        let slow = Collaborators::from_config(&config);
        let started = tokio::time::Instant::now();
        let report = slow.log_analyzer.analyze("Payment API", "database timeout").await.unwrap();
        let elapsed = started.elapsed();
        assert!(report.anomalies_found);
        assert!(elapsed >= Duration::from_millis(800), "{:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(1_200), "{:?}", elapsed);

        let fast = Collaborators::from_config(&AppConfig::default());
        let started = tokio::time::Instant::now();
        fast.log_analyzer.analyze("Payment API", "database timeout").await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
