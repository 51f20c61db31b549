use futures::future::BoxFuture;

use crate::error::CollaboratorError;
use crate::results::{KnowledgeReport, LogAnalysisResults, LogReport, ParsedAlert, RootCauseReport};
use crate::types::{NotificationKind, NotifyStatus};

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Scans service logs for anomalies.
pub trait LogAnalyzer: Send + Sync + 'static {
    /// Analyze logs for a service. A report with `anomalies_found == false`
    /// is a definitive answer; an `Err` is a failure to answer.
    fn analyze(
        &self,
        service: &str,
        description: &str,
    ) -> BoxFuture<'_, CollaboratorResult<LogReport>>;
}

/// Looks up similar historical incidents.
pub trait KnowledgeSearcher: Send + Sync + 'static {
    fn search(
        &self,
        service: &str,
        description: &str,
    ) -> BoxFuture<'_, CollaboratorResult<KnowledgeReport>>;
}

/// Alert parsing and root-cause inference.
pub trait AiAnalyzer: Send + Sync + 'static {
    /// Extract service, severity, and description from raw alert text.
    fn parse(&self, raw_alert: &str) -> BoxFuture<'_, CollaboratorResult<ParsedAlert>>;

    /// Infer a root cause. `log_results` is `None` when log analysis has not
    /// been merged yet (it runs in the same parallel group).
    fn analyze<'a>(
        &'a self,
        service: &'a str,
        description: &'a str,
        log_results: Option<&'a LogAnalysisResults>,
    ) -> BoxFuture<'a, CollaboratorResult<RootCauseReport>>;
}

/// Delivers templated notifications. Never fails its caller.
pub trait Notifier: Send + Sync + 'static {
    fn notify(
        &self,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> BoxFuture<'_, NotifyStatus>;
}
