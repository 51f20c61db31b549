use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use triage_core::results::{Anomaly, LogReport};
use triage_core::traits::{CollaboratorResult, LogAnalyzer};
use triage_core::types::Severity;

/// Keyword rules: (trigger words, anomaly type, severity, pattern, frequency, window).
const RULES: &[(&[&str], &str, Severity, &str, u32, &str)] = &[
    (
        &["timeout", "database"],
        "database_timeout",
        Severity::High,
        "Connection timeout after 30s",
        15,
        "10:25-10:30",
    ),
    (
        &["memory", "leak"],
        "memory_leak",
        Severity::High,
        "Memory usage increasing continuously",
        8,
        "10:20-10:30",
    ),
    (
        &["error", "failure"],
        "error_spike",
        Severity::Medium,
        "Error rate above threshold",
        25,
        "10:25-10:30",
    ),
    (
        &["network", "connection"],
        "network_issue",
        Severity::Medium,
        "Connection failures detected",
        12,
        "10:28-10:30",
    ),
];

const MAX_LOG_PATTERNS: usize = 5;

/// Simulated log analyzer that matches incident keywords against known
/// anomaly signatures.
pub struct PatternLogAnalyzer {
    latency: Option<Duration>,
}

impl PatternLogAnalyzer {
    pub fn new() -> Self {
        Self { latency: None }
    }

    /// Simulate a log backend round trip of roughly `latency` (±20% jitter).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Run detection synchronously.
    pub fn detect(&self, service: &str, description: &str) -> LogReport {
        let text = description.to_lowercase();
        let anomalies: Vec<Anomaly> = RULES
            .iter()
            .filter(|(words, ..)| words.iter().any(|w| text.contains(w)))
            .map(|(_, kind, severity, pattern, frequency, window)| Anomaly {
                kind: (*kind).to_string(),
                severity: *severity,
                pattern: (*pattern).to_string(),
                frequency: *frequency,
                time_range: (*window).to_string(),
            })
            .collect();

        let log_patterns = log_patterns(service, &anomalies);
        let anomalies_found = !anomalies.is_empty();

        LogReport {
            anomalies_found,
            confidence: if anomalies_found { 0.85 } else { 0.3 },
            anomalies,
            log_patterns,
        }
    }
}

impl Default for PatternLogAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn log_patterns(service: &str, anomalies: &[Anomaly]) -> Vec<String> {
    let mut patterns = Vec::new();
    for anomaly in anomalies {
        let lines: [&str; 2] = match anomaly.kind.as_str() {
            "database_timeout" => ["ERROR: {} - Connection timeout after 30s", "WARN: {} - Connection pool exhausted"],
            "memory_leak" => ["WARN: {} - Memory usage at 95%", "ERROR: {} - OutOfMemoryError"],
            "error_spike" => ["ERROR: {} - Request failed with 500", "ERROR: {} - Internal server error"],
            "network_issue" => ["ERROR: {} - Connection refused", "WARN: {} - Network timeout"],
            _ => continue,
        };
        patterns.extend(lines.iter().map(|l| l.replace("{}", service)));
    }
    patterns.truncate(MAX_LOG_PATTERNS);
    patterns
}

impl LogAnalyzer for PatternLogAnalyzer {
    fn analyze(
        &self,
        service: &str,
        description: &str,
    ) -> BoxFuture<'_, CollaboratorResult<LogReport>> {
        let service = service.to_string();
        let description = description.to_string();
        Box::pin(async move {
            if let Some(latency) = self.latency {
                let jitter = 0.8 + rand::random::<f64>() * 0.4;
                tokio::time::sleep(latency.mul_f64(jitter)).await;
            }
            let report = self.detect(&service, &description);
            debug!(
                service = %service,
                anomalies = report.anomalies.len(),
                "Log analysis complete"
            );
            Ok(report)
        })
    }
}
