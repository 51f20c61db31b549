use futures::future::BoxFuture;

use triage_core::results::{Anomaly, LogAnalysisResults, ParsedAlert, RootCauseReport, UNKNOWN_SERVICE};
use triage_core::traits::{AiAnalyzer, CollaboratorResult};
use triage_core::types::Severity;

use crate::log_analyzer::PatternLogAnalyzer;

/// Maximum characters of alert text kept as the description.
pub const MAX_DESCRIPTION_CHARS: usize = 200;

/// Service name keywords, checked in order.
const SERVICES: &[(&str, &str)] = &[
    ("payment", "Payment API"),
    ("auth", "Auth Service"),
    ("load balancer", "Load Balancer"),
    ("gateway", "API Gateway"),
    ("database", "Database"),
];

struct Diagnosis {
    root_cause: &'static str,
    confidence: f64,
    factors: &'static [&'static str],
    recommendation: &'static str,
    urgency: Severity,
    resolution: &'static str,
}

fn diagnosis_for(anomaly_type: &str) -> Option<Diagnosis> {
    let d = match anomaly_type {
        "database_timeout" => Diagnosis {
            root_cause: "Database connection pool exhausted under peak load",
            confidence: 0.92,
            factors: &["Traffic spike", "Connection pool limit of 50"],
            recommendation: "Scale database connection pool from 50 to 100 and restart service",
            urgency: Severity::High,
            resolution: "15 minutes",
        },
        "memory_leak" => Diagnosis {
            root_cause: "Session objects retained after logout causing heap growth",
            confidence: 0.75,
            factors: &["Unbounded session cache", "Missing eviction policy"],
            recommendation: "Deploy memory leak fix and restart service instances",
            urgency: Severity::High,
            resolution: "45 minutes",
        },
        "error_spike" => Diagnosis {
            root_cause: "Failing downstream dependency propagating errors",
            confidence: 0.7,
            factors: &["Dependency failures", "No circuit breaker"],
            recommendation: "Enable circuit breaker for the failing dependency",
            urgency: Severity::Medium,
            resolution: "30 minutes",
        },
        "network_issue" => Diagnosis {
            root_cause: "Intermittent network connectivity between service tiers",
            confidence: 0.65,
            factors: &["Connection resets", "Routing instability"],
            recommendation: "Restart affected instances and verify network routes",
            urgency: Severity::Medium,
            resolution: "30 minutes",
        },
        _ => return None,
    };
    Some(d)
}

/// Keyword-driven analyzer used when no AI backend is configured.
pub struct HeuristicAnalyzer {
    detector: PatternLogAnalyzer,
}

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self {
            detector: PatternLogAnalyzer::new(),
        }
    }

    pub fn parse_alert(&self, raw_alert: &str) -> ParsedAlert {
        let lower = raw_alert.to_lowercase();

        let service = SERVICES
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, name)| (*name).to_string())
            .unwrap_or_else(|| UNKNOWN_SERVICE.to_string());

        let severity = if lower.contains("critical") {
            Severity::Critical
        } else if lower.contains("high") {
            Severity::High
        } else if lower.contains("low") {
            Severity::Low
        } else {
            Severity::Medium
        };

        ParsedAlert {
            service,
            severity,
            description: truncate_chars(raw_alert.trim(), MAX_DESCRIPTION_CHARS),
        }
    }

    pub fn diagnose(
        &self,
        service: &str,
        description: &str,
        log_results: Option<&LogAnalysisResults>,
    ) -> RootCauseReport {
        let detected;
        let anomalies: &[Anomaly] = match log_results {
            Some(results) if results.anomalies_found() => &results.report.anomalies,
            _ => {
                detected = self.detector.detect(service, description);
                &detected.anomalies
            }
        };

        let best = anomalies
            .iter()
            .filter_map(|a| diagnosis_for(&a.kind))
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        match best {
            Some(d) => RootCauseReport {
                root_cause: d.root_cause.to_string(),
                confidence: d.confidence,
                contributing_factors: d.factors.iter().map(|f| f.to_string()).collect(),
                recommendations: vec![d.recommendation.to_string()],
                urgency: d.urgency,
                estimated_resolution: d.resolution.to_string(),
            },
            None => RootCauseReport {
                root_cause: format!("Unknown root cause for {}", service),
                confidence: 0.5,
                contributing_factors: vec!["No recognised failure signature".into()],
                recommendations: vec!["Manual investigation required".into()],
                urgency: Severity::Medium,
                estimated_resolution: "30 minutes".into(),
            },
        }
    }
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

impl AiAnalyzer for HeuristicAnalyzer {
    fn parse(&self, raw_alert: &str) -> BoxFuture<'_, CollaboratorResult<ParsedAlert>> {
        let parsed = self.parse_alert(raw_alert);
        Box::pin(async move { Ok(parsed) })
    }

    fn analyze<'a>(
        &'a self,
        service: &'a str,
        description: &'a str,
        log_results: Option<&'a LogAnalysisResults>,
    ) -> BoxFuture<'a, CollaboratorResult<RootCauseReport>> {
        Box::pin(async move { Ok(self.diagnose(service, description, log_results)) })
    }
}
