use std::collections::BTreeSet;

use futures::future::BoxFuture;
use tracing::debug;

use triage_core::results::{KnowledgeReport, SimilarIncident};
use triage_core::traits::{CollaboratorResult, KnowledgeSearcher};

/// A resolved incident from the historical record.
#[derive(Debug, Clone)]
pub struct HistoricalIncident {
    pub incident_id: String,
    pub service: String,
    pub anomaly: String,
    pub root_cause: String,
    pub solution: String,
    pub keywords: Vec<String>,
}

impl HistoricalIncident {
    fn new(
        incident_id: &str,
        service: &str,
        anomaly: &str,
        root_cause: &str,
        solution: &str,
        keywords: &[&str],
    ) -> Self {
        Self {
            incident_id: incident_id.into(),
            service: service.into(),
            anomaly: anomaly.into(),
            root_cause: root_cause.into(),
            solution: solution.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Minimum share of a record's keywords that must match.
const SIMILARITY_CUTOFF: f64 = 0.3;
const MAX_MATCHES: usize = 5;
const MAX_SOLUTIONS: usize = 3;

/// Keyword search over a fixed set of historical incidents.
pub struct KnowledgeBase {
    incidents: Vec<HistoricalIncident>,
}

impl KnowledgeBase {
    pub fn new(incidents: Vec<HistoricalIncident>) -> Self {
        Self { incidents }
    }

    /// The built-in incident history.
    pub fn builtin() -> Self {
        Self::new(vec![
            HistoricalIncident::new(
                "INC-001",
                "Payment API",
                "Database connection timeout",
                "Traffic spike exceeded connection pool limits",
                "Scale database connection pool from 50 to 100, restart service",
                &["database", "timeout", "connection", "pool"],
            ),
            HistoricalIncident::new(
                "INC-002",
                "Auth Service",
                "Memory leak",
                "Session objects not being garbage collected",
                "Deploy memory leak fix, restart service instances",
                &["memory", "leak", "session", "garbage"],
            ),
            HistoricalIncident::new(
                "INC-003",
                "Payment API",
                "High error rate",
                "Database query timeout due to missing index",
                "Add database index, optimize queries",
                &["error", "database", "query", "timeout"],
            ),
            HistoricalIncident::new(
                "INC-004",
                "Load Balancer",
                "Uneven traffic distribution",
                "Sticky session configuration issue",
                "Reconfigure load balancer session affinity",
                &["load", "balancer", "traffic", "distribution"],
            ),
            HistoricalIncident::new(
                "INC-005",
                "Auth Service",
                "Slow response time",
                "Cache invalidation storm",
                "Implement cache warming strategy",
                &["cache", "slow", "response", "performance"],
            ),
            HistoricalIncident::new(
                "INC-006",
                "Payment API",
                "Connection pool exhaustion",
                "Connection leak in payment processor",
                "Fix connection leak, increase pool size",
                &["connection", "pool", "exhaustion", "leak"],
            ),
            HistoricalIncident::new(
                "INC-007",
                "API Gateway",
                "Rate limit exceeded",
                "DDoS attack from single IP range",
                "Block malicious IPs, increase rate limits",
                &["rate", "limit", "ddos", "attack"],
            ),
            HistoricalIncident::new(
                "INC-008",
                "Database",
                "Replication lag",
                "Large batch update blocking replication",
                "Optimize batch updates, increase replication capacity",
                &["database", "replication", "lag", "batch"],
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Find similar incidents and summarise their solutions.
    pub fn lookup(&self, service: &str, description: &str) -> KnowledgeReport {
        let query = query_keywords(service, description);

        let mut similar: Vec<SimilarIncident> = self
            .incidents
            .iter()
            .filter_map(|incident| {
                let matched: Vec<String> = incident
                    .keywords
                    .iter()
                    .filter(|k| query.contains(k.as_str()))
                    .cloned()
                    .collect();
                if matched.is_empty() || incident.keywords.is_empty() {
                    return None;
                }
                let score = matched.len() as f64 / incident.keywords.len() as f64;
                (score > SIMILARITY_CUTOFF).then(|| SimilarIncident {
                    incident_id: incident.incident_id.clone(),
                    service: incident.service.clone(),
                    similarity_score: round2(score),
                    root_cause: incident.root_cause.clone(),
                    solution: incident.solution.clone(),
                    keywords_matched: matched,
                })
            })
            .collect();

        // Stable sort keeps record order among equal scores.
        similar.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        similar.truncate(MAX_MATCHES);

        let mut recommended_solutions: Vec<String> = Vec::new();
        for incident in similar.iter().take(MAX_SOLUTIONS) {
            if !recommended_solutions.contains(&incident.solution) {
                recommended_solutions.push(incident.solution.clone());
            }
        }

        let top: Vec<f64> = similar
            .iter()
            .take(MAX_SOLUTIONS)
            .map(|i| i.similarity_score)
            .collect();
        let confidence = if top.is_empty() {
            0.0
        } else {
            round2(top.iter().sum::<f64>() / top.len() as f64)
        };

        KnowledgeReport {
            solutions_found: !recommended_solutions.is_empty(),
            similar_incidents: similar,
            recommended_solutions,
            confidence,
        }
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

fn query_keywords(service: &str, description: &str) -> BTreeSet<String> {
    let mut words: BTreeSet<String> = description
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    words.insert(service.to_lowercase());
    words
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl KnowledgeSearcher for KnowledgeBase {
    fn search(
        &self,
        service: &str,
        description: &str,
    ) -> BoxFuture<'_, CollaboratorResult<KnowledgeReport>> {
        let service = service.to_string();
        let description = description.to_string();
        Box::pin(async move {
            let report = self.lookup(&service, &description);
            debug!(
                service = %service,
                matches = report.similar_incidents.len(),
                "Knowledge lookup complete"
            );
            Ok(report)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_eight_records() {
        assert_eq!(KnowledgeBase::builtin().len(), 8);
    }

    #[test]
    fn test_database_timeout_matches() {
        let kb = KnowledgeBase::builtin();
        let report = kb.lookup(
            "Payment API",
            "Payment API experiencing database connection timeouts and high error rates",
        );
        // "timeouts" does not match "timeout"; database + connection do.
        let ids: Vec<&str> = report
            .similar_incidents
            .iter()
            .map(|i| i.incident_id.as_str())
            .collect();
        assert!(ids.contains(&"INC-001"));
        assert!(report.solutions_found);
        assert!(report.confidence > 0.3);
        assert!(report.similar_incidents.len() <= MAX_MATCHES);
    }

    #[test]
    fn test_scores_sorted_descending() {
        let kb = KnowledgeBase::builtin();
        let report = kb.lookup("Payment API", "database timeout connection pool error query");
        let scores: Vec<f64> = report
            .similar_incidents
            .iter()
            .map(|i| i.similarity_score)
            .collect();
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(scores, sorted);
        assert_eq!(report.similar_incidents[0].incident_id, "INC-001");
        assert_eq!(report.similar_incidents[0].similarity_score, 1.0);
    }

    #[test]
    fn test_single_keyword_below_cutoff() {
        let kb = KnowledgeBase::builtin();
        // One of four keywords is 0.25, below the cutoff.
        let report = kb.lookup("Billing", "cache");
        assert!(report.similar_incidents.is_empty());
        assert!(!report.solutions_found);
        assert_eq!(report.confidence, 0.0);
    }

    #[test]
    fn test_solutions_deduplicated() {
        let incidents = vec![
            HistoricalIncident::new("A", "svc", "x", "rc", "restart", &["disk", "full"]),
            HistoricalIncident::new("B", "svc", "x", "rc", "restart", &["disk", "slow"]),
        ];
        let report = KnowledgeBase::new(incidents).lookup("svc", "disk full slow");
        assert_eq!(report.similar_incidents.len(), 2);
        assert_eq!(report.recommended_solutions, vec!["restart".to_string()]);
    }

    #[tokio::test]
    async fn test_search_trait() {
        let kb = KnowledgeBase::builtin();
        let report = kb.search("Database", "replication lag").await.unwrap();
        assert_eq!(report.similar_incidents[0].incident_id, "INC-008");
    }
}
