pub mod ai;
pub mod knowledge;
pub mod log_analyzer;
pub mod notifier;

pub use ai::{build_ai_analyzer, GeminiAnalyzer, HeuristicAnalyzer};
pub use knowledge::{HistoricalIncident, KnowledgeBase};
pub use log_analyzer::PatternLogAnalyzer;
pub use notifier::{build_notifier, LogNotifier, WebhookNotifier};
