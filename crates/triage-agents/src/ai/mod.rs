pub mod gemini;
pub mod heuristic;

use std::sync::Arc;

use triage_core::config::{AiConfig, AiProvider};
use triage_core::traits::AiAnalyzer;

pub use gemini::GeminiAnalyzer;
pub use heuristic::HeuristicAnalyzer;

/// Create the AI analyzer selected by the configuration.
pub fn build_ai_analyzer(config: &AiConfig) -> Arc<dyn AiAnalyzer> {
    match config.provider {
        AiProvider::Heuristic => Arc::new(HeuristicAnalyzer::new()),
        AiProvider::Gemini => Arc::new(GeminiAnalyzer::from_config(config)),
    }
}
