pub mod ai;
pub mod analytics;
pub mod arbitrage;
pub mod config;
pub mod error;
pub mod metrics;
pub mod simulation;
pub mod utils;

// Re-export the types most callers wire together.
pub use analytics::{FeedbackRecorder, RouteStatsStore};
pub use arbitrage::{
    Decision, ExecutionAdapter, ExecutionPath, ExecutionResult, MarketRegime, Opportunity,
    Orchestrator, Scorer, ScorerConfig,
};
pub use config::Config;
pub use error::{ArbError, Result};
