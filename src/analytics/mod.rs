//! Feedback side of the engine: per-route rolling statistics and the
//! recorder that folds realized execution outcomes back into them.

pub mod recorder;
pub mod route_stats;

pub use recorder::FeedbackRecorder;
pub use route_stats::{RouteStats, RouteStatsStore};
