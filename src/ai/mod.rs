//! Learned success-probability predictor seam.
//!
//! The engine only owns the interface: feature extraction from a candidate
//! plus ambient state, and the trait a trained model must satisfy. Absence
//! or failure of a predictor always falls back to the scorer's heuristic.
//! Checkpoint formats are the implementation's concern, behind this trait.

use crate::arbitrage::opportunity::{ExecutionPath, MarketRegime, Opportunity, RouteKey};
use crate::analytics::route_stats::RouteStats;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Model inputs derived from one candidate, the current regime, and the
/// candidate's per-route history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub edge_bps: f64,
    pub notional: f64,
    /// Total estimated cost over gross profit, clamped to [0, 1].
    pub cost_ratio: f64,
    /// Expected slippage over notional.
    pub slippage_ratio: f64,
    pub hop_count: u32,
    pub prior_confidence: f64,
    pub regime_volatility: f64,
    pub regime_gas_percentile: f64,
    pub route_success_rate: f64,
    pub route_profit_capture: f64,
    pub route_samples: u64,
}

impl FeatureVector {
    pub fn from_candidate(
        opportunity: &Opportunity,
        regime: Option<&MarketRegime>,
        route_stats: &RouteStats,
    ) -> Self {
        let gross = opportunity.gross_profit();
        let cost_ratio = if gross > 0.0 {
            (opportunity.costs.total() / gross).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            edge_bps: opportunity.edge_bps,
            notional: opportunity.notional,
            cost_ratio,
            slippage_ratio: if opportunity.notional > 0.0 {
                opportunity.costs.expected_slippage / opportunity.notional
            } else {
                0.0
            },
            hop_count: opportunity.hop_count,
            prior_confidence: opportunity.prior_confidence,
            regime_volatility: regime.map_or(0.5, |r| r.volatility),
            regime_gas_percentile: regime.map_or(0.5, |r| r.gas_percentile),
            route_success_rate: route_stats.success_rate,
            route_profit_capture: route_stats.profit_capture,
            route_samples: route_stats.samples,
        }
    }
}

/// One row of execution history, the unit a predictor retrains from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub opportunity_id: String,
    pub route: RouteKey,
    pub path: ExecutionPath,
    pub success: bool,
    pub realized_profit: f64,
    pub predicted_profit: Option<f64>,
    pub latency_ms: u64,
    pub timed_out: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Interface a trained success-probability model must satisfy.
///
/// Both operations are fallible and both failures are absorbed by the
/// caller: inference failure drops the scorer back to its heuristic for
/// that candidate, retrain failure leaves the last-known model state
/// untouched.
pub trait SuccessPredictor: Send + Sync {
    /// Probability in [0, 1] that executing this candidate succeeds.
    fn predict_success_probability(&self, features: &FeatureVector) -> Result<f64>;

    /// Refit the model from accumulated execution history.
    fn retrain(&self, history: &[ExecutionRecord]) -> Result<()>;

    /// False until the first successful `retrain`; the scorer uses the
    /// heuristic fallback while this is false.
    fn is_trained(&self) -> bool;
}

/// Fixed-probability implementation for tests and dry runs.
pub struct MockPredictor {
    probability: f64,
    trained: std::sync::atomic::AtomicBool,
}

impl MockPredictor {
    pub fn new(probability: f64) -> Self {
        Self {
            probability,
            trained: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn untrained(probability: f64) -> Self {
        Self {
            probability,
            trained: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

impl SuccessPredictor for MockPredictor {
    fn predict_success_probability(&self, _features: &FeatureVector) -> Result<f64> {
        Ok(self.probability)
    }

    fn retrain(&self, history: &[ExecutionRecord]) -> Result<()> {
        log::debug!("MockPredictor retrained on {} records", history.len());
        self.trained.store(true, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.trained.load(std::sync::atomic::Ordering::Relaxed)
    }
}
