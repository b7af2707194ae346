//! Opportunity Module
//!
//! Core value types for the scoring and execution pipeline: a candidate
//! price discrepancy ([`Opportunity`]), the scorer's verdict for the best
//! candidate in a batch ([`Decision`]), and the realized outcome of
//! dispatching that decision ([`ExecutionResult`]).
//!
//! All three are plain data. An `Opportunity` is immutable once created;
//! a `Decision` is only ever constructed by the scorer for candidates that
//! cleared every gate, so `net_profit > 0` and `confidence` in [0, 1] hold
//! for every instance that exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Which execution backend a candidate trade routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionPath {
    /// Capital borrowed and repaid within one atomic on-chain transaction.
    FlashLoan,
    /// Simultaneous buy/sell across two exchange venues.
    ExchangeArbitrage,
    /// Single-sided exchange order riding a detected dislocation.
    ExchangeDirectional,
}

impl ExecutionPath {
    /// Every path the dispatcher must have an adapter registered for.
    pub const ALL: [ExecutionPath; 3] = [
        ExecutionPath::FlashLoan,
        ExecutionPath::ExchangeArbitrage,
        ExecutionPath::ExchangeDirectional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPath::FlashLoan => "flash_loan",
            ExecutionPath::ExchangeArbitrage => "exchange_arbitrage",
            ExecutionPath::ExchangeDirectional => "exchange_directional",
        }
    }
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Itemized cost estimate for executing one opportunity, in quote currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Network/gas cost of the transaction(s).
    pub network_cost: f64,
    /// Venue trading fees across all legs.
    pub venue_fee: f64,
    /// Expected slippage against the quoted prices.
    pub expected_slippage: f64,
    /// Bridging cost where the route crosses chains; zero otherwise.
    pub bridging_cost: f64,
}

impl CostEstimate {
    pub fn total(&self) -> f64 {
        self.network_cost + self.venue_fee + self.expected_slippage + self.bridging_cost
    }
}

/// A candidate trade discovered by an upstream quote source.
///
/// Immutable once created. The upstream collaborator is responsible for the
/// raw edge/cost math; this type only carries the result into the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    /// Unique identifier for tracing the candidate through the pipeline.
    pub id: String,
    /// Pair identifier, e.g. "SOL/USDC".
    pub symbol: String,
    /// Which execution backend this candidate routes through.
    pub path: ExecutionPath,
    /// Venue or chain identifier, e.g. "raydium" or "binance".
    pub venue: String,
    /// Reference price on the cheap side.
    pub buy_price: f64,
    /// Reference price on the expensive side.
    pub sell_price: f64,
    /// Price discrepancy between the two sides, in basis points.
    pub edge_bps: f64,
    /// Trade size in quote currency.
    pub notional: f64,
    /// Itemized execution cost estimate.
    pub costs: CostEstimate,
    /// Number of swap/transfer legs in the route.
    pub hop_count: u32,
    /// Caller-supplied prior confidence in [0, 1].
    pub prior_confidence: f64,
    /// Free-form metadata from the quote source.
    pub metadata: HashMap<String, String>,
    /// When the discrepancy was observed.
    pub detected_at: DateTime<Utc>,
}

impl Opportunity {
    /// Profit before costs: notional scaled by the edge.
    pub fn gross_profit(&self) -> f64 {
        self.notional * self.edge_bps / 10_000.0
    }

    /// Key under which this candidate's historical performance is tracked.
    pub fn route_key(&self) -> RouteKey {
        RouteKey {
            symbol: self.symbol.clone(),
            venue: self.venue.clone(),
        }
    }

    /// Checks that the essential fields are sane before scoring.
    pub fn validate(&self) -> bool {
        if self.notional <= 0.0 || self.edge_bps < 0.0 {
            log::error!(
                "[Opportunity {}] Validation failed: non-positive notional or negative edge",
                self.id
            );
            return false;
        }
        if !(0.0..=1.0).contains(&self.prior_confidence) {
            log::error!(
                "[Opportunity {}] Validation failed: prior confidence {} outside [0, 1]",
                self.id,
                self.prior_confidence
            );
            return false;
        }
        true
    }

    /// Fresh opportunity with a generated id and the current timestamp.
    /// Convenience for quote-source collaborators and tests.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        path: ExecutionPath,
        venue: impl Into<String>,
        buy_price: f64,
        sell_price: f64,
        edge_bps: f64,
        notional: f64,
        costs: CostEstimate,
        hop_count: u32,
        prior_confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            path,
            venue: venue.into(),
            buy_price,
            sell_price,
            edge_bps,
            notional,
            costs,
            hop_count,
            prior_confidence,
            metadata: HashMap::new(),
            detected_at: Utc::now(),
        }
    }
}

/// The scorer's output for the single best candidate in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// The winning candidate, carried whole.
    pub opportunity: Opportunity,
    /// Estimated profit net of all costs and hop penalties, quote currency.
    pub net_profit: f64,
    /// Blended confidence in [0, 1].
    pub confidence: f64,
    /// Human-readable acceptance summary.
    pub reason: String,
    /// Final multi-factor score the candidate won the batch with.
    pub score: f64,
    /// Kelly-derived recommended position size, quote currency.
    pub recommended_size: Option<f64>,
}

impl Decision {
    pub fn log_summary(&self) {
        log::info!(
            "[Decision {}] {} via {} on {} | net ${:.2} | confidence {:.3} | score {:.4} | size {} | {}",
            self.opportunity.id,
            self.opportunity.symbol,
            self.opportunity.path,
            self.opportunity.venue,
            self.net_profit,
            self.confidence,
            self.score,
            self.recommended_size
                .map_or("n/a".to_string(), |s| format!("${:.2}", s)),
            self.reason
        );
    }
}

/// Outcome of dispatching a [`Decision`] to an execution adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Id of the originating opportunity.
    pub opportunity_id: String,
    /// Route the outcome is recorded against.
    pub route: RouteKey,
    /// Execution path the dispatch went through.
    pub path: ExecutionPath,
    /// Whether the venue reported a fill.
    pub success: bool,
    /// Realized profit in quote currency; negative on a losing execution.
    pub realized_profit: f64,
    /// Realized execution cost in quote currency.
    pub realized_cost: f64,
    /// Wall-clock time from dispatch to completion.
    pub latency: Duration,
    /// Adapter- or venue-reported error description, if any.
    pub error: Option<String>,
    /// Venue transaction identifier, if one was produced.
    pub tx_id: Option<String>,
    /// True when the dispatch deadline elapsed before the adapter returned.
    pub timed_out: bool,
    /// Profit the scorer predicted, carried for profit-capture tracking.
    pub predicted_profit: Option<f64>,
}

impl ExecutionResult {
    /// Failure result synthesized at the dispatch boundary when an adapter
    /// errors or the timeout elapses. Loss is the decision's cost estimate.
    pub fn failed(decision: &Decision, error: String, latency: Duration, timed_out: bool) -> Self {
        let estimated_cost = decision.opportunity.costs.total();
        Self {
            opportunity_id: decision.opportunity.id.clone(),
            route: decision.opportunity.route_key(),
            path: decision.opportunity.path,
            success: false,
            realized_profit: -estimated_cost,
            realized_cost: estimated_cost,
            latency,
            error: Some(error),
            tx_id: None,
            timed_out,
            predicted_profit: Some(decision.net_profit),
        }
    }
}

/// (symbol, venue) pair keying the per-route statistics table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub symbol: String,
    pub venue: String,
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.venue)
    }
}

/// Snapshot of ambient market conditions, replaced wholesale on each update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegime {
    /// Volatility estimate, normalized to [0, 1].
    pub volatility: f64,
    /// Trend strength, normalized to [0, 1].
    pub trend_strength: f64,
    /// Liquidity score, normalized to [0, 1].
    pub liquidity_score: f64,
    /// Where current network fees sit in their recent distribution, [0, 1].
    pub gas_percentile: f64,
    /// Descriptive label, e.g. "calm" or "volatile".
    pub label: String,
}

impl MarketRegime {
    pub fn neutral() -> Self {
        Self {
            volatility: 0.3,
            trend_strength: 0.5,
            liquidity_score: 0.5,
            gas_percentile: 0.5,
            label: "neutral".to_string(),
        }
    }
}
