//! Opportunity scorer.
//!
//! Pure, synchronous batch scoring: given a slice of candidates plus the
//! current market regime and route statistics, produce at most one winning
//! [`Decision`]. Deterministic for identical inputs and identical
//! learned-predictor state; never mutates its inputs, never blocks, never
//! performs I/O, so it is safe to call inline from the batch loop.
//!
//! Each candidate runs the same gauntlet:
//!   1. profitability gate (net of costs and hop penalty),
//!   2. weighted multi-factor score,
//!   3. success-probability estimate (learned predictor, or heuristic
//!      fallback seeded from route history),
//!   4. blended-confidence gate,
//!   5. fractional-Kelly position size.
//! The best survivor by post-probability score wins; ties go to the
//! earliest-detected candidate.

use crate::ai::{FeatureVector, SuccessPredictor};
use crate::analytics::route_stats::RouteStatsStore;
use crate::arbitrage::opportunity::{Decision, MarketRegime, Opportunity};
use crate::config::{Config, ScoringWeights};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

/// Regime factor applied when no [`MarketRegime`] snapshot is available.
const NEUTRAL_REGIME_SCORE: f64 = 0.7;
/// Success-probability clamp for the heuristic fallback.
const HEURISTIC_PROB_FLOOR: f64 = 0.10;
const HEURISTIC_PROB_CEIL: f64 = 0.95;
/// Quote-currency profit at which the log profit multiplier reaches ln(2).
const PROFIT_SCALE: f64 = 100.0;
/// Notional at which the liquidity proxy saturates to tanh(1).
const LIQUIDITY_SCALE: f64 = 10_000.0;

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Scoring knobs, lifted from [`Config`] at construction.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub weights: ScoringWeights,
    /// Floor on the success-probability estimate.
    pub min_predictor_confidence: f64,
    /// Acceptance threshold on the blended confidence.
    pub min_confidence: f64,
    /// Quote-currency penalty per hop beyond the first.
    pub hop_penalty: f64,
    /// Conservative multiplier on the raw Kelly fraction (0.25 = quarter-Kelly).
    pub kelly_fraction: f64,
    /// Hard cap on position size as a fraction of portfolio value.
    pub max_position_fraction: f64,
    /// Assumed cost of a failed execution, as a fraction of net profit,
    /// when no explicit failure cost is known.
    pub failure_cost_fraction: f64,
}

impl ScorerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            weights: config.scoring_weights,
            min_predictor_confidence: config.min_predictor_confidence,
            min_confidence: config.limits.min_confidence,
            hop_penalty: config.hop_penalty,
            kelly_fraction: config.kelly_fraction,
            max_position_fraction: config.max_position_fraction,
            failure_cost_fraction: config.failure_cost_fraction,
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self::from_config(&Config::test_default())
    }
}

/// Why a candidate did not become the batch's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectionReason {
    /// Failed structural validation before scoring.
    Invalid,
    /// Net profit after costs and hop penalty is not positive.
    Unprofitable,
    /// Success-probability estimate below the configured floor.
    LowPredictorConfidence,
    /// Blended confidence below the acceptance threshold.
    LowConfidence,
    /// Passed every gate but lost the batch to a higher-scored candidate.
    Outscored,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Invalid => "invalid candidate",
            RejectionReason::Unprofitable => "unprofitable",
            RejectionReason::LowPredictorConfidence => "low predictor confidence",
            RejectionReason::LowConfidence => "low confidence",
            RejectionReason::Outscored => "outscored in batch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandidateOutcome {
    Accepted,
    Rejected(RejectionReason),
}

/// The five normalized sub-scores and their combination.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SubScores {
    pub edge: f64,
    pub execution: f64,
    pub regime: f64,
    pub liquidity: f64,
    pub gas: f64,
    /// Weighted sum of the five, before the profit multiplier.
    pub weighted: f64,
    /// log(1 + net/PROFIT_SCALE) magnitude factor.
    pub profit_multiplier: f64,
}

/// Per-candidate evaluation trace, kept for every candidate in a batch
/// whether accepted or rejected. Diagnostic only; not part of the
/// functional contract.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateEvaluation {
    pub opportunity_id: String,
    pub symbol: String,
    pub outcome: CandidateOutcome,
    pub net_profit: f64,
    /// Final score after the success-probability multiplication; zero for
    /// candidates rejected before scoring completed.
    pub score: f64,
    pub success_probability: f64,
    pub confidence: f64,
    pub sub_scores: Option<SubScores>,
}

/// Everything the scorer produced for one batch: the winning decision (if
/// any) plus the full evaluation trace.
#[derive(Debug, Clone)]
pub struct BatchEvaluation {
    pub decision: Option<Decision>,
    pub evaluations: Vec<CandidateEvaluation>,
}

struct ScoredCandidate {
    index: usize,
    score: f64,
    net_profit: f64,
    success_probability: f64,
    confidence: f64,
    recommended_size: f64,
}

pub struct Scorer {
    config: ScorerConfig,
    predictor: Option<Arc<dyn SuccessPredictor>>,
}

impl Scorer {
    pub fn new(config: ScorerConfig, predictor: Option<Arc<dyn SuccessPredictor>>) -> Self {
        Self { config, predictor }
    }

    /// Scores a batch and returns at most one winning decision.
    pub fn score(
        &self,
        candidates: &[Opportunity],
        regime: Option<&MarketRegime>,
        route_stats: &RouteStatsStore,
        portfolio_value: f64,
    ) -> BatchEvaluation {
        let mut evaluations = Vec::with_capacity(candidates.len());
        let mut survivors: Vec<ScoredCandidate> = Vec::new();

        for (index, candidate) in candidates.iter().enumerate() {
            let (evaluation, scored) =
                self.evaluate_candidate(index, candidate, regime, route_stats, portfolio_value);
            evaluations.push(evaluation);
            if let Some(scored) = scored {
                survivors.push(scored);
            }
        }

        let winner = survivors.into_iter().reduce(|best, other| {
            let better = other.score > best.score
                || (other.score == best.score
                    && candidates[other.index].detected_at < candidates[best.index].detected_at);
            if better {
                other
            } else {
                best
            }
        });

        let decision = winner.map(|scored| {
            // Everyone else that survived lost the batch on score.
            for evaluation in evaluations.iter_mut() {
                if evaluation.outcome == CandidateOutcome::Accepted
                    && evaluation.opportunity_id != candidates[scored.index].id
                {
                    evaluation.outcome =
                        CandidateOutcome::Rejected(RejectionReason::Outscored);
                }
            }
            Decision {
                opportunity: candidates[scored.index].clone(),
                net_profit: scored.net_profit,
                confidence: scored.confidence,
                reason: format!(
                    "accepted: score {:.4}, success probability {:.3}",
                    scored.score, scored.success_probability
                ),
                score: scored.score,
                recommended_size: Some(scored.recommended_size),
            }
        });

        BatchEvaluation {
            decision,
            evaluations,
        }
    }

    fn evaluate_candidate(
        &self,
        index: usize,
        candidate: &Opportunity,
        regime: Option<&MarketRegime>,
        route_stats: &RouteStatsStore,
        portfolio_value: f64,
    ) -> (CandidateEvaluation, Option<ScoredCandidate>) {
        let rejected = |reason: RejectionReason,
                        net: f64,
                        score: f64,
                        probability: f64,
                        confidence: f64,
                        sub_scores: Option<SubScores>| {
            debug!(
                "[Scorer] {} {}: {} (net {:.2})",
                candidate.symbol,
                candidate.id,
                reason.as_str(),
                net
            );
            (
                CandidateEvaluation {
                    opportunity_id: candidate.id.clone(),
                    symbol: candidate.symbol.clone(),
                    outcome: CandidateOutcome::Rejected(reason),
                    net_profit: net,
                    score,
                    success_probability: probability,
                    confidence,
                    sub_scores,
                },
                None,
            )
        };

        if !candidate.validate() {
            return rejected(RejectionReason::Invalid, 0.0, 0.0, 0.0, 0.0, None);
        }

        // Step 1: profitability gate.
        let net = self.net_profit(candidate);
        if net <= 0.0 {
            return rejected(RejectionReason::Unprofitable, net, 0.0, 0.0, 0.0, None);
        }

        // Step 2: weighted multi-factor score.
        let sub_scores = self.multi_factor_score(candidate, regime, net);
        let base_score = sub_scores.weighted * sub_scores.profit_multiplier;

        // Step 3: success-probability estimate and floor.
        let probability = self.success_probability(candidate, regime, route_stats);
        if probability < self.config.min_predictor_confidence {
            return rejected(
                RejectionReason::LowPredictorConfidence,
                net,
                base_score,
                probability,
                0.0,
                Some(sub_scores),
            );
        }
        let score = base_score * probability;

        // Step 4: blended confidence and acceptance gate.
        let confidence = clamp01(
            0.4 * probability
                + 0.3 * (candidate.edge_bps / 50.0).tanh()
                + 0.3 * candidate.prior_confidence,
        );
        if confidence < self.config.min_confidence {
            return rejected(
                RejectionReason::LowConfidence,
                net,
                score,
                probability,
                confidence,
                Some(sub_scores),
            );
        }

        // Step 5: fractional-Kelly position size.
        let recommended_size = self.kelly_size(net, probability, portfolio_value);

        (
            CandidateEvaluation {
                opportunity_id: candidate.id.clone(),
                symbol: candidate.symbol.clone(),
                outcome: CandidateOutcome::Accepted,
                net_profit: net,
                score,
                success_probability: probability,
                confidence,
                sub_scores: Some(sub_scores),
            },
            Some(ScoredCandidate {
                index,
                score,
                net_profit: net,
                success_probability: probability,
                confidence,
                recommended_size,
            }),
        )
    }

    /// Gross profit minus itemized costs minus the multi-hop penalty.
    pub fn net_profit(&self, candidate: &Opportunity) -> f64 {
        let hop_penalty =
            self.config.hop_penalty * (candidate.hop_count.saturating_sub(1)) as f64;
        candidate.gross_profit() - candidate.costs.total() - hop_penalty
    }

    fn multi_factor_score(
        &self,
        candidate: &Opportunity,
        regime: Option<&MarketRegime>,
        net: f64,
    ) -> SubScores {
        let gross = candidate.gross_profit();
        let total_cost = candidate.costs.total();

        let edge = (candidate.edge_bps / 100.0).tanh();

        let cost_efficiency = if gross > 0.0 {
            clamp01(1.0 - total_cost / gross)
        } else {
            0.0
        };
        let slippage_efficiency =
            clamp01(1.0 - candidate.costs.expected_slippage / candidate.notional);
        let execution = 0.6 * cost_efficiency + 0.4 * slippage_efficiency;

        let regime_score = match regime {
            Some(r) => 0.6 * (-2.0 * r.volatility).exp() + 0.4 * (1.0 - r.gas_percentile),
            None => NEUTRAL_REGIME_SCORE,
        };

        let liquidity = (candidate.notional / LIQUIDITY_SCALE).tanh();
        let gas = cost_efficiency;

        let w = &self.config.weights;
        let weighted = w.edge * edge
            + w.execution * execution
            + w.regime * regime_score
            + w.liquidity * liquidity
            + w.gas * gas;
        let profit_multiplier = (1.0 + net / PROFIT_SCALE).ln();

        SubScores {
            edge,
            execution,
            regime: regime_score,
            liquidity,
            gas,
            weighted,
            profit_multiplier,
        }
    }

    /// Learned-predictor probability with heuristic fallback. Inference
    /// failure or an untrained predictor falls back silently.
    fn success_probability(
        &self,
        candidate: &Opportunity,
        regime: Option<&MarketRegime>,
        route_stats: &RouteStatsStore,
    ) -> f64 {
        let stats = route_stats.get(&candidate.route_key());
        if let Some(predictor) = &self.predictor {
            if predictor.is_trained() {
                let features = FeatureVector::from_candidate(candidate, regime, &stats);
                match predictor.predict_success_probability(&features) {
                    Ok(p) => return clamp01(p),
                    Err(e) => {
                        log::warn!(
                            "Predictor inference failed for {}, using heuristic: {}",
                            candidate.id,
                            e
                        );
                    }
                }
            }
        }
        self.heuristic_probability(candidate, stats.success_rate)
    }

    /// Deterministic fallback: route success history scaled by edge
    /// strength and cost efficiency, clamped to [0.10, 0.95].
    fn heuristic_probability(&self, candidate: &Opportunity, route_success_rate: f64) -> f64 {
        let gross = candidate.gross_profit();
        let edge_factor = (candidate.edge_bps / 100.0).min(1.0);
        let gas_factor = if gross > 0.0 {
            1.0 - (candidate.costs.total() / gross).min(0.5)
        } else {
            0.5
        };
        let scaled = route_success_rate * (0.5 + 0.3 * edge_factor + 0.2 * gas_factor);
        scaled.clamp(HEURISTIC_PROB_FLOOR, HEURISTIC_PROB_CEIL)
    }

    /// Fractional Kelly: `f* = (p·b − q) / b` with payoff ratio `b` of net
    /// profit over the assumed failure cost, scaled by the conservative
    /// multiplier and capped at the maximum portfolio fraction.
    pub fn kelly_size(&self, net_profit: f64, win_probability: f64, portfolio_value: f64) -> f64 {
        let failure_cost = (net_profit * self.config.failure_cost_fraction).max(f64::EPSILON);
        let ratio = net_profit / failure_cost;
        let raw_kelly =
            ((win_probability * ratio - (1.0 - win_probability)) / ratio).max(0.0);
        let sized = raw_kelly * self.config.kelly_fraction * portfolio_value;
        sized.min(self.config.max_position_fraction * portfolio_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockPredictor;
    use crate::arbitrage::opportunity::{CostEstimate, ExecutionPath};
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;

    fn candidate(edge_bps: f64, notional: f64, total_cost: f64, prior: f64) -> Opportunity {
        Opportunity::new(
            "SOL/USDC",
            ExecutionPath::ExchangeArbitrage,
            "raydium",
            150.0,
            150.0 * (1.0 + edge_bps / 10_000.0),
            edge_bps,
            notional,
            CostEstimate {
                network_cost: total_cost * 0.3,
                venue_fee: total_cost * 0.4,
                expected_slippage: total_cost * 0.3,
                bridging_cost: 0.0,
            },
            1,
            prior,
        )
    }

    fn scorer() -> Scorer {
        Scorer::new(ScorerConfig::default(), None)
    }

    #[test]
    fn accepts_healthy_candidate_on_heuristic_path() {
        // 65 bps on 100k notional, 70 in costs, heuristic path, unseen
        // route: accepted with net ~580 and confidence in the mid band.
        let scorer = scorer();
        let stats = RouteStatsStore::new();
        let batch = vec![candidate(65.0, 100_000.0, 70.0, 0.75)];

        let result = scorer.score(&batch, None, &stats, 100_000.0);
        let decision = result.decision.expect("candidate should be accepted");
        assert_approx_eq!(decision.net_profit, 580.0, 1e-6);
        assert!(
            decision.confidence > 0.55 && decision.confidence < 0.75,
            "confidence {} outside expected band",
            decision.confidence
        );
        assert!(decision.recommended_size.unwrap() > 0.0);
        assert_eq!(result.evaluations.len(), 1);
        assert_eq!(result.evaluations[0].outcome, CandidateOutcome::Accepted);
    }

    #[test]
    fn rejects_when_gross_equals_costs() {
        // Gross profit exactly equals total costs: net = 0, unprofitable.
        let scorer = scorer();
        let stats = RouteStatsStore::new();
        let batch = vec![candidate(50.0, 10_000.0, 50.0, 0.9)];

        let result = scorer.score(&batch, None, &stats, 100_000.0);
        assert!(result.decision.is_none());
        assert_eq!(
            result.evaluations[0].outcome,
            CandidateOutcome::Rejected(RejectionReason::Unprofitable)
        );
    }

    #[test]
    fn bigger_edge_wins_the_batch() {
        let predictor: Arc<dyn SuccessPredictor> = Arc::new(MockPredictor::new(0.8));
        let scorer = Scorer::new(ScorerConfig::default(), Some(predictor));
        let stats = RouteStatsStore::new();
        let small = candidate(20.0, 100_000.0, 70.0, 0.9);
        let large = candidate(90.0, 100_000.0, 70.0, 0.9);
        let large_id = large.id.clone();

        let result = scorer.score(&[small, large], None, &stats, 100_000.0);
        let decision = result.decision.expect("one candidate should win");
        assert_eq!(decision.opportunity.id, large_id);
        assert_eq!(
            result.evaluations[0].outcome,
            CandidateOutcome::Rejected(RejectionReason::Outscored)
        );
    }

    #[test]
    fn ties_break_toward_earliest_detection() {
        let predictor: Arc<dyn SuccessPredictor> = Arc::new(MockPredictor::new(0.8));
        let scorer = Scorer::new(ScorerConfig::default(), Some(predictor));
        let stats = RouteStatsStore::new();
        let first = candidate(60.0, 50_000.0, 70.0, 0.9);
        let mut second = candidate(60.0, 50_000.0, 70.0, 0.9);
        second.detected_at = first.detected_at + chrono::Duration::milliseconds(250);
        let first_id = first.id.clone();

        // Later candidate listed first; the earlier one must still win.
        let result = scorer.score(&[second, first], None, &stats, 100_000.0);
        assert_eq!(result.decision.unwrap().opportunity.id, first_id);
    }

    #[test]
    fn hop_penalty_reduces_net_profit() {
        let scorer = scorer();
        let mut multi_hop = candidate(65.0, 100_000.0, 70.0, 0.75);
        multi_hop.hop_count = 3;
        // 650 gross - 70 costs - 2 * 5.0 penalty.
        assert_approx_eq!(scorer.net_profit(&multi_hop), 570.0, 1e-6);
    }

    #[test]
    fn low_predictor_confidence_rejects() {
        let predictor: Arc<dyn SuccessPredictor> = Arc::new(MockPredictor::new(0.30));
        let scorer = Scorer::new(ScorerConfig::default(), Some(predictor));
        let stats = RouteStatsStore::new();
        let batch = vec![candidate(65.0, 100_000.0, 70.0, 0.9)];

        let result = scorer.score(&batch, None, &stats, 100_000.0);
        assert!(result.decision.is_none());
        assert_eq!(
            result.evaluations[0].outcome,
            CandidateOutcome::Rejected(RejectionReason::LowPredictorConfidence)
        );
    }

    #[test]
    fn low_blended_confidence_rejects() {
        // Decent probability but a rock-bottom caller prior drags the
        // blend under the acceptance threshold.
        let predictor: Arc<dyn SuccessPredictor> = Arc::new(MockPredictor::new(0.60));
        let scorer = Scorer::new(ScorerConfig::default(), Some(predictor));
        let stats = RouteStatsStore::new();
        let batch = vec![candidate(30.0, 100_000.0, 70.0, 0.05)];

        let result = scorer.score(&batch, None, &stats, 100_000.0);
        assert!(result.decision.is_none());
        assert_eq!(
            result.evaluations[0].outcome,
            CandidateOutcome::Rejected(RejectionReason::LowConfidence)
        );
    }

    #[test]
    fn kelly_size_is_bounded() {
        let scorer = scorer();
        let portfolio = 100_000.0;
        for p in [0.1, 0.55, 0.7, 0.95] {
            for net in [1.0, 100.0, 10_000.0] {
                let size = scorer.kelly_size(net, p, portfolio);
                assert!(size >= 0.0);
                assert!(size <= portfolio * 0.20 + 1e-9);
            }
        }
        // Hopeless probability yields a zero position.
        assert_eq!(scorer.kelly_size(100.0, 0.05, portfolio), 0.0);
    }

    #[test]
    fn accepted_decisions_always_have_positive_net_and_unit_confidence() {
        let scorer = scorer();
        let stats = RouteStatsStore::new();
        for edge in [10.0, 40.0, 65.0, 120.0, 300.0] {
            for cost in [10.0, 70.0, 400.0] {
                let batch = vec![candidate(edge, 100_000.0, cost, 0.8)];
                if let Some(decision) = scorer.score(&batch, None, &stats, 100_000.0).decision {
                    assert!(decision.net_profit > 0.0);
                    assert!((0.0..=1.0).contains(&decision.confidence));
                }
            }
        }
    }

    #[test]
    fn regime_volatility_lowers_score() {
        let predictor: Arc<dyn SuccessPredictor> = Arc::new(MockPredictor::new(0.8));
        let scorer = Scorer::new(ScorerConfig::default(), Some(predictor));
        let stats = RouteStatsStore::new();
        let calm = MarketRegime {
            volatility: 0.05,
            gas_percentile: 0.2,
            ..MarketRegime::neutral()
        };
        let stormy = MarketRegime {
            volatility: 0.9,
            gas_percentile: 0.95,
            label: "volatile".to_string(),
            ..MarketRegime::neutral()
        };
        let batch = vec![candidate(65.0, 100_000.0, 70.0, 0.9)];

        let calm_score = scorer
            .score(&batch, Some(&calm), &stats, 100_000.0)
            .decision
            .unwrap()
            .score;
        let stormy_score = scorer
            .score(&batch, Some(&stormy), &stats, 100_000.0)
            .decision
            .unwrap()
            .score;
        assert!(calm_score > stormy_score);
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = scorer();
        let stats = RouteStatsStore::new();
        let batch = vec![
            candidate(65.0, 100_000.0, 70.0, 0.75),
            candidate(40.0, 60_000.0, 55.0, 0.8),
        ];
        let a = scorer.score(&batch, None, &stats, 100_000.0);
        let b = scorer.score(&batch, None, &stats, 100_000.0);
        assert_eq!(
            a.decision.as_ref().map(|d| (&d.opportunity.id, d.score.to_bits())),
            b.decision.as_ref().map(|d| (&d.opportunity.id, d.score.to_bits()))
        );
    }

    #[test]
    fn untrained_predictor_falls_back_to_heuristic() {
        let untrained: Arc<dyn SuccessPredictor> = Arc::new(MockPredictor::untrained(0.99));
        let with_fallback = Scorer::new(ScorerConfig::default(), Some(untrained));
        let without = scorer();
        let stats = RouteStatsStore::new();
        let batch = vec![candidate(65.0, 100_000.0, 70.0, 0.75)];

        let a = with_fallback.score(&batch, None, &stats, 100_000.0);
        let b = without.score(&batch, None, &stats, 100_000.0);
        assert_eq!(
            a.decision.map(|d| d.score.to_bits()),
            b.decision.map(|d| d.score.to_bits())
        );
    }
}
