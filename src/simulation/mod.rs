//! Simulated execution adapter for paper-trading runs and tests.
//!
//! Stands in for a live venue backend: realistic latency jitter, a
//! configurable failure rate, and noisy profit capture, without touching
//! any real market.

use crate::arbitrage::executor::ExecutionAdapter;
use crate::arbitrage::opportunity::{Decision, ExecutionResult, Opportunity};
use crate::error::Result;
use async_trait::async_trait;
use log::debug;
use rand::Rng;
use std::time::Instant;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Probability a dispatched execution fills.
    pub success_rate: f64,
    /// Latency jitter bounds, milliseconds.
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Realized profit as a fraction of predicted, sampled uniformly.
    pub min_profit_capture: f64,
    pub max_profit_capture: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.90,
            min_latency_ms: 30,
            max_latency_ms: 150,
            min_profit_capture: 0.75,
            max_profit_capture: 1.05,
        }
    }
}

pub struct SimulatedExecutionAdapter {
    config: SimulationConfig,
    name: String,
}

impl SimulatedExecutionAdapter {
    pub fn new(name: impl Into<String>, config: SimulationConfig) -> Self {
        Self {
            config,
            name: name.into(),
        }
    }
}

#[async_trait]
impl ExecutionAdapter for SimulatedExecutionAdapter {
    async fn execute(
        &self,
        opportunity: &Opportunity,
        decision: &Decision,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let (delay_ms, filled, capture, cost_noise) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.config.min_latency_ms..=self.config.max_latency_ms),
                rng.gen_bool(self.config.success_rate.clamp(0.0, 1.0)),
                rng.gen_range(self.config.min_profit_capture..=self.config.max_profit_capture),
                rng.gen_range(0.9..=1.1),
            )
        };
        sleep(Duration::from_millis(delay_ms)).await;

        let estimated_cost = opportunity.costs.total();
        let result = if filled {
            ExecutionResult {
                opportunity_id: opportunity.id.clone(),
                route: opportunity.route_key(),
                path: opportunity.path,
                success: true,
                realized_profit: decision.net_profit * capture,
                realized_cost: estimated_cost * cost_noise,
                latency: started.elapsed(),
                error: None,
                tx_id: Some(format!("sim-{}", uuid::Uuid::new_v4())),
                timed_out: false,
                predicted_profit: Some(decision.net_profit),
            }
        } else {
            ExecutionResult {
                opportunity_id: opportunity.id.clone(),
                route: opportunity.route_key(),
                path: opportunity.path,
                success: false,
                realized_profit: -estimated_cost,
                realized_cost: estimated_cost,
                latency: started.elapsed(),
                error: Some("simulated fill rejection".to_string()),
                tx_id: None,
                timed_out: false,
                predicted_profit: Some(decision.net_profit),
            }
        };

        debug!(
            "[{}] simulated execution for {}: success={}, profit={:.2}",
            self.name, opportunity.id, result.success, result.realized_profit
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
