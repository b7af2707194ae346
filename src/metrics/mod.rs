//! Event metrics: in-process counters plus an optional JSON-lines log.
//!
//! One line per pipeline event (decision, execution, drop), each a JSON
//! object with an RFC3339 timestamp, appended to the configured log file.
//! Counters back the orchestrator's stats snapshot.

use crate::arbitrage::opportunity::{Decision, ExecutionResult};
use crate::error::{ArbError, Result};
use log::info;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct Metrics {
    log_file: Option<Mutex<std::fs::File>>,

    pub opportunities_submitted: AtomicU64,
    pub opportunities_dropped: AtomicU64,
    pub decisions_made: AtomicU64,
    pub decisions_refused: AtomicU64,
    pub executions_succeeded: AtomicU64,
    pub executions_failed: AtomicU64,
    pub executions_timed_out: AtomicU64,
}

impl Metrics {
    pub fn new(log_path: Option<&str>) -> Result<Self> {
        let log_file = match log_path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        ArbError::MetricsError(format!("failed to open {}: {}", path, e))
                    })?;
                info!("Metrics event log: {}", path);
                Some(Mutex::new(file))
            }
            None => None,
        };
        Ok(Self {
            log_file,
            ..Default::default()
        })
    }

    fn write_line(&self, line: serde_json::Value) {
        if let Some(file) = &self.log_file {
            let mut file = file.lock().expect("metrics file mutex poisoned");
            // Event-log write failure must not disturb the pipeline.
            if let Err(e) = writeln!(file, "{}", line) {
                log::warn!("Failed to write metrics event: {}", e);
            }
        }
    }

    pub fn log_submitted(&self) {
        self.opportunities_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_dropped(&self, queued: usize) {
        self.opportunities_dropped.fetch_add(1, Ordering::Relaxed);
        self.write_line(json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "opportunity_dropped",
            "queued": queued,
        }));
    }

    pub fn log_decision(&self, decision: &Decision) {
        self.decisions_made.fetch_add(1, Ordering::Relaxed);
        self.write_line(json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "decision",
            "opportunity_id": decision.opportunity.id,
            "symbol": decision.opportunity.symbol,
            "venue": decision.opportunity.venue,
            "path": decision.opportunity.path.as_str(),
            "net_profit": decision.net_profit,
            "confidence": decision.confidence,
            "score": decision.score,
            "recommended_size": decision.recommended_size,
        }));
    }

    pub fn log_admission_refused(&self, reason: &str) {
        self.decisions_refused.fetch_add(1, Ordering::Relaxed);
        self.write_line(json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "admission_refused",
            "reason": reason,
        }));
    }

    pub fn log_execution(&self, result: &ExecutionResult) {
        let event = if result.success {
            self.executions_succeeded.fetch_add(1, Ordering::Relaxed);
            "execution_success"
        } else if result.timed_out {
            self.executions_timed_out.fetch_add(1, Ordering::Relaxed);
            "execution_timeout"
        } else {
            self.executions_failed.fetch_add(1, Ordering::Relaxed);
            "execution_failed"
        };
        self.write_line(json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": event,
            "opportunity_id": result.opportunity_id,
            "route": result.route.to_string(),
            "path": result.path.as_str(),
            "realized_profit": result.realized_profit,
            "realized_cost": result.realized_cost,
            "latency_ms": result.latency.as_millis() as u64,
            "error": result.error,
            "tx_id": result.tx_id,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::opportunity::{
        CostEstimate, ExecutionPath, Opportunity, RouteKey,
    };
    use std::time::Duration;

    #[test]
    fn counters_track_execution_outcomes() {
        let metrics = Metrics::new(None).unwrap();
        let result = ExecutionResult {
            opportunity_id: "opp".to_string(),
            route: RouteKey {
                symbol: "SOL/USDC".to_string(),
                venue: "orca".to_string(),
            },
            path: ExecutionPath::FlashLoan,
            success: false,
            realized_profit: -5.0,
            realized_cost: 5.0,
            latency: Duration::from_secs(1),
            error: Some("deadline elapsed".to_string()),
            tx_id: None,
            timed_out: true,
            predicted_profit: None,
        };
        metrics.log_execution(&result);
        assert_eq!(metrics.executions_timed_out.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.executions_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn decision_logging_counts() {
        let metrics = Metrics::new(None).unwrap();
        let opportunity = Opportunity::new(
            "SOL/USDC",
            ExecutionPath::ExchangeArbitrage,
            "orca",
            150.0,
            151.0,
            60.0,
            10_000.0,
            CostEstimate::default(),
            1,
            0.8,
        );
        let decision = Decision {
            opportunity,
            net_profit: 50.0,
            confidence: 0.8,
            reason: "accepted".to_string(),
            score: 1.2,
            recommended_size: Some(2_000.0),
        };
        metrics.log_decision(&decision);
        metrics.log_admission_refused("cooldown active");
        assert_eq!(metrics.decisions_made.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.decisions_refused.load(Ordering::Relaxed), 1);
    }
}
