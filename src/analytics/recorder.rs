//! Feedback recorder: the only writer of route statistics.
//!
//! Consumes every [`ExecutionResult`] the dispatcher produces, folds it
//! into the per-route EMAs, appends it to a bounded execution-history log,
//! and every N outcomes signals the learned predictor to retrain from the
//! accumulated history. Retraining runs off the hot path and its failures
//! never reach the caller.

use crate::ai::{ExecutionRecord, SuccessPredictor};
use crate::analytics::route_stats::RouteStatsStore;
use crate::arbitrage::opportunity::ExecutionResult;
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct FeedbackRecorder {
    stats: Arc<RouteStatsStore>,
    history: Mutex<VecDeque<ExecutionRecord>>,
    history_limit: usize,
    ema_alpha: f64,
    retrain_every: usize,
    recorded: AtomicU64,
    predictor: Option<Arc<dyn SuccessPredictor>>,
}

impl FeedbackRecorder {
    pub fn new(
        stats: Arc<RouteStatsStore>,
        ema_alpha: f64,
        history_limit: usize,
        retrain_every: usize,
        predictor: Option<Arc<dyn SuccessPredictor>>,
    ) -> Self {
        Self {
            stats,
            history: Mutex::new(VecDeque::with_capacity(history_limit)),
            history_limit,
            ema_alpha,
            retrain_every,
            recorded: AtomicU64::new(0),
            predictor,
        }
    }

    /// Folds one realized outcome into route stats and history.
    pub fn record_outcome(&self, result: &ExecutionResult) {
        // Profit capture only makes sense on a success with a recorded
        // prediction; a ratio against zero predicted profit is noise.
        let profit_capture = match (result.success, result.predicted_profit) {
            (true, Some(predicted)) if predicted > 0.0 => {
                Some(result.realized_profit / predicted)
            }
            _ => None,
        };
        self.stats.record(
            &result.route,
            result.success,
            profit_capture,
            self.ema_alpha,
        );

        let record = ExecutionRecord {
            opportunity_id: result.opportunity_id.clone(),
            route: result.route.clone(),
            path: result.path,
            success: result.success,
            realized_profit: result.realized_profit,
            predicted_profit: result.predicted_profit,
            latency_ms: result.latency.as_millis() as u64,
            timed_out: result.timed_out,
            recorded_at: Utc::now(),
        };

        {
            let mut history = self.history.lock().expect("history mutex poisoned");
            if history.len() == self.history_limit {
                history.pop_front();
            }
            history.push_back(record);
        }

        let total = self.recorded.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "[Feedback] outcome #{} for {}: success={}, profit={:.2}, timed_out={}",
            total, result.route, result.success, result.realized_profit, result.timed_out
        );

        if self.retrain_every > 0 && total % self.retrain_every as u64 == 0 {
            self.signal_retrain(total);
        }
    }

    /// Snapshots the history and retrains off the hot path. A failed
    /// retrain leaves the predictor's last-known state in place.
    fn signal_retrain(&self, total: u64) {
        let Some(predictor) = self.predictor.clone() else {
            debug!("[Feedback] {} outcomes recorded, no predictor to retrain", total);
            return;
        };
        let snapshot: Vec<ExecutionRecord> = {
            let history = self.history.lock().expect("history mutex poisoned");
            history.iter().cloned().collect()
        };
        info!(
            "[Feedback] signaling retrain after {} outcomes ({} history records)",
            total,
            snapshot.len()
        );
        tokio::task::spawn_blocking(move || {
            if let Err(e) = predictor.retrain(&snapshot) {
                warn!("Predictor retrain failed (keeping last-known state): {}", e);
            }
        });
    }

    /// Number of outcomes recorded so far.
    pub fn recorded_count(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Copy of the bounded execution history, oldest first.
    pub fn history_snapshot(&self) -> Vec<ExecutionRecord> {
        self.history
            .lock()
            .expect("history mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }
}
