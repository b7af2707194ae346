//! Per-route rolling performance statistics.
//!
//! Keyed by (symbol, venue). Entries are created lazily on first
//! observation and never deleted. The scorer reads value copies while the
//! feedback recorder writes; every update replaces the whole entry, so a
//! concurrent reader sees either the old or the new value, never a torn
//! one.

use crate::arbitrage::opportunity::RouteKey;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rolling statistics for one (symbol, venue) route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouteStats {
    /// Exponentially-weighted success rate, in [0, 1].
    pub success_rate: f64,
    /// Exponentially-weighted realized/predicted profit ratio on successes.
    pub profit_capture: f64,
    /// Number of outcomes folded in.
    pub samples: u64,
}

impl Default for RouteStats {
    fn default() -> Self {
        // Neutral priors for unseen routes.
        Self {
            success_rate: 0.65,
            profit_capture: 1.0,
            samples: 0,
        }
    }
}

/// Keyed table of [`RouteStats`], safe for concurrent read-while-write.
#[derive(Debug, Default)]
pub struct RouteStatsStore {
    entries: DashMap<RouteKey, RouteStats>,
}

impl RouteStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for a route; the neutral prior for routes never observed.
    pub fn get(&self, key: &RouteKey) -> RouteStats {
        self.entries
            .get(key)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    /// Folds one outcome into the route's EMA state. Called only by the
    /// feedback recorder.
    pub fn record(&self, key: &RouteKey, success: bool, profit_capture: Option<f64>, alpha: f64) {
        let mut stats = self.get(key);
        let outcome = if success { 1.0 } else { 0.0 };
        stats.success_rate = stats.success_rate * (1.0 - alpha) + outcome * alpha;
        if let Some(capture) = profit_capture {
            stats.profit_capture = stats.profit_capture * (1.0 - alpha) + capture * alpha;
        }
        stats.samples += 1;
        self.entries.insert(key.clone(), stats);
        log::debug!(
            "[RouteStats {}] success rate {:.3}, profit capture {:.3}, samples {}",
            key,
            stats.success_rate,
            stats.profit_capture,
            stats.samples
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of every route's stats, keyed by display name.
    pub fn snapshot(&self) -> HashMap<String, RouteStats> {
        self.entries
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect()
    }
}
