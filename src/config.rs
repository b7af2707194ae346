use serde::Deserialize;
use std::env;

/// Weights of the five scoring factors. Must sum to ~1.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScoringWeights {
    pub edge: f64,
    pub execution: f64,
    pub regime: f64,
    pub liquidity: f64,
    pub gas: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            edge: 0.35,
            execution: 0.25,
            regime: 0.15,
            liquidity: 0.15,
            gas: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.edge + self.execution + self.regime + self.liquidity + self.gas
    }
}

/// Admission-control and batching limits for the orchestrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrchestratorLimits {
    /// Maximum concurrent in-flight executions.
    pub max_concurrent_executions: usize,
    /// Minimum seconds between two dispatch starts.
    pub cooldown_secs: u64,
    /// Maximum executions per day.
    pub max_daily_executions: u64,
    /// Maximum cumulative realized loss per day, quote currency.
    pub max_daily_loss: f64,
    /// Batch is handed to the scorer once this many candidates accumulate.
    pub batch_size: usize,
    /// ...or once this window has elapsed since the first candidate.
    pub batch_window_ms: u64,
    /// Acceptance threshold for the blended decision confidence.
    pub min_confidence: f64,
}

impl Default for OrchestratorLimits {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 2,
            cooldown_secs: 30,
            max_daily_executions: 50,
            max_daily_loss: 500.0,
            batch_size: 10,
            batch_window_ms: 500,
            min_confidence: 0.70,
        }
    }
}

/// Partial update applied to [`OrchestratorLimits`] at runtime.
/// `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct LimitsUpdate {
    pub max_concurrent_executions: Option<usize>,
    pub cooldown_secs: Option<u64>,
    pub max_daily_executions: Option<u64>,
    pub max_daily_loss: Option<f64>,
    pub batch_size: Option<usize>,
    pub batch_window_ms: Option<u64>,
    pub min_confidence: Option<f64>,
}

impl OrchestratorLimits {
    pub fn apply(&mut self, update: &LimitsUpdate) {
        if let Some(v) = update.max_concurrent_executions {
            self.max_concurrent_executions = v;
        }
        if let Some(v) = update.cooldown_secs {
            self.cooldown_secs = v;
        }
        if let Some(v) = update.max_daily_executions {
            self.max_daily_executions = v;
        }
        if let Some(v) = update.max_daily_loss {
            self.max_daily_loss = v;
        }
        if let Some(v) = update.batch_size {
            self.batch_size = v;
        }
        if let Some(v) = update.batch_window_ms {
            self.batch_window_ms = v;
        }
        if let Some(v) = update.min_confidence {
            self.min_confidence = v;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    // Scoring
    #[serde(default)]
    pub scoring_weights: ScoringWeights,
    pub min_predictor_confidence: f64,
    pub hop_penalty: f64,
    pub kelly_fraction: f64,
    pub max_position_fraction: f64,
    pub failure_cost_fraction: f64,
    pub portfolio_value: f64,

    // Orchestration
    #[serde(default)]
    pub limits: OrchestratorLimits,
    pub queue_capacity: usize,
    pub execution_timeout_secs: u64,
    pub housekeeping_interval_secs: u64,

    // Feedback
    pub ema_alpha: f64,
    pub history_limit: usize,
    pub retrain_every: usize,

    // Modes & observability
    pub paper_trading: bool,
    pub metrics_log_path: Option<String>,
    pub log_level: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::test_default();
        Config {
            scoring_weights: ScoringWeights {
                edge: env_parse("WEIGHT_EDGE", defaults.scoring_weights.edge),
                execution: env_parse("WEIGHT_EXECUTION", defaults.scoring_weights.execution),
                regime: env_parse("WEIGHT_REGIME", defaults.scoring_weights.regime),
                liquidity: env_parse("WEIGHT_LIQUIDITY", defaults.scoring_weights.liquidity),
                gas: env_parse("WEIGHT_GAS", defaults.scoring_weights.gas),
            },
            min_predictor_confidence: env_parse(
                "MIN_PREDICTOR_CONFIDENCE",
                defaults.min_predictor_confidence,
            ),
            hop_penalty: env_parse("HOP_PENALTY", defaults.hop_penalty),
            kelly_fraction: env_parse("KELLY_FRACTION", defaults.kelly_fraction),
            max_position_fraction: env_parse(
                "MAX_POSITION_FRACTION",
                defaults.max_position_fraction,
            ),
            failure_cost_fraction: env_parse(
                "FAILURE_COST_FRACTION",
                defaults.failure_cost_fraction,
            ),
            portfolio_value: env_parse("PORTFOLIO_VALUE", defaults.portfolio_value),
            limits: OrchestratorLimits {
                max_concurrent_executions: env_parse(
                    "MAX_CONCURRENT_EXECUTIONS",
                    defaults.limits.max_concurrent_executions,
                ),
                cooldown_secs: env_parse("COOLDOWN_SECS", defaults.limits.cooldown_secs),
                max_daily_executions: env_parse(
                    "MAX_DAILY_EXECUTIONS",
                    defaults.limits.max_daily_executions,
                ),
                max_daily_loss: env_parse("MAX_DAILY_LOSS", defaults.limits.max_daily_loss),
                batch_size: env_parse("BATCH_SIZE", defaults.limits.batch_size),
                batch_window_ms: env_parse("BATCH_WINDOW_MS", defaults.limits.batch_window_ms),
                min_confidence: env_parse("MIN_CONFIDENCE", defaults.limits.min_confidence),
            },
            queue_capacity: env_parse("QUEUE_CAPACITY", defaults.queue_capacity),
            execution_timeout_secs: env_parse(
                "EXECUTION_TIMEOUT_SECS",
                defaults.execution_timeout_secs,
            ),
            housekeeping_interval_secs: env_parse(
                "HOUSEKEEPING_INTERVAL_SECS",
                defaults.housekeeping_interval_secs,
            ),
            ema_alpha: env_parse("EMA_ALPHA", defaults.ema_alpha),
            history_limit: env_parse("HISTORY_LIMIT", defaults.history_limit),
            retrain_every: env_parse("RETRAIN_EVERY", defaults.retrain_every),
            paper_trading: env_parse("PAPER_TRADING", defaults.paper_trading),
            metrics_log_path: env::var("METRICS_LOG_PATH").ok(),
            log_level: env::var("LOG_LEVEL").ok(),
        }
    }

    /// Logs the effective configuration and rejects values the engine
    /// cannot run with. Call once at start-up.
    pub fn validate_and_log(&self) -> crate::error::Result<()> {
        use crate::error::ArbError;

        let weight_sum = self.scoring_weights.sum();
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(ArbError::ConfigError(format!(
                "scoring weights sum to {:.3}, expected 1.0",
                weight_sum
            )));
        }
        if !(0.0..=1.0).contains(&self.limits.min_confidence)
            || !(0.0..=1.0).contains(&self.min_predictor_confidence)
        {
            return Err(ArbError::ConfigError(
                "confidence thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.ema_alpha) || self.ema_alpha == 0.0 {
            return Err(ArbError::ConfigError(format!(
                "ema-alpha {} outside (0, 1)",
                self.ema_alpha
            )));
        }
        if self.limits.max_concurrent_executions == 0 || self.limits.batch_size == 0 {
            return Err(ArbError::ConfigError(
                "max-concurrent-executions and batch-size must be positive".to_string(),
            ));
        }
        if self.portfolio_value <= 0.0 {
            return Err(ArbError::ConfigError(format!(
                "portfolio-value {} must be positive",
                self.portfolio_value
            )));
        }
        log::info!(
            "Config: batch {}x{}ms | concurrency {} | cooldown {}s | daily {} execs / ${} loss | min confidence {:.2} | kelly {:.2}x capped {:.0}% | paper trading: {}",
            self.limits.batch_size,
            self.limits.batch_window_ms,
            self.limits.max_concurrent_executions,
            self.limits.cooldown_secs,
            self.limits.max_daily_executions,
            self.limits.max_daily_loss,
            self.limits.min_confidence,
            self.kelly_fraction,
            self.max_position_fraction * 100.0,
            self.paper_trading
        );
        Ok(())
    }

    pub fn test_default() -> Self {
        Self {
            scoring_weights: ScoringWeights::default(),
            min_predictor_confidence: 0.55,
            hop_penalty: 5.0,
            kelly_fraction: 0.25,
            max_position_fraction: 0.20,
            failure_cost_fraction: 0.10,
            portfolio_value: 100_000.0,
            limits: OrchestratorLimits::default(),
            queue_capacity: 512,
            execution_timeout_secs: 30,
            housekeeping_interval_secs: 60,
            ema_alpha: 0.12,
            history_limit: 512,
            retrain_every: 25,
            paper_trading: true,
            metrics_log_path: None,
            log_level: Some("info".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        assert!((ScoringWeights::default().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_validates() {
        assert!(Config::test_default().validate_and_log().is_ok());
    }

    #[test]
    fn bad_weights_rejected() {
        let mut config = Config::test_default();
        config.scoring_weights.edge = 0.9;
        assert!(config.validate_and_log().is_err());
    }

    #[test]
    fn limits_partial_update_keeps_unset_fields() {
        let mut limits = OrchestratorLimits::default();
        limits.apply(&LimitsUpdate {
            cooldown_secs: Some(5),
            max_daily_loss: Some(1_000.0),
            ..Default::default()
        });
        assert_eq!(limits.cooldown_secs, 5);
        assert_eq!(limits.max_daily_loss, 1_000.0);
        assert_eq!(limits.batch_size, OrchestratorLimits::default().batch_size);
    }
}
