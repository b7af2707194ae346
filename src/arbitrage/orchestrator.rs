//! The orchestrator: central engine coordinating the scoring and
//! execution pipeline.
//!
//! Three cooperative loops share state only through synchronized
//! primitives: the producer path (`submit`, bounded mpsc), the
//! batch/score/dispatch loop, and a housekeeping loop that resets daily
//! counters at the local day boundary and refreshes the market regime.
//!
//! Per-batch state machine:
//! queued -> batched -> scored -> {rejected | dispatching} -> executing
//! -> {succeeded | failed | timed-out} -> recorded.
//!
//! Admission control gates every dispatch: daily execution limit, daily
//! loss limit, concurrency limit, cooldown. A refusal discards the
//! decision for this cycle; the underlying opportunity is not retried.

use crate::{
    analytics::{route_stats::RouteStats, FeedbackRecorder, RouteStatsStore},
    arbitrage::{
        executor::{ExecutionAdapter, RegimeProvider},
        opportunity::{Decision, ExecutionPath, ExecutionResult, MarketRegime, Opportunity},
        scorer::Scorer,
    },
    config::{Config, LimitsUpdate, OrchestratorLimits},
    error::{ArbError, Result},
    metrics::Metrics,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, RwLock},
    time::{timeout, timeout_at},
};

/// Why an accepted decision was not dispatched this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdmissionRefusal {
    DailyExecutionLimit { executed: u64 },
    DailyLossLimit { loss: f64 },
    ConcurrencyLimit { in_flight: usize },
    CooldownActive { remaining: Duration },
}

impl AdmissionRefusal {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionRefusal::DailyExecutionLimit { .. } => "daily execution limit",
            AdmissionRefusal::DailyLossLimit { .. } => "daily loss limit",
            AdmissionRefusal::ConcurrencyLimit { .. } => "concurrency limit",
            AdmissionRefusal::CooldownActive { .. } => "cooldown active",
        }
    }
}

impl fmt::Display for AdmissionRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionRefusal::DailyExecutionLimit { executed } => {
                write!(f, "daily execution limit reached ({} executed)", executed)
            }
            AdmissionRefusal::DailyLossLimit { loss } => {
                write!(f, "daily loss limit reached (${:.2} lost)", loss)
            }
            AdmissionRefusal::ConcurrencyLimit { in_flight } => {
                write!(f, "concurrency limit reached ({} in flight)", in_flight)
            }
            AdmissionRefusal::CooldownActive { remaining } => {
                write!(f, "cooldown active ({:?} remaining)", remaining)
            }
        }
    }
}

/// Daily counters, reset by housekeeping at the local day boundary.
#[derive(Debug)]
struct DailyWindow {
    day: chrono::NaiveDate,
    executed: u64,
    realized_profit: f64,
    realized_loss: f64,
}

impl DailyWindow {
    fn today() -> Self {
        Self {
            day: chrono::Local::now().date_naive(),
            executed: 0,
            realized_profit: 0.0,
            realized_loss: 0.0,
        }
    }
}

/// Observability snapshot returned by [`Orchestrator::get_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub queued: usize,
    pub in_flight: usize,
    pub daily_executed: u64,
    pub daily_profit: f64,
    pub daily_loss: f64,
    pub opportunities_dropped: u64,
    pub blended_confidence: f64,
    pub route_stats: HashMap<String, RouteStats>,
}

pub struct Orchestrator {
    scorer: Scorer,
    route_stats: Arc<RouteStatsStore>,
    recorder: Arc<FeedbackRecorder>,
    metrics: Arc<Metrics>,
    adapters: HashMap<ExecutionPath, Arc<dyn ExecutionAdapter>>,
    regime_provider: Option<Arc<dyn RegimeProvider>>,

    limits: RwLock<OrchestratorLimits>,
    regime: RwLock<Option<MarketRegime>>,
    portfolio_value: f64,
    execution_timeout: Duration,
    housekeeping_interval: Duration,

    sender: mpsc::Sender<Opportunity>,
    receiver: Mutex<Option<mpsc::Receiver<Opportunity>>>,

    in_flight: AtomicUsize,
    daily: Mutex<DailyWindow>,
    last_dispatch: Mutex<Option<tokio::time::Instant>>,
    blended_confidence: Mutex<f64>,
    shutdown: AtomicBool,
}

impl Orchestrator {
    /// Builds the engine. Fails fast when any execution path lacks a
    /// registered adapter; a decision must never discover a missing
    /// backend at dispatch time.
    pub fn new(
        config: &Config,
        scorer: Scorer,
        route_stats: Arc<RouteStatsStore>,
        recorder: Arc<FeedbackRecorder>,
        metrics: Arc<Metrics>,
        adapters: HashMap<ExecutionPath, Arc<dyn ExecutionAdapter>>,
        regime_provider: Option<Arc<dyn RegimeProvider>>,
    ) -> Result<Arc<Self>> {
        for path in ExecutionPath::ALL {
            if !adapters.contains_key(&path) {
                return Err(ArbError::MissingAdapter(path.to_string()));
            }
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity);

        info!(
            "Orchestrator initialized: queue {} | batch {}x{}ms | concurrency {} | cooldown {}s | {} adapters",
            config.queue_capacity,
            config.limits.batch_size,
            config.limits.batch_window_ms,
            config.limits.max_concurrent_executions,
            config.limits.cooldown_secs,
            adapters.len()
        );

        Ok(Arc::new(Self {
            scorer,
            route_stats,
            recorder,
            metrics,
            adapters,
            regime_provider,
            limits: RwLock::new(config.limits.clone()),
            regime: RwLock::new(None),
            portfolio_value: config.portfolio_value,
            execution_timeout: Duration::from_secs(config.execution_timeout_secs),
            housekeeping_interval: Duration::from_secs(config.housekeeping_interval_secs),
            sender,
            receiver: Mutex::new(Some(receiver)),
            in_flight: AtomicUsize::new(0),
            daily: Mutex::new(DailyWindow::today()),
            last_dispatch: Mutex::new(None),
            blended_confidence: Mutex::new(0.5),
            shutdown: AtomicBool::new(false),
        }))
    }

    /// Spawns the batch loop and the housekeeping loop. Call once.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let receiver = self
            .receiver
            .lock()
            .expect("receiver mutex poisoned")
            .take()
            .ok_or_else(|| ArbError::ConfigError("orchestrator already started".to_string()))?;

        let batch = Arc::clone(self);
        tokio::spawn(async move { batch.run_batch_loop(receiver).await });

        let housekeeping = Arc::clone(self);
        tokio::spawn(async move { housekeeping.run_housekeeping().await });

        Ok(())
    }

    /// Fire-and-forget intake. Drops with a warning on a full queue;
    /// opportunities are transient and safe to lose.
    pub fn submit(&self, opportunity: Opportunity) {
        if self.shutdown.load(Ordering::SeqCst) {
            warn!(
                "Rejecting opportunity {} submitted during shutdown",
                opportunity.id
            );
            return;
        }
        self.metrics.log_submitted();
        match self.sender.try_send(opportunity) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                let queued = self.queued_count();
                warn!(
                    "Inbound queue full ({} pending); dropping opportunity {} for {}",
                    queued, dropped.id, dropped.symbol
                );
                self.metrics.log_dropped(queued);
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                warn!("Inbound queue closed; dropping opportunity {}", dropped.id);
            }
        }
    }

    /// Replaces the regime snapshot wholesale.
    pub async fn update_market_regime(&self, regime: MarketRegime) {
        info!(
            "Market regime updated: {} (vol {:.2}, gas p{:.0})",
            regime.label,
            regime.volatility,
            regime.gas_percentile * 100.0
        );
        *self.regime.write().await = Some(regime);
    }

    /// Applies a partial limits update at runtime.
    pub async fn update_limits(&self, update: LimitsUpdate) {
        let mut limits = self.limits.write().await;
        limits.apply(&update);
        info!(
            "Limits updated: concurrency {} | cooldown {}s | daily {} execs / ${} loss | min confidence {:.2}",
            limits.max_concurrent_executions,
            limits.cooldown_secs,
            limits.max_daily_executions,
            limits.max_daily_loss,
            limits.min_confidence
        );
    }

    /// Point-in-time observability snapshot. Never mutates state.
    pub async fn get_stats(&self) -> OrchestratorStats {
        let daily = self.daily.lock().expect("daily mutex poisoned");
        OrchestratorStats {
            queued: self.queued_count(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            daily_executed: daily.executed,
            daily_profit: daily.realized_profit,
            daily_loss: daily.realized_loss,
            opportunities_dropped: self
                .metrics
                .opportunities_dropped
                .load(Ordering::Relaxed),
            blended_confidence: *self
                .blended_confidence
                .lock()
                .expect("confidence mutex poisoned"),
            route_stats: self.route_stats.snapshot(),
        }
    }

    /// Cooperative shutdown: loops exit at their next wake, queued
    /// opportunities are discarded, in-flight executions drain.
    pub async fn stop(&self) {
        info!("Stop requested; draining in-flight executions");
        self.shutdown.store(true, Ordering::SeqCst);
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        info!("Orchestrator stopped");
    }

    fn queued_count(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    // ---- batch/score/dispatch loop ----

    async fn run_batch_loop(self: Arc<Self>, mut receiver: mpsc::Receiver<Opportunity>) {
        info!("Batch loop started");
        while !self.shutdown.load(Ordering::SeqCst) {
            let batch = self.collect_batch(&mut receiver).await;
            if batch.is_empty() {
                continue;
            }
            debug!("Scoring batch of {} candidates", batch.len());

            let regime = self.regime.read().await.clone();
            let evaluation = self.scorer.score(
                &batch,
                regime.as_ref(),
                &self.route_stats,
                self.portfolio_value,
            );

            let Some(decision) = evaluation.decision else {
                debug!("No viable candidate among {} in batch", batch.len());
                continue;
            };
            decision.log_summary();
            self.metrics.log_decision(&decision);

            let limits = self.limits.read().await.clone();
            match self.try_admit(&limits) {
                Ok(()) => self.dispatch(decision),
                Err(refusal) => {
                    info!(
                        "Admission refused for decision {}: {}",
                        decision.opportunity.id, refusal
                    );
                    self.metrics.log_admission_refused(refusal.as_str());
                }
            }
        }
        info!("Batch loop exited; {} queued opportunities discarded", self.queued_count());
    }

    /// Accumulates one batch: returns once `batch_size` candidates arrived
    /// or `batch_window_ms` elapsed since the first, whichever is sooner.
    /// Idle polls are bounded so shutdown is observed promptly.
    async fn collect_batch(&self, receiver: &mut mpsc::Receiver<Opportunity>) -> Vec<Opportunity> {
        let (batch_size, window_ms) = {
            let limits = self.limits.read().await;
            (limits.batch_size, limits.batch_window_ms)
        };
        let mut batch = Vec::with_capacity(batch_size);

        match timeout(Duration::from_millis(200), receiver.recv()).await {
            Ok(Some(opportunity)) => batch.push(opportunity),
            Ok(None) | Err(_) => return batch,
        }

        let deadline = tokio::time::Instant::now() + Duration::from_millis(window_ms);
        while batch.len() < batch_size {
            match timeout_at(deadline, receiver.recv()).await {
                Ok(Some(opportunity)) => batch.push(opportunity),
                Ok(None) | Err(_) => break,
            }
        }
        batch
    }

    /// Admission control, in order: daily execution limit, daily loss
    /// limit, concurrency (atomically reserving the slot), cooldown. On
    /// `Ok` the in-flight slot stays reserved for the dispatch.
    fn try_admit(&self, limits: &OrchestratorLimits) -> std::result::Result<(), AdmissionRefusal> {
        {
            let daily = self.daily.lock().expect("daily mutex poisoned");
            if daily.executed >= limits.max_daily_executions {
                return Err(AdmissionRefusal::DailyExecutionLimit {
                    executed: daily.executed,
                });
            }
            if daily.realized_loss >= limits.max_daily_loss {
                return Err(AdmissionRefusal::DailyLossLimit {
                    loss: daily.realized_loss,
                });
            }
        }

        if self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limits.max_concurrent_executions).then_some(n + 1)
            })
            .is_err()
        {
            return Err(AdmissionRefusal::ConcurrencyLimit {
                in_flight: self.in_flight.load(Ordering::SeqCst),
            });
        }

        let mut last = self.last_dispatch.lock().expect("dispatch mutex poisoned");
        let now = tokio::time::Instant::now();
        let cooldown = Duration::from_secs(limits.cooldown_secs);
        if let Some(previous) = *last {
            let elapsed = now.duration_since(previous);
            if elapsed < cooldown {
                drop(last);
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return Err(AdmissionRefusal::CooldownActive {
                    remaining: cooldown - elapsed,
                });
            }
        }
        *last = Some(now);
        Ok(())
    }

    /// Hands the decision to its adapter on a spawned task with a bounded
    /// deadline. The in-flight slot was reserved by `try_admit`.
    fn dispatch(self: &Arc<Self>, decision: Decision) {
        // Registry coverage is validated at construction.
        let adapter = Arc::clone(
            self.adapters
                .get(&decision.opportunity.path)
                .expect("adapter registry validated at construction"),
        );
        let engine = Arc::clone(self);
        let deadline = self.execution_timeout;

        tokio::spawn(async move {
            info!(
                "Dispatching {} ({} on {}) via adapter '{}'",
                decision.opportunity.id,
                decision.opportunity.symbol,
                decision.opportunity.venue,
                adapter.name()
            );
            let started = std::time::Instant::now();
            let outcome = timeout(
                deadline,
                adapter.execute(&decision.opportunity, &decision),
            )
            .await;

            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(
                        "Adapter '{}' failed for {}: {}",
                        adapter.name(),
                        decision.opportunity.id,
                        e
                    );
                    ExecutionResult::failed(&decision, e.to_string(), started.elapsed(), false)
                }
                Err(_) => {
                    warn!(
                        "Execution of {} timed out after {:?} on adapter '{}'",
                        decision.opportunity.id,
                        deadline,
                        adapter.name()
                    );
                    ExecutionResult::failed(
                        &decision,
                        format!("timed out after {:?}", deadline),
                        started.elapsed(),
                        true,
                    )
                }
            };
            engine.complete(&decision, result);
        });
    }

    /// Terminal step of the per-dispatch state machine: rolls daily
    /// counters, records feedback, then releases the in-flight slot. The
    /// slot is released last so a drained gauge implies recorded feedback.
    fn complete(&self, decision: &Decision, result: ExecutionResult) {
        {
            let mut daily = self.daily.lock().expect("daily mutex poisoned");
            daily.executed += 1;
            if result.realized_profit >= 0.0 {
                daily.realized_profit += result.realized_profit;
            } else {
                daily.realized_loss += -result.realized_profit;
            }
        }

        info!(
            "Execution {} completed: success={}, profit={:.2}, latency={:?}{}",
            result.opportunity_id,
            result.success,
            result.realized_profit,
            result.latency,
            if result.timed_out { " (timed out)" } else { "" }
        );

        self.metrics.log_execution(&result);
        self.recorder.record_outcome(&result);

        let mut blended = self
            .blended_confidence
            .lock()
            .expect("confidence mutex poisoned");
        let observed = if result.success {
            decision.confidence
        } else {
            0.0
        };
        *blended = *blended * 0.9 + observed * 0.1;
        drop(blended);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    // ---- housekeeping loop ----

    async fn run_housekeeping(self: Arc<Self>) {
        info!(
            "Housekeeping loop started (interval {:?})",
            self.housekeeping_interval
        );
        let mut ticker = tokio::time::interval(self.housekeeping_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately; skip it.
        ticker.tick().await;

        while !self.shutdown.load(Ordering::SeqCst) {
            ticker.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            self.reset_daily_if_new_day();

            if let Some(provider) = &self.regime_provider {
                if let Some(regime) = provider.current_regime().await {
                    debug!("Housekeeping refreshed market regime: {}", regime.label);
                    *self.regime.write().await = Some(regime);
                }
            }

            let stats = self.get_stats().await;
            info!(
                "Status: {} queued, {} in flight, {} executed today (P ${:.2} / L ${:.2}), blended confidence {:.3}",
                stats.queued,
                stats.in_flight,
                stats.daily_executed,
                stats.daily_profit,
                stats.daily_loss,
                stats.blended_confidence
            );
        }
        info!("Housekeeping loop exited");
    }

    fn reset_daily_if_new_day(&self) {
        let today = chrono::Local::now().date_naive();
        let mut daily = self.daily.lock().expect("daily mutex poisoned");
        if daily.day != today {
            info!(
                "Daily counters reset ({}): {} executed, P ${:.2} / L ${:.2}",
                daily.day, daily.executed, daily.realized_profit, daily.realized_loss
            );
            *daily = DailyWindow::today();
        }
    }

    #[cfg(test)]
    fn release_slot(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::scorer::ScorerConfig;
    use crate::simulation::{SimulatedExecutionAdapter, SimulationConfig};

    fn test_orchestrator(mut mutate: impl FnMut(&mut Config)) -> Arc<Orchestrator> {
        let mut config = Config::test_default();
        mutate(&mut config);

        let route_stats = Arc::new(RouteStatsStore::new());
        let recorder = Arc::new(FeedbackRecorder::new(
            Arc::clone(&route_stats),
            config.ema_alpha,
            config.history_limit,
            0,
            None,
        ));
        let metrics = Arc::new(Metrics::new(None).unwrap());
        let scorer = Scorer::new(ScorerConfig::from_config(&config), None);

        let mut adapters: HashMap<ExecutionPath, Arc<dyn ExecutionAdapter>> = HashMap::new();
        for path in ExecutionPath::ALL {
            adapters.insert(
                path,
                Arc::new(SimulatedExecutionAdapter::new(
                    path.as_str(),
                    SimulationConfig {
                        success_rate: 1.0,
                        min_latency_ms: 1,
                        max_latency_ms: 2,
                        ..Default::default()
                    },
                )),
            );
        }

        Orchestrator::new(
            &config,
            scorer,
            route_stats,
            recorder,
            metrics,
            adapters,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn construction_fails_without_full_adapter_registry() {
        let config = Config::test_default();
        let route_stats = Arc::new(RouteStatsStore::new());
        let recorder = Arc::new(FeedbackRecorder::new(
            Arc::clone(&route_stats),
            0.12,
            16,
            0,
            None,
        ));
        let metrics = Arc::new(Metrics::new(None).unwrap());
        let scorer = Scorer::new(ScorerConfig::default(), None);

        let result = Orchestrator::new(
            &config,
            scorer,
            route_stats,
            recorder,
            metrics,
            HashMap::new(),
            None,
        );
        assert!(matches!(result, Err(ArbError::MissingAdapter(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_refuses_rapid_dispatches() {
        // With a 5 s cooldown the first dispatch is admitted, immediate
        // retries are refused, and the gate reopens once the clock
        // advances past the cooldown.
        let orchestrator = test_orchestrator(|c| {
            c.limits.cooldown_secs = 5;
            c.limits.max_concurrent_executions = 10;
        });
        let limits = orchestrator.limits.read().await.clone();

        assert!(orchestrator.try_admit(&limits).is_ok());
        orchestrator.release_slot();

        for _ in 0..2 {
            let refusal = orchestrator.try_admit(&limits).unwrap_err();
            assert!(matches!(refusal, AdmissionRefusal::CooldownActive { .. }));
        }

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(matches!(
            orchestrator.try_admit(&limits),
            Err(AdmissionRefusal::CooldownActive { .. })
        ));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(orchestrator.try_admit(&limits).is_ok());
        orchestrator.release_slot();
    }

    #[tokio::test]
    async fn concurrency_reserve_never_exceeds_limit() {
        let orchestrator = test_orchestrator(|c| {
            c.limits.cooldown_secs = 0;
            c.limits.max_concurrent_executions = 2;
        });
        let limits = orchestrator.limits.read().await.clone();

        assert!(orchestrator.try_admit(&limits).is_ok());
        assert!(orchestrator.try_admit(&limits).is_ok());
        assert!(matches!(
            orchestrator.try_admit(&limits),
            Err(AdmissionRefusal::ConcurrencyLimit { .. })
        ));
        assert_eq!(orchestrator.in_flight.load(Ordering::SeqCst), 2);

        orchestrator.release_slot();
        assert!(orchestrator.try_admit(&limits).is_ok());
        orchestrator.release_slot();
        orchestrator.release_slot();
    }

    #[tokio::test]
    async fn daily_limits_refuse_admission() {
        let orchestrator = test_orchestrator(|c| {
            c.limits.cooldown_secs = 0;
            c.limits.max_daily_executions = 1;
        });
        let limits = orchestrator.limits.read().await.clone();

        {
            let mut daily = orchestrator.daily.lock().unwrap();
            daily.executed = 1;
        }
        assert!(matches!(
            orchestrator.try_admit(&limits),
            Err(AdmissionRefusal::DailyExecutionLimit { .. })
        ));

        {
            let mut daily = orchestrator.daily.lock().unwrap();
            daily.executed = 0;
            daily.realized_loss = limits.max_daily_loss + 1.0;
        }
        assert!(matches!(
            orchestrator.try_admit(&limits),
            Err(AdmissionRefusal::DailyLossLimit { .. })
        ));
    }

    #[tokio::test]
    async fn daily_window_resets_on_new_day() {
        let orchestrator = test_orchestrator(|_| {});
        {
            let mut daily = orchestrator.daily.lock().unwrap();
            daily.day = chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
            daily.executed = 9;
            daily.realized_loss = 123.0;
        }
        orchestrator.reset_daily_if_new_day();
        let stats = orchestrator.get_stats().await;
        assert_eq!(stats.daily_executed, 0);
        assert_eq!(stats.daily_loss, 0.0);
    }

    #[tokio::test]
    async fn get_stats_is_idempotent() {
        let orchestrator = test_orchestrator(|_| {});
        let first = orchestrator.get_stats().await;
        let second = orchestrator.get_stats().await;
        assert_eq!(first.queued, second.queued);
        assert_eq!(first.in_flight, second.in_flight);
        assert_eq!(first.daily_executed, second.daily_executed);
        assert_eq!(first.blended_confidence, second.blended_confidence);
    }

    #[tokio::test]
    async fn limits_update_applies_partially() {
        let orchestrator = test_orchestrator(|_| {});
        orchestrator
            .update_limits(LimitsUpdate {
                cooldown_secs: Some(1),
                ..Default::default()
            })
            .await;
        let limits = orchestrator.limits.read().await;
        assert_eq!(limits.cooldown_secs, 1);
        assert_eq!(
            limits.batch_size,
            Config::test_default().limits.batch_size
        );
    }
}
