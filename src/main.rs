use cross_arb_bot::{
    ai::SuccessPredictor,
    analytics::{FeedbackRecorder, RouteStatsStore},
    arbitrage::{
        executor::ExecutionAdapter,
        opportunity::{CostEstimate, ExecutionPath, MarketRegime, Opportunity},
        orchestrator::Orchestrator,
        scorer::{Scorer, ScorerConfig},
    },
    config::Config,
    metrics::Metrics,
    simulation::{SimulatedExecutionAdapter, SimulationConfig},
    utils::setup_logging,
};
use log::info;
use std::{collections::HashMap, sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env());
    setup_logging(config.log_level.as_deref()).expect("Failed to initialize logging");
    config.validate_and_log()?;

    info!("Cross-venue arbitrage engine starting...");

    // --- Shared state & feedback loop ---
    let route_stats = Arc::new(RouteStatsStore::new());
    // Plug a trained model in here; the scorer falls back to its
    // heuristic while none is available.
    let predictor: Option<Arc<dyn SuccessPredictor>> = None;
    let recorder = Arc::new(FeedbackRecorder::new(
        Arc::clone(&route_stats),
        config.ema_alpha,
        config.history_limit,
        config.retrain_every,
        predictor.clone(),
    ));
    let metrics = Arc::new(Metrics::new(config.metrics_log_path.as_deref())?);
    let scorer = Scorer::new(ScorerConfig::from_config(&config), predictor);

    // --- Execution adapters ---
    let adapters: HashMap<ExecutionPath, Arc<dyn ExecutionAdapter>> = if config.paper_trading {
        info!("Paper trading mode: routing every path to simulated adapters");
        ExecutionPath::ALL
            .into_iter()
            .map(|path| {
                let adapter: Arc<dyn ExecutionAdapter> = Arc::new(SimulatedExecutionAdapter::new(
                    format!("sim-{}", path),
                    SimulationConfig::default(),
                ));
                (path, adapter)
            })
            .collect()
    } else {
        // Live venue adapters are wired by the deployment, not this binary.
        anyhow::bail!("no live execution adapters configured; set PAPER_TRADING=true");
    };

    let orchestrator = Orchestrator::new(
        &config,
        scorer,
        Arc::clone(&route_stats),
        recorder,
        Arc::clone(&metrics),
        adapters,
        None,
    )?;
    orchestrator.start()?;
    orchestrator.update_market_regime(MarketRegime::neutral()).await;

    // --- Synthetic quote feed (paper trading only) ---
    {
        let feed_engine = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            info!("Synthetic quote feed started");
            let symbols = ["SOL/USDC", "ETH/USDC", "JUP/USDC"];
            let venues = ["raydium", "orca", "binance"];
            let mut interval = tokio::time::interval(Duration::from_millis(250));
            loop {
                interval.tick().await;
                let symbol = symbols[fastrand::usize(..symbols.len())];
                let venue = venues[fastrand::usize(..venues.len())];
                let path = match venue {
                    "binance" => ExecutionPath::ExchangeArbitrage,
                    _ if fastrand::f64() < 0.3 => ExecutionPath::FlashLoan,
                    _ => ExecutionPath::ExchangeArbitrage,
                };
                let edge_bps = 5.0 + fastrand::f64() * 110.0;
                let notional = 5_000.0 + fastrand::f64() * 145_000.0;
                let gross = notional * edge_bps / 10_000.0;
                let reference = 150.0;
                let opportunity = Opportunity::new(
                    symbol,
                    path,
                    venue,
                    reference,
                    reference * (1.0 + edge_bps / 10_000.0),
                    edge_bps,
                    notional,
                    CostEstimate {
                        network_cost: gross * 0.05,
                        venue_fee: notional * 0.0006,
                        expected_slippage: notional * 0.0004 * fastrand::f64(),
                        bridging_cost: 0.0,
                    },
                    1 + fastrand::u32(..2),
                    0.5 + fastrand::f64() * 0.45,
                );
                feed_engine.submit(opportunity);
            }
        });
    }

    // --- Periodic stats report ---
    let stats_engine = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let stats = stats_engine.get_stats().await;
            info!(
                "Report: {} queued | {} in flight | {} executed today | P ${:.2} / L ${:.2} | {} routes tracked",
                stats.queued,
                stats.in_flight,
                stats.daily_executed,
                stats.daily_profit,
                stats.daily_loss,
                stats.route_stats.len()
            );
        }
    });

    info!("Engine running. Press CTRL-C to exit.");
    tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl-c");

    info!("Shutting down gracefully...");
    orchestrator.stop().await;
    info!("Shutdown complete");
    Ok(())
}
