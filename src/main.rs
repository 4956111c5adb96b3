//! APEX — real-time MEV decision engine
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the engine to the paper-trading boundary implementations, and runs the
//! decision loop with graceful shutdown.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use apex::config::AppConfig;
use apex::engine::executor::SimulatedExecutor;
use apex::engine::monitor::DriftPriceFeed;
use apex::engine::Engine;
use apex::stream::{Candidate, MarketStream, ReplayStream, StreamBatch};
use apex::types::{
    CandidateEvent, GasPriceContext, LiquidityPoolState, PendingSwap, TokenLaunch,
    TokenSecurityProfile,
};

const BANNER: &str = r#"
    _    ____  _______  __
   / \  |  _ \| ____\ \/ /
  / _ \ | |_) |  _|  \  /
 / ___ \|  __/| |___ /  \
/_/   \_\_|   |_____/_/\_\

  Adaptive Profit EXtraction engine
  v0.1.0 — paper-trading loop
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML, falling back to defaults when absent.
    let cfg = match AppConfig::load("config.toml") {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config.toml not loaded ({e:#}); using defaults");
            AppConfig::default()
        }
    };

    init_logging();

    println!("{BANNER}");
    info!(
        cycle_interval_secs = cfg.engine.cycle_interval_secs,
        initial_balance = cfg.engine.initial_balance,
        min_score = cfg.engine.min_score,
        "APEX starting up"
    );

    // -- Boundary implementations (paper trading) -------------------------

    let executor = Arc::new(SimulatedExecutor::new(cfg.executor.clone()));
    // Gentle upward drift so paper positions resolve via profit target or
    // trailing stop rather than only the time limit.
    let feed = Arc::new(DriftPriceFeed::new(2.0));
    let mut stream = ReplayStream::new(demo_batches());

    let mut engine = Engine::new(&cfg, executor, feed);
    engine.start();

    // -- Main loop --------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.engine.cycle_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.engine.cycle_interval_secs,
        "Entering decision loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let batch = match stream.next_batch().await {
                    Ok(batch) => batch,
                    Err(e) => {
                        error!(error = %e, "Stream failed — skipping cycle");
                        continue;
                    }
                };

                match engine.run_tick(batch).await {
                    Ok(result) => {
                        info!(%result, "Tick complete");
                    }
                    Err(e) => {
                        error!(error = %e, "Cycle failed — halting");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // Stop taking new cycles, fold in any straggler exits, then wind the
    // monitors down for process exit.
    engine.stop();
    engine.drain_exits();
    engine.shutdown_monitors().await;
    engine.drain_exits();

    info!(
        portfolio = %engine.portfolio(),
        "APEX shut down cleanly."
    );

    Ok(())
}

/// A canned slice of stream traffic for the paper loop: a few sandwich
/// targets of varying size and one token launch per gas regime.
fn demo_batches() -> Vec<StreamBatch> {
    let pool = LiquidityPoolState {
        reserve_in: 1_500_000.0,
        reserve_out: 3_750_000_000.0,
        total_liquidity_quote: 120_000.0,
        native_price_quote: 2_500.0,
    };

    let gas_regimes = [25.0, 55.0, 85.0];
    let swap_amounts = [40_000.0, 150_000.0, 320_000.0];

    gas_regimes
        .iter()
        .enumerate()
        .map(|(i, congestion)| {
            let gas = GasPriceContext {
                current_gas_price: 0.00000002 * (1.0 + congestion / 100.0),
                native_price_quote: 2_500.0,
                congestion_level: *congestion,
            };

            let mut candidates: Vec<Candidate> = swap_amounts
                .iter()
                .enumerate()
                .map(|(j, amount)| Candidate {
                    event: CandidateEvent::PendingSwap(PendingSwap {
                        pool_ref: format!("pool-{i}-{j}"),
                        amount_in: *amount,
                        counterparty: format!("0xtarget{i}{j}"),
                        observed_at: Utc::now(),
                        metadata: serde_json::json!({ "router": "v2" }),
                    }),
                    pool,
                })
                .collect();

            candidates.push(Candidate {
                event: CandidateEvent::TokenLaunch(TokenLaunch {
                    token_ref: format!("mint-{i}"),
                    security: TokenSecurityProfile {
                        contract_verified: true,
                        mint_authority_revoked: true,
                        supply_bounded: true,
                        liquidity_locked: i % 2 == 0,
                    },
                    volatility: 0.3 + 0.2 * i as f64,
                    observed_at: Utc::now(),
                    metadata: serde_json::json!({ "venue": "launchpad" }),
                }),
                pool,
            });

            StreamBatch { candidates, gas }
        })
        .collect()
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("apex=info"));

    let json_logging = std::env::var("APEX_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
