//! Core engine — the score → allocate → monitor loop.
//!
//! The engine owns the single `PortfolioState` and the exit-event channel.
//! Monitors never touch shared state: they report exits over the channel
//! and the engine folds them in through the allocator's single update path,
//! between cycles, so no two closes interleave their read-modify-write.

pub mod allocator;
pub mod executor;
pub mod monitor;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::scorer::Scorer;
use crate::stream::StreamBatch;
use crate::types::{CycleResult, EngineError, ExitEvent, Opportunity, PortfolioState};

use allocator::Allocator;
use executor::Executor;
use monitor::{spawn_monitor, MonitorHandle, PositionMonitor, PriceFeed};

/// Exit-channel depth. Monitors block briefly if the engine lags this far
/// behind; cycles drain the queue first, so in practice it never fills.
const EXIT_CHANNEL_CAPACITY: usize = 64;

pub struct Engine {
    scorer: Scorer,
    allocator: Allocator,
    portfolio: PortfolioState,
    feed: Arc<dyn PriceFeed>,
    monitor_config: crate::config::MonitorConfig,
    exits_tx: mpsc::Sender<ExitEvent>,
    exits_rx: mpsc::Receiver<ExitEvent>,
    monitors: HashMap<Uuid, MonitorHandle>,
}

impl Engine {
    pub fn new(config: &AppConfig, executor: Arc<dyn Executor>, feed: Arc<dyn PriceFeed>) -> Self {
        let (exits_tx, exits_rx) = mpsc::channel(EXIT_CHANNEL_CAPACITY);
        Self {
            scorer: Scorer::new(config.scorer.clone(), config.sniper.clone()),
            allocator: Allocator::new(
                config.engine.clone(),
                config.monitor.clone(),
                executor,
            ),
            portfolio: PortfolioState::new(config.engine.initial_balance),
            feed,
            monitor_config: config.monitor.clone(),
            exits_tx,
            exits_rx,
            monitors: HashMap::new(),
        }
    }

    pub fn start(&mut self) {
        self.allocator.start();
    }

    /// Stop taking new cycles. Open positions' monitors keep running — open
    /// risk is managed until explicitly liquidated or the process exits.
    pub fn stop(&mut self) {
        self.allocator.stop();
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn open_monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Run one full decision tick: fold in any monitor exits, score the
    /// batch, allocate, and start a monitor per opened position.
    pub async fn run_tick(&mut self, batch: StreamBatch) -> Result<CycleResult, EngineError> {
        self.drain_exits();

        let gas = batch.gas;
        let mut opportunities: Vec<Opportunity> = Vec::with_capacity(batch.candidates.len());
        for candidate in &batch.candidates {
            match self.scorer.score(&candidate.event, &gas, &candidate.pool) {
                Ok(opportunity) => opportunities.push(opportunity),
                Err(e) => {
                    debug!(
                        subject = candidate.event.subject_ref(),
                        error = %e,
                        "Candidate rejected"
                    );
                }
            }
        }

        let dispatch = self
            .allocator
            .run_cycle(opportunities, &mut self.portfolio, &gas)
            .await?;

        for position in dispatch.opened {
            self.feed.track(&position).await;
            let monitor = PositionMonitor::new(
                position.clone(),
                self.feed.clone(),
                self.monitor_config.clone(),
                self.exits_tx.clone(),
            );
            self.monitors.insert(position.id, spawn_monitor(monitor));
        }

        Ok(dispatch.result)
    }

    /// Apply queued monitor exits to the portfolio. Called at the top of
    /// every tick and explicitly at shutdown; returns how many closed.
    pub fn drain_exits(&mut self) -> usize {
        let mut closed = 0;
        while let Ok(exit) = self.exits_rx.try_recv() {
            if self
                .allocator
                .apply_exit(&mut self.portfolio, &exit)
                .is_some()
            {
                closed += 1;
            }
            if let Some(handle) = self.monitors.remove(&exit.position_id) {
                handle.stop();
            }
        }
        // Forget handles whose tasks ended without an exit event (external
        // liquidation): their positions stay until reconciled upstream.
        self.monitors.retain(|_, handle| !handle.is_finished());
        closed
    }

    /// Stop every monitor and wait for the tasks to wind down. Used on
    /// process shutdown only — it abandons open risk management.
    pub async fn shutdown_monitors(&mut self) {
        let handles: Vec<MonitorHandle> = self.monitors.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.stop();
        }
        futures::future::join_all(handles.into_iter().map(|h| h.join())).await;
        info!("All monitors stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
