//! Allocator — ranks scored opportunities and admits them against portfolio
//! risk limits, one decision cycle at a time.
//!
//! The admission rule is greedy-by-score with a capital check before every
//! dispatch: not globally optimal bin-packing, but a single sorted pass with
//! bounded decision latency. Cycles are serialized by the caller — available
//! capital is recomputed before each item and never cached across decisions.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, MonitorConfig};
use crate::engine::executor::{ExecutionRequest, Executor};
use crate::types::{
    CycleResult, EngineError, ExitEvent, ExitRules, GasPriceContext, Opportunity, PortfolioState,
    Position, StatsSnapshot,
};

// ---------------------------------------------------------------------------
// Cycle dispatch
// ---------------------------------------------------------------------------

/// Outcome of one allocation cycle: the serialisable result plus the
/// positions opened this cycle, which the engine wires to fresh monitors.
#[derive(Debug)]
pub struct CycleDispatch {
    pub result: CycleResult,
    pub opened: Vec<Position>,
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

pub struct Allocator {
    config: EngineConfig,
    monitor_config: MonitorConfig,
    executor: Arc<dyn Executor>,
    started: bool,
    stats: StatsSnapshot,
    cycle_count: u64,
}

impl Allocator {
    pub fn new(
        config: EngineConfig,
        monitor_config: MonitorConfig,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            config,
            monitor_config,
            executor,
            started: false,
            stats: StatsSnapshot::default(),
            cycle_count: 0,
        }
    }

    /// Begin accepting cycles.
    pub fn start(&mut self) {
        self.started = true;
        info!("Allocator started");
    }

    /// Stop accepting cycles. Pending dispatches die with the cycle; open
    /// positions' monitors are untouched — open risk keeps being managed
    /// until explicitly liquidated.
    pub fn stop(&mut self) {
        self.started = false;
        info!("Allocator stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn stats(&self) -> &StatsSnapshot {
        &self.stats
    }

    /// Run one decision cycle over a batch of scored opportunities.
    ///
    /// Fails fast with `EngineError::Inactive` unless started; every other
    /// failure is local to one opportunity and the cycle continues.
    pub async fn run_cycle(
        &mut self,
        opportunities: Vec<Opportunity>,
        portfolio: &mut PortfolioState,
        market: &GasPriceContext,
    ) -> Result<CycleDispatch, EngineError> {
        if !self.started {
            return Err(EngineError::Inactive);
        }

        let started_at = std::time::Instant::now();
        self.cycle_count += 1;
        let total = opportunities.len();

        // 1. Discard below the score threshold.
        let mut ranked: Vec<Opportunity> = opportunities
            .into_iter()
            .filter(|o| o.score >= self.config.min_score)
            .collect();
        let skipped_below_score = total - ranked.len();

        // 2. Rank: score descending, ties broken by cheaper gas.
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.gas_cost_estimate
                        .partial_cmp(&b.gas_cost_estimate)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        let considered = ranked.len();
        let mut dispatched = 0usize;
        let mut skipped_capital = 0usize;
        let mut failed = 0usize;
        let mut committed_this_cycle = 0.0f64;
        let mut opened: Vec<Position> = Vec::new();

        // 3–7. Walk in rank order; capital is recomputed before every item.
        for opportunity in ranked {
            if dispatched >= self.config.max_strategies_per_cycle {
                debug!(
                    max = self.config.max_strategies_per_cycle,
                    "Cycle dispatch cap reached"
                );
                break;
            }

            let available = portfolio.available_capital();
            let required = opportunity.sizing.required_capital(available);

            if required <= 0.0 || required > available {
                warn!(
                    subject = %opportunity.subject_ref,
                    score = format!("{:.1}", opportunity.score),
                    error = %EngineError::InsufficientCapital {
                        needed: required,
                        available,
                    },
                    "Opportunity skipped — capital constrained"
                );
                skipped_capital += 1;
                continue;
            }

            match self.dispatch(&opportunity, required).await {
                Ok(position) => {
                    info!(
                        position = %position.id,
                        subject = %position.subject_ref,
                        kind = %position.kind,
                        entry = format!("${:.2}", position.entry_value),
                        score = format!("{:.1}", opportunity.score),
                        "Position opened"
                    );
                    self.stats
                        .for_kind_mut(opportunity.kind)
                        .record_dispatch(true);
                    portfolio.trades_total += 1;
                    portfolio.trades_successful += 1;
                    portfolio.open_position(position.clone());
                    committed_this_cycle += required;
                    dispatched += 1;
                    opened.push(position);
                }
                Err(e) => {
                    warn!(
                        subject = %opportunity.subject_ref,
                        kind = %opportunity.kind,
                        error = %e,
                        "Dispatch failed — no position opened"
                    );
                    self.stats
                        .for_kind_mut(opportunity.kind)
                        .record_dispatch(false);
                    portfolio.trades_total += 1;
                    failed += 1;
                }
            }
        }

        let result = CycleResult {
            cycle_number: self.cycle_count,
            considered,
            dispatched,
            skipped_below_score,
            skipped_capital,
            failed,
            committed_this_cycle,
            total_balance: portfolio.total_balance,
            available_capital: portfolio.available_capital(),
            open_positions: portfolio.positions.len(),
            stats: self.stats,
            processing_ms: started_at.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        };

        info!(
            cycle = result.cycle_number,
            considered = result.considered,
            dispatched = result.dispatched,
            capital_skips = result.skipped_capital,
            failed = result.failed,
            congestion = market.congestion_level,
            elapsed_ms = result.processing_ms,
            "Cycle complete"
        );

        Ok(CycleDispatch { result, opened })
    }

    /// Submit one opportunity to the executor, bounded by the dispatch
    /// timeout, and build the resulting position.
    async fn dispatch(
        &self,
        opportunity: &Opportunity,
        required: f64,
    ) -> Result<Position, EngineError> {
        let request = ExecutionRequest {
            kind: opportunity.kind,
            subject_ref: opportunity.subject_ref.clone(),
            amount_quote: required,
        };

        let receipt = timeout(
            Duration::from_millis(self.config.dispatch_timeout_ms),
            self.executor.submit(request),
        )
        .await
        .map_err(|_| {
            EngineError::Execution(format!(
                "dispatch timed out after {}ms",
                self.config.dispatch_timeout_ms
            ))
        })??;

        Ok(Position {
            id: Uuid::new_v4(),
            subject_ref: opportunity.subject_ref.clone(),
            kind: opportunity.kind,
            entry_value: required,
            quantity: receipt.quantity,
            opened_at: Utc::now(),
            exit_rules: self.exit_rules(),
            high_water_mark: required,
        })
    }

    fn exit_rules(&self) -> ExitRules {
        ExitRules {
            profit_target_pct: self.monitor_config.profit_target_pct,
            stop_loss_pct: self.monitor_config.stop_loss_pct,
            trailing_stop_pct: self.monitor_config.trailing_stop_pct,
            max_hold_secs: self.monitor_config.max_hold_secs,
        }
    }

    /// Fold a monitor exit back into portfolio state and strategy stats.
    /// Duplicate deliveries are no-ops. This is the only close path — all
    /// shared-state mutation is serialized through the caller.
    pub fn apply_exit(
        &mut self,
        portfolio: &mut PortfolioState,
        exit: &ExitEvent,
    ) -> Option<Position> {
        match portfolio.close_position(exit.position_id, exit.realized_value) {
            Some(position) => {
                let pnl = exit.realized_value - position.entry_value;
                self.stats.for_kind_mut(position.kind).record_realized(pnl);
                info!(
                    position = %position.id,
                    subject = %position.subject_ref,
                    reason = %exit.reason,
                    realized = format!("${:.2}", exit.realized_value),
                    pnl = format!("${:+.2}", pnl),
                    "Position closed"
                );
                Some(position)
            }
            None => {
                warn!(
                    position = %exit.position_id,
                    reason = %exit.reason,
                    "Exit for unknown or already-closed position — ignored"
                );
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
