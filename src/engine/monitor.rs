//! Position monitor — one exit-condition state machine per open position.
//!
//! Each monitor is an independent, cancellable timer task. On every poll it
//! walks a fixed ladder: time limit, liquidation check, price fetch (a miss
//! skips the tick), high-water-mark update, then profit target → stop loss →
//! trailing stop in strict priority order. The first satisfied condition
//! fires the exit exactly once; the task then stops for good and hands the
//! close reason back to the engine over the exit channel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::types::{CloseReason, EngineError, ExitEvent, Position};

// ---------------------------------------------------------------------------
// Price feed boundary
// ---------------------------------------------------------------------------

/// Injectable price/balance feed polled by monitors. Real market data lives
/// behind this seam in an external service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Currently held quantity of the subject asset.
    async fn balance_of(&self, subject_ref: &str) -> Result<f64, EngineError>;

    /// Current price of the subject asset in quote currency per unit.
    async fn price_of(&self, subject_ref: &str) -> Result<f64, EngineError>;

    /// Called when a position opens on this subject, letting paper feeds
    /// seed their state. Real feeds ignore it.
    async fn track(&self, _position: &Position) {}
}

// ---------------------------------------------------------------------------
// Tick evaluation
// ---------------------------------------------------------------------------

/// What a single poll decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// No exit condition met (or feed unavailable): stay OPEN.
    Hold,
    /// Balance is zero — position was liquidated externally. Terminate
    /// without a duplicate exit.
    Liquidated,
    /// One exit rule fired.
    Exit {
        reason: CloseReason,
        realized_value: f64,
    },
}

/// Whether the position has been open past its time limit.
pub fn time_limit_exceeded(position: &Position, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(position.opened_at).num_seconds()
        >= position.exit_rules.max_hold_secs as i64
}

/// Evaluate the value-based exit ladder for one tick. Raises the high-water
/// mark first, then checks profit target, stop loss, and trailing stop in
/// that fixed order — a position hitting profit target and trailing stop on
/// the same tick closes as a profit-target exit.
pub fn evaluate_exit(position: &mut Position, current_value: f64) -> Option<CloseReason> {
    if current_value > position.high_water_mark {
        position.high_water_mark = current_value;
    }

    let rules = position.exit_rules;

    if current_value >= position.entry_value * rules.profit_target_pct / 100.0 {
        return Some(CloseReason::ProfitTarget);
    }

    if current_value <= position.entry_value * (1.0 - rules.stop_loss_pct / 100.0) {
        return Some(CloseReason::StopLoss);
    }

    if position.high_water_mark > 0.0 {
        let drawdown_pct =
            (position.high_water_mark - current_value) / position.high_water_mark * 100.0;
        if drawdown_pct >= rules.trailing_stop_pct {
            return Some(CloseReason::TrailingStop);
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// The per-position state machine. Owns its copy of the position; the
/// authoritative portfolio entry is only touched by the engine when the
/// exit event arrives.
pub struct PositionMonitor {
    position: Position,
    feed: Arc<dyn PriceFeed>,
    config: MonitorConfig,
    exits: mpsc::Sender<ExitEvent>,
    /// Last successfully computed position value; reported when a time-limit
    /// exit fires before a fresh price is available.
    last_value: f64,
}

impl PositionMonitor {
    pub fn new(
        position: Position,
        feed: Arc<dyn PriceFeed>,
        config: MonitorConfig,
        exits: mpsc::Sender<ExitEvent>,
    ) -> Self {
        let last_value = position.entry_value;
        Self {
            position,
            feed,
            config,
            exits,
            last_value,
        }
    }

    pub fn position_id(&self) -> Uuid {
        self.position.id
    }

    /// Run one poll of the exit ladder.
    pub async fn tick(&mut self) -> TickOutcome {
        let now = Utc::now();

        // 1. Time limit is checked before any fetch: a dead feed must not
        //    keep a position open forever.
        if time_limit_exceeded(&self.position, now) {
            return TickOutcome::Exit {
                reason: CloseReason::TimeLimit,
                realized_value: self.last_value,
            };
        }

        let fetch_timeout = Duration::from_millis(self.config.fetch_timeout_ms);

        // 2. Balance. Zero means someone already liquidated the position.
        let balance = match timeout(
            fetch_timeout,
            self.feed.balance_of(&self.position.subject_ref),
        )
        .await
        {
            Ok(Ok(balance)) => balance,
            Ok(Err(e)) => {
                debug!(
                    position = %self.position.id,
                    error = %e,
                    "Balance fetch failed — skipping tick"
                );
                return TickOutcome::Hold;
            }
            Err(_) => {
                debug!(position = %self.position.id, "Balance fetch timed out — skipping tick");
                return TickOutcome::Hold;
            }
        };

        if balance <= 0.0 {
            info!(
                position = %self.position.id,
                subject = %self.position.subject_ref,
                "Balance is zero — position liquidated externally"
            );
            return TickOutcome::Liquidated;
        }

        // 3. Price. A transient feed miss is not an exit condition.
        let price = match timeout(fetch_timeout, self.feed.price_of(&self.position.subject_ref))
            .await
        {
            Ok(Ok(price)) => price,
            Ok(Err(e)) => {
                debug!(
                    position = %self.position.id,
                    error = %e,
                    "Price unavailable — skipping tick"
                );
                return TickOutcome::Hold;
            }
            Err(_) => {
                debug!(position = %self.position.id, "Price fetch timed out — skipping tick");
                return TickOutcome::Hold;
            }
        };

        // 4–5. Value, high-water mark, exit ladder.
        let current_value = balance * price;
        self.last_value = current_value;

        match evaluate_exit(&mut self.position, current_value) {
            Some(reason) => TickOutcome::Exit {
                reason,
                realized_value: current_value,
            },
            None => TickOutcome::Hold,
        }
    }
}

// ---------------------------------------------------------------------------
// Task handle
// ---------------------------------------------------------------------------

/// Handle to a running monitor task. `stop` cancels the timer immediately
/// and permanently; there is no resume.
pub struct MonitorHandle {
    position_id: Uuid,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn position_id(&self) -> Uuid {
        self.position_id
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to wind down.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Spawn the monitor's timer task. The loop ends on the first exit or
/// liquidation, or when the handle is stopped.
pub fn spawn_monitor(mut monitor: PositionMonitor) -> MonitorHandle {
    let position_id = monitor.position_id();
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let poll = Duration::from_millis(monitor.config.poll_interval_ms);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Consume the immediate first tick so the first evaluation happens
        // one full interval after open.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    debug!(position = %position_id, "Monitor stopped");
                    break;
                }
                _ = interval.tick() => {
                    match monitor.tick().await {
                        TickOutcome::Hold => {}
                        TickOutcome::Liquidated => break,
                        TickOutcome::Exit { reason, realized_value } => {
                            info!(
                                position = %position_id,
                                reason = %reason,
                                realized = format!("${:.2}", realized_value),
                                "Exit condition fired"
                            );
                            if monitor
                                .exits
                                .send(ExitEvent {
                                    position_id,
                                    reason,
                                    realized_value,
                                })
                                .await
                                .is_err()
                            {
                                warn!(position = %position_id, "Exit channel closed — engine gone");
                            }
                            break;
                        }
                    }
                }
            }
        }
    });

    MonitorHandle {
        position_id,
        stop: stop_tx,
        task,
    }
}

// ---------------------------------------------------------------------------
// Paper price feed
// ---------------------------------------------------------------------------

/// Deterministic paper feed: each tracked subject starts at its position's
/// entry value and the price drifts by a fixed percentage per poll. Used by
/// the binary's paper-trading loop and the simulation tests.
pub struct DriftPriceFeed {
    state: Mutex<HashMap<String, (f64, f64)>>,
    drift_per_poll_pct: f64,
}

impl DriftPriceFeed {
    pub fn new(drift_per_poll_pct: f64) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            drift_per_poll_pct,
        }
    }

    /// Seed a subject directly (tests).
    pub fn set(&self, subject_ref: &str, balance: f64, price: f64) {
        self.state
            .lock()
            .expect("feed state poisoned")
            .insert(subject_ref.to_string(), (balance, price));
    }

    /// Mark a subject as externally liquidated.
    pub fn liquidate(&self, subject_ref: &str) {
        if let Some(entry) = self
            .state
            .lock()
            .expect("feed state poisoned")
            .get_mut(subject_ref)
        {
            entry.0 = 0.0;
        }
    }
}

#[async_trait]
impl PriceFeed for DriftPriceFeed {
    async fn balance_of(&self, subject_ref: &str) -> Result<f64, EngineError> {
        self.state
            .lock()
            .expect("feed state poisoned")
            .get(subject_ref)
            .map(|(balance, _)| *balance)
            .ok_or_else(|| EngineError::StaleData(format!("unknown subject {subject_ref}")))
    }

    async fn price_of(&self, subject_ref: &str) -> Result<f64, EngineError> {
        let mut state = self.state.lock().expect("feed state poisoned");
        match state.get_mut(subject_ref) {
            Some((_, price)) => {
                *price *= 1.0 + self.drift_per_poll_pct / 100.0;
                Ok(*price)
            }
            None => Err(EngineError::StaleData(format!(
                "unknown subject {subject_ref}"
            ))),
        }
    }

    async fn track(&self, position: &Position) {
        let price = if position.quantity > 0.0 {
            position.entry_value / position.quantity
        } else {
            0.0
        };
        self.set(&position.subject_ref, position.quantity, price);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitRules, OpportunityKind};
    use chrono::Duration as ChronoDuration;

    fn make_rules() -> ExitRules {
        ExitRules {
            profit_target_pct: 200.0,
            stop_loss_pct: 20.0,
            trailing_stop_pct: 10.0,
            max_hold_secs: 3_600,
        }
    }

    fn make_position(entry_value: f64) -> Position {
        Position {
            id: Uuid::new_v4(),
            subject_ref: "pool-1".to_string(),
            kind: OpportunityKind::Sandwich,
            entry_value,
            quantity: 100.0,
            opened_at: Utc::now(),
            exit_rules: make_rules(),
            high_water_mark: entry_value,
        }
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 10,
            fetch_timeout_ms: 50,
            ..MonitorConfig::default()
        }
    }

    // -- Pure exit ladder --

    #[test]
    fn test_profit_target_fires_at_multiple_of_entry() {
        let mut pos = make_position(100.0);
        // 200% target → fires at 2.0× entry.
        assert_eq!(evaluate_exit(&mut pos, 199.0), None);
        assert_eq!(
            evaluate_exit(&mut pos, 200.0),
            Some(CloseReason::ProfitTarget)
        );
    }

    #[test]
    fn test_profit_target_beats_trailing_stop_same_tick() {
        // Entry $100, HWM already $400: at $250 both profit target (≥ $200)
        // and trailing stop (37.5% drawdown) are satisfied. Priority order
        // records this as a profit-target exit.
        let mut pos = make_position(100.0);
        pos.high_water_mark = 400.0;
        assert_eq!(
            evaluate_exit(&mut pos, 250.0),
            Some(CloseReason::ProfitTarget)
        );
    }

    #[test]
    fn test_stop_loss_beats_trailing_stop_same_tick() {
        let mut pos = make_position(100.0);
        pos.high_water_mark = 150.0;
        // $75 is ≤ 80% stop line and a 50% drawdown from HWM.
        assert_eq!(evaluate_exit(&mut pos, 75.0), Some(CloseReason::StopLoss));
    }

    #[test]
    fn test_trailing_stop_fires_on_drawdown_from_hwm() {
        let mut pos = make_position(100.0);
        // Rise to 150 — raises HWM, no exit (target is 200).
        assert_eq!(evaluate_exit(&mut pos, 150.0), None);
        assert_eq!(pos.high_water_mark, 150.0);
        // Fall to 130: 13.3% drawdown ≥ 10% trailing, still above stop loss.
        assert_eq!(
            evaluate_exit(&mut pos, 130.0),
            Some(CloseReason::TrailingStop)
        );
    }

    #[test]
    fn test_rising_value_never_trips_trailing() {
        let mut pos = make_position(100.0);
        for value in [101.0, 110.0, 125.0, 140.0] {
            assert_eq!(evaluate_exit(&mut pos, value), None, "value {value}");
        }
        assert_eq!(pos.high_water_mark, 140.0);
    }

    #[test]
    fn test_time_limit() {
        let mut pos = make_position(100.0);
        pos.opened_at = Utc::now() - ChronoDuration::seconds(3_601);
        assert!(time_limit_exceeded(&pos, Utc::now()));

        pos.opened_at = Utc::now();
        assert!(!time_limit_exceeded(&pos, Utc::now()));
    }

    // -- Tick against a mocked feed --

    #[tokio::test]
    async fn test_tick_time_limit_skips_fetches() {
        let mut pos = make_position(100.0);
        pos.opened_at = Utc::now() - ChronoDuration::seconds(7_200);

        // No expectations set: any feed call would panic the test.
        let feed = Arc::new(MockPriceFeed::new());
        let (tx, _rx) = mpsc::channel(1);
        let mut monitor = PositionMonitor::new(pos, feed, fast_config(), tx);

        match monitor.tick().await {
            TickOutcome::Exit {
                reason: CloseReason::TimeLimit,
                realized_value,
            } => assert_eq!(realized_value, 100.0),
            other => panic!("expected time-limit exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tick_zero_balance_terminates_without_exit() {
        let mut feed = MockPriceFeed::new();
        feed.expect_balance_of().returning(|_| Ok(0.0));
        let (tx, _rx) = mpsc::channel(1);
        let mut monitor =
            PositionMonitor::new(make_position(100.0), Arc::new(feed), fast_config(), tx);

        assert_eq!(monitor.tick().await, TickOutcome::Liquidated);
    }

    #[tokio::test]
    async fn test_tick_price_error_skips_tick() {
        let mut feed = MockPriceFeed::new();
        feed.expect_balance_of().returning(|_| Ok(100.0));
        feed.expect_price_of()
            .returning(|_| Err(EngineError::StaleData("feed down".to_string())));
        let (tx, _rx) = mpsc::channel(1);
        let mut monitor =
            PositionMonitor::new(make_position(100.0), Arc::new(feed), fast_config(), tx);

        // Position remains OPEN: no state transition, no exit.
        assert_eq!(monitor.tick().await, TickOutcome::Hold);
    }

    #[tokio::test]
    async fn test_tick_feed_timeout_skips_tick() {
        // A hanging feed call must be bounded by the fetch timeout and
        // treated as a skipped tick, not an exit.
        struct HangingFeed;

        #[async_trait]
        impl PriceFeed for HangingFeed {
            async fn balance_of(&self, _subject_ref: &str) -> Result<f64, EngineError> {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(1.0)
            }
            async fn price_of(&self, _subject_ref: &str) -> Result<f64, EngineError> {
                Ok(1.0)
            }
        }

        let (tx, _rx) = mpsc::channel(1);
        let mut monitor =
            PositionMonitor::new(make_position(100.0), Arc::new(HangingFeed), fast_config(), tx);

        assert_eq!(monitor.tick().await, TickOutcome::Hold);
    }

    #[tokio::test]
    async fn test_tick_computes_value_and_exits_on_profit() {
        let mut feed = MockPriceFeed::new();
        feed.expect_balance_of().returning(|_| Ok(100.0));
        feed.expect_price_of().returning(|_| Ok(2.5)); // value 250 ≥ 200
        let (tx, _rx) = mpsc::channel(1);
        let mut monitor =
            PositionMonitor::new(make_position(100.0), Arc::new(feed), fast_config(), tx);

        match monitor.tick().await {
            TickOutcome::Exit {
                reason: CloseReason::ProfitTarget,
                realized_value,
            } => assert!((realized_value - 250.0).abs() < 1e-10),
            other => panic!("expected profit exit, got {other:?}"),
        }
    }

    // -- Spawned task --

    #[tokio::test]
    async fn test_spawned_monitor_sends_exit_exactly_once() {
        let feed = Arc::new(DriftPriceFeed::new(0.0));
        feed.set("pool-1", 100.0, 2.5); // value 250: immediate profit exit

        let (tx, mut rx) = mpsc::channel(8);
        let pos = make_position(100.0);
        let id = pos.id;
        let handle = spawn_monitor(PositionMonitor::new(pos, feed, fast_config(), tx));

        let exit = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("monitor should exit quickly")
            .expect("channel open");
        assert_eq!(exit.position_id, id);
        assert_eq!(exit.reason, CloseReason::ProfitTarget);

        // The task ended after the single exit; the channel stays silent.
        handle.join().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_cancels_without_exit_event() {
        let feed = Arc::new(DriftPriceFeed::new(0.0));
        feed.set("pool-1", 100.0, 1.0); // value 100: no exit condition

        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn_monitor(PositionMonitor::new(
            make_position(100.0),
            feed,
            fast_config(),
            tx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
        handle.join().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_externally_liquidated_position_winds_down_silently() {
        let feed = Arc::new(DriftPriceFeed::new(0.0));
        feed.set("pool-1", 100.0, 1.0);
        feed.liquidate("pool-1");

        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn_monitor(PositionMonitor::new(
            make_position(100.0),
            feed,
            fast_config(),
            tx,
        ));

        handle.join().await;
        assert!(rx.try_recv().is_err());
    }

    // -- Drift feed --

    #[tokio::test]
    async fn test_drift_feed_moves_price_per_poll() {
        let feed = DriftPriceFeed::new(10.0);
        feed.set("pool-1", 1.0, 100.0);
        assert!((feed.price_of("pool-1").await.unwrap() - 110.0).abs() < 1e-9);
        assert!((feed.price_of("pool-1").await.unwrap() - 121.0).abs() < 1e-9);
        assert!(feed.price_of("unknown").await.is_err());
    }
}
