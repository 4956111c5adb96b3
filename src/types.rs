//! Shared types for the APEX engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that scorer, engine, and stream
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Candidate events
// ---------------------------------------------------------------------------

/// A candidate event pulled off the external stream. The variant is decided
/// once, at the stream boundary; everything downstream dispatches on the tag
/// instead of inspecting payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CandidateEvent {
    PendingSwap(PendingSwap),
    TokenLaunch(TokenLaunch),
}

impl CandidateEvent {
    /// The pool or token this event refers to.
    pub fn subject_ref(&self) -> &str {
        match self {
            CandidateEvent::PendingSwap(s) => &s.pool_ref,
            CandidateEvent::TokenLaunch(l) => &l.token_ref,
        }
    }

    /// The strategy kind this event maps to.
    pub fn kind(&self) -> OpportunityKind {
        match self {
            CandidateEvent::PendingSwap(_) => OpportunityKind::Sandwich,
            CandidateEvent::TokenLaunch(_) => OpportunityKind::TokenSnipe,
        }
    }
}

/// A pending swap observed in the mempool — the target of a potential
/// sandwich.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSwap {
    pub pool_ref: String,
    /// Trade amount in base units of the pool's input reserve.
    pub amount_in: f64,
    pub counterparty: String,
    pub observed_at: DateTime<Utc>,
    /// Raw upstream payload, preserved for audit.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A newly listed token — the target of a potential snipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLaunch {
    pub token_ref: String,
    pub security: TokenSecurityProfile,
    /// Estimated short-horizon volatility, 0.0–1.0.
    pub volatility: f64,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Composite security assessment supplied by the (external) token crawler.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenSecurityProfile {
    pub contract_verified: bool,
    pub mint_authority_revoked: bool,
    pub supply_bounded: bool,
    pub liquidity_locked: bool,
}

impl TokenSecurityProfile {
    pub const CHECK_COUNT: usize = 4;

    /// Number of checks that passed.
    pub fn passed(&self) -> usize {
        [
            self.contract_verified,
            self.mint_authority_revoked,
            self.supply_bounded,
            self.liquidity_locked,
        ]
        .iter()
        .filter(|c| **c)
        .count()
    }

    /// Fraction of checks passed, 0.0–1.0.
    pub fn pass_ratio(&self) -> f64 {
        self.passed() as f64 / Self::CHECK_COUNT as f64
    }

    /// Names of the checks that failed, for skip logs.
    pub fn failed_checks(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.contract_verified {
            failed.push("contract_verified");
        }
        if !self.mint_authority_revoked {
            failed.push("mint_authority_revoked");
        }
        if !self.supply_bounded {
            failed.push("supply_bounded");
        }
        if !self.liquidity_locked {
            failed.push("liquidity_locked");
        }
        failed
    }
}

// ---------------------------------------------------------------------------
// Market context snapshots
// ---------------------------------------------------------------------------

/// Gas-price context supplied externally. Read-only to the core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GasPriceContext {
    /// Current price per gas unit, in the native asset.
    pub current_gas_price: f64,
    /// Native asset price in the quote currency (USD).
    pub native_price_quote: f64,
    /// Network congestion, 0–100.
    pub congestion_level: f64,
}

impl GasPriceContext {
    /// Whether congestion is high enough to flag elevated spike probability.
    pub fn spike_likely(&self, threshold: f64) -> bool {
        self.congestion_level > threshold
    }
}

/// Liquidity-pool snapshot supplied externally. Staleness is a correctness
/// risk — snapshots are consumed in the cycle they arrive and never cached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiquidityPoolState {
    /// Reserve of the input-side token, in base units.
    pub reserve_in: f64,
    /// Reserve of the output-side token, in base units.
    pub reserve_out: f64,
    /// Total pool liquidity in the quote currency (USD).
    pub total_liquidity_quote: f64,
    /// Native asset price in the quote currency (USD).
    pub native_price_quote: f64,
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Strategy kind. One scorer path and one stats bucket per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Sandwich,
    TokenSnipe,
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpportunityKind::Sandwich => write!(f, "sandwich"),
            OpportunityKind::TokenSnipe => write!(f, "token_snipe"),
        }
    }
}

/// Price-impact risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Classify by price impact percentage: high > 5%, medium 1–5%, low < 1%.
    pub fn from_impact_pct(impact_pct: f64) -> Self {
        if impact_pct > 5.0 {
            RiskLevel::High
        } else if impact_pct >= 1.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// How crowded the opportunity is likely to be, derived from congestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionLevel {
    Low,
    Medium,
    High,
}

impl CompetitionLevel {
    /// Classify by network congestion: high > 80, medium > 50, else low.
    pub fn from_congestion(congestion_level: f64) -> Self {
        if congestion_level > 80.0 {
            CompetitionLevel::High
        } else if congestion_level > 50.0 {
            CompetitionLevel::Medium
        } else {
            CompetitionLevel::Low
        }
    }
}

impl fmt::Display for CompetitionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompetitionLevel::Low => write!(f, "low"),
            CompetitionLevel::Medium => write!(f, "medium"),
            CompetitionLevel::High => write!(f, "high"),
        }
    }
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// How much capital an opportunity wants. Sandwich sizes resolve at the
/// scorer (the front-run notional is a function of pool state alone); snipe
/// sizes are a balance fraction resolved against available capital at
/// allocation time, so the 25% cap binds to the balance actually on hand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PositionSizing {
    Notional { quote: f64 },
    BalanceFraction { fraction: f64 },
}

impl PositionSizing {
    /// Required capital in quote currency, given currently available capital.
    pub fn required_capital(&self, available: f64) -> f64 {
        match self {
            PositionSizing::Notional { quote } => *quote,
            PositionSizing::BalanceFraction { fraction } => fraction * available.max(0.0),
        }
    }
}

/// A scored, ranked candidate action derived from one external event.
/// Immutable once produced; consumed at most once, in the cycle produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub subject_ref: String,
    pub price_impact_pct: f64,
    pub gross_profit_estimate: f64,
    pub gas_cost_estimate: f64,
    pub net_profit_estimate: f64,
    pub risk_level: RiskLevel,
    pub competition_level: CompetitionLevel,
    /// Composite opportunity score, 0–100.
    pub score: f64,
    pub sizing: PositionSizing,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} score={:.1} net=${:.2} gas=${:.2} impact={:.3}% risk={} comp={}",
            self.kind,
            self.subject_ref,
            self.score,
            self.net_profit_estimate,
            self.gas_cost_estimate,
            self.price_impact_pct,
            self.risk_level,
            self.competition_level,
        )
    }
}

// ---------------------------------------------------------------------------
// Positions & exit rules
// ---------------------------------------------------------------------------

/// Exit thresholds attached to a position at open time.
///
/// `profit_target_pct` is relative to entry value: 200 means exit once the
/// position is worth 2.0× what it cost. `stop_loss_pct` and
/// `trailing_stop_pct` are loss percentages (from entry and from the
/// high-water mark respectively).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExitRules {
    pub profit_target_pct: f64,
    pub stop_loss_pct: f64,
    pub trailing_stop_pct: f64,
    pub max_hold_secs: u64,
}

/// Capital committed as a result of a dispatched opportunity, tracked until
/// exit. Created on successful dispatch; mutated only by its own monitor;
/// removed from the portfolio exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub subject_ref: String,
    pub kind: OpportunityKind,
    /// Capital committed at entry, in quote currency.
    pub entry_value: f64,
    /// Quantity of the subject asset received.
    pub quantity: f64,
    pub opened_at: DateTime<Utc>,
    pub exit_rules: ExitRules,
    /// Highest observed position value, the trailing-stop reference.
    pub high_water_mark: f64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} entry=${:.2} qty={:.4} hwm=${:.2}",
            self.kind,
            self.id,
            self.subject_ref,
            self.entry_value,
            self.quantity,
            self.high_water_mark,
        )
    }
}

/// Why a position was closed. The four terminal monitor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    ProfitTarget,
    StopLoss,
    TrailingStop,
    TimeLimit,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ProfitTarget => write!(f, "profit_target"),
            CloseReason::StopLoss => write!(f, "stop_loss"),
            CloseReason::TrailingStop => write!(f, "trailing_stop"),
            CloseReason::TimeLimit => write!(f, "time_limit"),
        }
    }
}

/// Emitted once per closed position, for portfolio reconciliation and
/// downstream alerting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitEvent {
    pub position_id: Uuid,
    pub reason: CloseReason,
    pub realized_value: f64,
}

// ---------------------------------------------------------------------------
// Portfolio state
// ---------------------------------------------------------------------------

/// The single portfolio instance. Owned by the engine; mutated only through
/// the allocator's update path (opens from the decision cycle, closes from
/// serialized monitor exit events) — never touched directly by a monitor or
/// the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Total balance in quote currency, including capital committed to
    /// open positions.
    pub total_balance: f64,
    pub positions: HashMap<Uuid, Position>,
    pub realized_pnl: f64,
    pub trades_total: u64,
    pub trades_successful: u64,
}

impl fmt::Display for PortfolioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "balance=${:.2} open={} committed=${:.2} pnl=${:.2} trades={} win_rate={:.1}%",
            self.total_balance,
            self.positions.len(),
            self.committed_capital(),
            self.realized_pnl,
            self.trades_total,
            self.win_rate() * 100.0,
        )
    }
}

impl PortfolioState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            total_balance: initial_balance,
            positions: HashMap::new(),
            realized_pnl: 0.0,
            trades_total: 0,
            trades_successful: 0,
        }
    }

    /// Capital tied up in open positions.
    pub fn committed_capital(&self) -> f64 {
        self.positions.values().map(|p| p.entry_value).sum()
    }

    /// Capital free for new positions. Recomputed on every call — callers
    /// must not cache this across dispatch decisions.
    pub fn available_capital(&self) -> f64 {
        (self.total_balance - self.committed_capital()).max(0.0)
    }

    /// Win rate as a fraction. 0.0 when no trades have completed.
    pub fn win_rate(&self) -> f64 {
        if self.trades_total == 0 {
            0.0
        } else {
            self.trades_successful as f64 / self.trades_total as f64
        }
    }

    /// Record a newly opened position.
    pub fn open_position(&mut self, position: Position) {
        self.positions.insert(position.id, position);
    }

    /// Close a position and fold its realized value into the balance.
    /// Returns `None` if the position is unknown or already closed, making
    /// duplicate exit deliveries harmless.
    pub fn close_position(&mut self, id: Uuid, realized_value: f64) -> Option<Position> {
        let position = self.positions.remove(&id)?;
        let pnl = realized_value - position.entry_value;
        self.total_balance += pnl;
        self.realized_pnl += pnl;
        Some(position)
    }
}

// ---------------------------------------------------------------------------
// Strategy statistics
// ---------------------------------------------------------------------------

/// Per-kind execution statistics. Monotonically updated; never reset except
/// by process restart.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    pub executions: u64,
    pub successes: u64,
    pub total_profit: f64,
}

impl StrategyStats {
    /// Record a dispatch attempt.
    pub fn record_dispatch(&mut self, success: bool) {
        self.executions += 1;
        if success {
            self.successes += 1;
        }
    }

    /// Fold a realized position result into cumulative profit.
    pub fn record_realized(&mut self, pnl: f64) {
        self.total_profit += pnl;
    }

    /// Win rate, recomputed from the counters on every call.
    pub fn win_rate(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.successes as f64 / self.executions as f64
        }
    }

    /// Average realized profit per successful execution.
    pub fn avg_profit(&self) -> f64 {
        if self.successes == 0 {
            0.0
        } else {
            self.total_profit / self.successes as f64
        }
    }
}

/// Stats snapshot across the (closed) set of strategy kinds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub sandwich: StrategyStats,
    pub token_snipe: StrategyStats,
}

impl StatsSnapshot {
    pub fn for_kind(&self, kind: OpportunityKind) -> &StrategyStats {
        match kind {
            OpportunityKind::Sandwich => &self.sandwich,
            OpportunityKind::TokenSnipe => &self.token_snipe,
        }
    }

    pub fn for_kind_mut(&mut self, kind: OpportunityKind) -> &mut StrategyStats {
        match kind {
            OpportunityKind::Sandwich => &mut self.sandwich,
            OpportunityKind::TokenSnipe => &mut self.token_snipe,
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle result
// ---------------------------------------------------------------------------

/// Summary of a single allocation cycle. Failures are observable here
/// without inspecting logs: considered vs dispatched counts plus skip
/// reasons always populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle_number: u64,
    /// Opportunities that survived the score threshold and entered ranking.
    pub considered: usize,
    pub dispatched: usize,
    pub skipped_below_score: usize,
    pub skipped_capital: usize,
    pub failed: usize,
    pub committed_this_cycle: f64,
    pub total_balance: f64,
    pub available_capital: f64,
    pub open_positions: usize,
    pub stats: StatsSnapshot,
    pub processing_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for CycleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle #{}: considered={} dispatched={} capital_skips={} failed={} committed=${:.2} available=${:.2} open={} ({}ms)",
            self.cycle_number,
            self.considered,
            self.dispatched,
            self.skipped_capital,
            self.failed,
            self.committed_this_cycle,
            self.available_capital,
            self.open_positions,
            self.processing_ms,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for APEX. All variants except `Inactive` are
/// recoverable and local to one opportunity or one monitor tick.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient liquidity: ${available:.2} below ${floor:.2} floor")]
    InsufficientLiquidity { available: f64, floor: f64 },

    #[error("insufficient capital: need ${needed:.2}, have ${available:.2}")]
    InsufficientCapital { needed: f64, available: f64 },

    #[error("security check failed: {passed}/{total} passed, {required_ratio:.0}% required")]
    SecurityCheckFailed {
        passed: usize,
        total: usize,
        required_ratio: f64,
    },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("stale data: {0}")]
    StaleData(String),

    #[error("orchestrator not started")]
    Inactive,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_position(entry_value: f64) -> Position {
        Position {
            id: Uuid::new_v4(),
            subject_ref: "pool-1".to_string(),
            kind: OpportunityKind::Sandwich,
            entry_value,
            quantity: 10.0,
            opened_at: Utc::now(),
            exit_rules: ExitRules {
                profit_target_pct: 200.0,
                stop_loss_pct: 20.0,
                trailing_stop_pct: 10.0,
                max_hold_secs: 3600,
            },
            high_water_mark: entry_value,
        }
    }

    // -- Security profile --

    #[test]
    fn test_security_profile_pass_ratio() {
        let all = TokenSecurityProfile {
            contract_verified: true,
            mint_authority_revoked: true,
            supply_bounded: true,
            liquidity_locked: true,
        };
        assert_eq!(all.passed(), 4);
        assert!((all.pass_ratio() - 1.0).abs() < f64::EPSILON);

        let three = TokenSecurityProfile {
            liquidity_locked: false,
            ..all
        };
        assert_eq!(three.passed(), 3);
        assert!((three.pass_ratio() - 0.75).abs() < f64::EPSILON);
        assert_eq!(three.failed_checks(), vec!["liquidity_locked"]);
    }

    #[test]
    fn test_security_profile_default_fails_everything() {
        let none = TokenSecurityProfile::default();
        assert_eq!(none.passed(), 0);
        assert_eq!(none.failed_checks().len(), TokenSecurityProfile::CHECK_COUNT);
    }

    // -- Classification --

    #[test]
    fn test_risk_level_from_impact() {
        assert_eq!(RiskLevel::from_impact_pct(0.5), RiskLevel::Low);
        assert_eq!(RiskLevel::from_impact_pct(1.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_impact_pct(4.9), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_impact_pct(5.1), RiskLevel::High);
    }

    #[test]
    fn test_competition_from_congestion() {
        assert_eq!(CompetitionLevel::from_congestion(30.0), CompetitionLevel::Low);
        assert_eq!(CompetitionLevel::from_congestion(60.0), CompetitionLevel::Medium);
        assert_eq!(CompetitionLevel::from_congestion(90.0), CompetitionLevel::High);
    }

    #[test]
    fn test_gas_context_spike_flag() {
        let gas = GasPriceContext {
            current_gas_price: 0.000005,
            native_price_quote: 150.0,
            congestion_level: 85.0,
        };
        assert!(gas.spike_likely(80.0));
        assert!(!gas.spike_likely(90.0));
    }

    // -- Position sizing --

    #[test]
    fn test_sizing_notional_ignores_available() {
        let sizing = PositionSizing::Notional { quote: 250.0 };
        assert_eq!(sizing.required_capital(10_000.0), 250.0);
        assert_eq!(sizing.required_capital(0.0), 250.0);
    }

    #[test]
    fn test_sizing_fraction_tracks_available() {
        let sizing = PositionSizing::BalanceFraction { fraction: 0.25 };
        assert!((sizing.required_capital(1000.0) - 250.0).abs() < 1e-10);
        assert!((sizing.required_capital(400.0) - 100.0).abs() < 1e-10);
        assert_eq!(sizing.required_capital(-50.0), 0.0);
    }

    // -- Portfolio --

    #[test]
    fn test_portfolio_new() {
        let p = PortfolioState::new(1000.0);
        assert_eq!(p.total_balance, 1000.0);
        assert_eq!(p.committed_capital(), 0.0);
        assert_eq!(p.available_capital(), 1000.0);
        assert_eq!(p.win_rate(), 0.0);
    }

    #[test]
    fn test_portfolio_available_capital_recomputes() {
        let mut p = PortfolioState::new(1000.0);
        p.open_position(make_position(300.0));
        assert!((p.available_capital() - 700.0).abs() < 1e-10);
        p.open_position(make_position(500.0));
        assert!((p.available_capital() - 200.0).abs() < 1e-10);
        assert!((p.committed_capital() - 800.0).abs() < 1e-10);
    }

    #[test]
    fn test_portfolio_close_folds_pnl() {
        let mut p = PortfolioState::new(1000.0);
        let pos = make_position(300.0);
        let id = pos.id;
        p.open_position(pos);

        let closed = p.close_position(id, 450.0);
        assert!(closed.is_some());
        assert!((p.total_balance - 1150.0).abs() < 1e-10);
        assert!((p.realized_pnl - 150.0).abs() < 1e-10);
        assert!(p.positions.is_empty());
    }

    #[test]
    fn test_portfolio_close_is_idempotent() {
        let mut p = PortfolioState::new(1000.0);
        let pos = make_position(300.0);
        let id = pos.id;
        p.open_position(pos);

        assert!(p.close_position(id, 250.0).is_some());
        let balance_after_first = p.total_balance;
        // Second delivery of the same exit must be a no-op.
        assert!(p.close_position(id, 250.0).is_none());
        assert_eq!(p.total_balance, balance_after_first);
    }

    #[test]
    fn test_portfolio_win_rate() {
        let mut p = PortfolioState::new(1000.0);
        p.trades_total = 10;
        p.trades_successful = 7;
        assert!((p.win_rate() - 0.7).abs() < f64::EPSILON);
    }

    // -- Strategy stats --

    #[test]
    fn test_stats_win_rate_fresh_after_every_update() {
        let mut stats = StrategyStats::default();
        stats.record_dispatch(true);
        assert!((stats.win_rate() - 1.0).abs() < f64::EPSILON);
        stats.record_dispatch(false);
        assert!((stats.win_rate() - 0.5).abs() < f64::EPSILON);
        stats.record_dispatch(true);
        assert!((stats.win_rate() - 2.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_stats_avg_profit() {
        let mut stats = StrategyStats::default();
        assert_eq!(stats.avg_profit(), 0.0);
        stats.record_dispatch(true);
        stats.record_dispatch(true);
        stats.record_realized(30.0);
        stats.record_realized(-10.0);
        assert!((stats.avg_profit() - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_stats_snapshot_routes_by_kind() {
        let mut snap = StatsSnapshot::default();
        snap.for_kind_mut(OpportunityKind::Sandwich).record_dispatch(true);
        snap.for_kind_mut(OpportunityKind::TokenSnipe).record_dispatch(false);
        assert_eq!(snap.for_kind(OpportunityKind::Sandwich).successes, 1);
        assert_eq!(snap.for_kind(OpportunityKind::TokenSnipe).successes, 0);
        assert_eq!(snap.for_kind(OpportunityKind::TokenSnipe).executions, 1);
    }

    // -- Events --

    #[test]
    fn test_candidate_event_routing() {
        let swap = CandidateEvent::PendingSwap(PendingSwap {
            pool_ref: "pool-1".to_string(),
            amount_in: 1000.0,
            counterparty: "0xabc".to_string(),
            observed_at: Utc::now(),
            metadata: serde_json::Value::Null,
        });
        assert_eq!(swap.kind(), OpportunityKind::Sandwich);
        assert_eq!(swap.subject_ref(), "pool-1");

        let launch = CandidateEvent::TokenLaunch(TokenLaunch {
            token_ref: "mint-9".to_string(),
            security: TokenSecurityProfile::default(),
            volatility: 0.4,
            observed_at: Utc::now(),
            metadata: serde_json::Value::Null,
        });
        assert_eq!(launch.kind(), OpportunityKind::TokenSnipe);
        assert_eq!(launch.subject_ref(), "mint-9");
    }

    #[test]
    fn test_candidate_event_serialization_roundtrip() {
        let swap = CandidateEvent::PendingSwap(PendingSwap {
            pool_ref: "pool-1".to_string(),
            amount_in: 1000.0,
            counterparty: "0xabc".to_string(),
            observed_at: Utc::now(),
            metadata: serde_json::json!({"router": "v2"}),
        });
        let json = serde_json::to_string(&swap).unwrap();
        assert!(json.contains("pending_swap"));
        let parsed: CandidateEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.subject_ref(), "pool-1");
    }

    // -- Display / errors --

    #[test]
    fn test_close_reason_display() {
        assert_eq!(format!("{}", CloseReason::ProfitTarget), "profit_target");
        assert_eq!(format!("{}", CloseReason::TrailingStop), "trailing_stop");
    }

    #[test]
    fn test_cycle_result_display() {
        let result = CycleResult {
            cycle_number: 3,
            considered: 5,
            dispatched: 2,
            skipped_below_score: 1,
            skipped_capital: 1,
            failed: 1,
            committed_this_cycle: 420.0,
            total_balance: 1000.0,
            available_capital: 580.0,
            open_positions: 2,
            stats: StatsSnapshot::default(),
            processing_ms: 12,
            timestamp: Utc::now(),
        };
        let display = format!("{result}");
        assert!(display.contains("#3"));
        assert!(display.contains("dispatched=2"));
    }

    #[test]
    fn test_engine_error_display() {
        let e = EngineError::InsufficientLiquidity {
            available: 4000.0,
            floor: 5000.0,
        };
        assert!(format!("{e}").contains("4000.00"));
        assert!(format!("{e}").contains("5000.00"));

        let e = EngineError::InsufficientCapital {
            needed: 500.0,
            available: 100.0,
        };
        assert!(format!("{e}").contains("500.00"));

        assert_eq!(format!("{}", EngineError::Inactive), "orchestrator not started");
    }
}
