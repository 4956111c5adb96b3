//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! scoring constant (caps, multipliers, thresholds) lives here rather than
//! in the code: the numbers were chosen empirically upstream and are tuning
//! parameters, not invariants.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub sniper: SniperConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

/// Decision-loop settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between decision cycles.
    pub cycle_interval_secs: u64,
    /// Opportunities scoring below this are discarded before ranking.
    pub min_score: f64,
    /// Maximum dispatches per cycle.
    pub max_strategies_per_cycle: usize,
    /// Starting balance in quote currency.
    pub initial_balance: f64,
    /// Upper bound on a single executor dispatch.
    pub dispatch_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 5,
            min_score: 30.0,
            max_strategies_per_cycle: 3,
            initial_balance: 10_000.0,
            dispatch_timeout_ms: 2_000,
        }
    }
}

/// Sandwich-path scoring parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScorerConfig {
    /// Pools below this liquidity (quote currency) are rejected outright.
    pub min_pool_liquidity: f64,
    /// AMM trading fee folded into the effective input amount.
    pub swap_fee: f64,
    /// Gas units consumed by one leg of the sandwich.
    pub base_gas_units: f64,
    /// Front-run gas multiplier to outbid the target. Must exceed 1.0.
    pub priority_multiplier: f64,
    /// Congestion level above which gas spike probability is flagged.
    pub congestion_spike_threshold: f64,
    /// Front-run size cap as a fraction of total pool liquidity.
    pub max_pool_fraction: f64,
    /// Profitability floor: position must be at least this multiple of gas.
    pub gas_profit_multiple: f64,
    /// Absolute minimum position notional in quote currency.
    pub min_notional: f64,
    /// Score term caps and multipliers.
    pub profit_score_cap: f64,
    pub profit_score_divisor: f64,
    pub impact_score_cap: f64,
    pub impact_score_multiplier: f64,
    pub efficiency_score_cap: f64,
    pub efficiency_score_multiplier: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            min_pool_liquidity: 5_000.0,
            swap_fee: 0.003,
            base_gas_units: 220_000.0,
            priority_multiplier: 1.5,
            congestion_spike_threshold: 80.0,
            max_pool_fraction: 0.10,
            gas_profit_multiple: 10.0,
            min_notional: 50.0,
            profit_score_cap: 40.0,
            profit_score_divisor: 10.0,
            impact_score_cap: 30.0,
            impact_score_multiplier: 6.0,
            efficiency_score_cap: 30.0,
            efficiency_score_multiplier: 3.0,
        }
    }
}

/// Token-snipe scoring parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SniperConfig {
    /// Fraction of security checks that must pass (0.0–1.0).
    pub security_threshold: f64,
    /// Assumed win probability `p` for the Kelly fraction.
    pub win_probability: f64,
    /// Assumed average win ratio `b` for the Kelly fraction.
    pub avg_win_ratio: f64,
    /// Hard cap on the balance fraction committed to one snipe.
    pub max_balance_fraction: f64,
    /// Notional used to express profit estimates for ranking.
    pub reference_notional: f64,
}

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            security_threshold: 0.75,
            win_probability: 0.60,
            avg_win_ratio: 2.0,
            max_balance_fraction: 0.25,
            reference_notional: 1_000.0,
        }
    }
}

/// Position-monitor settings. The exit percentages become the `ExitRules`
/// attached to every new position.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    /// Milliseconds between monitor polls.
    pub poll_interval_ms: u64,
    /// Upper bound on one price/balance fetch.
    pub fetch_timeout_ms: u64,
    /// Exit when value reaches this percentage of entry (200 = 2.0×).
    pub profit_target_pct: f64,
    /// Exit when value drops this far below entry.
    pub stop_loss_pct: f64,
    /// Exit on this percentage drawdown from the high-water mark.
    pub trailing_stop_pct: f64,
    /// Exit unconditionally after this many seconds.
    pub max_hold_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            fetch_timeout_ms: 1_500,
            profit_target_pct: 200.0,
            stop_loss_pct: 20.0,
            trailing_stop_pct: 15.0,
            max_hold_secs: 1_800,
        }
    }
}

/// Simulated-executor settings for the paper-trading binary.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Fraction of submissions that fail, 0.0–1.0.
    pub failure_rate: f64,
    /// Simulated fill slippage percentage.
    pub slippage_pct: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            slippage_pct: 0.5,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }
}
