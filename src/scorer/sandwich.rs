//! Sandwich-path evaluation: constant-product price impact, gas cost
//! modelling, position sizing, and the composite opportunity score.

use tracing::debug;

use crate::config::ScorerConfig;
use crate::types::{
    CompetitionLevel, EngineError, GasPriceContext, LiquidityPoolState, Opportunity,
    OpportunityKind, PendingSwap, PositionSizing, RiskLevel,
};

// ---------------------------------------------------------------------------
// AMM math
// ---------------------------------------------------------------------------

/// Constant-product output for a swap, with the trading fee folded into the
/// effective input amount: `out = reserve_out × in_eff / (reserve_in + in_eff)`
/// where `in_eff = in × (1 − fee)`.
pub fn amount_out(amount_in: f64, reserve_in: f64, reserve_out: f64, fee: f64) -> f64 {
    let in_eff = amount_in * (1.0 - fee);
    reserve_out * in_eff / (reserve_in + in_eff)
}

/// Price impact of a trade, expressed as `amount_in / reserve_in` in percent.
pub fn price_impact_pct(amount_in: f64, reserve_in: f64) -> f64 {
    amount_in / reserve_in * 100.0
}

// ---------------------------------------------------------------------------
// Gas model
// ---------------------------------------------------------------------------

/// Estimated cost of both sandwich legs, in quote currency.
#[derive(Debug, Clone, Copy)]
pub struct GasEstimate {
    /// Front-run leg, priced at `priority_multiplier` × current gas to
    /// outbid the target.
    pub front_run_quote: f64,
    /// Back-run leg at the unmultiplied price.
    pub back_run_quote: f64,
    /// Elevated spike probability when congestion is past the threshold.
    pub spike_likely: bool,
}

impl GasEstimate {
    pub fn total(&self) -> f64 {
        self.front_run_quote + self.back_run_quote
    }
}

/// Estimate both legs from the current gas context.
pub fn estimate_gas(gas: &GasPriceContext, config: &ScorerConfig) -> GasEstimate {
    let front_native = config.base_gas_units * gas.current_gas_price * config.priority_multiplier;
    let back_native = config.base_gas_units * gas.current_gas_price;

    GasEstimate {
        front_run_quote: front_native * gas.native_price_quote,
        back_run_quote: back_native * gas.native_price_quote,
        spike_likely: gas.spike_likely(config.congestion_spike_threshold),
    }
}

// ---------------------------------------------------------------------------
// Position sizing
// ---------------------------------------------------------------------------

/// Bound the front-run notional by the pool-liquidity cap and the
/// gas-multiple profitability floor: the smaller of the liquidity bound and
/// the larger of the floor and the absolute minimum.
pub fn position_size(pool_liquidity: f64, total_gas: f64, config: &ScorerConfig) -> f64 {
    let liquidity_bound = config.max_pool_fraction * pool_liquidity;
    let profitability_floor = config.gas_profit_multiple * total_gas;
    liquidity_bound.min(profitability_floor.max(config.min_notional))
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Three capped contributions — profit, impact magnitude, gas efficiency —
/// summed and clamped to [0, 100]. Independent caps let an opportunity be
/// attractive for any combination of reasons without one term saturating
/// the score.
pub fn composite_score(
    net_profit: f64,
    impact_pct: f64,
    total_gas: f64,
    config: &ScorerConfig,
) -> f64 {
    let profit_term = (net_profit / config.profit_score_divisor).min(config.profit_score_cap);
    let impact_term = (impact_pct * config.impact_score_multiplier).min(config.impact_score_cap);
    let efficiency_term = if total_gas > 0.0 {
        (net_profit / total_gas * config.efficiency_score_multiplier)
            .min(config.efficiency_score_cap)
    } else {
        0.0
    };

    (profit_term + impact_term + efficiency_term).clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Score a pending swap as a sandwich opportunity. Input has already been
/// validated by the scorer boundary.
pub(crate) fn score(
    swap: &PendingSwap,
    gas: &GasPriceContext,
    pool: &LiquidityPoolState,
    config: &ScorerConfig,
) -> Result<Opportunity, EngineError> {
    let impact_pct = price_impact_pct(swap.amount_in, pool.reserve_in);
    let victim_out = amount_out(
        swap.amount_in,
        pool.reserve_in,
        pool.reserve_out,
        config.swap_fee,
    );
    let gas_estimate = estimate_gas(gas, config);
    let total_gas = gas_estimate.total();

    let size = position_size(pool.total_liquidity_quote, total_gas, config);
    let gross_profit = size * impact_pct / 100.0;
    let net_profit = gross_profit - total_gas;

    debug!(
        pool = %swap.pool_ref,
        victim_out = format!("{victim_out:.2}"),
        impact = format!("{impact_pct:.4}%"),
        "Target swap modelled"
    );

    if gas_estimate.spike_likely {
        debug!(
            pool = %swap.pool_ref,
            congestion = gas.congestion_level,
            "Gas spike probability elevated"
        );
    }

    let score = composite_score(net_profit, impact_pct, total_gas, config);

    Ok(Opportunity {
        kind: OpportunityKind::Sandwich,
        subject_ref: swap.pool_ref.clone(),
        price_impact_pct: impact_pct,
        gross_profit_estimate: gross_profit,
        gas_cost_estimate: total_gas,
        net_profit_estimate: net_profit,
        risk_level: RiskLevel::from_impact_pct(impact_pct),
        competition_level: CompetitionLevel::from_congestion(gas.congestion_level),
        score,
        sizing: PositionSizing::Notional { quote: size },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
