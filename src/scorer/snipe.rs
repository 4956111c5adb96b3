//! Token-snipe evaluation: the launch security gate and Kelly-criterion
//! position sizing.

use tracing::debug;

use crate::config::{ScorerConfig, SniperConfig};
use crate::types::{
    CompetitionLevel, EngineError, GasPriceContext, Opportunity, OpportunityKind, PositionSizing,
    RiskLevel, TokenLaunch, TokenSecurityProfile,
};

use super::sandwich::composite_score;

// ---------------------------------------------------------------------------
// Kelly sizing
// ---------------------------------------------------------------------------

/// Raw Kelly fraction `f = (b·p − q)/b` where `b` is the average win ratio,
/// `p` the win probability, and `q = 1 − p`.
pub fn kelly_fraction(avg_win_ratio: f64, win_probability: f64) -> f64 {
    let q = 1.0 - win_probability;
    (avg_win_ratio * win_probability - q) / avg_win_ratio
}

/// Discount the raw fraction by estimated volatility and apply the hard
/// balance cap. Volatility is clamped below 1.0 so a wild estimate degrades
/// the fraction instead of negating it.
pub fn sized_fraction(raw_kelly: f64, volatility: f64, config: &SniperConfig) -> f64 {
    let discounted = raw_kelly * (1.0 - volatility.clamp(0.0, 0.99));
    discounted.min(config.max_balance_fraction)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Score a token launch as a snipe opportunity. The security gate runs
/// before any sizing: launches under the composite check threshold are
/// rejected outright.
pub(crate) fn score(
    launch: &TokenLaunch,
    gas: &GasPriceContext,
    config: &SniperConfig,
    scorer: &ScorerConfig,
) -> Result<Opportunity, EngineError> {
    let security = &launch.security;
    if security.pass_ratio() < config.security_threshold {
        debug!(
            token = %launch.token_ref,
            failed = ?security.failed_checks(),
            "Launch rejected by security gate"
        );
        return Err(EngineError::SecurityCheckFailed {
            passed: security.passed(),
            total: TokenSecurityProfile::CHECK_COUNT,
            required_ratio: config.security_threshold * 100.0,
        });
    }

    let raw_kelly = kelly_fraction(config.avg_win_ratio, config.win_probability);
    if raw_kelly <= 0.0 {
        return Err(EngineError::Validation(format!(
            "non-positive Kelly fraction {raw_kelly:.4} (b={}, p={})",
            config.avg_win_ratio, config.win_probability
        )));
    }

    let fraction = sized_fraction(raw_kelly, launch.volatility, config);

    // Edge per unit staked; profit is expressed on the reference notional so
    // snipe and sandwich scores rank on the same scale.
    let edge = config.avg_win_ratio * config.win_probability - (1.0 - config.win_probability);
    let stake = fraction * config.reference_notional;
    let gross_profit = stake * edge;

    // One aggressive buy leg; the snipe races the crowd just like a front-run.
    let gas_cost = scorer.base_gas_units
        * gas.current_gas_price
        * scorer.priority_multiplier
        * gas.native_price_quote;
    let net_profit = gross_profit - gas_cost;

    let score = composite_score(net_profit, edge * 100.0, gas_cost, scorer);

    Ok(Opportunity {
        kind: OpportunityKind::TokenSnipe,
        subject_ref: launch.token_ref.clone(),
        price_impact_pct: 0.0,
        gross_profit_estimate: gross_profit,
        gas_cost_estimate: gas_cost,
        net_profit_estimate: net_profit,
        risk_level: RiskLevel::High,
        competition_level: CompetitionLevel::from_congestion(gas.congestion_level),
        score,
        sizing: PositionSizing::BalanceFraction { fraction },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
