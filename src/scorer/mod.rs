//! Opportunity scorer — pure evaluation of candidate events.
//!
//! `Scorer::score` is a pure function of one candidate event plus its gas
//! and pool context: no shared state, safe to invoke concurrently across
//! events. Validation fails fast with a typed error before any model runs;
//! the strategy path is picked once from the event's variant tag.

pub mod sandwich;
pub mod snipe;

use tracing::debug;

use crate::config::{ScorerConfig, SniperConfig};
use crate::types::{
    CandidateEvent, EngineError, GasPriceContext, LiquidityPoolState, Opportunity,
};

/// Stateless evaluator for candidate events.
pub struct Scorer {
    scorer: ScorerConfig,
    sniper: SniperConfig,
}

impl Scorer {
    pub fn new(scorer: ScorerConfig, sniper: SniperConfig) -> Self {
        Self { scorer, sniper }
    }

    /// Evaluate one candidate event against its market context.
    ///
    /// Returns a scored `Opportunity`, or a typed error when the input is
    /// malformed or fails a gate. Errors here are local to the candidate —
    /// the caller drops it and moves on.
    pub fn score(
        &self,
        event: &CandidateEvent,
        gas: &GasPriceContext,
        pool: &LiquidityPoolState,
    ) -> Result<Opportunity, EngineError> {
        self.validate(event, gas, pool)?;

        let opportunity = match event {
            CandidateEvent::PendingSwap(swap) => {
                sandwich::score(swap, gas, pool, &self.scorer)?
            }
            CandidateEvent::TokenLaunch(launch) => {
                snipe::score(launch, gas, &self.sniper, &self.scorer)?
            }
        };

        debug!(
            kind = %opportunity.kind,
            subject = %opportunity.subject_ref,
            score = format!("{:.1}", opportunity.score),
            net = format!("${:.2}", opportunity.net_profit_estimate),
            "Candidate scored"
        );

        Ok(opportunity)
    }

    /// Fail fast on malformed or disqualifying input, before any model math.
    fn validate(
        &self,
        event: &CandidateEvent,
        gas: &GasPriceContext,
        pool: &LiquidityPoolState,
    ) -> Result<(), EngineError> {
        if event.subject_ref().is_empty() {
            return Err(EngineError::Validation(
                "event has no pool/token reference".to_string(),
            ));
        }

        if let CandidateEvent::PendingSwap(swap) = event {
            if swap.amount_in <= 0.0 || !swap.amount_in.is_finite() {
                return Err(EngineError::Validation(format!(
                    "non-positive trade amount: {}",
                    swap.amount_in
                )));
            }
        }

        if gas.current_gas_price <= 0.0 || !gas.current_gas_price.is_finite() {
            return Err(EngineError::Validation(
                "gas context carries no current price".to_string(),
            ));
        }

        if pool.total_liquidity_quote < self.scorer.min_pool_liquidity {
            return Err(EngineError::InsufficientLiquidity {
                available: pool.total_liquidity_quote,
                floor: self.scorer.min_pool_liquidity,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
