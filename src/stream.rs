//! Market-stream boundary.
//!
//! The engine pulls `StreamBatch`es — candidate events paired with their
//! pool snapshots plus one gas-price context per batch — through the
//! `MarketStream` trait. Real mempool/launch feeds live behind this seam in
//! external services; the crate ships a deterministic replay implementation
//! for the paper-trading binary and for simulations.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;

use crate::types::{CandidateEvent, GasPriceContext, LiquidityPoolState};

/// One candidate event with the pool snapshot it was observed against.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub event: CandidateEvent,
    pub pool: LiquidityPoolState,
}

/// One cycle's worth of input.
#[derive(Debug, Clone)]
pub struct StreamBatch {
    pub candidates: Vec<Candidate>,
    pub gas: GasPriceContext,
}

impl StreamBatch {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Injectable event stream consumed once per decision cycle.
#[async_trait]
pub trait MarketStream: Send {
    /// The next batch of candidates. An exhausted stream keeps returning
    /// empty batches — the decision loop idles rather than terminating.
    async fn next_batch(&mut self) -> Result<StreamBatch>;
}

/// Deterministic stream that replays a fixed sequence of batches, then
/// empty batches carrying the last seen gas context.
pub struct ReplayStream {
    batches: VecDeque<StreamBatch>,
    last_gas: GasPriceContext,
}

impl ReplayStream {
    pub fn new(batches: Vec<StreamBatch>) -> Self {
        let last_gas = batches
            .last()
            .map(|b| b.gas)
            .unwrap_or(GasPriceContext {
                current_gas_price: 0.00000002,
                native_price_quote: 2_500.0,
                congestion_level: 0.0,
            });
        Self {
            batches: batches.into(),
            last_gas,
        }
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

#[async_trait]
impl MarketStream for ReplayStream {
    async fn next_batch(&mut self) -> Result<StreamBatch> {
        match self.batches.pop_front() {
            Some(batch) => {
                self.last_gas = batch.gas;
                Ok(batch)
            }
            None => Ok(StreamBatch {
                candidates: Vec::new(),
                gas: self.last_gas,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
