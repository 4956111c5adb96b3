//! Execution boundary.
//!
//! The allocator never talks to a chain: it submits `ExecutionRequest`s
//! through the `Executor` trait and folds the receipt (or failure) back into
//! portfolio state. Real signing/broadcast lives behind this seam in an
//! external service; the crate ships a deterministic paper implementation
//! for the binary and for simulations.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::types::{EngineError, OpportunityKind};

// ---------------------------------------------------------------------------
// Request / receipt
// ---------------------------------------------------------------------------

/// One dispatch: commit `amount_quote` of capital to the subject.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub kind: OpportunityKind,
    pub subject_ref: String,
    pub amount_quote: f64,
}

/// Successful fill.
#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    pub order_id: String,
    /// Realized entry price in quote currency per unit.
    pub entry_price: f64,
    /// Quantity of the subject asset received.
    pub quantity: f64,
    /// Realized slippage against the quoted price, in percent.
    pub slippage_pct: f64,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Injectable execution capability. Implementations must be safe to share
/// across cycles; the allocator serializes calls within a cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn submit(&self, request: ExecutionRequest) -> Result<ExecutionReceipt, EngineError>;
}

// ---------------------------------------------------------------------------
// Simulated executor
// ---------------------------------------------------------------------------

/// Paper executor: fills at a unit price adjusted for configured slippage,
/// failing deterministically at the configured rate (every ⌈1/rate⌉-th
/// submission) so simulations are reproducible.
pub struct SimulatedExecutor {
    config: ExecutorConfig,
    sequence: AtomicU64,
}

impl SimulatedExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            sequence: AtomicU64::new(0),
        }
    }

    fn should_fail(&self, sequence: u64) -> bool {
        if self.config.failure_rate <= 0.0 {
            return false;
        }
        if self.config.failure_rate >= 1.0 {
            return true;
        }
        let period = (1.0 / self.config.failure_rate).round().max(1.0) as u64;
        (sequence - 1) % period == 0
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn submit(&self, request: ExecutionRequest) -> Result<ExecutionReceipt, EngineError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        if self.should_fail(sequence) {
            return Err(EngineError::Execution(format!(
                "simulated fill rejected for {}",
                request.subject_ref
            )));
        }

        // Paper fill at unit price, degraded by slippage.
        let entry_price = 1.0 * (1.0 + self.config.slippage_pct / 100.0);
        let quantity = request.amount_quote / entry_price;

        Ok(ExecutionReceipt {
            order_id: format!("sim-{}", Uuid::new_v4()),
            entry_price,
            quantity,
            slippage_pct: self.config.slippage_pct,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(amount: f64) -> ExecutionRequest {
        ExecutionRequest {
            kind: OpportunityKind::Sandwich,
            subject_ref: "pool-1".to_string(),
            amount_quote: amount,
        }
    }

    #[tokio::test]
    async fn test_simulated_fill() {
        let executor = SimulatedExecutor::new(ExecutorConfig {
            failure_rate: 0.0,
            slippage_pct: 0.5,
        });
        let receipt = executor.submit(make_request(100.0)).await.unwrap();
        assert!(receipt.order_id.starts_with("sim-"));
        assert!((receipt.entry_price - 1.005).abs() < 1e-12);
        assert!((receipt.quantity - 100.0 / 1.005).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failure_rate_is_deterministic() {
        let executor = SimulatedExecutor::new(ExecutorConfig {
            failure_rate: 0.5,
            slippage_pct: 0.0,
        });
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(executor.submit(make_request(100.0)).await.is_ok());
        }
        // Every 2nd submission fails, starting with the first.
        assert_eq!(outcomes, vec![false, true, false, true]);
    }

    #[tokio::test]
    async fn test_full_failure_rate_rejects_everything() {
        let executor = SimulatedExecutor::new(ExecutorConfig {
            failure_rate: 1.0,
            slippage_pct: 0.0,
        });
        for _ in 0..3 {
            let err = executor.submit(make_request(100.0)).await.unwrap_err();
            assert!(matches!(err, EngineError::Execution(_)));
        }
    }
}
