//! Error types for settlement processing.

use thiserror::Error;

use crate::Amount;
use crate::config::{ConfigError, ConfigScope};
use crate::engine::state::OrderAction;
use crate::model::{OrderId, OrderStatus, VendorId, VendorRef};
use crate::store::StoreError;

/// Failure of the pure split computation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SplitError {
    #[error("party shares sum to {computed}, {drift} minor units away from total {total}")]
    Drift {
        total: Amount,
        computed: Amount,
        drift: u64,
    },

    #[error("negative total {0}")]
    NegativeTotal(Amount),

    #[error("total {0} is outside the supported range")]
    OutOfRange(Amount),
}

/// Top-level error returned by the calculator, reconciler and reader.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("no {scope} commission policy for vendor {vendor}")]
    ConfigNotFound { scope: ConfigScope, vendor: VendorId },

    #[error("order {order} is in an invalid state: {reason}")]
    InvalidOrderState { order: OrderId, reason: String },

    #[error("order {order}: cannot {action} while {current}")]
    InvalidTransition {
        order: OrderId,
        current: OrderStatus,
        action: OrderAction,
    },

    #[error("order {order}: {source}")]
    RoundingInvariantViolation { order: OrderId, source: SplitError },

    #[error("order {order} was modified concurrently: {source}")]
    ConcurrentModificationConflict { order: OrderId, source: StoreError },

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {order} references unknown vendor {vendor}")]
    UnknownVendor { order: OrderId, vendor: VendorRef },

    #[error("invalid commission config: {0}")]
    Config(#[from] ConfigError),

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl SettlementError {
    /// Only transient store failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::Store(e) if e.is_transient())
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { ref order, .. } | StoreError::Stale { ref order, .. } => {
                SettlementError::ConcurrentModificationConflict {
                    order: order.clone(),
                    source: err,
                }
            }
            StoreError::NotFound(order) => SettlementError::OrderNotFound(order),
            other => SettlementError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_become_concurrency_errors() {
        let err: SettlementError = StoreError::Stale {
            order: OrderId::new("o1"),
            stored: 4,
            attempted: 3,
        }
        .into();
        assert!(matches!(
            err,
            SettlementError::ConcurrentModificationConflict { .. }
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn unavailable_store_is_retryable() {
        let err: SettlementError = StoreError::Unavailable("connection reset".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn transition_error_names_state_and_action() {
        let err = SettlementError::InvalidTransition {
            order: OrderId::new("o9"),
            current: OrderStatus::Cancelled,
            action: OrderAction::CollectPayment,
        };
        assert_eq!(
            err.to_string(),
            "order o9: cannot collect-payment while cancelled"
        );
    }
}
