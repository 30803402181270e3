//! Settlement engine.
//!
//! The [`Reconciler`] drives order status transitions and keeps the settlement
//! record in step with them. The [`Calculator`] derives the commission split.
//! Both serialize work per order through a shared lock map, and every order
//! write is a compare-and-swap on the status and version it was read with.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::model::{Order, OrderId, OrderStatus, PaymentStatus, SettlementRecord};
use crate::store::{OrderQuery, Stores};

pub mod calculator;
pub use calculator::{Calculator, ROUNDING_TOLERANCE, derive_record, split};

mod error;
pub use error::{SettlementError, SplitError};

mod notify;
pub use notify::{LogNotifier, NotifyError, SettlementNotifier};

mod state;
pub use state::{OrderAction, next_status};

/// Single-writer discipline per order id.
#[derive(Clone, Default)]
pub(crate) struct OrderLocks {
    locks: Arc<DashMap<OrderId, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub(crate) async fn acquire(&self, order: &OrderId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(order.clone()).or_default().clone();
        lock.lock_owned().await
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub order: Order,
    /// Present when the transition touched the settlement.
    pub settlement: Option<SettlementRecord>,
}

/// Counts from a [`Reconciler::backfill_breakdowns`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub calculated: usize,
    pub failed: usize,
}

/// Order lifecycle reconciler.
pub struct Reconciler {
    stores: Stores,
    calculator: Calculator,
    locks: OrderLocks,
    notifier: Arc<dyn SettlementNotifier>,
}

/// Public API
impl Reconciler {
    pub fn new(stores: Stores) -> Self {
        let locks = OrderLocks::default();
        Self {
            calculator: Calculator::with_locks(stores.clone(), locks.clone()),
            stores,
            locks,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SettlementNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Calculator sharing this reconciler's per-order locks.
    pub fn calculator(&self) -> &Calculator {
        &self.calculator
    }

    /// Replay a stream of lifecycle events. Failures are logged and skipped.
    pub async fn run(&self, mut events: impl Stream<Item = (OrderId, OrderAction)> + Unpin) {
        while let Some((order, action)) = events.next().await {
            // a rejected event must not stop the replay
            let _ = self.transition(&order, action).await;
        }
    }

    /// Apply `action` to the order and reconcile its settlement.
    ///
    /// | Action          | Settlement effect                                      |
    /// |-----------------|--------------------------------------------------------|
    /// | accept          | initial calculation                                    |
    /// | reject / cancel | record zeroed                                          |
    /// | mark-delivered  | recalculated, `completed`                              |
    /// | collect-payment | recalculated, `completed`, commission `received`       |
    /// | other           | none                                                   |
    ///
    /// Illegal transitions fail with [`SettlementError::InvalidTransition`]
    /// before anything is written.
    pub async fn transition(
        &self,
        order: &OrderId,
        action: OrderAction,
    ) -> Result<TransitionOutcome, SettlementError> {
        let result = {
            let _guard = self.locks.acquire(order).await;
            self.transition_locked(order, action).await
        };
        Self::log_result(order, action, &result);

        let outcome = result?;
        if let Some(record) = &outcome.settlement {
            if outcome.order.status == OrderStatus::Delivered {
                self.notify(record).await;
            }
        }
        Ok(outcome)
    }

    /// Perform the hotel/admin commission distribution for a collected order.
    ///
    /// Guarded by the order's `commissionDistributed` flag: returns `true` if
    /// this call distributed, `false` if it had already happened.
    pub async fn distribute_hotel_commission(
        &self,
        order_id: &OrderId,
    ) -> Result<bool, SettlementError> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.load(order_id).await?;

        if order.commission_distributed {
            debug!(order = %order_id, "commission already distributed");
            return Ok(false);
        }
        if !order.cash_collected {
            return Err(SettlementError::InvalidOrderState {
                order: order_id.clone(),
                reason: "payment has not been collected".into(),
            });
        }

        let mut next = order.clone();
        next.commission_distributed = true;
        let (_, record) = self.write(&order, next).await?;
        info!(
            order = %order_id,
            hotel = %record.admin_earning.hotel_commission,
            admin = %record.admin_earning.commission,
            "hotel commission distributed"
        );
        Ok(true)
    }

    /// Calculate every settled-able order that still lacks a stored breakdown.
    pub async fn backfill_breakdowns(
        &self,
        query: &OrderQuery,
    ) -> Result<BackfillSummary, SettlementError> {
        let orders = self.stores.orders.query(query).await?;
        let mut summary = BackfillSummary::default();

        let legacy = orders.iter().filter(|o| {
            o.commission_breakdown.is_none()
                && !matches!(o.status, OrderStatus::Pending | OrderStatus::Cancelled)
        });
        for order in legacy {
            match self.calculator.calculate(&order.id).await {
                Ok(_) => summary.calculated += 1,
                Err(e) => {
                    warn!(order = %order.id, reason = %e, "backfill skipped");
                    summary.failed += 1;
                }
            }
        }

        info!(
            calculated = summary.calculated,
            failed = summary.failed,
            "breakdown backfill finished"
        );
        Ok(summary)
    }
}

/// Private API
impl Reconciler {
    /// Small helper to log `transition` results
    fn log_result(
        order: &OrderId,
        action: OrderAction,
        result: &Result<TransitionOutcome, SettlementError>,
    ) {
        match result {
            Ok(outcome) => {
                info!(
                    order = %order,
                    action = %action,
                    status = %outcome.order.status,
                    "transition applied"
                );
            }
            Err(e) => {
                info!(
                    order = %order,
                    action = %action,
                    reason = %e,
                    "transition rejected"
                );
            }
        }
    }

    async fn load(&self, order: &OrderId) -> Result<Order, SettlementError> {
        self.stores
            .orders
            .get(order)
            .await?
            .ok_or_else(|| SettlementError::OrderNotFound(order.clone()))
    }

    async fn transition_locked(
        &self,
        order_id: &OrderId,
        action: OrderAction,
    ) -> Result<TransitionOutcome, SettlementError> {
        let order = self.load(order_id).await?;
        let status = next_status(&order, action).ok_or(SettlementError::InvalidTransition {
            order: order_id.clone(),
            current: order.status,
            action,
        })?;

        let mut next = order.clone();
        next.status = status;
        if action == OrderAction::CollectPayment {
            next.cash_collected = true;
            next.payment.status = PaymentStatus::Completed;
            next.commission_distributed = true;
        }

        let touches_settlement = matches!(
            action,
            OrderAction::Accept
                | OrderAction::Reject
                | OrderAction::Cancel
                | OrderAction::MarkDelivered
                | OrderAction::CollectPayment
        );
        if !touches_settlement {
            let order = self
                .stores
                .orders
                .replace_if(next, order.status, order.version)
                .await?;
            return Ok(TransitionOutcome {
                order,
                settlement: None,
            });
        }

        let (order, record) = self.write(&order, next).await?;
        if action == OrderAction::CollectPayment {
            info!(
                order = %order_id,
                hotel = %record.admin_earning.hotel_commission,
                admin = %record.admin_earning.commission,
                "hotel commission distributed"
            );
        }
        Ok(TransitionOutcome {
            order,
            settlement: Some(record),
        })
    }

    /// Settle `next` in memory, then write the order (compare-and-swap against
    /// `current`) and upsert its record. Nothing is written if settling fails.
    async fn write(
        &self,
        current: &Order,
        mut next: Order,
    ) -> Result<(Order, SettlementRecord), SettlementError> {
        let settled = self.calculator.settle(&next).await?;
        settled.apply_to(&mut next);

        let written = self
            .stores
            .orders
            .replace_if(next, current.status, current.version)
            .await?;
        let record = derive_record(&written, &settled.breakdown);
        self.stores.settlements.upsert(record.clone()).await?;
        Ok((written, record))
    }

    async fn notify(&self, record: &SettlementRecord) {
        if let Err(e) = self.notifier.settlement_completed(record).await {
            warn!(
                order = %record.order_id,
                reason = %e,
                "settlement notification failed"
            );
        }
    }
}

/// Retry `op` with exponential backoff while it fails with a retryable error.
pub async fn retry_transient<T, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, SettlementError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SettlementError>>,
{
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(attempt, reason = %e, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            result => return result,
        }
    }
}
