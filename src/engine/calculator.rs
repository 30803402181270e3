//! Commission split and settlement record derivation.
//!
//! Every party's share is rounded independently from the order total. The
//! leftover (at most one minor unit for a valid policy) goes to the platform.
//! No share is ever computed as "total minus the others".

use tracing::{debug, info, warn};

use super::OrderLocks;
use super::error::{SettlementError, SplitError};
use crate::Amount;
use crate::config::ConfigScope;
use crate::model::{
    AdminCommissionStatus, AdminEarning, CommissionBreakdown, CommissionPercentages, Order,
    OrderId, OrderStatus, RestaurantEarning, SettlementRecord, SettlementStatus, VendorId,
};
use crate::store::Stores;

/// Largest tolerated gap between the rounded shares and the total, in minor units.
pub const ROUNDING_TOLERANCE: u64 = 1;

/// Split `total` across restaurant, admin and hotel.
pub fn split(
    total: Amount,
    percentages: &CommissionPercentages,
) -> Result<CommissionBreakdown, SplitError> {
    if total.is_negative() {
        return Err(SplitError::NegativeTotal(total));
    }
    if !total.in_range() {
        return Err(SplitError::OutOfRange(total));
    }

    let mut breakdown = CommissionBreakdown {
        restaurant: total.share(percentages.restaurant),
        admin: total.share(percentages.admin),
        hotel: total.share(percentages.hotel),
    };

    let computed = breakdown.sum();
    let drift = total.distance(computed);
    if drift > ROUNDING_TOLERANCE {
        return Err(SplitError::Drift {
            total,
            computed,
            drift,
        });
    }

    // tie-break favours the platform
    breakdown.admin += total - computed;
    Ok(breakdown)
}

/// Build the settlement record for `order` from its split.
///
/// A cancelled order always yields zero earnings, whatever was computed before.
pub fn derive_record(order: &Order, breakdown: &CommissionBreakdown) -> SettlementRecord {
    let settlement_status = if order.status == OrderStatus::Delivered {
        SettlementStatus::Completed
    } else {
        SettlementStatus::Pending
    };

    if order.status == OrderStatus::Cancelled {
        return SettlementRecord {
            order_id: order.id.clone(),
            restaurant_earning: RestaurantEarning::default(),
            admin_earning: AdminEarning::default(),
            settlement_status,
            order_status: order.status,
            revision: order.version,
        };
    }

    let admin_commission_status = if order.commission_distributed {
        AdminCommissionStatus::Received
    } else {
        AdminCommissionStatus::PendingSettlement
    };
    let food_price = order.pricing.total;

    SettlementRecord {
        order_id: order.id.clone(),
        restaurant_earning: RestaurantEarning {
            food_price,
            commission: breakdown.restaurant,
            net_earning: food_price - breakdown.admin - breakdown.hotel,
        },
        admin_earning: AdminEarning {
            commission: breakdown.admin,
            platform_fee: order.pricing.platform_fee,
            delivery_fee: order.pricing.delivery_fee,
            gst: order.pricing.tax,
            hotel_commission: breakdown.hotel,
            admin_commission_status,
        },
        settlement_status,
        order_status: order.status,
        revision: order.version,
    }
}

/// Outcome of settling one order in memory, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settled {
    pub breakdown: CommissionBreakdown,
    pub percentages: Option<CommissionPercentages>,
}

impl Settled {
    /// Write the snapshots onto the order. Returns whether anything changed.
    pub fn apply_to(&self, order: &mut Order) -> bool {
        // a cancelled order only ever has an existing snapshot zeroed
        if order.status == OrderStatus::Cancelled {
            let stale = order
                .commission_breakdown
                .is_some_and(|b| b != self.breakdown);
            if stale {
                order.commission_breakdown = Some(self.breakdown);
            }
            return stale;
        }
        let mut changed = false;
        if order.commission_breakdown != Some(self.breakdown) {
            if order.commission_breakdown.is_some() {
                debug!(order = %order.id, "refreshing stale commission breakdown");
            }
            order.commission_breakdown = Some(self.breakdown);
            changed = true;
        }
        if order.commission_percentages.is_none() {
            if let Some(percentages) = self.percentages {
                order.commission_percentages = Some(percentages);
                changed = true;
            }
        }
        changed
    }
}

/// Settlement calculator over the engine's stores.
#[derive(Clone)]
pub struct Calculator {
    stores: Stores,
    locks: OrderLocks,
}

impl Calculator {
    pub fn new(stores: Stores) -> Self {
        Self::with_locks(stores, OrderLocks::default())
    }

    pub(crate) fn with_locks(stores: Stores, locks: OrderLocks) -> Self {
        Self { stores, locks }
    }

    /// Calculate and persist the settlement for an order.
    ///
    /// Idempotent: with unchanged inputs, repeated calls produce an identical
    /// record and no writes beyond the first.
    pub async fn calculate(&self, order_id: &OrderId) -> Result<SettlementRecord, SettlementError> {
        let _guard = self.locks.acquire(order_id).await;
        self.calculate_locked(order_id).await
    }

    /// Caller holds the order's lock.
    pub(crate) async fn calculate_locked(
        &self,
        order_id: &OrderId,
    ) -> Result<SettlementRecord, SettlementError> {
        let order = self
            .stores
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| SettlementError::OrderNotFound(order_id.clone()))?;

        let settled = self.settle(&order).await?;
        let mut next = order.clone();
        let order = if settled.apply_to(&mut next) {
            self.stores
                .orders
                .replace_if(next, order.status, order.version)
                .await?
        } else {
            order
        };

        let record = derive_record(&order, &settled.breakdown);
        let outcome = self.stores.settlements.upsert(record.clone()).await?;
        info!(
            order = %order.id,
            status = %order.status,
            restaurant = %record.restaurant_earning.commission,
            admin = %record.admin_earning.commission,
            hotel = %record.admin_earning.hotel_commission,
            outcome = ?outcome,
            "settlement calculated"
        );
        Ok(record)
    }

    /// Compute the split for `order` without writing anything.
    pub(crate) async fn settle(&self, order: &Order) -> Result<Settled, SettlementError> {
        if order.status == OrderStatus::Cancelled {
            return Ok(Settled {
                breakdown: CommissionBreakdown::default(),
                percentages: None,
            });
        }

        if !order.total().is_positive() {
            return Err(SettlementError::InvalidOrderState {
                order: order.id.clone(),
                reason: format!("non-positive total {}", order.total()),
            });
        }

        let percentages = self.percentages_for(order).await?;
        let breakdown = split_order(order, &percentages)?;
        Ok(Settled {
            breakdown,
            percentages: Some(percentages),
        })
    }

    /// Percentages applicable to `order`: its own snapshot if present,
    /// otherwise the vendor override, otherwise the global default.
    pub async fn percentages_for(
        &self,
        order: &Order,
    ) -> Result<CommissionPercentages, SettlementError> {
        if let Some(snapshot) = order.commission_percentages {
            return Ok(snapshot);
        }

        let vendor = self.vendor_id(order).await?;
        let scope = if order.vendor.is_qr() {
            ConfigScope::Qr
        } else {
            ConfigScope::Standard
        };
        let config = self
            .stores
            .configs
            .resolve(scope, &vendor)
            .await
            .ok_or_else(|| SettlementError::ConfigNotFound {
                scope,
                vendor: vendor.clone(),
            })?;

        let percentages = config.policy.percentages();
        if percentages.restaurant.is_zero() {
            warn!(
                order = %order.id,
                vendor = %vendor,
                config_version = config.version,
                "vendor share resolves to 0%"
            );
        }
        Ok(percentages)
    }

    pub(crate) async fn vendor_id(&self, order: &Order) -> Result<VendorId, SettlementError> {
        let reference = order.vendor.reference();
        self.stores
            .vendors
            .resolve(reference)
            .await
            .ok_or_else(|| SettlementError::UnknownVendor {
                order: order.id.clone(),
                vendor: reference.clone(),
            })
    }
}

/// [`split`] with errors attributed to `order`.
pub(crate) fn split_order(
    order: &Order,
    percentages: &CommissionPercentages,
) -> Result<CommissionBreakdown, SettlementError> {
    split(order.total(), percentages).map_err(|source| match source {
        invalid @ (SplitError::NegativeTotal(_) | SplitError::OutOfRange(_)) => {
            SettlementError::InvalidOrderState {
                order: order.id.clone(),
                reason: invalid.to_string(),
            }
        }
        drift @ SplitError::Drift { .. } => {
            warn!(order = %order.id, error = %drift, "rounding invariant violated");
            SettlementError::RoundingInvariantViolation {
                order: order.id.clone(),
                source: drift,
            }
        }
    })
}
