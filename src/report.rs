//! Read-side aggregation of commission figures across many orders.
//!
//! Orders carrying a stored breakdown are summed directly. Legacy orders
//! without one are recomputed with the same split the calculator uses. The
//! two partitions are disjoint and merged exactly once.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::amount::Total;
use crate::engine::calculator::split_order;
use crate::engine::{Calculator, SettlementError};
use crate::model::{CommissionBreakdown, Order, OrderStatus, VendorId, VendorRef};
use crate::store::{OrderQuery, Stores};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub vendor: Option<VendorRef>,
    pub zone: Option<String>,
}

impl ReportFilter {
    fn query(&self) -> OrderQuery {
        OrderQuery {
            from: self.from,
            to: self.to,
            zone: self.zone.clone(),
        }
    }
}

/// Running totals over a set of orders.
///
/// `merge` is associative and commutative with `Default` as identity, so
/// partial sums can be combined in any grouping. Money sums are [`Total`]s
/// and cannot overflow however many orders are added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EarningsAccumulator {
    pub order_count: u64,
    /// Orders whose split was recomputed because no breakdown was stored.
    pub fallback_count: u64,
    /// Legacy orders left out because their split could not be computed.
    pub unresolved_count: u64,
    pub revenue: Total,
    pub restaurant: Total,
    pub admin: Total,
    pub hotel: Total,
    pub platform_fee: Total,
    pub delivery_fee: Total,
    pub gst: Total,
}

impl EarningsAccumulator {
    pub fn add(&mut self, order: &Order, breakdown: &CommissionBreakdown) {
        self.order_count += 1;
        self.revenue += order.pricing.total;
        self.restaurant += breakdown.restaurant;
        self.admin += breakdown.admin;
        self.hotel += breakdown.hotel;
        self.platform_fee += order.pricing.platform_fee;
        self.delivery_fee += order.pricing.delivery_fee;
        self.gst += order.pricing.tax;
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            order_count: self.order_count + other.order_count,
            fallback_count: self.fallback_count + other.fallback_count,
            unresolved_count: self.unresolved_count + other.unresolved_count,
            revenue: self.revenue + other.revenue,
            restaurant: self.restaurant + other.restaurant,
            admin: self.admin + other.admin,
            hotel: self.hotel + other.hotel,
            platform_fee: self.platform_fee + other.platform_fee,
            delivery_fee: self.delivery_fee + other.delivery_fee,
            gst: self.gst + other.gst,
        }
    }
}

/// Dashboard aggregation. Never writes.
pub struct AggregateReader {
    stores: Stores,
    calculator: Calculator,
}

impl AggregateReader {
    pub fn new(stores: Stores) -> Self {
        Self {
            calculator: Calculator::new(stores.clone()),
            stores,
        }
    }

    pub async fn summarize(
        &self,
        filter: &ReportFilter,
    ) -> Result<EarningsAccumulator, SettlementError> {
        let orders = self.candidates(filter).await?;
        let (stored, legacy): (Vec<&Order>, Vec<&Order>) = orders
            .iter()
            .partition(|o| o.commission_breakdown.is_some());

        debug!(
            stored = stored.len(),
            legacy = legacy.len(),
            "aggregating commission"
        );
        let known = sum_stored(&stored);
        let recomputed = self.recompute_fallback(&legacy).await;
        Ok(known.merge(recomputed))
    }

    /// Recompute splits for orders without a stored breakdown.
    ///
    /// Uses the calculator's own percentage resolution and split, so each
    /// order contributes exactly what `calculate` would store for it.
    pub async fn recompute_fallback(&self, orders: &[&Order]) -> EarningsAccumulator {
        let mut acc = EarningsAccumulator::default();
        for order in orders {
            match self.fallback_breakdown(order).await {
                Ok(breakdown) => {
                    acc.add(order, &breakdown);
                    acc.fallback_count += 1;
                }
                Err(e) => {
                    warn!(order = %order.id, reason = %e, "legacy order left out of report");
                    acc.unresolved_count += 1;
                }
            }
        }
        acc
    }

    pub async fn fallback_breakdown(
        &self,
        order: &Order,
    ) -> Result<CommissionBreakdown, SettlementError> {
        let percentages = self.calculator.percentages_for(order).await?;
        split_order(order, &percentages)
    }

    /// Non-cancelled orders matching the filter, vendor refs normalized.
    async fn candidates(&self, filter: &ReportFilter) -> Result<Vec<Order>, SettlementError> {
        let orders = self.stores.orders.query(&filter.query()).await?;

        let vendor = match &filter.vendor {
            None => None,
            Some(reference) => match self.stores.vendors.resolve(reference).await {
                Some(id) => Some(id),
                None => {
                    debug!(vendor = %reference, "report filter names unknown vendor");
                    return Ok(Vec::new());
                }
            },
        };

        let mut matched = Vec::with_capacity(orders.len());
        for order in orders {
            if order.status == OrderStatus::Cancelled {
                continue;
            }
            if let Some(wanted) = &vendor {
                if !self.is_vendor(&order, wanted).await {
                    continue;
                }
            }
            matched.push(order);
        }
        Ok(matched)
    }

    async fn is_vendor(&self, order: &Order, wanted: &VendorId) -> bool {
        self.stores
            .vendors
            .resolve(order.vendor.reference())
            .await
            .is_some_and(|id| &id == wanted)
    }
}

/// Sum orders that carry a stored breakdown. Orders without one are skipped.
pub fn sum_stored(orders: &[&Order]) -> EarningsAccumulator {
    orders
        .iter()
        .filter_map(|o| o.commission_breakdown.as_ref().map(|b| (*o, b)))
        .fold(EarningsAccumulator::default(), |mut acc, (order, breakdown)| {
            acc.add(order, breakdown);
            acc
        })
}
