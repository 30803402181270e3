//! Core domain types for the settlement engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Percent};

/// Stable order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical vendor identifier, as produced by a [`VendorDirectory`](crate::vendor::VendorDirectory).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(pub String);

impl VendorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A vendor reference as it appears on an order: either the primary id or the
/// human-readable code. Both forms name the same vendor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorRef {
    Id(String),
    Code(String),
}

impl fmt::Display for VendorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendorRef::Id(id) => write!(f, "id:{id}"),
            VendorRef::Code(code) => write!(f, "code:{code}"),
        }
    }
}

/// Who sold the order. A hotel vendor marks a QR order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    Restaurant(VendorRef),
    Hotel(VendorRef),
}

impl Vendor {
    pub fn reference(&self) -> &VendorRef {
        match self {
            Vendor::Restaurant(r) | Vendor::Hotel(r) => r,
        }
    }

    pub fn is_qr(&self) -> bool {
        matches!(self, Vendor::Hotel(_))
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    Ready,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Online,
    Cash,
    PayAtHotel,
}

impl PaymentMethod {
    /// Money changes hands physically, so the order settles on collect-payment.
    pub fn is_collected_in_person(self) -> bool {
        matches!(self, PaymentMethod::Cash | PaymentMethod::PayAtHotel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub subtotal: Amount,
    pub delivery_fee: Amount,
    pub platform_fee: Amount,
    pub tax: Amount,
    pub total: Amount,
}

/// Per-order monetary split snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub restaurant: Amount,
    pub admin: Amount,
    pub hotel: Amount,
}

impl CommissionBreakdown {
    pub fn sum(&self) -> Amount {
        self.restaurant + self.admin + self.hotel
    }
}

/// Percentages applied to an order, kept for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommissionPercentages {
    pub restaurant: Percent,
    pub admin: Percent,
    pub hotel: Percent,
}

/// A customer purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment: Payment,
    pub pricing: Pricing,
    pub vendor: Vendor,
    pub zone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub commission_breakdown: Option<CommissionBreakdown>,
    pub commission_percentages: Option<CommissionPercentages>,
    pub cash_collected: bool,
    pub commission_distributed: bool,
    /// Bumped by the order store on every successful write.
    pub version: u64,
}

impl Order {
    /// A fresh pending order with no commission snapshots.
    pub fn new(
        id: OrderId,
        vendor: Vendor,
        method: PaymentMethod,
        pricing: Pricing,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_number: id.0.clone(),
            id,
            status: OrderStatus::Pending,
            payment: Payment {
                method,
                status: PaymentStatus::Pending,
            },
            pricing,
            vendor,
            zone: None,
            created_at,
            commission_breakdown: None,
            commission_percentages: None,
            cash_collected: false,
            commission_distributed: false,
            version: 0,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_breakdown(mut self, breakdown: CommissionBreakdown) -> Self {
        self.commission_breakdown = Some(breakdown);
        self
    }

    pub fn with_percentages(mut self, percentages: CommissionPercentages) -> Self {
        self.commission_percentages = Some(percentages);
        self
    }

    pub fn total(&self) -> Amount {
        self.pricing.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    #[default]
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminCommissionStatus {
    #[default]
    PendingSettlement,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantEarning {
    pub food_price: Amount,
    pub commission: Amount,
    pub net_earning: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminEarning {
    pub commission: Amount,
    pub platform_fee: Amount,
    pub delivery_fee: Amount,
    pub gst: Amount,
    pub hotel_commission: Amount,
    pub admin_commission_status: AdminCommissionStatus,
}

/// Normalized per-order financial outcome. One per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub order_id: OrderId,
    pub restaurant_earning: RestaurantEarning,
    pub admin_earning: AdminEarning,
    pub settlement_status: SettlementStatus,
    /// Order status the record was derived from.
    pub order_status: OrderStatus,
    /// Order version the record was derived from; older revisions never overwrite newer ones.
    pub revision: u64,
}

impl SettlementRecord {
    /// Sum of all party shares: restaurant, admin and hotel.
    pub fn distributed(&self) -> Amount {
        self.restaurant_earning.commission
            + self.admin_earning.commission
            + self.admin_earning.hotel_commission
    }

    pub fn is_zeroed(&self) -> bool {
        self.restaurant_earning == RestaurantEarning::default()
            && self.admin_earning.commission == Amount::ZERO
            && self.admin_earning.hotel_commission == Amount::ZERO
            && self.admin_earning.platform_fee == Amount::ZERO
            && self.admin_earning.delivery_fee == Amount::ZERO
            && self.admin_earning.gst == Amount::ZERO
    }
}
