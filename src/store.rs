//! Order and settlement persistence.
//!
//! The engine only talks to the traits here. The in-memory implementations
//! honour the same atomicity rules a database-backed store must: a
//! compare-and-swap on `(status, version)` for orders, and revision-ordered
//! upserts for settlements.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::{CommissionConfigStore, MemoryConfigStore};
use crate::model::{
    AdminCommissionStatus, Order, OrderId, OrderStatus, SettlementRecord, SettlementStatus,
};
use crate::vendor::{MemoryVendorDirectory, VendorDirectory};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("order {0} already exists")]
    Duplicate(OrderId),

    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error(
        "order {order} changed concurrently: expected {expected_status} v{expected_version}, found {actual_status} v{actual_version}"
    )]
    Conflict {
        order: OrderId,
        expected_status: OrderStatus,
        expected_version: u64,
        actual_status: OrderStatus,
        actual_version: u64,
    },

    #[error("settlement for order {order} is at revision {stored}, refusing revision {attempted}")]
    Stale {
        order: OrderId,
        stored: u64,
        attempted: u64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Transient I/O failures are the only store errors worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Order selection for reporting and sweeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
    pub zone: Option<String>,
}

impl OrderQuery {
    pub fn matches(&self, order: &Order) -> bool {
        self.from.is_none_or(|from| order.created_at >= from)
            && self.to.is_none_or(|to| order.created_at < to)
            && self
                .zone
                .as_ref()
                .is_none_or(|zone| order.zone.as_ref() == Some(zone))
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;

    async fn insert(&self, order: Order) -> Result<(), StoreError>;

    /// Replace the order only if the stored copy still has the expected status
    /// and version. The written copy's version is bumped and returned.
    async fn replace_if(
        &self,
        order: Order,
        expected_status: OrderStatus,
        expected_version: u64,
    ) -> Result<Order, StoreError>;

    async fn query(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError>;
}

/// Result of a settlement upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementFilter {
    pub settlement_status: Option<SettlementStatus>,
    pub admin_commission_status: Option<AdminCommissionStatus>,
}

impl SettlementFilter {
    /// Completed settlements whose admin commission still awaits a payout run.
    pub fn awaiting_payout() -> Self {
        Self {
            settlement_status: Some(SettlementStatus::Completed),
            admin_commission_status: Some(AdminCommissionStatus::PendingSettlement),
        }
    }

    pub fn matches(&self, record: &SettlementRecord) -> bool {
        self.settlement_status
            .is_none_or(|s| record.settlement_status == s)
            && self
                .admin_commission_status
                .is_none_or(|s| record.admin_earning.admin_commission_status == s)
    }
}

#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn get(&self, order: &OrderId) -> Result<Option<SettlementRecord>, StoreError>;

    /// Insert or replace the record for its order. A record derived from an
    /// older order revision than the stored one is rejected.
    async fn upsert(&self, record: SettlementRecord) -> Result<UpsertOutcome, StoreError>;

    async fn list(&self, filter: &SettlementFilter) -> Result<Vec<SettlementRecord>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(id).cloned())
    }

    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(order.id));
        }
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn replace_if(
        &self,
        mut order: Order,
        expected_status: OrderStatus,
        expected_version: u64,
    ) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().await;
        let current = orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::NotFound(order.id.clone()))?;

        if current.status != expected_status || current.version != expected_version {
            return Err(StoreError::Conflict {
                order: order.id.clone(),
                expected_status,
                expected_version,
                actual_status: current.status,
                actual_version: current.version,
            });
        }

        order.version = expected_version + 1;
        *current = order.clone();
        Ok(order)
    }

    async fn query(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut matched: Vec<Order> = orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }
}

#[derive(Debug, Default)]
pub struct MemorySettlementStore {
    records: RwLock<HashMap<OrderId, SettlementRecord>>,
}

impl MemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettlementStore for MemorySettlementStore {
    async fn get(&self, order: &OrderId) -> Result<Option<SettlementRecord>, StoreError> {
        Ok(self.records.read().await.get(order).cloned())
    }

    async fn upsert(&self, record: SettlementRecord) -> Result<UpsertOutcome, StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.order_id) {
            None => {
                records.insert(record.order_id.clone(), record);
                Ok(UpsertOutcome::Created)
            }
            Some(stored) if stored.revision > record.revision => Err(StoreError::Stale {
                order: record.order_id,
                stored: stored.revision,
                attempted: record.revision,
            }),
            Some(stored) if *stored == record => Ok(UpsertOutcome::Unchanged),
            Some(stored) => {
                *stored = record;
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    async fn list(&self, filter: &SettlementFilter) -> Result<Vec<SettlementRecord>, StoreError> {
        let records = self.records.read().await;
        let mut matched: Vec<SettlementRecord> = records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        Ok(matched)
    }
}

/// The external collaborators the engine reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub settlements: Arc<dyn SettlementStore>,
    pub configs: Arc<dyn CommissionConfigStore>,
    pub vendors: Arc<dyn VendorDirectory>,
}

impl Stores {
    /// Fresh in-memory stores. The concrete config store and vendor directory
    /// are returned too so callers can seed them.
    pub fn in_memory() -> (Self, Arc<MemoryConfigStore>, Arc<MemoryVendorDirectory>) {
        let configs = Arc::new(MemoryConfigStore::new());
        let vendors = Arc::new(MemoryVendorDirectory::new());
        let stores = Self {
            orders: Arc::new(MemoryOrderStore::new()),
            settlements: Arc::new(MemorySettlementStore::new()),
            configs: configs.clone(),
            vendors: vendors.clone(),
        };
        (stores, configs, vendors)
    }
}
