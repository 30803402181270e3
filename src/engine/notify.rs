use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::model::SettlementRecord;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Told about completed settlements. Never part of their correctness: a
/// failure here is logged and the settlement write stands.
#[async_trait]
pub trait SettlementNotifier: Send + Sync {
    async fn settlement_completed(&self, record: &SettlementRecord) -> Result<(), NotifyError>;
}

/// Default notifier; records completions in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl SettlementNotifier for LogNotifier {
    async fn settlement_completed(&self, record: &SettlementRecord) -> Result<(), NotifyError> {
        info!(
            order = %record.order_id,
            net_earning = %record.restaurant_earning.net_earning,
            admin = %record.admin_earning.commission,
            "settlement completed"
        );
        Ok(())
    }
}
