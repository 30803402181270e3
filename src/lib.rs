pub mod amount;
pub mod config;
pub mod csv;
pub mod engine;
pub mod model;
pub mod report;
pub mod store;
pub mod vendor;

pub use amount::{Amount, Percent};
pub use engine::{Calculator, Reconciler, SettlementError};
pub use model::{Order, OrderId, SettlementRecord, VendorId};
pub use report::AggregateReader;
pub use store::Stores;
