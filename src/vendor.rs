//! Vendor identity resolution.
//!
//! Orders may name their vendor by primary id or by human-readable code. Both
//! are normalized to one [`VendorId`] before any config or report lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{VendorId, VendorRef};

#[async_trait]
pub trait VendorDirectory: Send + Sync {
    /// Canonical id for either identifier form, or `None` for an unknown vendor.
    async fn resolve(&self, reference: &VendorRef) -> Option<VendorId>;
}

#[derive(Debug, Default)]
struct Entries {
    ids: HashMap<String, VendorId>,
    codes: HashMap<String, VendorId>,
}

/// In-process directory of `(id, code)` pairs.
#[derive(Debug, Default)]
pub struct MemoryVendorDirectory {
    entries: RwLock<Entries>,
}

impl MemoryVendorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: impl Into<String>, code: Option<String>) -> VendorId {
        let id = id.into();
        let canonical = VendorId::new(id.clone());
        let mut entries = self.entries.write().await;
        entries.ids.insert(id, canonical.clone());
        if let Some(code) = code {
            entries.codes.insert(code, canonical.clone());
        }
        canonical
    }
}

#[async_trait]
impl VendorDirectory for MemoryVendorDirectory {
    async fn resolve(&self, reference: &VendorRef) -> Option<VendorId> {
        let entries = self.entries.read().await;
        match reference {
            VendorRef::Id(id) => entries.ids.get(id).cloned(),
            VendorRef::Code(code) => entries.codes.get(code).cloned(),
        }
    }
}
