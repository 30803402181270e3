//! Versioned, append-only commission policy.
//!
//! Every write creates a new version and retires the previously active one for
//! the same `(scope, vendor)` key. History is never rewritten, so the
//! percentages snapshotted onto old orders stay explainable.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::amount::Percent;
use crate::model::{CommissionPercentages, VendorId};

/// Which policy family a configuration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    /// Restaurant orders: platform / restaurant.
    Standard,
    /// QR orders placed through a hotel: hotel / admin / vendor.
    Qr,
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigScope::Standard => f.write_str("standard"),
            ConfigScope::Qr => f.write_str("qr"),
        }
    }
}

/// Percentage split for one policy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "family")]
pub enum CommissionPolicy {
    Standard { platform: Percent, restaurant: Percent },
    Qr { hotel: Percent, admin: Percent, vendor: Percent },
}

impl CommissionPolicy {
    pub fn standard(platform: Percent, restaurant: Percent) -> Self {
        CommissionPolicy::Standard {
            platform,
            restaurant,
        }
    }

    /// QR split where the vendor implicitly receives whatever hotel and admin leave.
    pub fn qr(hotel: Percent, admin: Percent) -> Result<Self, ConfigError> {
        let vendor = (hotel + admin)
            .remainder_of_hundred()
            .ok_or(ConfigError::InvalidSplit {
                scope: ConfigScope::Qr,
                sum: hotel + admin,
            })?;
        Ok(CommissionPolicy::Qr {
            hotel,
            admin,
            vendor,
        })
    }

    pub fn scope(&self) -> ConfigScope {
        match self {
            CommissionPolicy::Standard { .. } => ConfigScope::Standard,
            CommissionPolicy::Qr { .. } => ConfigScope::Qr,
        }
    }

    pub fn sum(&self) -> Percent {
        match *self {
            CommissionPolicy::Standard {
                platform,
                restaurant,
            } => platform + restaurant,
            CommissionPolicy::Qr {
                hotel,
                admin,
                vendor,
            } => hotel + admin + vendor,
        }
    }

    /// Shares within the family must sum to exactly 100.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.sum();
        if sum != Percent::HUNDRED {
            return Err(ConfigError::InvalidSplit {
                scope: self.scope(),
                sum,
            });
        }
        Ok(())
    }

    /// Map the family's shares onto the three settlement parties.
    pub fn percentages(&self) -> CommissionPercentages {
        match *self {
            CommissionPolicy::Standard {
                platform,
                restaurant,
            } => CommissionPercentages {
                restaurant,
                admin: platform,
                hotel: Percent::ZERO,
            },
            CommissionPolicy::Qr {
                hotel,
                admin,
                vendor,
            } => CommissionPercentages {
                restaurant: vendor,
                admin,
                hotel,
            },
        }
    }
}

/// One immutable version of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub version: u64,
    pub scope: ConfigScope,
    /// `None` for the global default.
    pub vendor: Option<VendorId>,
    pub policy: CommissionPolicy,
    pub active: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{scope} commission shares must sum to 100%, got {sum}")]
    InvalidSplit { scope: ConfigScope, sum: Percent },

    #[error("policy family {policy} cannot be stored under scope {scope}")]
    ScopeMismatch {
        scope: ConfigScope,
        policy: ConfigScope,
    },

    #[error("no active {scope} override for vendor {vendor}")]
    NoOverride { scope: ConfigScope, vendor: VendorId },
}

#[async_trait]
pub trait CommissionConfigStore: Send + Sync {
    /// Active version for the key, without falling back to the global default.
    async fn active_config(
        &self,
        scope: ConfigScope,
        vendor: Option<&VendorId>,
    ) -> Option<CommissionConfig>;

    /// Validate and append a new active version. Returns the new version number.
    async fn set_config(
        &self,
        scope: ConfigScope,
        vendor: Option<VendorId>,
        policy: CommissionPolicy,
    ) -> Result<u64, ConfigError>;

    /// Deactivate a vendor override so the global default applies again.
    async fn retire_override(&self, scope: ConfigScope, vendor: &VendorId)
    -> Result<(), ConfigError>;

    /// Every version ever written for the key, oldest first.
    async fn history(&self, scope: ConfigScope, vendor: Option<&VendorId>)
    -> Vec<CommissionConfig>;

    /// Resolution order: vendor override, then global default.
    async fn resolve(&self, scope: ConfigScope, vendor: &VendorId) -> Option<CommissionConfig> {
        match self.active_config(scope, Some(vendor)).await {
            Some(config) => Some(config),
            None => self.active_config(scope, None).await,
        }
    }
}

/// In-process configuration store.
///
/// A single write lock covers "retire old, append new", so readers never see
/// two active versions for the same key.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    versions: RwLock<Vec<CommissionConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_key(config: &CommissionConfig, scope: ConfigScope, vendor: Option<&VendorId>) -> bool {
    config.scope == scope && config.vendor.as_ref() == vendor
}

#[async_trait]
impl CommissionConfigStore for MemoryConfigStore {
    async fn active_config(
        &self,
        scope: ConfigScope,
        vendor: Option<&VendorId>,
    ) -> Option<CommissionConfig> {
        let versions = self.versions.read().await;
        versions
            .iter()
            .rev()
            .find(|c| c.active && same_key(c, scope, vendor))
            .cloned()
    }

    async fn set_config(
        &self,
        scope: ConfigScope,
        vendor: Option<VendorId>,
        policy: CommissionPolicy,
    ) -> Result<u64, ConfigError> {
        if policy.scope() != scope {
            return Err(ConfigError::ScopeMismatch {
                scope,
                policy: policy.scope(),
            });
        }
        policy.validate()?;

        let mut versions = self.versions.write().await;
        let version = versions.last().map_or(1, |c| c.version + 1);
        for config in versions.iter_mut() {
            if same_key(config, scope, vendor.as_ref()) {
                config.active = false;
            }
        }
        info!(
            scope = %scope,
            vendor = ?vendor,
            version,
            "commission config activated"
        );
        versions.push(CommissionConfig {
            version,
            scope,
            vendor,
            policy,
            active: true,
        });
        Ok(version)
    }

    async fn retire_override(
        &self,
        scope: ConfigScope,
        vendor: &VendorId,
    ) -> Result<(), ConfigError> {
        let mut versions = self.versions.write().await;
        let active = versions
            .iter_mut()
            .find(|c| c.active && same_key(c, scope, Some(vendor)))
            .ok_or_else(|| ConfigError::NoOverride {
                scope,
                vendor: vendor.clone(),
            })?;
        active.active = false;
        info!(scope = %scope, vendor = %vendor, version = active.version, "commission override retired");
        Ok(())
    }

    async fn history(
        &self,
        scope: ConfigScope,
        vendor: Option<&VendorId>,
    ) -> Vec<CommissionConfig> {
        let versions = self.versions.read().await;
        versions
            .iter()
            .filter(|c| same_key(c, scope, vendor))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard(platform: u32, restaurant: u32) -> CommissionPolicy {
        CommissionPolicy::standard(Percent::whole(platform), Percent::whole(restaurant))
    }

    #[test]
    fn qr_policy_derives_vendor_share() {
        let policy = CommissionPolicy::qr(Percent::whole(10), Percent::whole(20)).unwrap();
        let pct = policy.percentages();
        assert_eq!(pct.hotel, Percent::whole(10));
        assert_eq!(pct.admin, Percent::whole(20));
        assert_eq!(pct.restaurant, Percent::whole(70));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn qr_policy_over_hundred_fails() {
        let result = CommissionPolicy::qr(Percent::whole(60), Percent::whole(50));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSplit {
                scope: ConfigScope::Qr,
                ..
            })
        ));
    }

    #[test]
    fn standard_policy_maps_platform_to_admin() {
        let pct = standard(25, 75).percentages();
        assert_eq!(pct.admin, Percent::whole(25));
        assert_eq!(pct.restaurant, Percent::whole(75));
        assert_eq!(pct.hotel, Percent::ZERO);
    }

    #[tokio::test]
    async fn set_config_rejects_bad_sum_and_keeps_previous() {
        let store = MemoryConfigStore::new();
        let v1 = store
            .set_config(ConfigScope::Standard, None, standard(20, 80))
            .await
            .unwrap();

        let result = store
            .set_config(ConfigScope::Standard, None, standard(30, 80))
            .await;
        assert!(matches!(result, Err(ConfigError::InvalidSplit { .. })));

        let active = store.active_config(ConfigScope::Standard, None).await.unwrap();
        assert_eq!(active.version, v1);
        assert_eq!(active.policy, standard(20, 80));
        assert_eq!(store.history(ConfigScope::Standard, None).await.len(), 1);
    }

    #[tokio::test]
    async fn set_config_rejects_wrong_family() {
        let store = MemoryConfigStore::new();
        let result = store
            .set_config(ConfigScope::Qr, None, standard(20, 80))
            .await;
        assert!(matches!(result, Err(ConfigError::ScopeMismatch { .. })));
    }

    #[tokio::test]
    async fn new_version_retires_old_one() {
        let store = MemoryConfigStore::new();
        store
            .set_config(ConfigScope::Standard, None, standard(20, 80))
            .await
            .unwrap();
        let v2 = store
            .set_config(ConfigScope::Standard, None, standard(15, 85))
            .await
            .unwrap();

        let history = store.history(ConfigScope::Standard, None).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|c| c.active).count(), 1);
        assert!(!history[0].active);
        assert_eq!(history[1].version, v2);
    }

    #[tokio::test]
    async fn resolve_prefers_vendor_override() {
        let store = MemoryConfigStore::new();
        let vendor = VendorId::new("r1");
        store
            .set_config(ConfigScope::Standard, None, standard(20, 80))
            .await
            .unwrap();
        store
            .set_config(ConfigScope::Standard, Some(vendor.clone()), standard(10, 90))
            .await
            .unwrap();

        let resolved = store.resolve(ConfigScope::Standard, &vendor).await.unwrap();
        assert_eq!(resolved.policy, standard(10, 90));

        let other = store
            .resolve(ConfigScope::Standard, &VendorId::new("r2"))
            .await
            .unwrap();
        assert_eq!(other.policy, standard(20, 80));
    }

    #[tokio::test]
    async fn retired_override_falls_back_to_global() {
        let store = MemoryConfigStore::new();
        let vendor = VendorId::new("r1");
        store
            .set_config(ConfigScope::Standard, None, standard(20, 80))
            .await
            .unwrap();
        store
            .set_config(ConfigScope::Standard, Some(vendor.clone()), standard(10, 90))
            .await
            .unwrap();
        store
            .retire_override(ConfigScope::Standard, &vendor)
            .await
            .unwrap();

        let resolved = store.resolve(ConfigScope::Standard, &vendor).await.unwrap();
        assert_eq!(resolved.policy, standard(20, 80));
        assert_eq!(
            store
                .retire_override(ConfigScope::Standard, &vendor)
                .await,
            Err(ConfigError::NoOverride {
                scope: ConfigScope::Standard,
                vendor
            })
        );
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let store = MemoryConfigStore::new();
        store
            .set_config(ConfigScope::Standard, None, standard(20, 80))
            .await
            .unwrap();
        assert!(store.active_config(ConfigScope::Qr, None).await.is_none());
        assert!(
            store
                .resolve(ConfigScope::Qr, &VendorId::new("h1"))
                .await
                .is_none()
        );
    }
}
