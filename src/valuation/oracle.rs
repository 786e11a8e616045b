use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{AccountId, AssetId, Clock};
use crate::error::{Result, VaultError};

/// Source of account valuations and asset prices.
///
/// Implementations fail loudly: a missing, zero or stale price is an error, never a default.
#[async_trait]
pub trait ValuationOracle: Send + Sync {
    /// Total value of everything `account` holds
    async fn valuation_of(&self, account: &AccountId) -> Result<u128>;

    /// Price of one unit of `asset`
    async fn unit_price(&self, asset: &AssetId) -> Result<u128>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub price: u128,
    pub updated_at: DateTime<Utc>,
}

/// In-memory oracle fed by explicit updates
pub struct StaticOracle {
    prices: RwLock<HashMap<AssetId, PricePoint>>,
    valuations: RwLock<HashMap<AccountId, u128>>,
    max_price_age_secs: u64,
    clock: Arc<dyn Clock>,
}

impl StaticOracle {
    pub fn new(clock: Arc<dyn Clock>, max_price_age_secs: u64) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            valuations: RwLock::new(HashMap::new()),
            max_price_age_secs,
            clock,
        }
    }

    /// Publish a price stamped with the current clock time
    pub async fn set_price(&self, asset: &AssetId, price: u128) {
        let updated_at = self.clock.now();
        self.set_price_at(asset, price, updated_at).await;
    }

    pub async fn set_price_at(&self, asset: &AssetId, price: u128, updated_at: DateTime<Utc>) {
        debug!("Oracle price {} = {} at {}", asset, price, updated_at);
        self.prices
            .write()
            .await
            .insert(asset.clone(), PricePoint { price, updated_at });
    }

    pub async fn set_valuation(&self, account: &AccountId, value: u128) {
        debug!("Oracle valuation {} = {}", account, value);
        self.valuations.write().await.insert(account.clone(), value);
    }

    pub async fn clear_valuation(&self, account: &AccountId) {
        self.valuations.write().await.remove(account);
    }
}

#[async_trait]
impl ValuationOracle for StaticOracle {
    async fn valuation_of(&self, account: &AccountId) -> Result<u128> {
        self.valuations
            .read()
            .await
            .get(account)
            .copied()
            .ok_or_else(|| VaultError::ValuationUnavailable(account.clone()))
    }

    async fn unit_price(&self, asset: &AssetId) -> Result<u128> {
        let point = self
            .prices
            .read()
            .await
            .get(asset)
            .copied()
            .ok_or_else(|| VaultError::NoOracleForAsset(asset.clone()))?;

        if point.price == 0 {
            return Err(VaultError::BadPrice(asset.clone()));
        }

        let age_secs = (self.clock.now() - point.updated_at).num_seconds();
        if age_secs > self.max_price_age_secs as i64 {
            return Err(VaultError::TooOldPrice {
                asset: asset.clone(),
                age_secs,
                max_age_secs: self.max_price_age_secs,
            });
        }

        Ok(point.price)
    }
}
