#![allow(dead_code)]

use std::sync::Arc;

use copyvault::coordinator::{CoordinatorConfig, RoundSettlement, VaultAccounts};
use copyvault::domain::{AccountId, AssetId, ManualClock, PRECISION};
use copyvault::error::Result;
use copyvault::exchange::{AdapterGateway, PaperAdapter, StaticAdapterRegistry};
use copyvault::safety::StaticAllowList;
use copyvault::valuation::{StaticOracle, ValuationOracle};
use copyvault::VaultCoordinator;

pub const PAPER: u32 = 1;
pub const DISABLED: u32 = 2;

pub fn usdc() -> AssetId {
    AssetId::new("USDC")
}

pub fn weth() -> AssetId {
    AssetId::new("WETH")
}

pub fn alice() -> AccountId {
    AccountId::new("alice")
}

pub fn bob() -> AccountId {
    AccountId::new("bob")
}

pub struct Harness {
    pub vault: VaultCoordinator,
    pub clock: Arc<ManualClock>,
    pub oracle: Arc<StaticOracle>,
    pub venue: Arc<PaperAdapter>,
    pub accounts: VaultAccounts,
}

pub fn policy() -> StaticAllowList {
    StaticAllowList::new()
        .allow_investor("alice")
        .allow_investor("bob")
        .allow_asset("USDC")
        .allow_asset("WETH")
}

pub fn harness() -> Harness {
    harness_with(CoordinatorConfig::default())
}

pub fn harness_with(config: CoordinatorConfig) -> Harness {
    let clock = Arc::new(ManualClock::starting_now());
    let oracle = Arc::new(StaticOracle::new(clock.clone(), 3600));
    let (vault, venue) = build(config, oracle.clone(), clock.clone());
    Harness {
        accounts: vault.config().accounts.clone(),
        vault,
        clock,
        oracle,
        venue,
    }
}

/// Coordinator around an arbitrary oracle, with the paper venue registered
pub fn build(
    config: CoordinatorConfig,
    oracle: Arc<dyn ValuationOracle>,
    clock: Arc<ManualClock>,
) -> (VaultCoordinator, Arc<PaperAdapter>) {
    let venue = Arc::new(PaperAdapter::new("paper"));
    let registry = StaticAdapterRegistry::new()
        .register(PAPER, venue.clone() as Arc<dyn AdapterGateway>)
        .register_disabled(DISABLED);
    let vault = VaultCoordinator::new(
        config,
        oracle,
        Arc::new(registry),
        Arc::new(policy()),
        clock,
    );
    (vault, venue)
}

impl Harness {
    pub fn operator(&self) -> &AccountId {
        &self.accounts.lead_operator
    }

    pub async fn fund(&self, account: &AccountId, amount: u128) {
        self.vault
            .record_inflow(account, &usdc(), amount)
            .await
            .expect("inflow");
    }

    /// Fund a wallet and deposit from it
    pub async fn deposit(&self, participant: &AccountId, amount: u128) {
        self.fund(participant, amount).await;
        self.vault
            .deposit(participant, amount)
            .await
            .expect("deposit");
    }

    pub async fn lead_deposit(&self, amount: u128) {
        let operator = self.operator().clone();
        self.fund(&operator, amount).await;
        self.vault
            .lead_deposit(&operator, amount)
            .await
            .expect("lead deposit");
    }

    /// Fresh unit price plus explicit pool and lead valuations
    pub async fn mark(&self, pool_value: u128, lead_value: u128) {
        self.oracle.set_price(&usdc(), PRECISION).await;
        self.oracle.set_valuation(&self.accounts.pool, pool_value).await;
        self.oracle
            .set_valuation(&self.accounts.lead_account, lead_value)
            .await;
    }

    pub async fn settle(&self) -> Result<RoundSettlement> {
        self.vault.advance_round(self.operator()).await
    }
}
