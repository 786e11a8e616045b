//! Paper session
//!
//! Drives a full vault lifecycle against in-memory collaborators: funding, deposits, one
//! replicated position and a series of settlements while the position gains value.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::coordinator::{RoundSettlement, VaultCoordinator, VaultSnapshot};
use crate::domain::{AccountId, ManualClock, TradeInstruction, PRECISION};
use crate::error::Result;
use crate::exchange::{AdapterGateway, PaperAdapter, StaticAdapterRegistry};
use crate::persistence::Checkpoint;
use crate::safety::StaticAllowList;
use crate::valuation::StaticOracle;

pub const PAPER_PROTOCOL: u32 = 1;
const MARKET: &str = "ETH-PERP";

#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub rounds: u32,
    /// Position gain per round, basis points
    pub gain_bps: u32,
    pub lead_capital: u128,
    pub participants: Vec<(String, u128)>,
    /// Deposited by every participant in each round after the first
    pub top_up: u128,
    /// Lead-size collateral of the replicated position
    pub position_size: u128,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            rounds: 3,
            gain_bps: 500,
            lead_capital: 1_000_000_000,
            participants: vec![
                ("alice".to_string(), 300_000_000),
                ("bob".to_string(), 200_000_000),
            ],
            top_up: 10_000_000,
            position_size: 400_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub settlements: Vec<RoundSettlement>,
    pub snapshot: VaultSnapshot,
    #[serde(skip)]
    pub checkpoint: Checkpoint,
}

/// Underlying balance plus the position marked up by `gain_bps` for each round held
async fn mark_to_market(
    vault: &VaultCoordinator,
    venue: &PaperAdapter,
    oracle: &StaticOracle,
    account: &AccountId,
    rounds_held: u32,
    gain_bps: u32,
) {
    let underlying = vault.config().underlying_asset.clone();
    let cash = vault.balance_of(account, &underlying).await;
    let position = venue
        .position(account, MARKET)
        .await
        .map(|p| p.size)
        .unwrap_or(0);
    let growth = 10_000u128 + gain_bps as u128 * rounds_held as u128;
    oracle
        .set_valuation(account, cash + position * growth / 10_000)
        .await;
}

pub async fn run_paper_session(config: &AppConfig, params: &SimulationParams) -> Result<SimulationReport> {
    let engine = config.coordinator_config()?;
    let accounts = engine.accounts.clone();
    let underlying = engine.underlying_asset.clone();

    let clock = Arc::new(ManualClock::starting_now());
    let oracle = Arc::new(StaticOracle::new(clock.clone(), config.oracle.max_price_age_secs));
    let venue = Arc::new(PaperAdapter::new("paper"));
    let registry = StaticAdapterRegistry::new()
        .register(PAPER_PROTOCOL, venue.clone() as Arc<dyn AdapterGateway>);
    let mut policy = StaticAllowList::new();
    for (name, _) in &params.participants {
        policy = policy.allow_investor(name.as_str());
    }

    let vault = VaultCoordinator::new(
        engine,
        oracle.clone(),
        Arc::new(registry),
        Arc::new(policy),
        clock.clone(),
    );

    vault
        .record_inflow(&accounts.lead_operator, &underlying, params.lead_capital)
        .await?;
    vault
        .lead_deposit(&accounts.lead_operator, params.lead_capital)
        .await?;
    for (name, amount) in &params.participants {
        let participant = AccountId::new(name.as_str());
        vault.record_inflow(&participant, &underlying, *amount).await?;
        vault.deposit(&participant, *amount).await?;
    }

    let mut settlements = Vec::with_capacity(params.rounds as usize);
    for round in 0..params.rounds {
        if round > 0 {
            for (name, _) in &params.participants {
                let participant = AccountId::new(name.as_str());
                vault
                    .record_inflow(&participant, &underlying, params.top_up)
                    .await?;
                vault.deposit(&participant, params.top_up).await?;
            }
        }

        clock.advance(chrono::Duration::hours(1));
        oracle.set_price(&underlying, PRECISION).await;
        for account in [&accounts.pool, &accounts.lead_account] {
            mark_to_market(&vault, &venue, &oracle, account, round, params.gain_bps).await;
        }

        let settlement = vault.advance_round(&accounts.lead_operator).await?;
        info!(
            "Simulated round {} settled at pps {}",
            settlement.pool.round, settlement.pool.price_per_share
        );
        settlements.push(settlement);

        if round == 0 {
            for account in [&accounts.pool, &accounts.lead_account] {
                mark_to_market(&vault, &venue, &oracle, account, 0, params.gain_bps).await;
            }
            let instruction = TradeInstruction::increase(MARKET, underlying.clone(), params.position_size);
            vault
                .issue_instruction(&accounts.lead_operator, PAPER_PROTOCOL, &instruction, true)
                .await?;
        }
    }

    Ok(SimulationReport {
        settlements,
        snapshot: vault.snapshot().await,
        checkpoint: vault.checkpoint().await?,
    })
}
