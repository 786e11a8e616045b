mod common;

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;

use common::{alice, harness, policy, usdc, weth, Harness, PAPER};
use copyvault::coordinator::CoordinatorConfig;
use copyvault::domain::{
    AccountId, EmergencyPhase, ExecutionReport, ManualClock, OpenPosition, TradeInstruction,
};
use copyvault::error::{Result, VaultError};
use copyvault::exchange::{AdapterGateway, StaticAdapterRegistry};
use copyvault::persistence::VaultEvent;
use copyvault::valuation::StaticOracle;
use copyvault::VaultCoordinator;

const PERIOD_SECS: i64 = 15 * 3600;

/// Venue that cannot report positions
struct BlindVenue;

#[async_trait]
impl AdapterGateway for BlindVenue {
    fn venue(&self) -> &str {
        "blind"
    }

    async fn execute(
        &self,
        _account: &AccountId,
        _instruction: &TradeInstruction,
        _ratio: u128,
    ) -> Result<ExecutionReport> {
        Ok(ExecutionReport::rejected("read-only"))
    }

    async fn open_positions(&self, _account: &AccountId) -> Result<Vec<OpenPosition>> {
        Err(VaultError::Validation("position endpoint down".to_string()))
    }
}

/// Pool and lead each hold 30 on ETH-PERP and 40 on BTC-PERP; BTC closes need 200 bps
async fn open_book() -> Harness {
    let h = harness();
    h.deposit(&alice(), 100).await;
    h.lead_deposit(100).await;
    h.oracle.set_valuation(&h.accounts.pool, 100).await;
    h.oracle.set_valuation(&h.accounts.lead_account, 100).await;

    for (market, amount) in [("ETH-PERP", 30), ("BTC-PERP", 40)] {
        let instruction = TradeInstruction::increase(market, usdc(), amount);
        h.vault
            .issue_instruction(h.operator(), PAPER, &instruction, true)
            .await
            .unwrap();
    }
    h.venue.set_required_slippage("BTC-PERP", 200).await;
    assert_eq!(h.vault.balance_of(&h.accounts.pool, &usdc()).await, 30);
    h
}

#[tokio::test]
async fn unwind_waits_for_the_emergency_period() {
    let h = open_book().await;

    assert!(matches!(
        h.vault.emergency_unwind(&alice()).await,
        Err(VaultError::TooEarly { .. })
    ));
    h.clock.advance(Duration::seconds(PERIOD_SECS));
    assert!(matches!(
        h.vault.emergency_unwind(&alice()).await,
        Err(VaultError::TooEarly { .. })
    ));

    h.clock.advance(Duration::seconds(1));
    assert!(h.vault.emergency_unwind(&alice()).await.is_ok());
}

#[tokio::test]
async fn unwind_requires_an_allowed_investor() {
    let h = open_book().await;
    h.clock.advance(Duration::seconds(PERIOD_SECS + 1));

    assert!(matches!(
        h.vault.emergency_unwind(&AccountId::new("mallory")).await,
        Err(VaultError::UserNotAllowed(_))
    ));
}

#[tokio::test]
async fn partial_unwind_escalates_slippage_then_completes() {
    let h = open_book().await;
    h.clock.advance(Duration::seconds(PERIOD_SECS + 1));

    let first = h.vault.emergency_unwind(&alice()).await.unwrap();
    assert_eq!(first.attempted, 2);
    assert_eq!(first.closed, 1);
    assert_eq!(first.remaining, 1);
    assert!(first.is_emergency_open);
    assert_eq!(first.phase, EmergencyPhase::UnwindAttempted);
    assert_eq!(first.slippage_bps, 250);
    // ETH collateral is back in the pool, BTC is still on the venue
    assert_eq!(h.vault.balance_of(&h.accounts.pool, &usdc()).await, 60);
    assert!(h
        .venue
        .position(&h.accounts.pool, "BTC-PERP")
        .await
        .is_some_and(|p| p.is_open()));

    let second = h.vault.emergency_unwind(&alice()).await.unwrap();
    assert_eq!(second.remaining, 0);
    assert!(!second.is_emergency_open);
    assert_eq!(second.phase, EmergencyPhase::Normal);
    assert_eq!(second.slippage_bps, 150);
    assert_eq!(h.vault.balance_of(&h.accounts.pool, &usdc()).await, 100);

    let emergency = h.vault.emergency_state().await;
    assert_eq!(emergency.attempts, 0);

    let last = h.vault.events().await.pop().unwrap();
    assert_eq!(
        last.event,
        VaultEvent::EmergencyUnwindCompleted {
            attempts: 2,
            closed: 1
        }
    );
    assert_eq!(last.metadata.triggered_by, Some(alice()));
}

#[tokio::test]
async fn lead_positions_are_left_alone() {
    let h = open_book().await;
    h.clock.advance(Duration::seconds(PERIOD_SECS + 1));
    h.venue.set_required_slippage("BTC-PERP", 0).await;

    let outcome = h.vault.emergency_unwind(&alice()).await.unwrap();
    assert_eq!(outcome.remaining, 0);
    assert_eq!(
        h.venue
            .position(&h.accounts.lead_account, "ETH-PERP")
            .await
            .map(|p| p.size),
        Some(30)
    );
}

#[tokio::test]
async fn slippage_is_capped_at_full_tolerance() {
    let h = open_book().await;
    h.venue.set_required_slippage("BTC-PERP", u32::MAX).await;
    h.clock.advance(Duration::seconds(PERIOD_SECS + 1));

    for _ in 0..110 {
        h.vault.emergency_unwind(&alice()).await.unwrap();
    }
    assert_eq!(h.vault.emergency_state().await.current_slippage_bps, 10_000);
}

#[tokio::test]
async fn failed_position_query_changes_nothing() {
    let clock = Arc::new(ManualClock::starting_now());
    let oracle = Arc::new(StaticOracle::new(clock.clone(), 3600));
    let registry = StaticAdapterRegistry::new().register(4, Arc::new(BlindVenue));
    let vault = VaultCoordinator::new(
        CoordinatorConfig::default(),
        oracle,
        Arc::new(registry),
        Arc::new(policy()),
        clock.clone(),
    );
    clock.advance(Duration::seconds(PERIOD_SECS + 1));

    let before = vault.state().await;
    let err = vault.emergency_unwind(&alice()).await.unwrap_err();
    assert!(matches!(
        err,
        VaultError::AdapterOperationFailed { protocol: 4, .. }
    ));
    assert_eq!(vault.state().await, before);
}

#[tokio::test]
async fn settlement_resets_the_emergency_timer() {
    let h = harness();
    h.deposit(&alice(), 100).await;
    h.clock.advance(Duration::hours(16));
    h.mark(100, 0).await;
    h.settle().await.unwrap();

    assert!(matches!(
        h.vault.emergency_unwind(&alice()).await,
        Err(VaultError::TooEarly { .. })
    ));
}

#[tokio::test]
async fn emergency_withdraw_sweeps_stray_assets_to_admin() {
    let h = harness();
    let admin = h.accounts.admin.clone();
    h.vault
        .record_inflow(&h.accounts.pool, &weth(), 7)
        .await
        .unwrap();

    assert!(matches!(
        h.vault.emergency_withdraw(&alice(), &weth()).await,
        Err(VaultError::Unauthorized(_))
    ));
    assert!(matches!(
        h.vault.emergency_withdraw(&admin, &usdc()).await,
        Err(VaultError::Validation(_))
    ));

    assert_eq!(h.vault.emergency_withdraw(&admin, &weth()).await.unwrap(), 7);
    assert_eq!(h.vault.balance_of(&admin, &weth()).await, 7);
    assert_eq!(h.vault.balance_of(&h.accounts.pool, &weth()).await, 0);

    assert!(matches!(
        h.vault.emergency_withdraw(&admin, &weth()).await,
        Err(VaultError::ZeroAmount)
    ));
}
