//! Vault Coordinator: the single owner of all vault state
//!
//! Every mutating operation takes the state write lock, works on a staged clone and swaps
//! it in only when the whole operation succeeded. Operations are therefore serialized and
//! a rejected call leaves every ledger untouched. The one deliberate exception is
//! replication: once the lead side of an instruction has executed it is committed, and a
//! failing pool side is recorded on top of it.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::math::PRECISION;
use crate::domain::{AccountId, AssetId, Clock, ExecutionSide, ProtocolId, TradeInstruction, UnwindResult};
use crate::emergency::{unwind_positions, EmergencyState};
use crate::error::{Result, VaultError};
use crate::exchange::{resolve_adapter, AdapterRegistry};
use crate::ledger::RoundLedger;
use crate::persistence::{Checkpoint, EventMetadata, StoredEvent, VaultEvent};
use crate::pool::{ClaimAmounts, ParticipantRecord, SettlementInputs};
use crate::replication::{compute_ratio, ensure_funded, execute_on};
use crate::safety::{enforce_instruction_assets, enforce_investor, AccessPolicy};
use crate::valuation::ValuationOracle;

use super::config::CoordinatorConfig;
use super::state::{InstructionOutcome, RoundSettlement, UnwindOutcome, VaultSnapshot, VaultState};

/// Balance shortfalls on reserved transfers are reported as reserve violations
fn as_reserve_shortfall(err: VaultError) -> VaultError {
    match err {
        VaultError::InsufficientBalance {
            available,
            requested,
            ..
        } => VaultError::NotEnoughReservedAssets {
            have: available,
            need: requested,
        },
        other => other,
    }
}

#[derive(Clone)]
pub struct VaultCoordinator {
    config: CoordinatorConfig,
    state: Arc<RwLock<VaultState>>,
    oracle: Arc<dyn ValuationOracle>,
    registry: Arc<dyn AdapterRegistry>,
    policy: Arc<dyn AccessPolicy>,
    clock: Arc<dyn Clock>,
}

impl VaultCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        oracle: Arc<dyn ValuationOracle>,
        registry: Arc<dyn AdapterRegistry>,
        policy: Arc<dyn AccessPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = VaultState::new(config.emergency.default_slippage_bps, clock.now_ts());
        info!(
            "Vault coordinator started: pool={} lead={} underlying={}",
            config.accounts.pool, config.accounts.lead_account, config.underlying_asset
        );
        Self {
            config,
            state: Arc::new(RwLock::new(state)),
            oracle,
            registry,
            policy,
            clock,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn underlying(&self) -> &AssetId {
        &self.config.underlying_asset
    }

    fn ensure_caller(&self, caller: &AccountId, expected: &AccountId, role: &str) -> Result<()> {
        if caller == expected {
            Ok(())
        } else {
            Err(VaultError::Unauthorized(format!(
                "{} is not the {}",
                caller, role
            )))
        }
    }

    /// Run a synchronous mutation against a staged copy and commit it on success
    async fn transact<T>(
        &self,
        f: impl FnOnce(&mut VaultState, chrono::DateTime<chrono::Utc>) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let out = f(&mut staged, self.clock.now())?;
        *state = staged;
        Ok(out)
    }

    // ==================== Participant operations ====================

    pub async fn deposit(&self, participant: &AccountId, amount: u128) -> Result<()> {
        enforce_investor(self.policy.as_ref(), participant)?;
        let pool = self.config.accounts.pool.clone();
        let underlying = self.underlying().clone();

        self.transact(|state, now| {
            state.pool.deposit(participant, amount)?;
            state.book.transfer(participant, &pool, &underlying, amount)?;
            state.emit(
                VaultEvent::DepositRecorded {
                    participant: participant.clone(),
                    amount,
                },
                EventMetadata::triggered_by(participant),
                now,
            );
            Ok(())
        })
        .await?;

        info!("Deposit recorded: {} {} {}", participant, amount, self.underlying());
        Ok(())
    }

    pub async fn withdraw_request(&self, participant: &AccountId, shares: u128) -> Result<()> {
        self.transact(|state, now| {
            state.pool.withdraw_request(participant, shares)?;
            state.emit(
                VaultEvent::WithdrawRequested {
                    participant: participant.clone(),
                    shares,
                },
                EventMetadata::triggered_by(participant),
                now,
            );
            Ok(())
        })
        .await?;

        info!("Withdrawal requested: {} {} shares", participant, shares);
        Ok(())
    }

    /// Release claimable shares and assets. Nothing changes when nothing is claimable.
    pub async fn claim(&self, participant: &AccountId) -> Result<ClaimAmounts> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();

        let amounts = staged.pool.claim(participant)?;
        if amounts.is_empty() {
            debug!("Nothing to claim for {}", participant);
            return Ok(amounts);
        }
        if amounts.assets > 0 {
            staged
                .book
                .transfer(
                    &self.config.accounts.pool,
                    participant,
                    self.underlying(),
                    amounts.assets,
                )
                .map_err(as_reserve_shortfall)?;
        }
        staged.emit(
            VaultEvent::ClaimSettled {
                participant: participant.clone(),
                shares: amounts.shares,
                assets: amounts.assets,
            },
            EventMetadata::triggered_by(participant),
            self.clock.now(),
        );
        *state = staged;

        info!(
            "Claim settled: {} shares={} assets={}",
            participant, amounts.shares, amounts.assets
        );
        Ok(amounts)
    }

    pub async fn preview_shares(&self, participant: &AccountId) -> Result<u128> {
        self.state.read().await.pool.preview_shares(participant)
    }

    pub async fn preview_assets(&self, participant: &AccountId) -> Result<u128> {
        self.state.read().await.pool.preview_assets(participant)
    }

    /// Underlying value of a participant's claimed and claimable shares
    pub async fn share_value(&self, participant: &AccountId) -> Result<u128> {
        self.state.read().await.pool.share_value(participant)
    }

    // ==================== Lead operations ====================

    pub async fn lead_deposit(&self, caller: &AccountId, amount: u128) -> Result<()> {
        let accounts = self.config.accounts.clone();
        self.ensure_caller(caller, &accounts.lead_operator, "lead operator")?;
        let underlying = self.underlying().clone();

        self.transact(|state, now| {
            state.lead.record_deposit(amount)?;
            state
                .book
                .transfer(&accounts.lead_operator, &accounts.lead_account, &underlying, amount)?;
            state.emit(
                VaultEvent::LeadDepositRecorded { amount },
                EventMetadata::triggered_by(caller),
                now,
            );
            Ok(())
        })
        .await?;

        info!("Lead deposit recorded: {}", amount);
        Ok(())
    }

    /// Queue a lead withdrawal. Pending withdrawals stay covered by the lead account's
    /// underlying balance so that settlement can always pay them.
    pub async fn lead_withdraw_request(&self, caller: &AccountId, amount: u128) -> Result<()> {
        let accounts = self.config.accounts.clone();
        self.ensure_caller(caller, &accounts.lead_operator, "lead operator")?;
        let underlying = self.underlying().clone();

        self.transact(|state, now| {
            state.lead.record_withdraw_request(amount)?;
            let have = state.book.balance(&accounts.lead_account, &underlying);
            let need = state.lead.cumulative_pending_withdrawals;
            if need > have {
                return Err(VaultError::NotEnoughReservedAssets { have, need });
            }
            state.emit(
                VaultEvent::LeadWithdrawRequested { amount },
                EventMetadata::triggered_by(caller),
                now,
            );
            Ok(())
        })
        .await?;

        info!("Lead withdrawal requested: {}", amount);
        Ok(())
    }

    // ==================== Settlement ====================

    /// Settle the lead and the pool together and open the next round
    pub async fn advance_round(&self, caller: &AccountId) -> Result<RoundSettlement> {
        let accounts = &self.config.accounts;
        self.ensure_caller(caller, &accounts.lead_operator, "lead operator")?;

        let mut state = self.state.write().await;
        let mut staged = state.clone();

        RoundLedger::ensure_pending(&[&staged.lead, &staged.pool.ledger.round])?;

        let now = self.clock.now();
        let min_secs = self.config.min_round_interval_secs;
        let elapsed_secs = now.timestamp() - staged.emergency.last_round_timestamp;
        if min_secs > 0 && elapsed_secs < min_secs as i64 {
            return Err(VaultError::RoundTooSoon {
                elapsed_secs,
                min_secs,
            });
        }

        let unit_price = self.oracle.unit_price(self.underlying()).await?;
        let pool_valuation = self.oracle.valuation_of(&accounts.pool).await?;
        let inputs = SettlementInputs {
            unit_price,
            pool_valuation,
            underlying_balance: staged.book.balance(&accounts.pool, self.underlying()),
        };

        let outcome = staged
            .pool
            .settle(inputs, self.config.performance_fee_rate)?;

        let lead_withdrawn = staged.lead.cumulative_pending_withdrawals;
        if lead_withdrawn > 0 {
            staged
                .book
                .transfer(
                    &accounts.lead_account,
                    &accounts.lead_operator,
                    self.underlying(),
                    lead_withdrawn,
                )
                .map_err(as_reserve_shortfall)?;
        }
        let lead_after_round_balance = staged.book.balance(&accounts.lead_account, self.underlying());
        let lead_round = staged.lead.advance(lead_after_round_balance);
        staged.emergency.record_round(now.timestamp());

        let settlement_id = Uuid::new_v4();
        staged.emit(
            VaultEvent::RoundSettled {
                settlement_id,
                round: outcome.round,
                price_per_share: outcome.price_per_share,
                shares_minted: outcome.shares_minted,
                shares_burned: outcome.shares_burned,
                profit_value: outcome.profit_value,
                deposits_processed: outcome.deposits_processed,
                fee_assets: outcome.fee_assets,
            },
            EventMetadata::with_correlation(settlement_id).with_triggered_by(caller),
            now,
        );
        *state = staged;

        info!(
            "Round {} settled: pps={} minted={} burned={} profit={} fee={} lead_withdrawn={}",
            outcome.round,
            outcome.price_per_share,
            outcome.shares_minted,
            outcome.shares_burned,
            outcome.profit_value,
            outcome.fee_assets,
            lead_withdrawn
        );

        Ok(RoundSettlement {
            settlement_id,
            pool: outcome,
            lead_round,
            lead_withdrawn,
            lead_after_round_balance,
            settled_at: now,
        })
    }

    // ==================== Trading ====================

    /// Execute a lead instruction and, when `replicate` is set, relay it to the pool scaled
    /// by the pool/lead valuation ratio.
    pub async fn issue_instruction(
        &self,
        caller: &AccountId,
        protocol: ProtocolId,
        instruction: &TradeInstruction,
        replicate: bool,
    ) -> Result<InstructionOutcome> {
        let accounts = &self.config.accounts;
        self.ensure_caller(caller, &accounts.lead_operator, "lead operator")?;
        if instruction.amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        enforce_instruction_assets(self.policy.as_ref(), instruction)?;
        let adapter = resolve_adapter(self.registry.as_ref(), protocol)?;

        let mut state = self.state.write().await;
        let mut staged = state.clone();

        // Ratio reflects valuations before the lead trade moves them
        let ratio = if replicate {
            let pool_value = self.oracle.valuation_of(&accounts.pool).await?;
            let lead_value = self.oracle.valuation_of(&accounts.lead_account).await?;
            Some(compute_ratio(pool_value, lead_value)?)
        } else {
            None
        };

        let correlation_id = Uuid::new_v4();
        let metadata = EventMetadata::with_correlation(correlation_id).with_triggered_by(caller);

        // Pending lead withdrawals are not tradeable
        let lead_reserved = if &instruction.asset_in == self.underlying() {
            staged.lead.cumulative_pending_withdrawals
        } else {
            0
        };
        ensure_funded(
            &staged.book,
            &accounts.lead_account,
            instruction,
            PRECISION,
            lead_reserved,
        )?;

        let lead = execute_on(
            adapter.as_ref(),
            ExecutionSide::Lead,
            protocol,
            &accounts.lead_account,
            instruction,
            PRECISION,
        )
        .await?;
        staged
            .book
            .apply_deltas(&accounts.lead_account, &lead.report.deltas)
            .map_err(|e| VaultError::AdapterOperationFailed {
                side: ExecutionSide::Lead,
                protocol,
                reason: format!("fill could not be booked: {}", e),
            })?;
        staged.emit(
            VaultEvent::InstructionExecuted {
                side: ExecutionSide::Lead,
                protocol,
                market: instruction.market.clone(),
                ratio: PRECISION,
            },
            metadata.clone(),
            self.clock.now(),
        );
        *state = staged;
        info!(
            "Lead executed {:?} {} via protocol {}",
            instruction.action, instruction.market, protocol
        );

        let Some(ratio) = ratio else {
            return Ok(InstructionOutcome {
                lead,
                pool: None,
                skipped: None,
            });
        };

        let Some(ratio) = ratio else {
            let reason = "lead valuation is zero or pool/lead ratio rounds to zero".to_string();
            state.emit(
                VaultEvent::ReplicationSkipped {
                    protocol,
                    reason: reason.clone(),
                },
                metadata,
                self.clock.now(),
            );
            info!("Replication skipped for {}: {}", instruction.market, reason);
            return Ok(InstructionOutcome {
                lead,
                pool: None,
                skipped: Some(reason),
            });
        };

        let mut staged = state.clone();
        let pool_side = match ensure_funded(&staged.book, &accounts.pool, instruction, ratio, 0) {
            Err(e) => Err(VaultError::AdapterOperationFailed {
                side: ExecutionSide::Pool,
                protocol,
                reason: e.to_string(),
            }),
            Ok(()) => match execute_on(
                adapter.as_ref(),
                ExecutionSide::Pool,
                protocol,
                &accounts.pool,
                instruction,
                ratio,
            )
            .await
            {
                Ok(outcome) => staged
                    .book
                    .apply_deltas(&accounts.pool, &outcome.report.deltas)
                    .map(|_| outcome)
                    .map_err(|e| VaultError::AdapterOperationFailed {
                        side: ExecutionSide::Pool,
                        protocol,
                        reason: format!("fill could not be booked: {}", e),
                    }),
                Err(e) => Err(e),
            },
        };

        match pool_side {
            Ok(pool) => {
                staged.emit(
                    VaultEvent::InstructionExecuted {
                        side: ExecutionSide::Pool,
                        protocol,
                        market: instruction.market.clone(),
                        ratio,
                    },
                    metadata,
                    self.clock.now(),
                );
                *state = staged;
                info!(
                    "Pool replicated {} via protocol {} at ratio {}",
                    instruction.market, protocol, ratio
                );
                Ok(InstructionOutcome {
                    lead,
                    pool: Some(pool),
                    skipped: None,
                })
            }
            Err(e) => {
                warn!("Replication of {} failed: {}", instruction.market, e);
                state.emit(
                    VaultEvent::ReplicationFailed {
                        protocol,
                        reason: e.to_string(),
                    },
                    metadata,
                    self.clock.now(),
                );
                Err(e)
            }
        }
    }

    // ==================== Emergency ====================

    /// Attempt to close every pool position once rounds have stalled
    pub async fn emergency_unwind(&self, caller: &AccountId) -> Result<UnwindOutcome> {
        enforce_investor(self.policy.as_ref(), caller)?;
        let params = self.config.emergency;

        let mut state = self.state.write().await;
        let mut staged = state.clone();

        let now = self.clock.now();
        staged.emergency.ensure_due(now.timestamp(), params.period_secs)?;

        let adapters = self.registry.capabilities();
        let report = unwind_positions(
            &adapters,
            &self.config.accounts.pool,
            staged.emergency.current_slippage_bps,
        )
        .await?;

        staged
            .book
            .apply_deltas(&self.config.accounts.pool, &report.deltas)?;
        let slippage_used = staged.emergency.current_slippage_bps;
        let attempt = staged.emergency.attempts + 1;
        staged.emergency.apply(report.result, &params)?;

        let remaining = match report.result {
            UnwindResult::FullyClosed => 0,
            UnwindResult::PartiallyClosed { remaining } => remaining,
        };
        let event = match report.result {
            UnwindResult::FullyClosed => VaultEvent::EmergencyUnwindCompleted {
                attempts: attempt,
                closed: report.closed,
            },
            UnwindResult::PartiallyClosed { remaining } => VaultEvent::EmergencyUnwindAttempted {
                attempt,
                slippage_bps: slippage_used,
                remaining,
            },
        };
        staged.emit(event, EventMetadata::triggered_by(caller), now);

        let emergency: &EmergencyState = &staged.emergency;
        let outcome = UnwindOutcome {
            phase: emergency.phase,
            is_emergency_open: emergency.is_emergency_open,
            slippage_bps: emergency.current_slippage_bps,
            attempted: report.attempted,
            closed: report.closed,
            remaining,
        };
        *state = staged;

        if remaining == 0 {
            info!("Emergency unwind completed after {} attempt(s)", attempt);
        } else {
            warn!(
                "Emergency unwind partial: {} position(s) open, slippage now {} bps",
                remaining, outcome.slippage_bps
            );
        }
        Ok(outcome)
    }

    /// Sweep the pool's balance of a non-underlying asset to the admin
    pub async fn emergency_withdraw(&self, caller: &AccountId, asset: &AssetId) -> Result<u128> {
        let accounts = self.config.accounts.clone();
        self.ensure_caller(caller, &accounts.admin, "admin")?;
        if asset == self.underlying() {
            return Err(VaultError::Validation(format!(
                "{} is the underlying asset and cannot be withdrawn",
                asset
            )));
        }

        let amount = self
            .transact(|state, now| {
                let amount = state.book.balance(&accounts.pool, asset);
                if amount == 0 {
                    return Err(VaultError::ZeroAmount);
                }
                state.book.transfer(&accounts.pool, &accounts.admin, asset, amount)?;
                state.emit(
                    VaultEvent::EmergencyWithdrawal {
                        admin: accounts.admin.clone(),
                        asset: asset.clone(),
                        amount,
                    },
                    EventMetadata::triggered_by(caller),
                    now,
                );
                Ok(amount)
            })
            .await?;

        warn!("Emergency withdrawal: {} {} to {}", amount, asset, accounts.admin);
        Ok(amount)
    }

    // ==================== Administration ====================

    /// Pay accrued performance fees out to the admin
    pub async fn collect_fees(&self, caller: &AccountId) -> Result<u128> {
        let accounts = self.config.accounts.clone();
        self.ensure_caller(caller, &accounts.admin, "admin")?;
        let underlying = self.underlying().clone();

        let fees = self
            .transact(|state, now| {
                let fees = state.pool.ledger.accrued_performance_fee_assets;
                if fees == 0 {
                    return Err(VaultError::ZeroAmount);
                }
                state
                    .book
                    .transfer(&accounts.pool, &accounts.admin, &underlying, fees)
                    .map_err(as_reserve_shortfall)?;
                state.pool.take_accrued_fees();
                state.emit(
                    VaultEvent::FeesCollected {
                        admin: accounts.admin.clone(),
                        assets: fees,
                    },
                    EventMetadata::triggered_by(caller),
                    now,
                );
                Ok(fees)
            })
            .await?;

        info!("Collected {} {} in performance fees", fees, self.underlying());
        Ok(fees)
    }

    /// Book a transfer into `account` that happened outside the engine
    pub async fn record_inflow(&self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let signed = i128::try_from(amount)
            .map_err(|_| VaultError::ArithmeticOverflow("inflow exceeds i128"))?;

        self.transact(|state, now| {
            state.book.credit(account, asset, amount)?;
            state.emit(
                VaultEvent::ExternalTransfer {
                    account: account.clone(),
                    asset: asset.clone(),
                    amount: signed,
                },
                EventMetadata::default(),
                now,
            );
            Ok(())
        })
        .await?;

        debug!("Inflow booked: {} {} to {}", amount, asset, account);
        Ok(())
    }

    /// Book a transfer out of `account` that happened outside the engine
    pub async fn record_outflow(&self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let signed = i128::try_from(amount)
            .map_err(|_| VaultError::ArithmeticOverflow("outflow exceeds i128"))?;

        self.transact(|state, now| {
            state.book.debit(account, asset, amount)?;
            state.emit(
                VaultEvent::ExternalTransfer {
                    account: account.clone(),
                    asset: asset.clone(),
                    amount: -signed,
                },
                EventMetadata::default(),
                now,
            );
            Ok(())
        })
        .await?;

        debug!("Outflow booked: {} {} from {}", amount, asset, account);
        Ok(())
    }

    // ==================== Checkpoints ====================

    pub async fn checkpoint(&self) -> Result<Checkpoint> {
        let state = self.state.read().await;
        Checkpoint::capture(&*state, self.clock.now())
    }

    pub async fn restore_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        checkpoint.restore_into(&mut staged)?;
        *state = staged;
        Ok(())
    }

    // ==================== Queries ====================

    pub async fn current_round(&self) -> u64 {
        self.state.read().await.current_round()
    }

    pub async fn balance_of(&self, account: &AccountId, asset: &AssetId) -> u128 {
        self.state.read().await.book.balance(account, asset)
    }

    pub async fn share_balance(&self, account: &AccountId) -> u128 {
        self.state.read().await.pool.share_balance(account)
    }

    pub async fn participant(&self, account: &AccountId) -> Option<ParticipantRecord> {
        self.state.read().await.pool.record(account).cloned()
    }

    pub async fn emergency_state(&self) -> EmergencyState {
        self.state.read().await.emergency.clone()
    }

    pub async fn events(&self) -> Vec<StoredEvent> {
        self.state.read().await.events.events().to_vec()
    }

    pub async fn events_since(&self, seq: u64) -> Vec<StoredEvent> {
        self.state.read().await.events.events_since(seq).to_vec()
    }

    /// Full copy of the state, for invariant checks and inspection
    pub async fn state(&self) -> VaultState {
        self.state.read().await.clone()
    }

    pub async fn snapshot(&self) -> VaultSnapshot {
        let state = self.state.read().await;
        let ledger = &state.pool.ledger;
        VaultSnapshot {
            round: ledger.current_round(),
            lead_round: state.lead.current_round,
            total_share_supply: ledger.total_share_supply,
            custody_shares: ledger.custody_shares,
            pending_deposit_assets: ledger.pending_deposit_assets(),
            pending_withdraw_shares: ledger.pending_withdraw_shares(),
            processed_withdraw_assets: ledger.processed_withdraw_assets,
            accrued_performance_fee_assets: ledger.accrued_performance_fee_assets,
            latest_price_per_share: ledger.latest_price_per_share(),
            pool_underlying: state
                .book
                .balance(&self.config.accounts.pool, self.underlying()),
            lead_underlying: state
                .book
                .balance(&self.config.accounts.lead_account, self.underlying()),
            emergency_phase: state.emergency.phase,
            is_emergency_open: state.emergency.is_emergency_open,
            current_slippage_bps: state.emergency.current_slippage_bps,
            event_count: state.events.len(),
        }
    }
}
