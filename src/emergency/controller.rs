use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::math::BPS_DENOMINATOR;
use crate::domain::{AccountId, EmergencyPhase, PositionDelta, ProtocolId, UnwindResult};
use crate::error::{Result, VaultError};
use crate::exchange::AdapterGateway;

/// Engine-level emergency settings, already converted to basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyParams {
    pub period_secs: u64,
    pub default_slippage_bps: u32,
    pub slippage_step_bps: u32,
}

impl Default for EmergencyParams {
    fn default() -> Self {
        Self {
            period_secs: 15 * 3600,
            default_slippage_bps: 150,
            slippage_step_bps: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyState {
    pub phase: EmergencyPhase,
    pub is_emergency_open: bool,
    pub current_slippage_bps: u32,
    /// Unix seconds of the last settlement (or engine start)
    pub last_round_timestamp: i64,
    pub attempts: u32,
}

impl EmergencyState {
    pub fn new(default_slippage_bps: u32, started_at: i64) -> Self {
        Self {
            phase: EmergencyPhase::Normal,
            is_emergency_open: false,
            current_slippage_bps: default_slippage_bps,
            last_round_timestamp: started_at,
            attempts: 0,
        }
    }

    /// Unwind is only available once rounds have stalled past the emergency period
    pub fn ensure_due(&self, now_ts: i64, period_secs: u64) -> Result<()> {
        let elapsed_secs = now_ts - self.last_round_timestamp;
        if elapsed_secs > period_secs as i64 {
            Ok(())
        } else {
            Err(VaultError::TooEarly {
                elapsed_secs,
                period_secs,
            })
        }
    }

    pub fn record_round(&mut self, now_ts: i64) {
        self.last_round_timestamp = now_ts;
    }

    /// Fold one attempt's result into the state machine
    pub fn apply(&mut self, result: UnwindResult, params: &EmergencyParams) -> Result<()> {
        let next = result.next_phase();
        if !self.phase.can_transition_to(next) {
            return Err(VaultError::InvalidState(format!(
                "emergency phase {} cannot move to {}",
                self.phase, next
            )));
        }

        self.attempts += 1;
        match result {
            UnwindResult::FullyClosed => {
                self.is_emergency_open = false;
                self.current_slippage_bps = params.default_slippage_bps;
                self.attempts = 0;
            }
            UnwindResult::PartiallyClosed { .. } => {
                self.is_emergency_open = true;
                self.current_slippage_bps = self
                    .current_slippage_bps
                    .saturating_add(params.slippage_step_bps)
                    .min(BPS_DENOMINATOR);
            }
        }
        self.phase = next;
        Ok(())
    }
}

/// What one sweep over the venues achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindReport {
    pub attempted: usize,
    pub closed: usize,
    /// Collateral returned by successful closes, to be booked to the pool
    pub deltas: Vec<PositionDelta>,
    pub result: UnwindResult,
}

/// Try to close every open position `account` holds across `adapters`.
///
/// Fails only if the initial position query fails, before anything was sent to a venue.
/// After that, rejected closes and unconfirmed re-queries are reported as a partial result.
pub async fn unwind_positions(
    adapters: &[(ProtocolId, Arc<dyn AdapterGateway>)],
    account: &AccountId,
    slippage_bps: u32,
) -> Result<UnwindReport> {
    let mut open = Vec::with_capacity(adapters.len());
    for (protocol, adapter) in adapters {
        let positions = adapter.open_positions(account).await.map_err(|e| {
            VaultError::AdapterOperationFailed {
                side: crate::domain::ExecutionSide::Pool,
                protocol: *protocol,
                reason: format!("position query failed: {}", e),
            }
        })?;
        let positions: Vec<_> = positions.into_iter().filter(|p| p.is_open()).collect();
        open.push((*protocol, adapter.clone(), positions));
    }

    let mut attempted = 0;
    let mut closed = 0;
    let mut deltas = Vec::new();
    for (protocol, adapter, positions) in &open {
        for position in positions {
            attempted += 1;
            match adapter.close_position(account, position, slippage_bps).await {
                Ok(report) if report.success => {
                    closed += 1;
                    deltas.extend(report.deltas);
                }
                Ok(report) => warn!(
                    "Close of {} on protocol {} rejected at {} bps: {}",
                    position.market,
                    protocol,
                    slippage_bps,
                    report.message.unwrap_or_default()
                ),
                Err(e) => warn!(
                    "Close of {} on protocol {} failed: {}",
                    position.market, protocol, e
                ),
            }
        }
    }

    // Completion is what the venues report afterwards, not what the closes claimed
    let mut remaining = 0;
    for (protocol, adapter, positions) in &open {
        match adapter.open_positions(account).await {
            Ok(now_open) => remaining += now_open.iter().filter(|p| p.is_open()).count(),
            Err(e) => {
                warn!("Could not confirm closes on protocol {}: {}", protocol, e);
                remaining += positions.len().max(1);
            }
        }
    }

    let result = if remaining == 0 {
        UnwindResult::FullyClosed
    } else {
        UnwindResult::PartiallyClosed { remaining }
    };
    info!(
        "Unwind sweep: attempted={} closed={} remaining={}",
        attempted, closed, remaining
    );

    Ok(UnwindReport {
        attempted,
        closed,
        deltas,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TradeInstruction, PRECISION};
    use crate::exchange::PaperAdapter;

    fn params() -> EmergencyParams {
        EmergencyParams {
            period_secs: 100,
            default_slippage_bps: 150,
            slippage_step_bps: 100,
        }
    }

    #[test]
    fn test_gate_is_strictly_after_period() {
        let state = EmergencyState::new(150, 1_000);
        assert!(matches!(
            state.ensure_due(1_100, 100),
            Err(VaultError::TooEarly {
                elapsed_secs: 100,
                period_secs: 100
            })
        ));
        assert!(state.ensure_due(1_101, 100).is_ok());
    }

    #[test]
    fn test_partial_escalates_and_full_resets() {
        let mut state = EmergencyState::new(150, 0);

        state
            .apply(UnwindResult::PartiallyClosed { remaining: 1 }, &params())
            .unwrap();
        assert!(state.is_emergency_open);
        assert_eq!(state.phase, EmergencyPhase::UnwindAttempted);
        assert_eq!(state.current_slippage_bps, 250);

        state
            .apply(UnwindResult::PartiallyClosed { remaining: 1 }, &params())
            .unwrap();
        assert_eq!(state.current_slippage_bps, 350);
        assert_eq!(state.attempts, 2);

        state.apply(UnwindResult::FullyClosed, &params()).unwrap();
        assert!(!state.is_emergency_open);
        assert_eq!(state.phase, EmergencyPhase::Normal);
        assert_eq!(state.current_slippage_bps, 150);
    }

    #[test]
    fn test_slippage_saturates_at_full_range() {
        let mut state = EmergencyState::new(9_950, 0);
        state
            .apply(UnwindResult::PartiallyClosed { remaining: 1 }, &params())
            .unwrap();
        assert_eq!(state.current_slippage_bps, 10_000);
    }

    #[tokio::test]
    async fn test_unwind_sweep_reports_partial() {
        let pool = AccountId::new("pool");
        let venue = Arc::new(PaperAdapter::new("paper"));
        for market in ["ETH-PERP", "BTC-PERP"] {
            let instruction = TradeInstruction::increase(market, "USDC".into(), 10);
            venue.execute(&pool, &instruction, PRECISION).await.unwrap();
        }
        venue.set_required_slippage("BTC-PERP", 500).await;

        let adapters: Vec<(ProtocolId, Arc<dyn AdapterGateway>)> = vec![(1, venue.clone())];
        let report = unwind_positions(&adapters, &pool, 150).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.closed, 1);
        assert_eq!(report.result, UnwindResult::PartiallyClosed { remaining: 1 });
        assert_eq!(report.deltas, vec![PositionDelta::credit("USDC".into(), 10)]);
    }
}
