use serde::{Deserialize, Serialize};
use std::fmt;

/// Emergency unwind state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmergencyPhase {
    /// Lead is advancing rounds; no unwind in progress
    Normal,
    /// At least one unwind attempt left positions open
    UnwindAttempted,
}

impl EmergencyPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyPhase::Normal => "NORMAL",
            EmergencyPhase::UnwindAttempted => "UNWIND_ATTEMPTED",
        }
    }

    /// Check if this phase can transition to another phase
    pub fn can_transition_to(&self, target: EmergencyPhase) -> bool {
        use EmergencyPhase::*;

        match (self, target) {
            // Timeout elapsed, first attempt was partial
            (Normal, UnwindAttempted) => true,
            // Timeout elapsed, first attempt closed everything
            (Normal, Normal) => true,
            // Retry after escalation, still partial
            (UnwindAttempted, UnwindAttempted) => true,
            // Fully closed
            (UnwindAttempted, Normal) => true,
        }
    }

    pub fn valid_transitions(&self) -> Vec<EmergencyPhase> {
        use EmergencyPhase::*;

        match self {
            Normal => vec![UnwindAttempted, Normal],
            UnwindAttempted => vec![UnwindAttempted, Normal],
        }
    }

    pub fn is_unwinding(&self) -> bool {
        matches!(self, EmergencyPhase::UnwindAttempted)
    }
}

impl fmt::Display for EmergencyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for EmergencyPhase {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "NORMAL" => Ok(EmergencyPhase::Normal),
            "UNWIND_ATTEMPTED" => Ok(EmergencyPhase::UnwindAttempted),
            _ => Err(format!("Unknown emergency phase: {}", s)),
        }
    }
}

/// Outcome of one unwind attempt, as decided by completion detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnwindResult {
    /// Every observed position reports zero size
    FullyClosed,
    /// Some positions remain open (or could not be confirmed closed)
    PartiallyClosed { remaining: usize },
}

impl UnwindResult {
    pub fn next_phase(&self) -> EmergencyPhase {
        match self {
            UnwindResult::FullyClosed => EmergencyPhase::Normal,
            UnwindResult::PartiallyClosed { .. } => EmergencyPhase::UnwindAttempted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use EmergencyPhase::*;

        assert!(Normal.can_transition_to(UnwindAttempted));
        assert!(UnwindAttempted.can_transition_to(UnwindAttempted));
        assert!(UnwindAttempted.can_transition_to(Normal));
        assert_eq!(Normal.valid_transitions().len(), 2);
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!(
            EmergencyPhase::try_from("normal").unwrap(),
            EmergencyPhase::Normal
        );
        assert_eq!(
            EmergencyPhase::try_from("UNWIND_ATTEMPTED").unwrap(),
            EmergencyPhase::UnwindAttempted
        );
        assert!(EmergencyPhase::try_from("HALTED").is_err());
    }

    #[test]
    fn test_unwind_result_next_phase() {
        assert_eq!(UnwindResult::FullyClosed.next_phase(), EmergencyPhase::Normal);
        assert_eq!(
            UnwindResult::PartiallyClosed { remaining: 2 }.next_phase(),
            EmergencyPhase::UnwindAttempted
        );
        assert!(EmergencyPhase::UnwindAttempted.is_unwinding());
    }
}
