//! Emergency unwind
//!
//! When rounds stop advancing for longer than the emergency period, any allow-listed
//! investor may force the pool out of its venue positions. Each failed attempt widens the
//! slippage tolerance by one step; a fully closed book resets it.

mod controller;

pub use controller::{unwind_positions, EmergencyParams, EmergencyState, UnwindReport};
