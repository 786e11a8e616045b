pub mod clock;
pub mod math;
pub mod state;
pub mod types;

pub use clock::*;
pub use math::PRECISION;
pub use state::*;
pub use types::*;
