// Signal generation: band breakout detection and session remapping
pub mod breakout;
pub mod session;

pub use breakout::{BreakoutDetector, VolatilityFilter, VolatilityMode};
pub use session::{FixedModePolicy, HourTablePolicy, SessionPolicy};
