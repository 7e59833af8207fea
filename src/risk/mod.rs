// Risk management module
pub mod sizing;

pub use sizing::{round_to_tick, PositionSizer, DEFAULT_CONTRACT_MULTIPLIER};
