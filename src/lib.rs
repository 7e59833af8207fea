// Core modules
pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use config::BotConfig;
pub use models::*;
