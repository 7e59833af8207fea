// Cycle orchestration and the polling loop that drives it
pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{CycleOutcome, CycleState, Orchestrator, ORDER_TAG};
pub use scheduler::{delay_until_boundary, Scheduler, SchedulerStats};
