//! Closeout module.
//!
//! Finalizes squad weeks:
//! - Per-squad closeout units with isolated failure
//! - Run reports for the scheduler and the CLI
//! - Weekly scheduling on the Monday boundary

pub mod orchestrator;
pub mod scheduler;
pub mod types;

// Re-exports for convenience
pub use orchestrator::{close_out_squad, close_out_squad_through, CloseoutOrchestrator};
pub use scheduler::{next_run_at, CloseoutScheduler};
pub use types::{CloseoutError, CloseoutReport, SquadCloseout, SquadFailure, SquadOutcome, WeekMode};
