//! SquadRun - Weekly Squad Goals and Scoring
//!
//! Running squads share a weekly distance goal and a points pool. Members
//! log runs during the week and see live progress; after the week ends a
//! closeout job finalizes the goal, applies points, advances member streaks
//! and records per-member result logs.

pub mod closeout;
pub mod squads;
pub mod storage;

// Re-export commonly used types
pub use closeout::{CloseoutOrchestrator, CloseoutReport, CloseoutScheduler, WeekMode};
pub use squads::{GoalManager, ScoringPolicy, SquadManager};
pub use storage::{AppConfig, Database};
