//! Squads module.
//!
//! Squad goals, weekly windows and scoring:
//! - ISO week windows (Monday 00:00 UTC)
//! - Distance normalization and aggregation
//! - Weekly goals with live progress
//! - Scoring policy and member streaks
//! - Read models for summaries and standings

pub mod distance;
pub mod goals;
pub mod manager;
pub mod scoring;
pub mod streaks;
pub mod summary;
pub mod types;
pub mod units;
pub mod week;

// Re-exports for convenience
pub use distance::DistanceAggregator;
pub use goals::GoalManager;
pub use manager::SquadManager;
pub use scoring::{Score, ScoringPolicy, ZeroTargetPolicy};
pub use streaks::MemberStreak;
pub use summary::{squad_standings, weekly_summary, MemberStanding, SquadWeekSummary};
pub use types::{RunEntry, Squad, SquadError, WeeklyGoal, WeeklyResultLog};
pub use units::DistanceUnit;
pub use week::WeekWindow;
