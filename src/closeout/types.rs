//! Closeout type definitions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::squads::week::{current_week_start, previous_week_start};
use crate::storage::DatabaseError;

/// Which week a closeout run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekMode {
    /// The last completed week (normal weekly operation)
    #[default]
    Previous,
    /// The week in progress (manual testing only)
    Current,
}

impl WeekMode {
    /// Start of the targeted week relative to `now`.
    pub fn target_week(&self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            WeekMode::Previous => previous_week_start(now),
            WeekMode::Current => current_week_start(now),
        }
    }
}

impl std::fmt::Display for WeekMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeekMode::Previous => write!(f, "previous"),
            WeekMode::Current => write!(f, "current"),
        }
    }
}

/// What happened to one squad during a closeout run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SquadOutcome {
    /// Goal finalized, points applied, streaks and logs written
    Closed {
        points_delta: i64,
        achieved: bool,
        members: usize,
    },
    /// Goal finalized without scoring (no target, zero-target policy skip)
    ClosedUnscored,
    /// No goal row for the week
    NoGoal,
    /// Goal already finalized by an earlier run
    AlreadyClosed,
}

/// Result of closing one squad up to a target week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadCloseout {
    /// Older open weeks closed first, oldest first
    pub backfilled: Vec<(NaiveDate, SquadOutcome)>,
    /// Outcome for the target week
    pub outcome: SquadOutcome,
}

/// A squad whose closeout failed and was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadFailure {
    pub squad_id: Uuid,
    pub error: String,
    /// Whether the next run is expected to succeed
    pub transient: bool,
}

/// Summary of one closeout run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseoutReport {
    pub mode: WeekMode,
    pub week_start: NaiveDate,
    pub squads_seen: usize,
    pub closed: usize,
    pub closed_unscored: usize,
    pub skipped_no_goal: usize,
    pub skipped_closed: usize,
    /// Older open weeks closed ahead of the target week
    pub backfilled: usize,
    /// Sum of deltas applied across squads
    pub points_applied: i64,
    pub failed: Vec<SquadFailure>,
}

impl CloseoutReport {
    pub fn new(mode: WeekMode, week_start: NaiveDate) -> Self {
        Self {
            mode,
            week_start,
            squads_seen: 0,
            closed: 0,
            closed_unscored: 0,
            skipped_no_goal: 0,
            skipped_closed: 0,
            backfilled: 0,
            points_applied: 0,
            failed: Vec::new(),
        }
    }

    /// Tally one squad's result.
    pub fn record(&mut self, squad_id: Uuid, result: &Result<SquadOutcome, CloseoutError>) {
        self.squads_seen += 1;
        match result {
            Ok(SquadOutcome::Closed { points_delta, .. }) => {
                self.closed += 1;
                self.points_applied += points_delta;
            }
            Ok(SquadOutcome::ClosedUnscored) => self.closed_unscored += 1,
            Ok(SquadOutcome::NoGoal) => self.skipped_no_goal += 1,
            Ok(SquadOutcome::AlreadyClosed) => self.skipped_closed += 1,
            Err(e) => self.failed.push(SquadFailure {
                squad_id,
                error: e.to_string(),
                transient: e.is_transient(),
            }),
        }
    }

    /// Tally an older week closed ahead of the target week.
    pub fn record_backfill(&mut self, outcome: &SquadOutcome) {
        self.backfilled += 1;
        if let SquadOutcome::Closed { points_delta, .. } = outcome {
            self.points_applied += points_delta;
        }
    }

    /// True when no squad failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl std::fmt::Display for CloseoutReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "week {} ({}): {} squads, {} closed, {} closed unscored, {} without goal, {} already closed, {} earlier weeks backfilled, {} failed",
            self.week_start,
            self.mode,
            self.squads_seen,
            self.closed,
            self.closed_unscored,
            self.skipped_no_goal,
            self.skipped_closed,
            self.backfilled,
            self.failed.len()
        )
    }
}

/// Closeout errors.
#[derive(Debug, thiserror::Error)]
pub enum CloseoutError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Squad {0} disappeared during closeout")]
    SquadNotFound(Uuid),

    #[error("Closeout of squad {0} exceeded its time budget")]
    SquadTimeout(Uuid),

    #[error("Goal for squad {squad_id}, week {week_start} was modified concurrently")]
    ConcurrentModification { squad_id: Uuid, week_start: NaiveDate },

    #[error("Squad {squad_id} still has an open goal for week {week_start}")]
    EarlierWeekOpen { squad_id: Uuid, week_start: NaiveDate },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Closeout task failed: {0}")]
    TaskFailed(String),
}

impl CloseoutError {
    /// Whether the squad can be expected to close on the next run.
    pub fn is_transient(&self) -> bool {
        match self {
            CloseoutError::Database(e) => e.is_transient(),
            CloseoutError::SquadTimeout(_)
            | CloseoutError::ConcurrentModification { .. }
            | CloseoutError::EarlierWeekOpen { .. } => true,
            CloseoutError::SquadNotFound(_)
            | CloseoutError::LockPoisoned
            | CloseoutError::TaskFailed(_) => false,
        }
    }
}

impl From<rusqlite::Error> for CloseoutError {
    fn from(err: rusqlite::Error) -> Self {
        CloseoutError::Database(DatabaseError::from(err))
    }
}
