//! Weekly closeout orchestrator.
//!
//! Finalizes one week for every squad: scores the goal, applies points,
//! advances member streaks and writes the per-member result logs. Each
//! squad is an independent unit committed in its own `BEGIN IMMEDIATE`
//! transaction, so a failure or timeout rolls back that squad only and the
//! batch moves on. Re-running a week is a no-op for squads already closed.
//!
//! Weeks of one squad always close in calendar order: older open weeks are
//! closed before the target week, so streaks advance in the order the weeks
//! happened regardless of the order runs are triggered in.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, InterruptHandle, TransactionBehavior};
use uuid::Uuid;

use super::types::{CloseoutError, CloseoutReport, SquadCloseout, SquadOutcome, WeekMode};
use crate::squads::distance::DistanceAggregator;
use crate::squads::scoring::ScoringPolicy;
use crate::squads::streaks::MemberStreak;
use crate::squads::types::WeeklyResultLog;
use crate::squads::week::{week_before, WeekWindow};
use crate::storage::{Database, DatabaseError, SquadStore};

/// Default upper bound on closing out a single squad.
pub const DEFAULT_SQUAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs weekly closeouts against a shared database.
pub struct CloseoutOrchestrator {
    db: Arc<Mutex<Database>>,
    policy: ScoringPolicy,
    squad_timeout: Duration,
    interrupt: InterruptHandle,
    /// True while a closeout unit owns the connection. The unit clears it
    /// before releasing the database, so holding this lock pins the owner.
    unit_running: Arc<Mutex<bool>>,
}

impl CloseoutOrchestrator {
    /// Create an orchestrator over a shared database handle.
    pub fn new(db: Arc<Mutex<Database>>, policy: ScoringPolicy) -> Result<Self, CloseoutError> {
        let interrupt = lock(&db)?.interrupt_handle();
        Ok(Self {
            db,
            policy,
            squad_timeout: DEFAULT_SQUAD_TIMEOUT,
            interrupt,
            unit_running: Arc::new(Mutex::new(false)),
        })
    }

    /// Set the per-squad time budget.
    pub fn with_squad_timeout(mut self, timeout: Duration) -> Self {
        self.squad_timeout = timeout;
        self
    }

    /// Close out the week selected by `mode` for every squad.
    ///
    /// Errors only when the squad list cannot be read. Per-squad failures
    /// are logged and collected in the report.
    pub async fn run_closeout(
        &self,
        mode: WeekMode,
        now: DateTime<Utc>,
    ) -> Result<CloseoutReport, CloseoutError> {
        let week_start = mode.target_week(now);
        let squad_ids = {
            let db = lock(&self.db)?;
            SquadStore::new(db.connection()).list_squad_ids()?
        };

        tracing::info!(
            %week_start,
            %mode,
            squads = squad_ids.len(),
            "Starting weekly closeout"
        );

        let mut report = CloseoutReport::new(mode, week_start);
        for squad_id in squad_ids {
            let result = self.close_squad(squad_id, week_start, now).await.map(|closeout| {
                for (week, outcome) in &closeout.backfilled {
                    tracing::info!(%squad_id, %week, ?outcome, "Closed earlier open week first");
                    report.record_backfill(outcome);
                }
                closeout.outcome
            });
            match &result {
                Ok(outcome) => {
                    tracing::debug!(%squad_id, %week_start, ?outcome, "Squad closeout finished");
                }
                Err(e) => {
                    tracing::error!(
                        %squad_id,
                        %week_start,
                        error = %e,
                        transient = e.is_transient(),
                        "Squad closeout failed, rolled back"
                    );
                }
            }
            report.record(squad_id, &result);
        }

        if report.is_success() {
            tracing::info!(%report, "Weekly closeout complete");
        } else {
            tracing::warn!(%report, "Weekly closeout completed with failures");
        }
        Ok(report)
    }

    /// Close out one squad on the blocking pool, bounded by the squad timeout.
    async fn close_squad(
        &self,
        squad_id: Uuid,
        week_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<SquadCloseout, CloseoutError> {
        let db = Arc::clone(&self.db);
        let policy = self.policy.clone();
        let running = Arc::clone(&self.unit_running);
        let deadline = Instant::now() + self.squad_timeout;

        let mut task = tokio::task::spawn_blocking(move || {
            let mut guard = lock(&db)?;
            if Instant::now() >= deadline {
                return Err(CloseoutError::SquadTimeout(squad_id));
            }
            set_running(&running, true);
            let result = close_out_squad_through(
                guard.connection_mut(),
                squad_id,
                week_start,
                &policy,
                now,
                Some(deadline),
            );
            set_running(&running, false);
            result
        });

        match tokio::time::timeout(self.squad_timeout, &mut task).await {
            Ok(joined) => joined.map_err(|e| CloseoutError::TaskFailed(e.to_string()))?,
            Err(_) => {
                self.interrupt_running_unit(squad_id);
                // Let the unit finish or roll back before the next squad takes the lock
                let joined = task.await.map_err(|e| CloseoutError::TaskFailed(e.to_string()))?;
                settle_over_budget(squad_id, joined)
            }
        }
    }

    /// Interrupt the connection, but only while a closeout unit owns it.
    ///
    /// The unit clears the flag under the same lock before it releases the
    /// database, so no other connection user can be interrupted here.
    fn interrupt_running_unit(&self, squad_id: Uuid) -> bool {
        let running = self.unit_running.lock().unwrap_or_else(PoisonError::into_inner);
        if *running {
            tracing::warn!(%squad_id, "Squad closeout over budget, interrupting");
            self.interrupt.interrupt();
        }
        *running
    }
}

/// Final result of a unit that outlived its budget.
///
/// Work the unit managed to commit is kept. An interrupted unit was rolled
/// back and counts as a timeout.
fn settle_over_budget(
    squad_id: Uuid,
    result: Result<SquadCloseout, CloseoutError>,
) -> Result<SquadCloseout, CloseoutError> {
    match result {
        Ok(closeout) => {
            tracing::warn!(%squad_id, "Squad closeout committed after its budget");
            Ok(closeout)
        }
        Err(CloseoutError::Database(DatabaseError::Interrupted)) => {
            Err(CloseoutError::SquadTimeout(squad_id))
        }
        Err(e) => Err(e),
    }
}

fn set_running(flag: &Mutex<bool>, value: bool) {
    *flag.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

fn lock(db: &Mutex<Database>) -> Result<MutexGuard<'_, Database>, CloseoutError> {
    db.lock().map_err(|_| CloseoutError::LockPoisoned)
}

/// Close out one squad up to `week_start`.
///
/// Older weeks that still have an open goal are closed first, oldest
/// first, each in its own transaction. Weeks already committed stay closed
/// if a later one fails.
pub fn close_out_squad_through(
    conn: &mut Connection,
    squad_id: Uuid,
    week_start: NaiveDate,
    policy: &ScoringPolicy,
    now: DateTime<Utc>,
    deadline: Option<Instant>,
) -> Result<SquadCloseout, CloseoutError> {
    let earlier = SquadStore::new(conn).open_goal_weeks_before(&squad_id, week_start)?;

    let mut backfilled = Vec::with_capacity(earlier.len());
    for week in earlier {
        let outcome = close_out_squad(conn, squad_id, week, policy, now, deadline)?;
        backfilled.push((week, outcome));
    }

    let outcome = close_out_squad(conn, squad_id, week_start, policy, now, deadline)?;
    Ok(SquadCloseout { backfilled, outcome })
}

/// Close out one squad's week in a single immediate transaction.
///
/// Refuses with [`CloseoutError::EarlierWeekOpen`] while an older week of
/// the squad is still open.
///
/// Nothing is written unless every step succeeds. When `deadline` has
/// passed by the time the work is done, the transaction is rolled back and
/// [`CloseoutError::SquadTimeout`] is returned.
pub fn close_out_squad(
    conn: &mut Connection,
    squad_id: Uuid,
    week_start: NaiveDate,
    policy: &ScoringPolicy,
    now: DateTime<Utc>,
    deadline: Option<Instant>,
) -> Result<SquadOutcome, CloseoutError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let store = SquadStore::new(&tx);

    let goal = match store.get_goal(&squad_id, week_start)? {
        Some(goal) => goal,
        None => return Ok(SquadOutcome::NoGoal),
    };
    if goal.closed_out {
        return Ok(SquadOutcome::AlreadyClosed);
    }
    if let Some(open) = store.open_goal_weeks_before(&squad_id, week_start)?.first() {
        return Err(CloseoutError::EarlierWeekOpen {
            squad_id,
            week_start: *open,
        });
    }

    let window = WeekWindow::for_week(week_start);
    let total_km = DistanceAggregator::new(&tx).total_distance(&squad_id, &window)?;
    let target_previous = store
        .get_goal(&squad_id, week_before(week_start))?
        .map(|g| g.target_distance_km)
        .unwrap_or(0.0);

    let score = policy.score_week(goal.target_distance_km, target_previous, total_km);
    let (points_delta, achieved) = score.map(|s| (s.points_delta, s.achieved)).unwrap_or((0, false));

    if !store.close_goal(&squad_id, week_start, total_km, achieved, points_delta, now)? {
        return Err(CloseoutError::ConcurrentModification { squad_id, week_start });
    }

    let outcome = match score {
        None => {
            tracing::info!(%squad_id, %week_start, total_km, "Week closed without a target, not scored");
            SquadOutcome::ClosedUnscored
        }
        Some(score) => {
            let adjusted = if policy.allow_negative_balance {
                store.adjust_squad_points(&squad_id, score.points_delta)?
            } else {
                store.adjust_squad_points_floored(&squad_id, score.points_delta)?
            };
            let balance = adjusted.ok_or(CloseoutError::SquadNotFound(squad_id))?;

            let members = store.members_of(&squad_id)?;
            for member_id in &members {
                let mut streak = store
                    .get_streak(&squad_id, member_id)?
                    .unwrap_or_else(|| MemberStreak::new(squad_id, *member_id));
                streak.record(score.achieved);
                store.upsert_streak(&streak)?;

                store.upsert_result_log(&WeeklyResultLog {
                    member_id: *member_id,
                    squad_id,
                    week_start,
                    points_change: score.points_delta,
                    recorded_at: now,
                })?;
            }

            tracing::info!(
                %squad_id,
                %week_start,
                target_km = goal.target_distance_km,
                target_previous_km = target_previous,
                total_km,
                achieved = score.achieved,
                points_delta = score.points_delta,
                balance,
                members = members.len(),
                "Squad week closed"
            );

            SquadOutcome::Closed {
                points_delta: score.points_delta,
                achieved: score.achieved,
                members: members.len(),
            }
        }
    };

    if deadline.is_some_and(|d| Instant::now() >= d) {
        return Err(CloseoutError::SquadTimeout(squad_id));
    }

    tx.commit()?;
    Ok(outcome)
}
