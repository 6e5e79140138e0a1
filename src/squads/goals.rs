//! Weekly goal management.
//!
//! Two paths touch the same goal row: the live view, which any member can
//! refresh at any time during the week, and closeout, which finalizes it.
//! Every write here is guarded on `closed_out = 0`, so once closeout has
//! run the row can no longer change from this side.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::distance::DistanceAggregator;
use super::types::{SquadError, WeeklyGoal};
use super::units::DistanceUnit;
use super::week::{current_week_start, previous_week_start, WeekWindow};
use crate::storage::SquadStore;

/// Manager for squad weekly goals.
pub struct GoalManager<'a> {
    conn: &'a Connection,
}

impl<'a> GoalManager<'a> {
    /// Create a new goal manager with a database connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Get the goal for a squad week, creating an empty one if needed.
    ///
    /// This is the only place goal rows come into existence.
    pub fn ensure_goal(&self, squad_id: Uuid, week_start: NaiveDate) -> Result<WeeklyGoal, SquadError> {
        let store = SquadStore::new(self.conn);
        if store.get_squad(&squad_id)?.is_none() {
            return Err(SquadError::NotFound(squad_id));
        }
        Ok(store.ensure_goal(&squad_id, week_start)?)
    }

    /// Set or replace this week's target.
    ///
    /// Only the current week can be changed; closed weeks are rejected.
    pub fn set_target(
        &self,
        squad_id: Uuid,
        member_id: Uuid,
        distance: f64,
        unit: DistanceUnit,
        now: DateTime<Utc>,
    ) -> Result<WeeklyGoal, SquadError> {
        let target_km = unit.to_km(distance)?;
        let week_start = current_week_start(now);

        let tx = self.conn.unchecked_transaction()?;
        let store = SquadStore::new(&tx);
        self.require_member(&store, squad_id, member_id)?;

        store.ensure_goal(&squad_id, week_start)?;
        if !store.set_goal_target(&squad_id, week_start, target_km, unit)? {
            return Err(SquadError::AlreadyClosed {
                squad: squad_id,
                week_start,
            });
        }
        let goal = store.ensure_goal(&squad_id, week_start)?;
        tx.commit()?;

        tracing::info!(
            %squad_id,
            %member_id,
            %week_start,
            target_km,
            unit = %unit,
            "Squad weekly target set"
        );
        Ok(goal)
    }

    /// Refresh and return this week's progress.
    ///
    /// Recomputes the squad total for the current week and stores it with a
    /// provisional achieved flag. If the week has already been closed the
    /// closed record is returned untouched.
    pub fn live_view(
        &self,
        squad_id: Uuid,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<WeeklyGoal, SquadError> {
        let week_start = current_week_start(now);
        let window = WeekWindow::for_week(week_start);

        let tx = self.conn.unchecked_transaction()?;
        let store = SquadStore::new(&tx);
        self.require_member(&store, squad_id, member_id)?;

        let total_km = DistanceAggregator::new(&tx).total_distance(&squad_id, &window)?;
        let goal = store.ensure_goal(&squad_id, week_start)?;
        let achieved = goal.provisional_achieved(total_km);

        if !store.update_live_progress(&squad_id, week_start, total_km, achieved)? {
            tracing::debug!(%squad_id, %week_start, "Live view on a closed week, snapshot not stored");
        }
        let goal = store.ensure_goal(&squad_id, week_start)?;
        tx.commit()?;

        Ok(goal)
    }

    /// Last week's goal, or an empty zero-target goal if none was recorded.
    pub fn previous_goal(
        &self,
        squad_id: Uuid,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<WeeklyGoal, SquadError> {
        let store = SquadStore::new(self.conn);
        self.require_member(&store, squad_id, member_id)?;

        let week_start = previous_week_start(now);
        Ok(store
            .get_goal(&squad_id, week_start)?
            .unwrap_or_else(|| WeeklyGoal::empty(squad_id, week_start)))
    }

    /// Goal history of a squad, most recent week first.
    pub fn history(&self, squad_id: Uuid) -> Result<Vec<WeeklyGoal>, SquadError> {
        Ok(SquadStore::new(self.conn).goals_for_squad(&squad_id)?)
    }

    fn require_member(
        &self,
        store: &SquadStore<'_>,
        squad_id: Uuid,
        member_id: Uuid,
    ) -> Result<(), SquadError> {
        if store.get_squad(&squad_id)?.is_none() {
            return Err(SquadError::NotFound(squad_id));
        }
        if !store.is_member(&squad_id, &member_id)? {
            return Err(SquadError::NotMember {
                squad: squad_id,
                member: member_id,
            });
        }
        Ok(())
    }
}
