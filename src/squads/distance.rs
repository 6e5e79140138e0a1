//! Squad distance aggregation.

use rusqlite::Connection;
use uuid::Uuid;

use super::week::WeekWindow;
use crate::storage::{DatabaseError, SquadStore};

/// Sums the distance a squad's current members ran in a week.
pub struct DistanceAggregator<'a> {
    store: SquadStore<'a>,
}

impl<'a> DistanceAggregator<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            store: SquadStore::new(conn),
        }
    }

    /// Total kilometers logged inside `window` by anyone currently in the
    /// squad. Former members no longer count, even for runs logged while
    /// they were in the squad.
    pub fn total_distance(&self, squad_id: &Uuid, window: &WeekWindow) -> Result<f64, DatabaseError> {
        let total = self.store.squad_distance_km(squad_id, window)?;
        tracing::trace!(%squad_id, week = %window.week_start(), total_km = total, "Aggregated squad distance");
        Ok(total)
    }

    /// Per-member kilometers inside `window`, in join order, including
    /// members with no runs.
    pub fn member_distances(
        &self,
        squad_id: &Uuid,
        window: &WeekWindow,
    ) -> Result<Vec<(Uuid, f64)>, DatabaseError> {
        let members = self.store.members_of(squad_id)?;
        let mut totals = Vec::with_capacity(members.len());
        for member in members {
            let km: f64 = self
                .store
                .runs_for(&[member], window)?
                .into_iter()
                .map(|(distance_km, _)| distance_km)
                .sum();
            totals.push((member, km));
        }
        Ok(totals)
    }
}
