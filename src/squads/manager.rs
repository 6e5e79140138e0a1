//! Squad roster management.
//!
//! Provides squad creation, membership and run logging. These are the thin
//! collaborators the closeout engine reads from.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::types::{RunEntry, Squad, SquadError};
use super::units::DistanceUnit;
use crate::storage::SquadStore;

/// Squad manager.
pub struct SquadManager<'a> {
    conn: &'a Connection,
}

impl<'a> SquadManager<'a> {
    /// Create a new squad manager.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new squad. The owner joins it immediately.
    pub fn create_squad(
        &self,
        name: &str,
        description: Option<String>,
        owner_id: Uuid,
        is_private: bool,
    ) -> Result<Squad, SquadError> {
        let tx = self.conn.unchecked_transaction()?;
        let store = SquadStore::new(&tx);

        if store.squad_name_exists(name)? {
            return Err(SquadError::DuplicateName(name.to_string()));
        }

        let mut squad = Squad::new(name, owner_id);
        squad.description = description;
        squad.is_private = is_private;

        store.insert_squad(&squad)?;
        store.add_member(&squad.id, &owner_id, squad.created_at)?;
        tx.commit()?;

        tracing::info!(squad_id = %squad.id, name, "Squad created");
        Ok(squad)
    }

    /// Get a squad by ID.
    pub fn get_squad(&self, squad_id: Uuid) -> Result<Squad, SquadError> {
        SquadStore::new(self.conn)
            .get_squad(&squad_id)?
            .ok_or(SquadError::NotFound(squad_id))
    }

    /// Add a member to a squad.
    pub fn add_member(&self, squad_id: Uuid, member_id: Uuid, now: DateTime<Utc>) -> Result<bool, SquadError> {
        let store = SquadStore::new(self.conn);
        if store.get_squad(&squad_id)?.is_none() {
            return Err(SquadError::NotFound(squad_id));
        }
        let added = store.add_member(&squad_id, &member_id, now)?;
        if added {
            tracing::debug!(%squad_id, %member_id, "Member joined squad");
        }
        Ok(added)
    }

    /// Remove a member from a squad.
    ///
    /// Their runs stop counting toward the squad from now on. Weeks that
    /// are already closed keep their recorded totals.
    pub fn remove_member(&self, squad_id: Uuid, member_id: Uuid) -> Result<(), SquadError> {
        if !SquadStore::new(self.conn).remove_member(&squad_id, &member_id)? {
            return Err(SquadError::NotMember {
                squad: squad_id,
                member: member_id,
            });
        }
        tracing::debug!(%squad_id, %member_id, "Member left squad");
        Ok(())
    }

    /// Current members, in join order.
    pub fn members(&self, squad_id: Uuid) -> Result<Vec<Uuid>, SquadError> {
        Ok(SquadStore::new(self.conn).members_of(&squad_id)?)
    }

    /// Delete a squad along with its goals, streaks and result logs.
    pub fn delete_squad(&self, squad_id: Uuid) -> Result<(), SquadError> {
        if !SquadStore::new(self.conn).delete_squad(&squad_id)? {
            return Err(SquadError::NotFound(squad_id));
        }
        tracing::info!(%squad_id, "Squad deleted");
        Ok(())
    }

    /// Record a run, normalizing the distance to kilometers.
    pub fn log_run(
        &self,
        member_id: Uuid,
        distance: f64,
        unit: DistanceUnit,
        duration_minutes: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<RunEntry, SquadError> {
        let run = RunEntry::new(member_id, distance, unit, duration_minutes, recorded_at)?;
        SquadStore::new(self.conn).insert_run(&run)?;
        tracing::debug!(%member_id, distance_km = run.distance_km, "Run logged");
        Ok(run)
    }
}
