//! Squad domain types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::units::DistanceUnit;
use crate::storage::DatabaseError;

/// A group of members sharing a weekly distance goal and a points pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Squad {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub is_private: bool,
    /// Squad-level pot. May be negative.
    pub total_points: i64,
    pub created_at: DateTime<Utc>,
}

impl Squad {
    /// Create a new squad owned by `owner_id`.
    pub fn new(name: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            owner_id,
            is_private: false,
            total_points: 0,
            created_at: Utc::now(),
        }
    }
}

/// A logged run, already normalized to kilometers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub id: Uuid,
    pub member_id: Uuid,
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub unit_entered: DistanceUnit,
    pub recorded_at: DateTime<Utc>,
}

impl RunEntry {
    /// Build a run from a distance in any unit.
    pub fn new(
        member_id: Uuid,
        distance: f64,
        unit: DistanceUnit,
        duration_minutes: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, SquadError> {
        Ok(Self {
            id: Uuid::new_v4(),
            member_id,
            distance_km: unit.to_km(distance)?,
            duration_minutes,
            unit_entered: unit,
            recorded_at,
        })
    }
}

/// Per-squad, per-week distance target and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyGoal {
    pub squad_id: Uuid,
    pub week_start: NaiveDate,
    pub target_distance_km: f64,
    pub unit_entered: DistanceUnit,
    /// Live snapshot until the week is closed, authoritative afterwards.
    pub total_distance_km: f64,
    /// Provisional until the week is closed.
    pub achieved: bool,
    /// Only meaningful once closed.
    pub points_awarded: i64,
    /// Write-once. A closed goal is never modified again.
    pub closed_out: bool,
    pub closed_at: Option<DateTime<Utc>>,
}

impl WeeklyGoal {
    /// A goal row with no target set.
    pub fn empty(squad_id: Uuid, week_start: NaiveDate) -> Self {
        Self {
            squad_id,
            week_start,
            target_distance_km: 0.0,
            unit_entered: DistanceUnit::Kilometers,
            total_distance_km: 0.0,
            achieved: false,
            points_awarded: 0,
            closed_out: false,
            closed_at: None,
        }
    }

    /// Whether a target has been set.
    pub fn has_target(&self) -> bool {
        self.target_distance_km > 0.0
    }

    /// Live-view achievement: a zero target is never achieved.
    pub fn provisional_achieved(&self, total_km: f64) -> bool {
        self.has_target() && total_km >= self.target_distance_km
    }

    /// Target expressed in the unit it was entered in.
    pub fn target_in_entered_unit(&self) -> f64 {
        self.unit_entered.from_km(self.target_distance_km)
    }

    /// Fraction of the target covered so far, 0 when no target is set.
    pub fn progress_ratio(&self) -> f64 {
        if self.has_target() {
            self.total_distance_km / self.target_distance_km
        } else {
            0.0
        }
    }
}

/// Audit record of the points a closeout applied, per member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyResultLog {
    pub member_id: Uuid,
    pub squad_id: Uuid,
    pub week_start: NaiveDate,
    pub points_change: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Squad errors.
#[derive(Debug, thiserror::Error)]
pub enum SquadError {
    #[error("Squad not found: {0}")]
    NotFound(Uuid),

    #[error("Member {member} is not in squad {squad}")]
    NotMember { squad: Uuid, member: Uuid },

    #[error("Goal for squad {squad}, week {week_start} is already closed")]
    AlreadyClosed { squad: Uuid, week_start: NaiveDate },

    #[error("Invalid distance: {0}")]
    InvalidDistance(f64),

    #[error("Squad name already taken: {0}")]
    DuplicateName(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for SquadError {
    fn from(err: rusqlite::Error) -> Self {
        SquadError::Database(DatabaseError::from(err))
    }
}
