//! Shared fixtures: a fixed calendar around the week of 2024-03-04.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use squadrun::squads::{DistanceUnit, GoalManager, SquadManager};
use squadrun::storage::Database;
use uuid::Uuid;

/// Monday of the week being closed out.
pub fn week() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

/// Wednesday of the week before [`week`].
pub fn prior_wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 28, 9, 0, 0).unwrap()
}

/// Wednesday inside [`week`].
pub fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 6, 18, 30, 0).unwrap()
}

/// Shortly after the Monday boundary ending [`week`].
pub fn closeout_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 11, 0, 1, 0).unwrap()
}

pub struct SquadFixture {
    pub squad_id: Uuid,
    pub owner: Uuid,
    pub members: Vec<Uuid>,
}

/// A squad with `extra_members` members besides the owner.
pub fn squad(db: &Database, name: &str, extra_members: usize) -> SquadFixture {
    let owner = Uuid::new_v4();
    let manager = SquadManager::new(db.connection());
    let squad = manager.create_squad(name, None, owner, false).unwrap();
    let mut members = vec![owner];
    for _ in 0..extra_members {
        let member = Uuid::new_v4();
        manager.add_member(squad.id, member, prior_wednesday()).unwrap();
        members.push(member);
    }
    SquadFixture {
        squad_id: squad.id,
        owner,
        members,
    }
}

/// Set a kilometer target for the week containing `at`.
pub fn set_target(db: &Database, fixture: &SquadFixture, km: f64, at: DateTime<Utc>) {
    GoalManager::new(db.connection())
        .set_target(fixture.squad_id, fixture.owner, km, DistanceUnit::Kilometers, at)
        .unwrap();
}

/// Log a run in kilometers.
pub fn log_km(db: &Database, member: Uuid, km: f64, at: DateTime<Utc>) {
    SquadManager::new(db.connection())
        .log_run(member, km, DistanceUnit::Kilometers, km * 6.0, at)
        .unwrap();
}
