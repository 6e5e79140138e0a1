//! Squad data storage operations.
//!
//! Provides persistence for:
//! - Squads and their point balances
//! - Live squad membership
//! - Run logs
//! - Weekly goals
//! - Member streaks
//! - Weekly result logs
//!
//! The store borrows a connection, so it works the same on a plain
//! connection and inside a transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use crate::squads::streaks::MemberStreak;
use crate::squads::types::{RunEntry, Squad, WeeklyGoal, WeeklyResultLog};
use crate::squads::units::DistanceUnit;
use crate::squads::week::WeekWindow;
use crate::storage::database::{
    format_date, format_timestamp, parse_date, parse_timestamp, DatabaseError,
};

const GOAL_COLUMNS: &str = "squad_id, week_start, target_distance_km, unit_entered,
    total_distance_km, achieved, points_awarded, closed_out, closed_at";

/// Store for squad, goal and closeout records.
pub struct SquadStore<'a> {
    conn: &'a Connection,
}

impl<'a> SquadStore<'a> {
    /// Create a new squad store with the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ========== Squad Operations ==========

    /// Insert a new squad.
    pub fn insert_squad(&self, squad: &Squad) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO squads (id, name, description, owner_id, is_private, total_points, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                squad.id.to_string(),
                squad.name,
                squad.description,
                squad.owner_id.to_string(),
                squad.is_private,
                squad.total_points,
                format_timestamp(squad.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get a squad by ID.
    pub fn get_squad(&self, squad_id: &Uuid) -> Result<Option<Squad>, DatabaseError> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, name, description, owner_id, is_private, total_points, created_at
                 FROM squads WHERE id = ?1",
                params![squad_id.to_string()],
                SquadRow::from_row,
            )
            .optional()?;

        raw.map(SquadRow::into_squad).transpose()
    }

    /// Whether a squad with this name exists.
    pub fn squad_name_exists(&self, name: &str) -> Result<bool, DatabaseError> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM squads WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// IDs of every squad, oldest first.
    pub fn list_squad_ids(&self) -> Result<Vec<Uuid>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM squads ORDER BY created_at ASC, rowid ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(parse_uuid(&row?)?);
        }
        Ok(ids)
    }

    /// Squads the member currently belongs to.
    pub fn squads_for_member(&self, member_id: &Uuid) -> Result<Vec<Squad>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.name, s.description, s.owner_id, s.is_private, s.total_points, s.created_at
             FROM squads s JOIN squad_members m ON m.squad_id = s.id
             WHERE m.member_id = ?1
             ORDER BY m.joined_at ASC, s.name ASC",
        )?;
        let rows = stmt.query_map(params![member_id.to_string()], SquadRow::from_row)?;

        let mut squads = Vec::new();
        for row in rows {
            squads.push(row?.into_squad()?);
        }
        Ok(squads)
    }

    /// Delete a squad and, by cascade, its goals, streaks and result logs.
    pub fn delete_squad(&self, squad_id: &Uuid) -> Result<bool, DatabaseError> {
        let deleted = self
            .conn
            .execute("DELETE FROM squads WHERE id = ?1", params![squad_id.to_string()])?;
        Ok(deleted > 0)
    }

    /// Current point balance, `None` if the squad does not exist.
    pub fn squad_points(&self, squad_id: &Uuid) -> Result<Option<i64>, DatabaseError> {
        let points = self
            .conn
            .query_row(
                "SELECT total_points FROM squads WHERE id = ?1",
                params![squad_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(points)
    }

    /// Atomically add `delta` to a squad balance and return the new balance.
    ///
    /// The increment happens inside SQLite, so concurrent writers (closeout
    /// credits, shop debits) never overwrite each other. Returns `None` if
    /// the squad does not exist.
    pub fn adjust_squad_points(
        &self,
        squad_id: &Uuid,
        delta: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let balance = self
            .conn
            .query_row(
                "UPDATE squads SET total_points = total_points + ?2 WHERE id = ?1
                 RETURNING total_points",
                params![squad_id.to_string(), delta],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance)
    }

    /// Like [`adjust_squad_points`](Self::adjust_squad_points), but a
    /// deduction never takes the balance below zero.
    ///
    /// A balance that is already negative is left where it is.
    pub fn adjust_squad_points_floored(
        &self,
        squad_id: &Uuid,
        delta: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let balance = self
            .conn
            .query_row(
                "UPDATE squads
                 SET total_points = MAX(total_points + ?2, MIN(total_points, 0))
                 WHERE id = ?1
                 RETURNING total_points",
                params![squad_id.to_string(), delta],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance)
    }

    // ========== Membership Operations ==========

    /// Add a member. Returns false if they were already in the squad.
    pub fn add_member(
        &self,
        squad_id: &Uuid,
        member_id: &Uuid,
        joined_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO squad_members (squad_id, member_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![
                squad_id.to_string(),
                member_id.to_string(),
                format_timestamp(joined_at)
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Remove a member. Their past result logs and streak row are kept.
    pub fn remove_member(&self, squad_id: &Uuid, member_id: &Uuid) -> Result<bool, DatabaseError> {
        let removed = self.conn.execute(
            "DELETE FROM squad_members WHERE squad_id = ?1 AND member_id = ?2",
            params![squad_id.to_string(), member_id.to_string()],
        )?;
        Ok(removed > 0)
    }

    /// Current members, in join order.
    pub fn members_of(&self, squad_id: &Uuid) -> Result<Vec<Uuid>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT member_id FROM squad_members WHERE squad_id = ?1
             ORDER BY joined_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![squad_id.to_string()], |row| row.get::<_, String>(0))?;

        let mut members = Vec::new();
        for row in rows {
            members.push(parse_uuid(&row?)?);
        }
        Ok(members)
    }

    /// Whether the member currently belongs to the squad.
    pub fn is_member(&self, squad_id: &Uuid, member_id: &Uuid) -> Result<bool, DatabaseError> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM squad_members WHERE squad_id = ?1 AND member_id = ?2)",
            params![squad_id.to_string(), member_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // ========== Run Operations ==========

    /// Insert a run.
    pub fn insert_run(&self, run: &RunEntry) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO runs (id, member_id, distance_km, duration_minutes, unit_entered, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.id.to_string(),
                run.member_id.to_string(),
                run.distance_km,
                run.duration_minutes,
                run.unit_entered.as_str(),
                format_timestamp(run.recorded_at),
            ],
        )?;
        Ok(())
    }

    /// Distances and timestamps of runs by any of `member_ids` inside the
    /// window.
    pub fn runs_for(
        &self,
        member_ids: &[Uuid],
        window: &WeekWindow,
    ) -> Result<Vec<(f64, DateTime<Utc>)>, DatabaseError> {
        if member_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..member_ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT distance_km, recorded_at FROM runs
             WHERE recorded_at >= ?1 AND recorded_at < ?2 AND member_id IN ({placeholders})
             ORDER BY recorded_at ASC"
        );

        let mut values = vec![format_timestamp(window.start), format_timestamp(window.end)];
        values.extend(member_ids.iter().map(Uuid::to_string));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (distance_km, recorded_at) = row?;
            runs.push((distance_km, parse_timestamp(&recorded_at)?));
        }
        Ok(runs)
    }

    /// Sum of run distances by current squad members inside the window.
    pub fn squad_distance_km(
        &self,
        squad_id: &Uuid,
        window: &WeekWindow,
    ) -> Result<f64, DatabaseError> {
        let total = self.conn.query_row(
            "SELECT COALESCE(SUM(r.distance_km), 0.0)
             FROM runs r JOIN squad_members m ON m.member_id = r.member_id
             WHERE m.squad_id = ?1 AND r.recorded_at >= ?2 AND r.recorded_at < ?3",
            params![
                squad_id.to_string(),
                format_timestamp(window.start),
                format_timestamp(window.end),
            ],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // ========== Weekly Goal Operations ==========

    /// Get the goal row for a squad week, creating an empty one if missing.
    pub fn ensure_goal(
        &self,
        squad_id: &Uuid,
        week_start: NaiveDate,
    ) -> Result<WeeklyGoal, DatabaseError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO weekly_goals (squad_id, week_start) VALUES (?1, ?2)",
            params![squad_id.to_string(), format_date(week_start)],
        )?;

        self.get_goal(squad_id, week_start)?.ok_or_else(|| {
            DatabaseError::InvalidData(format!(
                "goal for squad {squad_id}, week {week_start} vanished after insert"
            ))
        })
    }

    /// Get the goal row for a squad week.
    pub fn get_goal(
        &self,
        squad_id: &Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyGoal>, DatabaseError> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {GOAL_COLUMNS} FROM weekly_goals WHERE squad_id = ?1 AND week_start = ?2"
                ),
                params![squad_id.to_string(), format_date(week_start)],
                GoalRow::from_row,
            )
            .optional()?;

        raw.map(GoalRow::into_goal).transpose()
    }

    /// Goal rows of a squad, most recent week first.
    pub fn goals_for_squad(&self, squad_id: &Uuid) -> Result<Vec<WeeklyGoal>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {GOAL_COLUMNS} FROM weekly_goals WHERE squad_id = ?1 ORDER BY week_start DESC"
        ))?;
        let rows = stmt.query_map(params![squad_id.to_string()], GoalRow::from_row)?;

        let mut goals = Vec::new();
        for row in rows {
            goals.push(row?.into_goal()?);
        }
        Ok(goals)
    }

    /// Overwrite the target of an open goal. Returns false if the goal is
    /// closed or missing.
    pub fn set_goal_target(
        &self,
        squad_id: &Uuid,
        week_start: NaiveDate,
        target_km: f64,
        unit: DistanceUnit,
    ) -> Result<bool, DatabaseError> {
        let updated = self.conn.execute(
            "UPDATE weekly_goals SET target_distance_km = ?3, unit_entered = ?4
             WHERE squad_id = ?1 AND week_start = ?2 AND closed_out = 0",
            params![
                squad_id.to_string(),
                format_date(week_start),
                target_km,
                unit.as_str()
            ],
        )?;
        Ok(updated > 0)
    }

    /// Store a live progress snapshot on an open goal. Returns false if the
    /// goal is closed or missing.
    pub fn update_live_progress(
        &self,
        squad_id: &Uuid,
        week_start: NaiveDate,
        total_km: f64,
        achieved: bool,
    ) -> Result<bool, DatabaseError> {
        let updated = self.conn.execute(
            "UPDATE weekly_goals SET total_distance_km = ?3, achieved = ?4
             WHERE squad_id = ?1 AND week_start = ?2 AND closed_out = 0",
            params![squad_id.to_string(), format_date(week_start), total_km, achieved],
        )?;
        Ok(updated > 0)
    }

    /// Finalize a goal. Returns false if it was already closed or missing,
    /// in which case nothing was written.
    pub fn close_goal(
        &self,
        squad_id: &Uuid,
        week_start: NaiveDate,
        total_km: f64,
        achieved: bool,
        points_awarded: i64,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let updated = self.conn.execute(
            "UPDATE weekly_goals
             SET total_distance_km = ?3, achieved = ?4, points_awarded = ?5,
                 closed_out = 1, closed_at = ?6
             WHERE squad_id = ?1 AND week_start = ?2 AND closed_out = 0",
            params![
                squad_id.to_string(),
                format_date(week_start),
                total_km,
                achieved,
                points_awarded,
                format_timestamp(closed_at),
            ],
        )?;
        Ok(updated > 0)
    }

    /// Weeks before `week_start` whose goal is still open, oldest first.
    pub fn open_goal_weeks_before(
        &self,
        squad_id: &Uuid,
        week_start: NaiveDate,
    ) -> Result<Vec<NaiveDate>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT week_start FROM weekly_goals
             WHERE squad_id = ?1 AND week_start < ?2 AND closed_out = 0
             ORDER BY week_start ASC",
        )?;
        let rows = stmt.query_map(
            params![squad_id.to_string(), format_date(week_start)],
            |row| row.get::<_, String>(0),
        )?;

        let mut weeks = Vec::new();
        for row in rows {
            weeks.push(parse_date(&row?)?);
        }
        Ok(weeks)
    }

    // ========== Streak Operations ==========

    /// Get the streak row for a squad member.
    pub fn get_streak(
        &self,
        squad_id: &Uuid,
        member_id: &Uuid,
    ) -> Result<Option<MemberStreak>, DatabaseError> {
        let raw = self
            .conn
            .query_row(
                "SELECT squad_id, member_id, current_streak, longest_streak, last_week_achieved
                 FROM member_streaks WHERE squad_id = ?1 AND member_id = ?2",
                params![squad_id.to_string(), member_id.to_string()],
                StreakRow::from_row,
            )
            .optional()?;

        raw.map(StreakRow::into_streak).transpose()
    }

    /// All streak rows of a squad.
    pub fn streaks_for_squad(&self, squad_id: &Uuid) -> Result<Vec<MemberStreak>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT squad_id, member_id, current_streak, longest_streak, last_week_achieved
             FROM member_streaks WHERE squad_id = ?1",
        )?;
        let rows = stmt.query_map(params![squad_id.to_string()], StreakRow::from_row)?;

        let mut streaks = Vec::new();
        for row in rows {
            streaks.push(row?.into_streak()?);
        }
        Ok(streaks)
    }

    /// Insert or replace a streak row.
    pub fn upsert_streak(&self, streak: &MemberStreak) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO member_streaks
                 (squad_id, member_id, current_streak, longest_streak, last_week_achieved)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(squad_id, member_id) DO UPDATE SET
                 current_streak = excluded.current_streak,
                 longest_streak = excluded.longest_streak,
                 last_week_achieved = excluded.last_week_achieved",
            params![
                streak.squad_id.to_string(),
                streak.member_id.to_string(),
                streak.current_streak,
                streak.longest_streak,
                streak.last_week_achieved,
            ],
        )?;
        Ok(())
    }

    // ========== Result Log Operations ==========

    /// Insert a result log, or overwrite the points of an existing one with
    /// the same key.
    pub fn upsert_result_log(&self, log: &WeeklyResultLog) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO weekly_result_logs (member_id, squad_id, week_start, points_change, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(member_id, squad_id, week_start) DO UPDATE SET
                 points_change = excluded.points_change",
            params![
                log.member_id.to_string(),
                log.squad_id.to_string(),
                format_date(log.week_start),
                log.points_change,
                format_timestamp(log.recorded_at),
            ],
        )?;
        Ok(())
    }

    /// Get the result log of one member for one squad week.
    pub fn get_result_log(
        &self,
        member_id: &Uuid,
        squad_id: &Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyResultLog>, DatabaseError> {
        let raw = self
            .conn
            .query_row(
                "SELECT member_id, squad_id, week_start, points_change, recorded_at
                 FROM weekly_result_logs
                 WHERE member_id = ?1 AND squad_id = ?2 AND week_start = ?3",
                params![member_id.to_string(), squad_id.to_string(), format_date(week_start)],
                ResultLogRow::from_row,
            )
            .optional()?;

        raw.map(ResultLogRow::into_log).transpose()
    }

    /// Result logs written for a squad week.
    pub fn result_logs_for_week(
        &self,
        squad_id: &Uuid,
        week_start: NaiveDate,
    ) -> Result<Vec<WeeklyResultLog>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT member_id, squad_id, week_start, points_change, recorded_at
             FROM weekly_result_logs WHERE squad_id = ?1 AND week_start = ?2
             ORDER BY member_id ASC",
        )?;
        let rows = stmt.query_map(
            params![squad_id.to_string(), format_date(week_start)],
            ResultLogRow::from_row,
        )?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?.into_log()?);
        }
        Ok(logs)
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::InvalidData(format!("id '{value}': {e}")))
}

/// Helper struct for squad row data.
struct SquadRow {
    id: String,
    name: String,
    description: Option<String>,
    owner_id: String,
    is_private: bool,
    total_points: i64,
    created_at: String,
}

impl SquadRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            owner_id: row.get(3)?,
            is_private: row.get(4)?,
            total_points: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_squad(self) -> Result<Squad, DatabaseError> {
        Ok(Squad {
            id: parse_uuid(&self.id)?,
            name: self.name,
            description: self.description,
            owner_id: parse_uuid(&self.owner_id)?,
            is_private: self.is_private,
            total_points: self.total_points,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Helper struct for goal row data.
struct GoalRow {
    squad_id: String,
    week_start: String,
    target_distance_km: f64,
    unit_entered: String,
    total_distance_km: f64,
    achieved: bool,
    points_awarded: i64,
    closed_out: bool,
    closed_at: Option<String>,
}

impl GoalRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            squad_id: row.get(0)?,
            week_start: row.get(1)?,
            target_distance_km: row.get(2)?,
            unit_entered: row.get(3)?,
            total_distance_km: row.get(4)?,
            achieved: row.get(5)?,
            points_awarded: row.get(6)?,
            closed_out: row.get(7)?,
            closed_at: row.get(8)?,
        })
    }

    fn into_goal(self) -> Result<WeeklyGoal, DatabaseError> {
        let unit_entered = DistanceUnit::parse(&self.unit_entered).ok_or_else(|| {
            DatabaseError::InvalidData(format!("distance unit '{}'", self.unit_entered))
        })?;

        Ok(WeeklyGoal {
            squad_id: parse_uuid(&self.squad_id)?,
            week_start: parse_date(&self.week_start)?,
            target_distance_km: self.target_distance_km,
            unit_entered,
            total_distance_km: self.total_distance_km,
            achieved: self.achieved,
            points_awarded: self.points_awarded,
            closed_out: self.closed_out,
            closed_at: self.closed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// Helper struct for streak row data.
struct StreakRow {
    squad_id: String,
    member_id: String,
    current_streak: u32,
    longest_streak: u32,
    last_week_achieved: bool,
}

impl StreakRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            squad_id: row.get(0)?,
            member_id: row.get(1)?,
            current_streak: row.get(2)?,
            longest_streak: row.get(3)?,
            last_week_achieved: row.get(4)?,
        })
    }

    fn into_streak(self) -> Result<MemberStreak, DatabaseError> {
        Ok(MemberStreak {
            squad_id: parse_uuid(&self.squad_id)?,
            member_id: parse_uuid(&self.member_id)?,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_week_achieved: self.last_week_achieved,
        })
    }
}

/// Helper struct for result log row data.
struct ResultLogRow {
    member_id: String,
    squad_id: String,
    week_start: String,
    points_change: i64,
    recorded_at: String,
}

impl ResultLogRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            member_id: row.get(0)?,
            squad_id: row.get(1)?,
            week_start: row.get(2)?,
            points_change: row.get(3)?,
            recorded_at: row.get(4)?,
        })
    }

    fn into_log(self) -> Result<WeeklyResultLog, DatabaseError> {
        Ok(WeeklyResultLog {
            member_id: parse_uuid(&self.member_id)?,
            squad_id: parse_uuid(&self.squad_id)?,
            week_start: parse_date(&self.week_start)?,
            points_change: self.points_change,
            recorded_at: parse_timestamp(&self.recorded_at)?,
        })
    }
}
