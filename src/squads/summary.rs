//! Read models for the presentation layer.
//!
//! Every field has a defined value even when the underlying row does not
//! exist yet: a member with no streak row has a streak of 0, a squad with
//! no goal has a target of 0.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::distance::DistanceAggregator;
use super::streaks::MemberStreak;
use super::types::SquadError;
use super::week::{current_week_start, previous_week_start, WeekWindow};
use crate::storage::SquadStore;

/// One member's view of one squad for the current week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadWeekSummary {
    pub squad_id: Uuid,
    pub squad_name: String,
    pub week_start: NaiveDate,
    pub target_distance_km: f64,
    pub progress_km: f64,
    pub achieved: bool,
    pub squad_points: i64,
    /// Points applied by the most recent closeout (last week), 0 if none
    pub points_change_last_closeout: i64,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// A member's row on a squad's streak board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStanding {
    pub member_id: Uuid,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_week_achieved: bool,
}

impl MemberStanding {
    fn from_streak(member_id: Uuid, streak: Option<&MemberStreak>) -> Self {
        match streak {
            Some(s) => Self {
                member_id,
                current_streak: s.current_streak,
                longest_streak: s.longest_streak,
                last_week_achieved: s.last_week_achieved,
            },
            None => Self {
                member_id,
                current_streak: 0,
                longest_streak: 0,
                last_week_achieved: false,
            },
        }
    }
}

/// Weekly summary across every squad the member belongs to.
///
/// Read-only: progress is computed on the fly and nothing is persisted.
pub fn weekly_summary(
    conn: &Connection,
    member_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<SquadWeekSummary>, SquadError> {
    let store = SquadStore::new(conn);
    let aggregator = DistanceAggregator::new(conn);
    let week_start = current_week_start(now);
    let window = WeekWindow::for_week(week_start);
    let last_week = previous_week_start(now);

    let mut summaries = Vec::new();
    for squad in store.squads_for_member(&member_id)? {
        let goal = store.get_goal(&squad.id, week_start)?;
        let streak = store.get_streak(&squad.id, &member_id)?;
        let last_result = store.get_result_log(&member_id, &squad.id, last_week)?;

        let (target_distance_km, progress_km, achieved) = match goal {
            Some(goal) if goal.closed_out => (goal.target_distance_km, goal.total_distance_km, goal.achieved),
            Some(goal) => {
                let progress = aggregator.total_distance(&squad.id, &window)?;
                (goal.target_distance_km, progress, goal.provisional_achieved(progress))
            }
            None => (0.0, aggregator.total_distance(&squad.id, &window)?, false),
        };

        let standing = MemberStanding::from_streak(member_id, streak.as_ref());
        summaries.push(SquadWeekSummary {
            squad_id: squad.id,
            squad_name: squad.name,
            week_start,
            target_distance_km,
            progress_km,
            achieved,
            squad_points: squad.total_points,
            points_change_last_closeout: last_result.map(|r| r.points_change).unwrap_or(0),
            current_streak: standing.current_streak,
            longest_streak: standing.longest_streak,
        });
    }

    Ok(summaries)
}

/// Streak board of a squad: every current member, best current streak first.
pub fn squad_standings(conn: &Connection, squad_id: Uuid) -> Result<Vec<MemberStanding>, SquadError> {
    let store = SquadStore::new(conn);
    if store.get_squad(&squad_id)?.is_none() {
        return Err(SquadError::NotFound(squad_id));
    }

    let streaks = store.streaks_for_squad(&squad_id)?;
    let mut standings: Vec<MemberStanding> = store
        .members_of(&squad_id)?
        .into_iter()
        .map(|member| {
            let streak = streaks.iter().find(|s| s.member_id == member);
            MemberStanding::from_streak(member, streak)
        })
        .collect();

    // Stable sort keeps join order for ties
    standings.sort_by(|a, b| {
        b.current_streak
            .cmp(&a.current_streak)
            .then(b.longest_streak.cmp(&a.longest_streak))
    });
    Ok(standings)
}
