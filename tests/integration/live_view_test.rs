//! Live progress and read models around a closeout.

use std::sync::{Arc, Mutex};

use chrono::Duration;
use squadrun::closeout::{CloseoutOrchestrator, WeekMode};
use squadrun::squads::{
    squad_standings, weekly_summary, DistanceUnit, GoalManager, ScoringPolicy, SquadError, SquadManager,
};
use squadrun::storage::{Database, SquadStore};

use super::support::{closeout_time, log_km, set_target, squad, wednesday, week};

#[tokio::test]
async fn test_live_view_never_touches_closed_week() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Riverside Milers", 0);
    set_target(&db, &fixture, 10.0, wednesday());
    log_km(&db, fixture.owner, 6.0, wednesday());

    let live = GoalManager::new(db.connection())
        .live_view(fixture.squad_id, fixture.owner, wednesday())
        .unwrap();
    assert!((live.total_distance_km - 6.0).abs() < 1e-9);
    assert!(!live.achieved);
    assert!(!live.closed_out);

    let db = Arc::new(Mutex::new(db));
    CloseoutOrchestrator::new(Arc::clone(&db), ScoringPolicy::default())
        .unwrap()
        .run_closeout(WeekMode::Current, wednesday())
        .await
        .unwrap();

    let guard = db.lock().unwrap();
    log_km(&guard, fixture.owner, 9.0, wednesday() + Duration::hours(2));
    let goals = GoalManager::new(guard.connection());
    let after = goals
        .live_view(fixture.squad_id, fixture.owner, wednesday() + Duration::hours(3))
        .unwrap();
    assert!(after.closed_out);
    assert!((after.total_distance_km - 6.0).abs() < 1e-9);
    assert!(!after.achieved);
    assert_eq!(after.points_awarded, -20);

    let rejected = goals.set_target(
        fixture.squad_id,
        fixture.owner,
        4.0,
        DistanceUnit::Kilometers,
        wednesday() + Duration::hours(4),
    );
    assert!(matches!(rejected, Err(SquadError::AlreadyClosed { .. })));
}

#[tokio::test]
async fn test_target_in_miles_survives_closeout() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Imperial Pacers", 0);
    GoalManager::new(db.connection())
        .set_target(fixture.squad_id, fixture.owner, 20.0, DistanceUnit::Miles, wednesday())
        .unwrap();
    let manager = SquadManager::new(db.connection());
    manager
        .log_run(fixture.owner, 12.0, DistanceUnit::Miles, 100.0, wednesday())
        .unwrap();
    manager
        .log_run(fixture.owner, 9.0, DistanceUnit::Miles, 80.0, wednesday() + Duration::days(1))
        .unwrap();
    let db = Arc::new(Mutex::new(db));

    let report = CloseoutOrchestrator::new(Arc::clone(&db), ScoringPolicy::default())
        .unwrap()
        .run_closeout(WeekMode::Previous, closeout_time())
        .await
        .unwrap();
    assert_eq!(report.points_applied, 70);

    let guard = db.lock().unwrap();
    let goal = SquadStore::new(guard.connection())
        .get_goal(&fixture.squad_id, week())
        .unwrap()
        .unwrap();
    assert_eq!(goal.unit_entered, DistanceUnit::Miles);
    assert!((goal.target_in_entered_unit() - 20.0).abs() < 1e-6);
    assert!(goal.achieved);
}

#[tokio::test]
async fn test_summary_reports_last_closeout_and_streaks() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Hill Seekers", 1);
    set_target(&db, &fixture, 5.0, wednesday());
    log_km(&db, fixture.members[1], 5.0, wednesday());
    let db = Arc::new(Mutex::new(db));

    CloseoutOrchestrator::new(Arc::clone(&db), ScoringPolicy::default())
        .unwrap()
        .run_closeout(WeekMode::Previous, closeout_time())
        .await
        .unwrap();

    let guard = db.lock().unwrap();
    let next_week = closeout_time() + Duration::days(1);
    let summary = weekly_summary(guard.connection(), fixture.owner, next_week).unwrap();
    assert_eq!(summary.len(), 1);
    let row = &summary[0];
    assert_eq!(row.squad_points, 70);
    assert_eq!(row.points_change_last_closeout, 70);
    assert_eq!(row.current_streak, 1);
    assert_eq!(row.target_distance_km, 0.0);
    assert!(!row.achieved);

    let standings = squad_standings(guard.connection(), fixture.squad_id).unwrap();
    assert_eq!(standings.len(), 2);
    assert!(standings.iter().all(|s| s.current_streak == 1 && s.last_week_achieved));
}
