//! Weekly closeout scenarios against an in-memory database.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use squadrun::closeout::{CloseoutOrchestrator, CloseoutReport, WeekMode};
use squadrun::squads::{ScoringPolicy, SquadManager, ZeroTargetPolicy};
use squadrun::storage::{Database, SquadStore};

use super::support::{
    closeout_time, log_km, prior_wednesday, set_target, squad, wednesday, week, SquadFixture,
};

async fn close_previous_week(db: &Arc<Mutex<Database>>, policy: ScoringPolicy) -> CloseoutReport {
    close(db, policy, WeekMode::Previous, closeout_time()).await
}

async fn close(
    db: &Arc<Mutex<Database>>,
    policy: ScoringPolicy,
    mode: WeekMode,
    now: DateTime<Utc>,
) -> CloseoutReport {
    CloseoutOrchestrator::new(Arc::clone(db), policy)
        .unwrap()
        .run_closeout(mode, now)
        .await
        .unwrap()
}

fn owner_streak(db: &Arc<Mutex<Database>>, fixture: &SquadFixture) -> (u32, bool) {
    let guard = db.lock().unwrap();
    let streak = SquadStore::new(guard.connection())
        .get_streak(&fixture.squad_id, &fixture.owner)
        .unwrap()
        .unwrap();
    (streak.current_streak, streak.last_week_achieved)
}

#[tokio::test]
async fn test_raised_target_met_awards_70_and_advances_streaks() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Canal Loopers", 2);
    set_target(&db, &fixture, 8.0, prior_wednesday());
    set_target(&db, &fixture, 10.0, wednesday());
    log_km(&db, fixture.members[0], 5.0, wednesday());
    log_km(&db, fixture.members[1], 4.0, wednesday());
    log_km(&db, fixture.members[2], 3.0, wednesday());
    let db = Arc::new(Mutex::new(db));

    // Last week: 8 km target, nothing logged
    let last_week = close(&db, ScoringPolicy::default(), WeekMode::Previous, wednesday()).await;
    assert_eq!(last_week.points_applied, -20);

    let report = close_previous_week(&db, ScoringPolicy::default()).await;
    assert_eq!(report.closed, 1);
    assert_eq!(report.backfilled, 0);
    assert_eq!(report.points_applied, 70);

    let guard = db.lock().unwrap();
    let store = SquadStore::new(guard.connection());
    let goal = store.get_goal(&fixture.squad_id, week()).unwrap().unwrap();
    assert!(goal.closed_out);
    assert!(goal.achieved);
    assert_eq!(goal.points_awarded, 70);
    assert!((goal.total_distance_km - 12.0).abs() < 1e-9);
    assert_eq!(store.squad_points(&fixture.squad_id).unwrap(), Some(-20 + 70));

    for member in &fixture.members {
        let streak = store.get_streak(&fixture.squad_id, member).unwrap().unwrap();
        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.longest_streak, 1);
        assert!(streak.last_week_achieved);
    }

    let logs = store.result_logs_for_week(&fixture.squad_id, week()).unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|log| log.points_change == 70));
}

#[tokio::test]
async fn test_same_target_met_awards_55() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Track Tuesdays", 0);
    set_target(&db, &fixture, 10.0, prior_wednesday());
    set_target(&db, &fixture, 10.0, wednesday());
    log_km(&db, fixture.owner, 10.0, wednesday());
    let db = Arc::new(Mutex::new(db));

    close(&db, ScoringPolicy::default(), WeekMode::Previous, wednesday()).await;
    let report = close_previous_week(&db, ScoringPolicy::default()).await;
    assert_eq!(report.closed, 1);
    assert_eq!(report.points_applied, 55);
}

#[tokio::test]
async fn test_missed_goal_deducts_20_and_resets_streaks() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Parkrun Regulars", 1);
    set_target(&db, &fixture, 10.0, wednesday());
    log_km(&db, fixture.owner, 4.0, wednesday());
    {
        let store = SquadStore::new(db.connection());
        let mut streak = squadrun::squads::MemberStreak::new(fixture.squad_id, fixture.owner);
        streak.record(true);
        streak.record(true);
        store.upsert_streak(&streak).unwrap();
    }
    let db = Arc::new(Mutex::new(db));

    let report = close_previous_week(&db, ScoringPolicy::default()).await;
    assert_eq!(report.points_applied, -20);

    let guard = db.lock().unwrap();
    let store = SquadStore::new(guard.connection());
    let goal = store.get_goal(&fixture.squad_id, week()).unwrap().unwrap();
    assert!(!goal.achieved);
    assert_eq!(goal.points_awarded, -20);
    assert_eq!(store.squad_points(&fixture.squad_id).unwrap(), Some(-20));

    let owner_streak = store.get_streak(&fixture.squad_id, &fixture.owner).unwrap().unwrap();
    assert_eq!(owner_streak.current_streak, 0);
    assert_eq!(owner_streak.longest_streak, 2);
    assert!(!owner_streak.last_week_achieved);

    let other = store.get_streak(&fixture.squad_id, &fixture.members[1]).unwrap().unwrap();
    assert_eq!(other.current_streak, 0);
    assert_eq!(other.longest_streak, 0);
}

#[tokio::test]
async fn test_squad_without_goal_is_untouched() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Lunch Break Runners", 1);
    log_km(&db, fixture.owner, 20.0, wednesday());
    let db = Arc::new(Mutex::new(db));

    let report = close_previous_week(&db, ScoringPolicy::default()).await;
    assert_eq!(report.skipped_no_goal, 1);
    assert_eq!(report.closed, 0);

    let guard = db.lock().unwrap();
    let store = SquadStore::new(guard.connection());
    assert!(store.get_goal(&fixture.squad_id, week()).unwrap().is_none());
    assert_eq!(store.squad_points(&fixture.squad_id).unwrap(), Some(0));
    assert!(store.streaks_for_squad(&fixture.squad_id).unwrap().is_empty());
    assert!(store.result_logs_for_week(&fixture.squad_id, week()).unwrap().is_empty());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Bridge to Bridge", 2);
    set_target(&db, &fixture, 6.0, wednesday());
    log_km(&db, fixture.owner, 7.0, wednesday());
    let db = Arc::new(Mutex::new(db));

    let first = close_previous_week(&db, ScoringPolicy::default()).await;
    let second = close_previous_week(&db, ScoringPolicy::default()).await;
    assert_eq!(first.closed, 1);
    assert_eq!(second.closed, 0);
    assert_eq!(second.skipped_closed, 1);
    assert_eq!(second.points_applied, 0);

    let guard = db.lock().unwrap();
    let store = SquadStore::new(guard.connection());
    assert_eq!(store.squad_points(&fixture.squad_id).unwrap(), Some(70));
    assert_eq!(store.result_logs_for_week(&fixture.squad_id, week()).unwrap().len(), 3);
    let streak = store.get_streak(&fixture.squad_id, &fixture.owner).unwrap().unwrap();
    assert_eq!(streak.current_streak, 1);
}

#[tokio::test]
async fn test_consecutive_weeks_build_streak() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Dawn Patrol", 0);
    set_target(&db, &fixture, 5.0, prior_wednesday());
    log_km(&db, fixture.owner, 6.0, prior_wednesday());
    set_target(&db, &fixture, 5.0, wednesday());
    log_km(&db, fixture.owner, 5.5, wednesday());
    let db = Arc::new(Mutex::new(db));

    let orchestrator = CloseoutOrchestrator::new(Arc::clone(&db), ScoringPolicy::default()).unwrap();
    // Catch up the older week first, then the most recent one
    orchestrator
        .run_closeout(WeekMode::Previous, wednesday())
        .await
        .unwrap();
    orchestrator
        .run_closeout(WeekMode::Previous, closeout_time())
        .await
        .unwrap();

    let guard = db.lock().unwrap();
    let store = SquadStore::new(guard.connection());
    let streak = store.get_streak(&fixture.squad_id, &fixture.owner).unwrap().unwrap();
    assert_eq!(streak.current_streak, 2);
    assert_eq!(streak.longest_streak, 2);
    // 5 km is a raise over no target (70), then flat (55)
    assert_eq!(store.squad_points(&fixture.squad_id).unwrap(), Some(125));
}

#[tokio::test]
async fn test_concurrent_debits_are_not_lost() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Harbour Sprinters", 0);
    set_target(&db, &fixture, 10.0, wednesday());
    log_km(&db, fixture.owner, 12.0, wednesday());
    let db = Arc::new(Mutex::new(db));

    let shop = {
        let db = Arc::clone(&db);
        let squad_id = fixture.squad_id;
        std::thread::spawn(move || {
            for _ in 0..25 {
                let guard = db.lock().unwrap();
                SquadStore::new(guard.connection())
                    .adjust_squad_points(&squad_id, -2)
                    .unwrap();
            }
        })
    };

    let report = close_previous_week(&db, ScoringPolicy::default()).await;
    shop.join().unwrap();
    assert_eq!(report.points_applied, 70);

    let guard = db.lock().unwrap();
    assert_eq!(
        SquadStore::new(guard.connection()).squad_points(&fixture.squad_id).unwrap(),
        Some(70 - 50)
    );
}

#[tokio::test]
async fn test_failing_squad_does_not_abort_batch() {
    let db = Database::open_in_memory().unwrap();
    let healthy = squad(&db, "Steady Eddies", 0);
    let broken = squad(&db, "Glitchy Gazelles", 0);
    set_target(&db, &healthy, 5.0, wednesday());
    set_target(&db, &broken, 5.0, wednesday());
    log_km(&db, healthy.owner, 5.0, wednesday());
    db.connection()
        .execute(
            "UPDATE weekly_goals SET unit_entered = 'furlongs' WHERE squad_id = ?1",
            [broken.squad_id.to_string()],
        )
        .unwrap();
    let db = Arc::new(Mutex::new(db));

    let report = close_previous_week(&db, ScoringPolicy::default()).await;
    assert!(!report.is_success());
    assert_eq!(report.closed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].squad_id, broken.squad_id);
    assert!(!report.failed[0].transient);

    let guard = db.lock().unwrap();
    let store = SquadStore::new(guard.connection());
    assert_eq!(store.squad_points(&healthy.squad_id).unwrap(), Some(70));
    assert_eq!(store.squad_points(&broken.squad_id).unwrap(), Some(0));
    assert!(store.streaks_for_squad(&broken.squad_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_departed_member_runs_do_not_count() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Ridge Runners", 1);
    set_target(&db, &fixture, 10.0, wednesday());
    log_km(&db, fixture.owner, 4.0, wednesday());
    log_km(&db, fixture.members[1], 8.0, wednesday());
    SquadManager::new(db.connection())
        .remove_member(fixture.squad_id, fixture.members[1])
        .unwrap();
    let db = Arc::new(Mutex::new(db));

    let report = close_previous_week(&db, ScoringPolicy::default()).await;
    assert_eq!(report.points_applied, -20);

    let guard = db.lock().unwrap();
    let store = SquadStore::new(guard.connection());
    let logs = store.result_logs_for_week(&fixture.squad_id, week()).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].member_id, fixture.owner);
}

#[tokio::test]
async fn test_zero_target_policies() {
    let cases = [
        (ZeroTargetPolicy::Penalize, Some(-20)),
        (ZeroTargetPolicy::Score, Some(55)),
        (ZeroTargetPolicy::Skip, None),
    ];

    for (zero_target, expected) in cases {
        let db = Database::open_in_memory().unwrap();
        let fixture = squad(&db, "No Plan Runners", 0);
        SquadStore::new(db.connection())
            .ensure_goal(&fixture.squad_id, week())
            .unwrap();
        log_km(&db, fixture.owner, 3.0, wednesday());
        let db = Arc::new(Mutex::new(db));

        let policy = ScoringPolicy {
            zero_target,
            ..Default::default()
        };
        let report = close_previous_week(&db, policy).await;

        let guard = db.lock().unwrap();
        let store = SquadStore::new(guard.connection());
        assert!(store.get_goal(&fixture.squad_id, week()).unwrap().unwrap().closed_out);
        match expected {
            Some(points) => {
                assert_eq!(report.closed, 1, "{zero_target:?}");
                assert_eq!(store.squad_points(&fixture.squad_id).unwrap(), Some(points));
            }
            None => {
                assert_eq!(report.closed_unscored, 1);
                assert_eq!(store.squad_points(&fixture.squad_id).unwrap(), Some(0));
                assert!(store.result_logs_for_week(&fixture.squad_id, week()).unwrap().is_empty());
            }
        }
    }
}

fn missed_then_met(db: &Database) -> SquadFixture {
    let fixture = squad(db, "Out Of Order Harriers", 0);
    set_target(db, &fixture, 10.0, prior_wednesday());
    log_km(db, fixture.owner, 2.0, prior_wednesday());
    set_target(db, &fixture, 5.0, wednesday());
    log_km(db, fixture.owner, 6.0, wednesday());
    fixture
}

#[tokio::test]
async fn test_closing_current_week_first_keeps_calendar_order() {
    let in_order = {
        let db = Database::open_in_memory().unwrap();
        let fixture = missed_then_met(&db);
        let db = Arc::new(Mutex::new(db));
        close(&db, ScoringPolicy::default(), WeekMode::Previous, wednesday()).await;
        close_previous_week(&db, ScoringPolicy::default()).await;
        owner_streak(&db, &fixture)
    };

    let db = Database::open_in_memory().unwrap();
    let fixture = missed_then_met(&db);
    let db = Arc::new(Mutex::new(db));

    // The overdue week is closed ahead of the current one
    let current = close(&db, ScoringPolicy::default(), WeekMode::Current, wednesday()).await;
    assert!(current.is_success());
    assert_eq!(current.backfilled, 1);
    assert_eq!(current.closed, 1);
    // Met a lowered target after the miss
    assert_eq!(current.points_applied, -20 + 55);

    let previous = close(&db, ScoringPolicy::default(), WeekMode::Previous, wednesday()).await;
    assert_eq!(previous.skipped_closed, 1);
    assert_eq!(previous.points_applied, 0);

    let reversed = owner_streak(&db, &fixture);
    assert_eq!(reversed, in_order);
    assert_eq!(reversed, (1, true));

    let guard = db.lock().unwrap();
    let store = SquadStore::new(guard.connection());
    assert_eq!(store.squad_points(&fixture.squad_id).unwrap(), Some(35));
    let streak = store.get_streak(&fixture.squad_id, &fixture.owner).unwrap().unwrap();
    assert_eq!(streak.longest_streak, 1);
}

#[tokio::test]
async fn test_scheduler_outage_closes_every_missed_week() {
    let db = Database::open_in_memory().unwrap();
    let fixture = squad(&db, "Back From Holiday", 0);
    let three_weeks_back = prior_wednesday() - chrono::Duration::days(7);
    set_target(&db, &fixture, 4.0, three_weeks_back);
    log_km(&db, fixture.owner, 5.0, three_weeks_back);
    set_target(&db, &fixture, 4.0, prior_wednesday());
    log_km(&db, fixture.owner, 4.5, prior_wednesday());
    set_target(&db, &fixture, 4.0, wednesday());
    log_km(&db, fixture.owner, 4.0, wednesday());
    let db = Arc::new(Mutex::new(db));

    let report = close_previous_week(&db, ScoringPolicy::default()).await;
    assert!(report.is_success());
    assert_eq!(report.backfilled, 2);
    assert_eq!(report.closed, 1);
    assert_eq!(report.points_applied, 70 + 55 + 55);
    assert_eq!(owner_streak(&db, &fixture), (3, true));
}
