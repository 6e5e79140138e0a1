//! Closeout against a file-backed database shared by several connections.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use squadrun::closeout::{CloseoutOrchestrator, WeekMode};
use squadrun::squads::ScoringPolicy;
use squadrun::storage::{Database, SquadStore};
use tempfile::tempdir;

use super::support::{closeout_time, log_km, set_target, squad, wednesday, week};

#[tokio::test]
async fn test_locked_database_fails_transiently_then_recovers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("squadrun.db");

    let writer = Database::open(&path, Duration::from_secs(1)).unwrap();
    let fixture = squad(&writer, "Shared File Striders", 0);
    set_target(&writer, &fixture, 5.0, wednesday());
    log_km(&writer, fixture.owner, 6.0, wednesday());

    let closer = Database::open(&path, Duration::from_millis(50)).unwrap();
    let closer = Arc::new(Mutex::new(closer));
    let orchestrator = CloseoutOrchestrator::new(Arc::clone(&closer), ScoringPolicy::default()).unwrap();

    // Another process holds the write lock
    writer.connection().execute_batch("BEGIN IMMEDIATE").unwrap();
    let blocked = orchestrator
        .run_closeout(WeekMode::Previous, closeout_time())
        .await
        .unwrap();
    assert_eq!(blocked.failed.len(), 1);
    assert!(blocked.failed[0].transient);
    writer.connection().execute_batch("ROLLBACK").unwrap();

    let retried = orchestrator
        .run_closeout(WeekMode::Previous, closeout_time())
        .await
        .unwrap();
    assert!(retried.is_success());
    assert_eq!(retried.closed, 1);

    // The other connection sees the committed result
    let store = SquadStore::new(writer.connection());
    let goal = store.get_goal(&fixture.squad_id, week()).unwrap().unwrap();
    assert!(goal.closed_out);
    assert_eq!(store.squad_points(&fixture.squad_id).unwrap(), Some(70));
}

#[tokio::test]
async fn test_closed_week_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("squadrun.db");

    let squad_id = {
        let db = Database::open(&path, Duration::from_secs(1)).unwrap();
        let fixture = squad(&db, "Reopened Runners", 2);
        set_target(&db, &fixture, 10.0, wednesday());
        let db = Arc::new(Mutex::new(db));
        CloseoutOrchestrator::new(db, ScoringPolicy::default())
            .unwrap()
            .run_closeout(WeekMode::Previous, closeout_time())
            .await
            .unwrap();
        fixture.squad_id
    };

    let db = Database::open(&path, Duration::from_secs(1)).unwrap();
    let store = SquadStore::new(db.connection());
    assert_eq!(store.squad_points(&squad_id).unwrap(), Some(-20));
    assert_eq!(store.result_logs_for_week(&squad_id, week()).unwrap().len(), 3);

    let db = Arc::new(Mutex::new(db));
    let rerun = CloseoutOrchestrator::new(db, ScoringPolicy::default())
        .unwrap()
        .run_closeout(WeekMode::Previous, closeout_time())
        .await
        .unwrap();
    assert_eq!(rerun.skipped_closed, 1);
}
