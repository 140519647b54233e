use chrono::{Duration, Utc};
use tempfile::TempDir;
use tether::backup;
use tether::config::StorePaths;
use tether::continuity::{GapClass, RestoreAction, SessionTracker};
use tether::db::Database;
use tether::models::CreateTaskInput;

fn setup() -> (TempDir, StorePaths, Database) {
    let tmp = TempDir::new().unwrap();
    let paths = StorePaths::at(tmp.path());
    let db = Database::open(paths.db_file()).expect("Failed to open database");
    db.migrate().expect("Failed to migrate");
    (tmp, paths, db)
}

fn write_session_log(paths: &StorePaths, last_session: chrono::DateTime<Utc>, count: u64) {
    std::fs::write(
        paths.session_log_file(),
        serde_json::json!({
            "last_session": last_session.to_rfc3339(),
            "session_count": count,
        })
        .to_string(),
    )
    .unwrap();
}

fn read_count(paths: &StorePaths) -> u64 {
    let raw = std::fs::read_to_string(paths.session_log_file()).unwrap();
    let log: serde_json::Value = serde_json::from_str(&raw).unwrap();
    log["session_count"].as_u64().unwrap()
}

#[test]
fn first_session_performs_a_full_restore_and_starts_the_counter() {
    let (_tmp, paths, db) = setup();
    let tracker = SessionTracker::new(paths.clone(), db);

    let report = tracker.resume(Utc::now());

    assert_eq!(report.class, GapClass::FirstSession);
    assert_eq!(report.action, RestoreAction::Full);
    assert_eq!(report.session_count, 1);
    assert_eq!(read_count(&paths), 1);
}

#[test]
fn an_immediate_second_resume_is_continuous() {
    let (_tmp, paths, db) = setup();
    let tracker = SessionTracker::new(paths.clone(), db);

    tracker.resume(Utc::now());
    let report = tracker.resume(Utc::now());

    assert_eq!(report.class, GapClass::Continuous);
    assert_eq!(report.action, RestoreAction::Minimal);
    assert_eq!(report.session_count, 2);
}

#[test]
fn a_three_hour_gap_restores_only_the_window() {
    let (_tmp, paths, db) = setup();
    let now = Utc::now();

    // One task inside the gap window, one well before it
    db.create_task(CreateTaskInput {
        title: "recent work".to_string(),
        status: None,
        priority: None,
        due_at: None,
        metadata: None,
    })
    .unwrap();
    paths.append_auto_log("inside the window").unwrap();

    write_session_log(&paths, now - Duration::hours(3), 4);

    let tracker = SessionTracker::new(paths.clone(), db);
    let report = tracker.resume(now);

    assert_eq!(report.class, GapClass::MediumGap);
    assert_eq!(report.action, RestoreAction::Partial);
    // The task and the log line were both written "now", inside the window
    assert_eq!(report.restored_tasks, 1);
    assert_eq!(report.log_lines, 1);
    assert_eq!(report.session_count, 5);
}

#[test]
fn a_long_gap_generates_a_narrative_summary() {
    let (_tmp, paths, db) = setup();
    let now = Utc::now();

    std::fs::write(
        paths.notes_file(),
        "# Session notes\n\nfixed the importer\n\nwrote migration tests\n\nshipped v0.4\n",
    )
    .unwrap();
    backup::create_backup(&paths, &db).unwrap();
    write_session_log(&paths, now - Duration::hours(9), 7);

    let tracker = SessionTracker::new(paths.clone(), db.clone());
    let report = tracker.resume(now);

    assert_eq!(report.class, GapClass::LongGap);
    assert_eq!(report.action, RestoreAction::FullWithSummary);
    assert_eq!(report.recent_backups.len(), 1);

    let summary = report.summary.unwrap();
    assert!(summary.starts_with("Recent activity:"));
    assert!(summary.contains("shipped v0.4"));

    // The summary was persisted as a session record with the backup ref
    let latest = db.latest_session().unwrap().unwrap();
    assert!(latest.summary.unwrap().contains("shipped v0.4"));
    assert!(latest.backup_ref.unwrap().starts_with("backup_"));
}

#[test]
fn corrupt_bookkeeping_selects_the_safe_path_but_still_bumps() {
    let (_tmp, paths, db) = setup();
    std::fs::write(paths.session_log_file(), "definitely not json").unwrap();

    let tracker = SessionTracker::new(paths.clone(), db);
    let report = tracker.resume(Utc::now());

    assert_eq!(report.class, GapClass::Error);
    assert_eq!(report.action, RestoreAction::Safe);

    // Bookkeeping was rewritten regardless: the log is valid again and the
    // counter restarted
    assert_eq!(read_count(&paths), 1);
}

#[test]
fn boundary_gaps_classify_per_band() {
    let (_tmp, paths, db) = setup();
    let tracker = SessionTracker::new(paths.clone(), db);
    let now = Utc::now();

    let cases = [
        (Duration::zero(), GapClass::Continuous),
        (Duration::minutes(119), GapClass::Continuous),
        (Duration::minutes(121), GapClass::MediumGap),
        (Duration::hours(8) + Duration::minutes(1), GapClass::LongGap),
    ];

    for (gap, expected) in cases {
        write_session_log(&paths, now - gap, 0);
        let report = tracker.resume(now);
        assert_eq!(report.class, expected, "gap of {} minutes", gap.num_minutes());
    }
}

#[test]
fn service_restart_scenario_preserves_tasks() {
    // start -> create task -> stop -> restart -> the task is still there
    let (_tmp, paths, db) = setup();
    db.create_task(CreateTaskInput {
        title: "write docs".to_string(),
        status: None,
        priority: None,
        due_at: None,
        metadata: None,
    })
    .unwrap();
    SessionTracker::new(paths.clone(), db.clone()).resume(Utc::now());
    drop(db);

    let reopened = Database::open(paths.db_file()).unwrap();
    reopened.migrate().unwrap();
    SessionTracker::new(paths.clone(), reopened.clone()).resume(Utc::now());

    let tasks = reopened.list_tasks().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "write docs");
    assert_eq!(tasks[0].status, tether::models::TaskStatus::Todo);
}
