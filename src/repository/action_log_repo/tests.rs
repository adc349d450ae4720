use super::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::types::RosterScope;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::init_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

fn make_test_log(action_type: ActionType, batch: &str, section: &str) -> ActionLog {
    ActionLog::new(action_type, "registrar")
        .with_scope(&RosterScope::new(batch, 1))
        .with_section(section)
        .with_payload(&serde_json::json!({ "student_id": "st-1" }))
        .with_detail("Test log")
}

#[test]
fn test_insert_and_find_by_id() {
    let repo = ActionLogRepository::new(setup_test_db());

    let log = make_test_log(ActionType::ManualAssign, "2024", "sec-a");
    let action_id = repo.insert(&log).unwrap();
    assert_eq!(action_id, log.action_id);

    let found = repo.find_by_id(&action_id).unwrap().unwrap();
    assert_eq!(found.action_type, "ManualAssign");
    assert_eq!(found.actor, "registrar");
    assert_eq!(found.semester_no, Some(1));
    assert_eq!(found.section_id.as_deref(), Some("sec-a"));
    assert_eq!(
        found.payload_json.unwrap()["student_id"],
        serde_json::json!("st-1")
    );
}

#[test]
fn test_find_by_id_not_found() {
    let repo = ActionLogRepository::new(setup_test_db());
    assert!(repo.find_by_id("missing").unwrap().is_none());
}

#[test]
fn test_find_by_scope_filters_and_limits() {
    let repo = ActionLogRepository::new(setup_test_db());

    for log in [
        make_test_log(ActionType::ManualAssign, "2024", "sec-a"),
        make_test_log(ActionType::RemoveAssignment, "2024", "sec-a"),
        make_test_log(ActionType::ManualAssign, "2025", "sec-x"),
    ] {
        repo.insert(&log).unwrap();
    }

    let scoped = repo.find_by_scope(&RosterScope::new("2024", 1), 10).unwrap();
    assert_eq!(scoped.len(), 2);
    assert!(scoped.iter().all(|l| l.batch_id.as_deref() == Some("2024")));

    let limited = repo.find_by_scope(&RosterScope::new("2024", 1), 1).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn test_find_by_section_newest_first() {
    let repo = ActionLogRepository::new(setup_test_db());

    let first = make_test_log(ActionType::ManualAssign, "2024", "sec-a");
    repo.insert(&first).unwrap();
    repo.insert(&make_test_log(ActionType::ManualAssign, "2024", "sec-b")).unwrap();
    let second = make_test_log(ActionType::RemoveAssignment, "2024", "sec-a");
    repo.insert(&second).unwrap();
    repo.insert(&ActionLog::new(ActionType::UpdateConfig, "admin")).unwrap();

    let logs = repo.find_by_section("sec-a", 10).unwrap();
    let ids: Vec<_> = logs.iter().map(|l| l.action_id.as_str()).collect();
    assert_eq!(ids, vec![second.action_id.as_str(), first.action_id.as_str()]);

    assert_eq!(repo.find_by_section("sec-a", 1).unwrap().len(), 1);
    assert!(repo.find_by_section("sec-z", 10).unwrap().is_empty());
}
