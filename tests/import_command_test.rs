// ==========================================
// 名录导入 / 配置 / JSON 命令层测试
// ==========================================


#[cfg(test)]
mod import_command_test {
    use section_roster::app::{handle_command, AppState, CommandRequest};
    use section_roster::engine::{RosterEvent, RosterEventPublisher, RosterEventType};
    use serde_json::{json, Value};
    use std::error::Error;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::{NamedTempFile, TempDir};

    use crate::test_helpers::{BATCH, SEMESTER};

    /// 记录事件的发布者
    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<RosterEventType>>,
    }

    impl RosterEventPublisher for RecordingPublisher {
        fn publish(&self, event: RosterEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push(event.event_type);
            Ok(String::new())
        }
    }

    fn setup() -> (TempDir, AppState, Arc<RecordingPublisher>) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("roster.db").to_string_lossy().to_string();
        let publisher = Arc::new(RecordingPublisher::default());
        let state = AppState::with_publisher(db_path, publisher.clone()).unwrap();
        (dir, state, publisher)
    }

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    async fn call(state: &AppState, method: &str, params: Value) -> Value {
        let response = handle_command(
            state,
            CommandRequest {
                id: json!(method),
                method: method.to_string(),
                params,
            },
        )
        .await;
        assert_eq!(response.id, json!(method));
        serde_json::to_value(response).unwrap()
    }

    fn seed_files() -> (NamedTempFile, NamedTempFile) {
        let students = csv_file(
            "Student ID,Name,Admission No,Roll No,Batch,Semester\n\
             st-1,Asha,ADM-1,R10,2024,1\n\
             st-2,Ben,ADM-2,R2,2024,1\n\
             st-3,Chen,ADM-3,R1,2024,1\n",
        );
        let sections = csv_file(
            "batch_id,semester_no,section_code,section_name,capacity\n\
             2024,1,A,Alpha,2\n\
             2024,1,B,Beta,2\n",
        );
        (students, sections)
    }

    #[tokio::test]
    async fn test_import_then_auto_assign_over_commands() {
        let (_dir, state, publisher) = setup();
        let (students, sections) = seed_files();

        let resp = call(
            &state,
            "import_students",
            json!({ "file_path": students.path().to_string_lossy(), "actor": "registrar" }),
        )
        .await;
        assert_eq!(resp["ok"], true, "{}", resp);
        assert_eq!(resp["result"]["imported"], 3);

        let resp = call(
            &state,
            "import_sections",
            json!({ "file_path": sections.path().to_string_lossy() }),
        )
        .await;
        assert_eq!(resp["result"]["imported"], 2);

        let resp = call(
            &state,
            "get_unassigned_count",
            json!({ "batch_id": BATCH, "semester_no": SEMESTER }),
        )
        .await;
        assert_eq!(resp["result"]["unassigned_count"], 3);

        let resp = call(
            &state,
            "auto_assign",
            json!({ "batch_id": BATCH, "semester_no": SEMESTER }),
        )
        .await;
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["result"]["assigned_count"], 3);
        assert_eq!(resp["result"]["unassigned_count"], 0);

        // 自然排序: R1 (st-3) → A, R2 (st-2) → B, R10 (st-1) → A
        let sections = call(
            &state,
            "list_sections",
            json!({ "batch_id": BATCH, "semester_no": SEMESTER }),
        )
        .await;
        let section_a = sections["result"][0]["section_id"].as_str().unwrap().to_string();
        let roster = call(&state, "get_section_roster", json!({ "section_id": section_a })).await;
        let ids: Vec<&str> = roster["result"]["students"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["student_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["st-3", "st-1"]);

        let events = publisher.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                RosterEventType::DirectoryImported,
                RosterEventType::DirectoryImported,
                RosterEventType::AutoAssignCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_command_errors_carry_stable_codes() {
        let (_dir, state, _) = setup();
        let (students, sections) = seed_files();
        call(
            &state,
            "import_students",
            json!({ "file_path": students.path().to_string_lossy() }),
        )
        .await;
        call(
            &state,
            "import_sections",
            json!({ "file_path": sections.path().to_string_lossy() }),
        )
        .await;

        let list = call(
            &state,
            "list_sections",
            json!({ "batch_id": BATCH, "semester_no": SEMESTER }),
        )
        .await;
        let section_a = list["result"][0]["section_id"].as_str().unwrap().to_string();

        for student in ["st-1", "st-2"] {
            let resp = call(
                &state,
                "create_manual_assignment",
                json!({ "student_id": student, "section_id": section_a }),
            )
            .await;
            assert_eq!(resp["ok"], true, "{}", resp);
        }

        let resp = call(
            &state,
            "create_manual_assignment",
            json!({ "student_id": "st-3", "section_id": section_a }),
        )
        .await;
        assert_eq!(resp["ok"], false);
        assert_eq!(resp["error"]["code"], "CAPACITY_EXCEEDED");
        assert_eq!(resp["error"]["details"]["capacity"], 2);

        let resp = call(
            &state,
            "create_manual_assignment",
            json!({ "student_id": "st-1", "section_id": section_a }),
        )
        .await;
        assert_eq!(resp["error"]["code"], "ALREADY_ASSIGNED");

        let resp = call(&state, "remove_assignment", json!({ "assignment_id": "nope" })).await;
        assert_eq!(resp["error"]["code"], "NOT_FOUND");

        let resp = call(&state, "get_section_roster", json!({})).await;
        assert_eq!(resp["error"]["code"], "INVALID_INPUT");

        let resp = call(&state, "no_such_method", Value::Null).await;
        assert_eq!(resp["error"]["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_config_update_changes_section_order() {
        let (_dir, state, _) = setup();

        let resp = call(&state, "get_config", Value::Null).await;
        assert_eq!(resp["result"]["roster.section_order"], "CODE_ASC");

        let resp = call(
            &state,
            "update_config",
            json!({ "key": "roster.section_order", "value": "created_asc" }),
        )
        .await;
        assert_eq!(resp["result"]["value"], "CREATED_ASC");

        let resp = call(
            &state,
            "update_config",
            json!({ "key": "roster.action_log_limit", "value": "-1" }),
        )
        .await;
        assert_eq!(resp["error"]["code"], "INVALID_INPUT");

        // 按创建顺序: 先建的 Z 排在 A 前
        for code in ["Z", "A"] {
            call(
                &state,
                "create_section",
                json!({
                    "batch_id": BATCH,
                    "semester_no": SEMESTER,
                    "section_code": code,
                    "section_name": "",
                    "capacity": 10
                }),
            )
            .await;
            // 保证 created_at 毫秒时间戳不同
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let list = call(
            &state,
            "list_sections",
            json!({ "batch_id": BATCH, "semester_no": SEMESTER }),
        )
        .await;
        assert_eq!(list["result"][0]["section_code"], "Z");
        assert_eq!(list["result"][1]["section_code"], "A");
    }

    #[tokio::test]
    async fn test_batch_import_reports_per_file() {
        let (_dir, state, _) = setup();
        let (students, _) = seed_files();

        let resp = call(
            &state,
            "batch_import",
            json!({
                "files": [
                    { "kind": "STUDENTS", "file_path": students.path().to_string_lossy() },
                    { "kind": "SECTIONS", "file_path": "/nonexistent/sections.csv" }
                ]
            }),
        )
        .await;
        assert_eq!(resp["ok"], true, "{}", resp);
        let items = resp["result"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["report"]["imported"], 3);
        assert!(items[1]["error"].is_string());
    }

    #[tokio::test]
    async fn test_ping_reports_version() {
        let (_dir, state, _) = setup();
        let resp = call(&state, "ping", Value::Null).await;
        assert_eq!(resp["result"]["version"], section_roster::VERSION);
    }
}
