// ==========================================
// 学生分班引擎 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建表入口，容量/唯一性约束同时落在存储层
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置（并发写入时排队而不是直接报 busy）
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等）
///
/// 约束落库：
/// - section: CHECK (0 <= current_strength <= capacity)
/// - section_assignment: 同一 (student, batch, semester) 仅允许一条有效分配（部分唯一索引）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        -- 学生名录（外部教务数据，引擎只读）
        CREATE TABLE IF NOT EXISTS student (
            student_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            admission_number TEXT NOT NULL,
            roll_no TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS student_enrollment (
            student_id TEXT NOT NULL REFERENCES student(student_id) ON DELETE CASCADE,
            batch_id TEXT NOT NULL,
            semester_no INTEGER NOT NULL CHECK (semester_no >= 1),
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            PRIMARY KEY (student_id, batch_id, semester_no)
        );

        CREATE INDEX IF NOT EXISTS idx_enrollment_scope
            ON student_enrollment(batch_id, semester_no, status);

        -- 班级（容量约束）
        CREATE TABLE IF NOT EXISTS section (
            section_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL,
            semester_no INTEGER NOT NULL CHECK (semester_no >= 1),
            section_code TEXT NOT NULL,
            section_name TEXT NOT NULL,
            capacity INTEGER NOT NULL CHECK (capacity > 0),
            current_strength INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (current_strength >= 0 AND current_strength <= capacity),
            UNIQUE(batch_id, semester_no, section_code)
        );

        CREATE INDEX IF NOT EXISTS idx_section_scope
            ON section(batch_id, semester_no);

        -- 分配台账（移除为墓碑标记，不物理删除）
        -- section_id 不设外键：班级删除后历史墓碑仍需保留
        CREATE TABLE IF NOT EXISTS section_assignment (
            assignment_id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES student(student_id),
            section_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            semester_no INTEGER NOT NULL,
            provenance TEXT NOT NULL CHECK (provenance IN ('AUTO', 'MANUAL')),
            assigned_at TEXT NOT NULL,
            assigned_by TEXT NOT NULL,
            removed_at TEXT,
            removed_by TEXT,
            removal_reason TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS uq_assignment_active_student_scope
            ON section_assignment(student_id, batch_id, semester_no)
            WHERE removed_at IS NULL;

        CREATE INDEX IF NOT EXISTS idx_assignment_section_active
            ON section_assignment(section_id)
            WHERE removed_at IS NULL;

        CREATE INDEX IF NOT EXISTS idx_assignment_student
            ON section_assignment(student_id, assigned_at);

        -- 操作日志（审计）
        CREATE TABLE IF NOT EXISTS action_log (
            action_id TEXT PRIMARY KEY,
            action_type TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            actor TEXT NOT NULL,
            batch_id TEXT,
            semester_no INTEGER,
            section_id TEXT,
            payload_json TEXT,
            detail TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_action_log_scope_ts
            ON action_log(batch_id, semester_no, action_ts DESC);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 打开连接并确保 schema 存在
pub fn open_and_init(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;

    match read_schema_version(&conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                db_version = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema 版本高于当前程序版本"
            );
        }
        _ => {}
    }

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_section_check_constraint_rejects_overfill() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO section (section_id, batch_id, semester_no, section_code, section_name,
                capacity, current_strength, created_at, updated_at)
             VALUES ('S1', 'B1', 1, 'A', 'Section A', 1, 1, '2026-01-01', '2026-01-01')",
            [],
        )
        .unwrap();

        let err = conn
            .execute(
                "UPDATE section SET current_strength = current_strength + 1 WHERE section_id = 'S1'",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("CHECK"));
    }
}
