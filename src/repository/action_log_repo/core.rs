use crate::domain::action_log::ActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::format_ts;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub(super) const ACTION_LOG_COLUMNS: &str = r#"
    action_id, action_type, action_ts, actor,
    batch_id, semester_no, section_id, payload_json, detail
"#;

// ==========================================
// ActionLogRepository - 操作日志仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct ActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActionLogRepository {
    /// 创建新的操作日志仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn insert_on(conn: &Connection, log: &ActionLog) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO action_log (
                action_id, action_type, action_ts, actor,
                batch_id, semester_no, section_id, payload_json, detail
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                log.action_id,
                log.action_type,
                format_ts(&log.action_ts),
                log.actor,
                log.batch_id,
                log.semester_no,
                log.section_id,
                log.payload_json.as_ref().map(|v| v.to_string()),
                log.detail,
            ],
        )?;
        Ok(())
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入操作日志
    ///
    /// # 返回
    /// - `Ok(action_id)`: 成功插入,返回action_id
    /// - `Err(...)`: 数据库错误
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_on(&conn, log)?;
        Ok(log.action_id.clone())
    }
}
