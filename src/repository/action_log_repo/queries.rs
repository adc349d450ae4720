use super::core::{ActionLogRepository, ACTION_LOG_COLUMNS};
use crate::domain::action_log::ActionLog;
use crate::domain::types::RosterScope;
use crate::repository::error::RepositoryResult;
use crate::repository::ts_column;
use rusqlite::{params, Result as SqliteResult, Row};

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 action_id 查询单个日志
    pub fn find_by_id(&self, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let conn = self.get_conn()?;

        let sql = format!("SELECT {} FROM action_log WHERE action_id = ?", ACTION_LOG_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;

        match stmt.query_row(params![action_id], |row| self.map_row(row)) {
            Ok(log) => Ok(Some(log)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询作用域内的操作日志（时间倒序）
    pub fn find_by_scope(&self, scope: &RosterScope, limit: i64) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let sql = format!(
            r#"SELECT {} FROM action_log
                WHERE batch_id = ? AND semester_no = ?
                ORDER BY action_ts DESC, rowid DESC
                LIMIT ?"#,
            ACTION_LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let logs = stmt
            .query_map(params![scope.batch_id, scope.semester_no, limit], |row| {
                self.map_row(row)
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }

    /// 查询指定班级的操作日志
    pub fn find_by_section(&self, section_id: &str, limit: i64) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let sql = format!(
            r#"SELECT {} FROM action_log
                WHERE section_id = ?
                ORDER BY action_ts DESC, rowid DESC
                LIMIT ?"#,
            ACTION_LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let logs = stmt
            .query_map(params![section_id, limit], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 将数据库行映射为 ActionLog 实体
    fn map_row(&self, row: &Row) -> SqliteResult<ActionLog> {
        let payload_str: Option<String> = row.get(7)?;

        Ok(ActionLog {
            action_id: row.get(0)?,
            action_type: row.get(1)?,
            action_ts: ts_column(row, 2)?,
            actor: row.get(3)?,
            batch_id: row.get(4)?,
            semester_no: row.get(5)?,
            section_id: row.get(6)?,
            payload_json: payload_str.and_then(|s| serde_json::from_str(&s).ok()),
            detail: row.get(8)?,
        })
    }
}
