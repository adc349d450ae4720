// ==========================================
// 学生分班引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务决策（分班顺序、公平性由引擎层决定）
// 例外: 容量 check-then-increment 必须是存储层单条条件更新
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod assignment_repo;
pub mod error;
pub mod section_repo;
pub mod student_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use assignment_repo::{AssignmentRepository, RosterOccupant, SeatChange};
pub use error::{RepositoryError, RepositoryResult};
pub use section_repo::{SectionRepository, SectionUpsert};
pub use student_repo::StudentRepository;

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Row;

/// 时间戳存储格式（毫秒精度，保证同一秒内多次分配可排序）
pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub(crate) fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 解析时间戳（兼容无毫秒的 datetime('now') 格式）
pub(crate) fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

fn ts_conversion_error(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("时间戳格式非法: {}", raw).into(),
    )
}

/// 读取时间戳列，格式非法时报列转换错误
pub(crate) fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| ts_conversion_error(idx, &raw))
}

/// 读取可空时间戳列
pub(crate) fn opt_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(&raw)
            .map(Some)
            .ok_or_else(|| ts_conversion_error(idx, &raw)),
        None => Ok(None),
    }
}
