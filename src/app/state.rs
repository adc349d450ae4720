// ==========================================
// 学生分班引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{ImportApi, RosterApi};
use crate::config::ConfigManager;
use crate::engine::{OptionalEventPublisher, RosterEventPublisher};

/// 应用状态
///
/// 所有 API 共享同一个 SQLite 连接；写事务由 SQLite 串行化
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 分班名单 API
    pub roster_api: Arc<RosterApi>,

    /// 名录导入 API
    pub import_api: Arc<ImportApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,
}

impl AppState {
    /// 创建新的AppState实例（不发布事件）
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_events(db_path, OptionalEventPublisher::none())
    }

    /// 使用指定事件发布者创建 AppState
    pub fn with_publisher(
        db_path: String,
        publisher: Arc<dyn RosterEventPublisher>,
    ) -> Result<Self, String> {
        Self::with_events(db_path, OptionalEventPublisher::with_publisher(publisher))
    }

    fn with_events(db_path: String, events: OptionalEventPublisher) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        // 打开连接并建表（共享连接）
        let mut conn =
            crate::db::open_and_init(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::perf::install_sqlite_tracing(&mut conn);
        // 进程内所有写入共用此锁，跨班级写入也会排队。
        // 每次持锁只跨一个单班级 IMMEDIATE 事务（条件更新 + 一条插入 + 复核），
        // 等待上限为一个短事务；跨进程由 busy_timeout(5s) 兜底。
        let conn = Arc::new(Mutex::new(conn));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        let roster_api = Arc::new(RosterApi::new(
            conn.clone(),
            config_manager.clone(),
            events.clone(),
        ));
        let import_api = Arc::new(ImportApi::new(conn, config_manager.clone(), events));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            roster_api,
            import_api,
            config_manager,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: SECTION_ROSTER_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("SECTION_ROSTER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./section_roster.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("section-roster");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("section_roster.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_initializes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).unwrap();
        assert_eq!(state.db_path, db_path);

        let count = state.roster_api.get_unassigned_count("2024", 1).unwrap();
        assert_eq!(count.unassigned_count, 0);
    }
}
