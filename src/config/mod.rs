// ==========================================
// 学生分班引擎 - 配置层
// ==========================================
// 职责: 系统配置管理（分班顺序、默认操作人、日志条数）
// 存储: config_kv 表 (scope_id='global')
// ==========================================

pub mod config_manager;
pub mod roster_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use roster_config_trait::RosterConfigReader;
