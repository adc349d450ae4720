// ==========================================
// 学生分班引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::roster_config_trait::RosterConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::types::SectionOrder;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 默认操作人
pub const DEFAULT_ACTOR: &str = "system";

/// 操作日志默认条数
pub const DEFAULT_ACTION_LOG_LIMIT: i64 = 200;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 写入 global scope 配置（仅允许已知键，且值须通过校验）
    ///
    /// # 返回
    /// - Ok(String): 规范化后实际写入的值
    /// - Err: 未知键 / 值非法 / 数据库错误
    pub fn update_global_config(&self, key: &str, value: &str) -> Result<String, Box<dyn Error>> {
        let normalized = config_keys::validate(key, value)?;

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, normalized],
        )?;

        tracing::info!(config_key = %key, value = %normalized, "配置已更新");
        Ok(normalized)
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// 未写入的已知键以默认值填充，写入自动分班审计负载。
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let mut config_map: BTreeMap<String, String> = config_keys::defaults()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        {
            let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            let mut stmt =
                conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            for row in rows {
                let (key, value) = row?;
                config_map.insert(key, value);
            }
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// RosterConfigReader Trait 实现
// ==========================================
impl RosterConfigReader for ConfigManager {
    fn get_section_order(&self) -> Result<SectionOrder, Box<dyn Error>> {
        let value =
            self.get_config_or_default(config_keys::SECTION_ORDER, SectionOrder::CodeAsc.as_str())?;
        Ok(SectionOrder::parse(&value).unwrap_or_else(|| {
            tracing::warn!(
                config_key = config_keys::SECTION_ORDER,
                raw_value = %value,
                "班级顺序配置非法，使用 CODE_ASC"
            );
            SectionOrder::CodeAsc
        }))
    }

    fn get_default_actor(&self) -> Result<String, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::DEFAULT_ACTOR, DEFAULT_ACTOR)?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Ok(DEFAULT_ACTOR.to_string())
        } else {
            Ok(trimmed.to_string())
        }
    }

    fn get_action_log_limit(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(
            config_keys::ACTION_LOG_LIMIT,
            &DEFAULT_ACTION_LOG_LIMIT.to_string(),
        )?;
        Ok(value
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_ACTION_LOG_LIMIT))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    use crate::domain::types::SectionOrder;

    // 自动分班
    pub const SECTION_ORDER: &str = "roster.section_order";

    // 审计
    pub const DEFAULT_ACTOR: &str = "roster.default_actor";
    pub const ACTION_LOG_LIMIT: &str = "roster.action_log_limit";

    /// 已知键及其默认值
    pub fn defaults() -> Vec<(&'static str, String)> {
        vec![
            (SECTION_ORDER, SectionOrder::CodeAsc.as_str().to_string()),
            (DEFAULT_ACTOR, super::DEFAULT_ACTOR.to_string()),
            (ACTION_LOG_LIMIT, super::DEFAULT_ACTION_LOG_LIMIT.to_string()),
        ]
    }

    /// 校验并规范化配置值
    pub fn validate(key: &str, value: &str) -> Result<String, String> {
        let trimmed = value.trim();
        match key {
            SECTION_ORDER => SectionOrder::parse(trimmed)
                .map(|o| o.as_str().to_string())
                .ok_or_else(|| format!("{} 仅支持 CODE_ASC / CREATED_ASC, 实际={}", key, value)),
            DEFAULT_ACTOR => {
                if trimmed.is_empty() {
                    Err(format!("{} 不能为空", key))
                } else {
                    Ok(trimmed.to_string())
                }
            }
            ACTION_LOG_LIMIT => match trimmed.parse::<i64>() {
                Ok(v) if v > 0 => Ok(v.to_string()),
                _ => Err(format!("{} 必须为正整数, 实际={}", key, value)),
            },
            _ => Err(format!("未知配置键: {}", key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = setup();
        assert_eq!(config.get_section_order().unwrap(), SectionOrder::CodeAsc);
        assert_eq!(config.get_default_actor().unwrap(), "system");
        assert_eq!(config.get_action_log_limit().unwrap(), 200);
    }

    #[test]
    fn test_update_normalizes_and_reads_back() {
        let config = setup();
        let stored = config
            .update_global_config(config_keys::SECTION_ORDER, " created_asc ")
            .unwrap();
        assert_eq!(stored, "CREATED_ASC");
        assert_eq!(config.get_section_order().unwrap(), SectionOrder::CreatedAsc);

        config
            .update_global_config(config_keys::ACTION_LOG_LIMIT, "50")
            .unwrap();
        assert_eq!(config.get_action_log_limit().unwrap(), 50);
    }

    #[test]
    fn test_update_rejects_invalid_values() {
        let config = setup();
        assert!(config
            .update_global_config(config_keys::SECTION_ORDER, "RANDOM")
            .is_err());
        assert!(config
            .update_global_config(config_keys::ACTION_LOG_LIMIT, "0")
            .is_err());
        assert!(config.update_global_config("unknown.key", "x").is_err());
    }

    #[test]
    fn test_snapshot_includes_defaults_and_overrides() {
        let config = setup();
        config
            .update_global_config(config_keys::DEFAULT_ACTOR, "registrar")
            .unwrap();

        let snapshot: serde_json::Value =
            serde_json::from_str(&config.get_config_snapshot().unwrap()).unwrap();
        assert_eq!(snapshot[config_keys::DEFAULT_ACTOR], "registrar");
        assert_eq!(snapshot[config_keys::SECTION_ORDER], "CODE_ASC");
    }
}
