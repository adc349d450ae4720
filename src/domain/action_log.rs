// ==========================================
// 学生分班引擎 - 操作日志领域模型
// ==========================================
// 红线: 所有写入必须记录
// 用途: 审计追踪（谁、何时、因何分配/移除）
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::types::RosterScope;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,           // 日志ID
    pub action_type: String,         // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime,    // 操作时间戳
    pub actor: String,               // 操作人

    // ===== 作用域 =====
    pub batch_id: Option<String>,
    pub semester_no: Option<i64>,
    pub section_id: Option<String>,

    // ===== 操作负载 =====
    pub payload_json: Option<JsonValue>,
    pub detail: Option<String>,
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    AutoAssign,            // 自动分班
    ManualAssign,          // 人工分班
    RemoveAssignment,      // 移除分配
    CreateSection,         // 创建班级
    UpdateSectionCapacity, // 调整班级容量
    DeleteSection,         // 删除班级
    ImportDirectory,       // 导入名录
    UpdateConfig,          // 修改配置
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AutoAssign => "AutoAssign",
            ActionType::ManualAssign => "ManualAssign",
            ActionType::RemoveAssignment => "RemoveAssignment",
            ActionType::CreateSection => "CreateSection",
            ActionType::UpdateSectionCapacity => "UpdateSectionCapacity",
            ActionType::DeleteSection => "DeleteSection",
            ActionType::ImportDirectory => "ImportDirectory",
            ActionType::UpdateConfig => "UpdateConfig",
        }
    }

    /// 从字符串解析
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AutoAssign" => Some(ActionType::AutoAssign),
            "ManualAssign" => Some(ActionType::ManualAssign),
            "RemoveAssignment" => Some(ActionType::RemoveAssignment),
            "CreateSection" => Some(ActionType::CreateSection),
            "UpdateSectionCapacity" => Some(ActionType::UpdateSectionCapacity),
            "DeleteSection" => Some(ActionType::DeleteSection),
            "ImportDirectory" => Some(ActionType::ImportDirectory),
            "UpdateConfig" => Some(ActionType::UpdateConfig),
            _ => None,
        }
    }
}

// ==========================================
// ActionLog 辅助方法
// ==========================================
impl ActionLog {
    /// 创建新的操作日志（自动生成 UUID 和时间戳）
    pub fn new(action_type: ActionType, actor: impl Into<String>) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Local::now().naive_local(),
            actor: actor.into(),
            batch_id: None,
            semester_no: None,
            section_id: None,
            payload_json: None,
            detail: None,
        }
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: &RosterScope) -> Self {
        self.batch_id = Some(scope.batch_id.clone());
        self.semester_no = Some(scope.semester_no);
        self
    }

    pub fn with_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    /// 设置操作负载 (转换为JSON)
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload_json = serde_json::to_value(payload).ok();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
