// ==========================================
// 学生分班引擎 - 名单变更事件发布
// ==========================================
// 职责: 定义名单事件发布 trait，实现依赖倒置
// 说明: 引擎层定义 trait，展示层（刷新名单/计数）实现适配器
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

use crate::domain::types::RosterScope;

// ==========================================
// 名单事件类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RosterEventType {
    /// 新增分配（手动/自动）
    AssignmentCreated,
    /// 分配被移除
    AssignmentRemoved,
    /// 一轮自动分班完成
    AutoAssignCompleted,
    /// 班级容量变更（含创建/删除）
    SectionCapacityChanged,
    /// 名录导入完成
    DirectoryImported,
}

impl RosterEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RosterEventType::AssignmentCreated => "AssignmentCreated",
            RosterEventType::AssignmentRemoved => "AssignmentRemoved",
            RosterEventType::AutoAssignCompleted => "AutoAssignCompleted",
            RosterEventType::SectionCapacityChanged => "SectionCapacityChanged",
            RosterEventType::DirectoryImported => "DirectoryImported",
        }
    }
}

/// 名单事件
///
/// 只在事务提交后发布；携带提交后的权威人数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEvent {
    pub event_type: RosterEventType,
    /// 作用域（导入跨多个作用域时为 None）
    pub scope: Option<RosterScope>,
    /// 受影响的班级
    pub section_ids: Vec<String>,
    /// 提交后的班级人数（单班级事件）
    pub current_strength: Option<i64>,
    /// 事件来源描述
    pub source: Option<String>,
}

impl RosterEvent {
    pub fn new(event_type: RosterEventType, scope: Option<RosterScope>) -> Self {
        Self {
            event_type,
            scope,
            section_ids: Vec::new(),
            current_strength: None,
            source: None,
        }
    }

    /// 单班级事件
    pub fn for_section(
        event_type: RosterEventType,
        scope: RosterScope,
        section_id: impl Into<String>,
        current_strength: i64,
    ) -> Self {
        Self {
            event_type,
            scope: Some(scope),
            section_ids: vec![section_id.into()],
            current_strength: Some(current_strength),
            source: None,
        }
    }

    pub fn with_sections(mut self, section_ids: Vec<String>) -> Self {
        self.section_ids = section_ids;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 名单事件发布者 Trait
///
/// # 实现说明
/// - 发布失败不影响已提交的写入，调用方只记录 warn
pub trait RosterEventPublisher: Send + Sync {
    /// 发布名单事件
    ///
    /// # 返回
    /// - `Ok(task_id)`: 任务 ID（如果支持）或空字符串
    /// - `Err`: 发布失败
    fn publish(&self, event: RosterEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl RosterEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: RosterEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - event_type={}, sections={:?}",
            event.event_type.as_str(),
            event.section_ids
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn RosterEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn RosterEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn RosterEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）；失败只记录告警
    pub fn publish(&self, event: RosterEvent) {
        let event_type = event.event_type;
        match &self.inner {
            Some(publisher) => {
                if let Err(e) = publisher.publish(event) {
                    tracing::warn!(
                        event_type = event_type.as_str(),
                        error = %e,
                        "名单事件发布失败（写入已提交）"
                    );
                }
            }
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - event_type={}",
                    event_type.as_str()
                );
            }
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
