// ==========================================
// 学生分班引擎 - 分配台账领域模型
// ==========================================
// 红线: 同一 (student, batch, semester) 至多一条有效分配
// 红线: 分配不可原地修改，移除 = 墓碑标记 + 人数递减（同一事务）
// ==========================================

use chrono::{NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

use crate::domain::types::{Provenance, RosterScope};

// ==========================================
// Assignment - 分配记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: String,
    pub student_id: String,
    pub section_id: String,
    pub batch_id: String,
    pub semester_no: i64,
    pub provenance: Provenance,
    pub assigned_at: NaiveDateTime,
    pub assigned_by: String,

    // ===== 墓碑 =====
    pub removed_at: Option<NaiveDateTime>,
    pub removed_by: Option<String>,
    pub removal_reason: Option<String>,
}

impl Assignment {
    /// 创建新的有效分配（自动生成 UUID 和时间戳）
    ///
    /// 时间戳截断到毫秒，与落库精度一致
    pub fn new(
        student_id: impl Into<String>,
        section_id: impl Into<String>,
        scope: &RosterScope,
        provenance: Provenance,
        assigned_by: impl Into<String>,
    ) -> Self {
        Self {
            assignment_id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.into(),
            section_id: section_id.into(),
            batch_id: scope.batch_id.clone(),
            semester_no: scope.semester_no,
            provenance,
            assigned_at: chrono::Local::now().naive_local().trunc_subsecs(3),
            assigned_by: assigned_by.into(),
            removed_at: None,
            removed_by: None,
            removal_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }

    pub fn scope(&self) -> RosterScope {
        RosterScope::new(self.batch_id.clone(), self.semester_no)
    }
}

// ==========================================
// 自动分班计划
// ==========================================

/// 计划条目：某学生 → 某班级
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementItem {
    pub student_id: String,
    pub section_id: String,
    pub provenance: Provenance,
}

/// 自动分班计划（按学号顺序）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPlan {
    pub items: Vec<PlacementItem>,
    /// 因容量不足未能进入计划的学生（学号顺序）
    pub unplaced: Vec<String>,
}

impl AssignmentPlan {
    pub fn planned_count(&self) -> usize {
        self.items.len()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
