// ==========================================
// 学生分班引擎 - 分配落库器
// ==========================================
// 职责: 把计划/人工请求/移除请求原子地写入台账
// 红线: 每条分配一个事务；容量/唯一性冲突 = 跳过并上报，不中断整批
// 红线: InternalConsistency 立即中止，不降级
// ==========================================

use crate::domain::assignment::{Assignment, AssignmentPlan, PlacementItem};
use crate::domain::types::{EnrollmentStatus, Provenance, RosterScope};
use crate::repository::{
    AssignmentRepository, RepositoryError, RepositoryResult, SeatChange, SectionRepository,
    StudentRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// CancelFlag - 协作式取消标记
// ==========================================

/// 批量落库的取消标记（可跨线程共享）
///
/// 已提交的分配不回滚；未尝试的条目在结果中标记为 not_attempted
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// 落库结果
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// 计划后班级被并发填满
    CapacityExceeded,
    /// 计划后学生已被并发分配
    AlreadyAssigned,
    /// 计划后班级被删除
    SectionMissing,
    /// 计划后学生退学/不再在读
    StudentNotEligible,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::CapacityExceeded => "CAPACITY_EXCEEDED",
            SkipReason::AlreadyAssigned => "ALREADY_ASSIGNED",
            SkipReason::SectionMissing => "SECTION_MISSING",
            SkipReason::StudentNotEligible => "STUDENT_NOT_ELIGIBLE",
        }
    }

    /// 计划条目落库失败时的跳过原因；None 表示应中止
    pub fn for_stale_item(err: &RepositoryError) -> Option<Self> {
        match err {
            RepositoryError::CapacityExceeded { .. } => Some(SkipReason::CapacityExceeded),
            RepositoryError::AlreadyAssigned { .. } => Some(SkipReason::AlreadyAssigned),
            RepositoryError::NotFound { entity, .. } if entity == "Student" => {
                Some(SkipReason::StudentNotEligible)
            }
            RepositoryError::NotFound { entity, .. } if entity == "Section" => {
                Some(SkipReason::SectionMissing)
            }
            _ => None,
        }
    }
}

/// 被跳过的计划条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPlacement {
    pub student_id: String,
    pub section_id: String,
    pub reason: SkipReason,
}

/// 批量落库结果
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// 已提交的分配（按计划顺序）
    pub applied: Vec<SeatChange>,
    pub skipped: Vec<SkippedPlacement>,
    /// 取消后未尝试的条目
    pub not_attempted: Vec<PlacementItem>,
    pub cancelled: bool,
}

impl ApplyOutcome {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

// ==========================================
// AssignmentApplier - 分配落库器
// ==========================================
pub struct AssignmentApplier {
    assignment_repo: Arc<AssignmentRepository>,
    section_repo: Arc<SectionRepository>,
    student_repo: Arc<StudentRepository>,
}

impl AssignmentApplier {
    pub fn new(
        assignment_repo: Arc<AssignmentRepository>,
        section_repo: Arc<SectionRepository>,
        student_repo: Arc<StudentRepository>,
    ) -> Self {
        Self {
            assignment_repo,
            section_repo,
            student_repo,
        }
    }

    fn log_consistency(err: &RepositoryError, context: &str) {
        if let RepositoryError::InternalConsistency(msg) = err {
            tracing::error!(context, detail = %msg, "分配台账一致性错误，中止");
        }
    }

    /// 按计划顺序逐条落库
    ///
    /// # 返回
    /// - Ok(ApplyOutcome): 已提交/跳过/未尝试的明细
    /// - Err(InternalConsistency): 不变量被破坏（已提交的条目保留）
    /// - Err(其它): 数据库错误
    #[instrument(skip(self, plan, cancel), fields(
        scope = %scope,
        planned = plan.planned_count()
    ))]
    pub fn apply_plan(
        &self,
        scope: &RosterScope,
        plan: &AssignmentPlan,
        actor: &str,
        cancel: &CancelFlag,
    ) -> RepositoryResult<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();

        for (idx, item) in plan.items.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    applied = outcome.applied.len(),
                    remaining = plan.items.len() - idx,
                    "自动分班被取消"
                );
                outcome.cancelled = true;
                outcome.not_attempted = plan.items[idx..].to_vec();
                break;
            }

            // 计划后学生可能已退学
            let eligible = matches!(
                self.student_repo.find_enrollment(&item.student_id, scope)?,
                Some(e) if e.status == EnrollmentStatus::Active
            );
            if !eligible {
                tracing::warn!(student_id = %item.student_id, "学生已不在读，跳过");
                outcome.skipped.push(SkippedPlacement {
                    student_id: item.student_id.clone(),
                    section_id: item.section_id.clone(),
                    reason: SkipReason::StudentNotEligible,
                });
                continue;
            }

            let assignment = Assignment::new(
                item.student_id.clone(),
                item.section_id.clone(),
                scope,
                item.provenance,
                actor,
            );

            match self.assignment_repo.create_atomic(&assignment) {
                Ok(change) => outcome.applied.push(change),
                Err(err) => {
                    let Some(reason) = SkipReason::for_stale_item(&err) else {
                        Self::log_consistency(&err, "apply_plan");
                        return Err(err);
                    };
                    tracing::warn!(
                        student_id = %item.student_id,
                        section_id = %item.section_id,
                        reason = reason.as_str(),
                        "计划条目已失效，跳过"
                    );
                    outcome.skipped.push(SkippedPlacement {
                        student_id: item.student_id.clone(),
                        section_id: item.section_id.clone(),
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            applied = outcome.applied.len(),
            skipped = outcome.skipped.len(),
            not_attempted = outcome.not_attempted.len(),
            cancelled = outcome.cancelled,
            "自动分班落库完成"
        );
        Ok(outcome)
    }

    /// 人工单条分配
    ///
    /// 校验顺序: 学生存在 → 班级存在 → 学生在该班级作用域在读
    /// → 无有效分配 (AlreadyAssigned) → 有余量 (CapacityExceeded)
    #[instrument(skip(self))]
    pub fn apply_manual(
        &self,
        student_id: &str,
        section_id: &str,
        actor: &str,
    ) -> RepositoryResult<SeatChange> {
        if self.student_repo.find_by_id(student_id)?.is_none() {
            return Err(RepositoryError::not_found("Student", student_id));
        }

        let section = self
            .section_repo
            .find_by_id(section_id)?
            .ok_or_else(|| RepositoryError::not_found("Section", section_id))?;
        let scope = section.scope();

        let enrolled = matches!(
            self.student_repo.find_enrollment(student_id, &scope)?,
            Some(e) if e.status == EnrollmentStatus::Active
        );
        if !enrolled {
            return Err(RepositoryError::NotFound {
                entity: "Enrollment".to_string(),
                id: format!("{} @ {}", student_id, scope),
            });
        }

        let assignment = Assignment::new(student_id, section_id, &scope, Provenance::Manual, actor);
        let change = self.assignment_repo.create_atomic(&assignment).map_err(|e| {
            Self::log_consistency(&e, "apply_manual");
            e
        })?;

        tracing::info!(
            assignment_id = %change.assignment.assignment_id,
            current_strength = change.section.current_strength,
            capacity = change.section.capacity,
            "人工分配已提交"
        );
        Ok(change)
    }

    /// 移除分配（墓碑 + 释放座位）
    #[instrument(skip(self))]
    pub fn remove(
        &self,
        assignment_id: &str,
        actor: &str,
        reason: Option<&str>,
    ) -> RepositoryResult<SeatChange> {
        let change = self
            .assignment_repo
            .remove_atomic(assignment_id, actor, reason)
            .map_err(|e| {
                Self::log_consistency(&e, "remove");
                e
            })?;

        tracing::info!(
            section_id = %change.section.section_id,
            current_strength = change.section.current_strength,
            "分配已移除"
        );
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_skip_reason_serializes_screaming_snake() {
        let json = serde_json::to_string(&SkipReason::CapacityExceeded).unwrap();
        assert_eq!(json, "\"CAPACITY_EXCEEDED\"");
        assert_eq!(SkipReason::StudentNotEligible.as_str(), "STUDENT_NOT_ELIGIBLE");
    }

    #[test]
    fn test_stale_item_reason_follows_missing_entity() {
        let student = RepositoryError::not_found("Student", "st-9");
        let section = RepositoryError::not_found("Section", "sec-9");
        assert_eq!(
            SkipReason::for_stale_item(&student),
            Some(SkipReason::StudentNotEligible)
        );
        assert_eq!(
            SkipReason::for_stale_item(&section),
            Some(SkipReason::SectionMissing)
        );

        let unknown: RepositoryError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(SkipReason::for_stale_item(&unknown), None);
        let broken = RepositoryError::InternalConsistency("strength drift".to_string());
        assert_eq!(SkipReason::for_stale_item(&broken), None);
    }
}
