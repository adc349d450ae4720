// ==========================================
// 学生分班引擎 - 分班名单 API
// ==========================================
// 职责: 未分班计数、自动分班、班级名单、人工分配/移除、班级管理、审计查询
// 红线: 每次写入后重新读库，返回提交后的权威人数
// 红线: 每次写入必须记录 ActionLog
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::config::{config_keys, ConfigManager, RosterConfigReader};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::assignment::{Assignment, PlacementItem};
use crate::domain::section::Section;
use crate::domain::student::Student;
use crate::domain::types::{Provenance, RosterScope};
use crate::engine::{
    AssignmentApplier, AutoAssignmentPlanner, CancelFlag, OptionalEventPublisher, RosterEvent,
    RosterEventType, RosterQueryService, SectionSummary, SkippedPlacement, UnassignedResolver,
};
use crate::repository::{
    ActionLogRepository, AssignmentRepository, SectionRepository, StudentRepository,
};

// ==========================================
// DTO
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnassignedCountResponse {
    pub batch_id: String,
    pub semester_no: i64,
    pub unassigned_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoAssignResponse {
    pub batch_id: String,
    pub semester_no: i64,
    pub assigned_count: usize,
    /// 提交后重新读库得到的未分班人数
    pub unassigned_count: usize,
    pub message: String,
    pub skipped: Vec<SkippedPlacement>,
    pub not_attempted_count: usize,
    pub cancelled: bool,
    pub sections: Vec<SectionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterStudentDto {
    pub assignment_id: String,
    pub student_id: String,
    pub name: String,
    pub admission_number: String,
    pub roll_no: String,
    pub provenance: Provenance,
    pub assigned_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRosterResponse {
    pub section_id: String,
    pub section_code: String,
    pub section_name: String,
    pub capacity: i64,
    pub current_strength: i64,
    pub students: Vec<RosterStudentDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub assignment: Assignment,
    pub section: SectionSummary,
    pub unassigned_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveAssignmentResponse {
    pub success: bool,
    pub assignment_id: String,
    pub section: SectionSummary,
    pub unassigned_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSectionDto {
    pub section_id: String,
    pub section_code: String,
    pub capacity: i64,
    pub current_strength: i64,
    pub planned_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewAutoAssignResponse {
    pub batch_id: String,
    pub semester_no: i64,
    pub planned_count: usize,
    pub unplaced_count: usize,
    pub sections: Vec<PreviewSectionDto>,
    pub items: Vec<PlacementItem>,
    pub unplaced: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSectionRequest {
    pub batch_id: String,
    pub semester_no: i64,
    pub section_code: String,
    pub section_name: String,
    pub capacity: i64,
}

// ==========================================
// RosterApi - 分班名单 API
// ==========================================
pub struct RosterApi {
    section_repo: Arc<SectionRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    student_repo: Arc<StudentRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    resolver: Arc<UnassignedResolver>,
    planner: AutoAssignmentPlanner,
    applier: AssignmentApplier,
    query: RosterQueryService,
    config: Arc<ConfigManager>,
    events: OptionalEventPublisher,
}

impl RosterApi {
    /// 从共享连接装配全部仓储与引擎
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        config: Arc<ConfigManager>,
        events: OptionalEventPublisher,
    ) -> Self {
        let section_repo = Arc::new(SectionRepository::new(conn.clone()));
        let assignment_repo = Arc::new(AssignmentRepository::new(conn.clone()));
        let student_repo = Arc::new(StudentRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn));
        let resolver = Arc::new(UnassignedResolver::new(student_repo.clone()));

        let applier = AssignmentApplier::new(
            assignment_repo.clone(),
            section_repo.clone(),
            student_repo.clone(),
        );
        let query = RosterQueryService::new(
            section_repo.clone(),
            assignment_repo.clone(),
            resolver.clone(),
        );

        Self {
            section_repo,
            assignment_repo,
            student_repo,
            action_log_repo,
            resolver,
            planner: AutoAssignmentPlanner::new(),
            applier,
            query,
            config,
            events,
        }
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn scope(batch_id: &str, semester_no: i64) -> ApiResult<RosterScope> {
        if batch_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("批次ID不能为空".to_string()));
        }
        if semester_no < 1 {
            return Err(ApiError::InvalidInput(format!(
                "学期号必须 >= 1, 实际={}",
                semester_no
            )));
        }
        Ok(RosterScope::new(batch_id.trim(), semester_no))
    }

    fn require_id(value: &str, label: &str) -> ApiResult<()> {
        if value.trim().is_empty() {
            return Err(ApiError::InvalidInput(format!("{}不能为空", label)));
        }
        Ok(())
    }

    fn actor(&self, actor: Option<&str>) -> ApiResult<String> {
        match actor.map(str::trim).filter(|a| !a.is_empty()) {
            Some(a) => Ok(a.to_string()),
            None => self
                .config
                .get_default_actor()
                .map_err(|e| ApiError::InternalError(format!("读取默认操作人失败: {}", e))),
        }
    }

    /// 记录操作日志；写入已提交，日志失败只告警
    fn record(&self, log: ActionLog) {
        let action_type = log.action_type.clone();
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!(action_type = %action_type, error = %e, "操作日志写入失败");
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    /// GetUnassignedCount
    pub fn get_unassigned_count(
        &self,
        batch_id: &str,
        semester_no: i64,
    ) -> ApiResult<UnassignedCountResponse> {
        let scope = Self::scope(batch_id, semester_no)?;
        let unassigned_count = self.query.unassigned_count(&scope)?;

        Ok(UnassignedCountResponse {
            batch_id: scope.batch_id,
            semester_no: scope.semester_no,
            unassigned_count,
        })
    }

    /// ListUnassignedStudents（按分班顺序）
    pub fn list_unassigned_students(
        &self,
        batch_id: &str,
        semester_no: i64,
    ) -> ApiResult<Vec<Student>> {
        let scope = Self::scope(batch_id, semester_no)?;
        Ok(self.resolver.resolve(&scope)?)
    }

    /// GetSectionRoster
    pub fn get_section_roster(&self, section_id: &str) -> ApiResult<SectionRosterResponse> {
        Self::require_id(section_id, "班级ID")?;
        let roster = self.query.section_roster(section_id)?;

        Ok(SectionRosterResponse {
            section_id: roster.section.section_id,
            section_code: roster.section.section_code,
            section_name: roster.section.section_name,
            capacity: roster.section.capacity,
            current_strength: roster.section.current_strength,
            students: roster
                .occupants
                .into_iter()
                .map(|o| RosterStudentDto {
                    assignment_id: o.assignment_id,
                    student_id: o.student_id,
                    name: o.name,
                    admission_number: o.admission_number,
                    roll_no: o.roll_no,
                    provenance: o.provenance,
                    assigned_at: o.assigned_at,
                })
                .collect(),
        })
    }

    /// ListSections（按配置的班级顺序）
    pub fn list_sections(&self, batch_id: &str, semester_no: i64) -> ApiResult<Vec<SectionSummary>> {
        let scope = Self::scope(batch_id, semester_no)?;
        let order = self
            .config
            .get_section_order()
            .map_err(|e| ApiError::InternalError(format!("读取班级顺序失败: {}", e)))?;
        Ok(self.query.list_sections(&scope, order)?)
    }

    /// ListStudentAssignmentHistory（含已移除的墓碑记录）
    pub fn list_student_assignment_history(&self, student_id: &str) -> ApiResult<Vec<Assignment>> {
        Self::require_id(student_id, "学生ID")?;
        if self.student_repo.find_by_id(student_id)?.is_none() {
            return Err(ApiError::NotFound(format!("Student(id={})不存在", student_id)));
        }
        Ok(self.assignment_repo.list_history_for_student(student_id)?)
    }

    /// ListActionLogs
    pub fn list_action_logs(
        &self,
        batch_id: &str,
        semester_no: i64,
        limit: Option<i64>,
    ) -> ApiResult<Vec<ActionLog>> {
        let scope = Self::scope(batch_id, semester_no)?;
        let limit = self.log_limit(limit)?;
        Ok(self.action_log_repo.find_by_scope(&scope, limit)?)
    }

    /// ListActionLogs（按班级过滤，已删除班级的日志仍可查）
    pub fn list_section_action_logs(
        &self,
        section_id: &str,
        limit: Option<i64>,
    ) -> ApiResult<Vec<ActionLog>> {
        Self::require_id(section_id, "班级ID")?;
        let limit = self.log_limit(limit)?;
        Ok(self.action_log_repo.find_by_section(section_id, limit)?)
    }

    fn log_limit(&self, limit: Option<i64>) -> ApiResult<i64> {
        match limit {
            Some(l) if l > 0 => Ok(l),
            Some(l) => Err(ApiError::InvalidInput(format!("limit 必须为正整数, 实际={}", l))),
            None => self
                .config
                .get_action_log_limit()
                .map_err(|e| ApiError::InternalError(format!("读取日志条数配置失败: {}", e))),
        }
    }

    // ==========================================
    // 自动分班
    // ==========================================

    /// PreviewAutoAssign（只计划，不落库）
    #[instrument(skip(self))]
    pub fn preview_auto_assign(
        &self,
        batch_id: &str,
        semester_no: i64,
    ) -> ApiResult<PreviewAutoAssignResponse> {
        let scope = Self::scope(batch_id, semester_no)?;
        let order = self
            .config
            .get_section_order()
            .map_err(|e| ApiError::InternalError(format!("读取班级顺序失败: {}", e)))?;

        let students = self.resolver.resolve(&scope)?;
        let sections = self.section_repo.list_by_scope(&scope, order)?;
        let plan = self.planner.plan(&students, &sections, order);

        let section_dtos = AutoAssignmentPlanner::order_sections(&sections, order)
            .into_iter()
            .map(|s| PreviewSectionDto {
                section_id: s.section_id.clone(),
                section_code: s.section_code.clone(),
                capacity: s.capacity,
                current_strength: s.current_strength,
                planned_count: plan
                    .items
                    .iter()
                    .filter(|i| i.section_id == s.section_id)
                    .count(),
            })
            .collect();

        Ok(PreviewAutoAssignResponse {
            batch_id: scope.batch_id,
            semester_no: scope.semester_no,
            planned_count: plan.planned_count(),
            unplaced_count: plan.unplaced_count(),
            sections: section_dtos,
            items: plan.items,
            unplaced: plan.unplaced,
        })
    }

    /// AutoAssign
    pub fn auto_assign(
        &self,
        batch_id: &str,
        semester_no: i64,
        actor: Option<&str>,
    ) -> ApiResult<AutoAssignResponse> {
        self.auto_assign_with_cancel(batch_id, semester_no, actor, &CancelFlag::new())
    }

    /// AutoAssign（可取消）
    ///
    /// 取消是正常终态：已提交的学生计入 assigned_count，其余仍为未分班。
    #[instrument(skip(self, cancel))]
    pub fn auto_assign_with_cancel(
        &self,
        batch_id: &str,
        semester_no: i64,
        actor: Option<&str>,
        cancel: &CancelFlag,
    ) -> ApiResult<AutoAssignResponse> {
        let scope = Self::scope(batch_id, semester_no)?;
        let actor = self.actor(actor)?;
        let order = self
            .config
            .get_section_order()
            .map_err(|e| ApiError::InternalError(format!("读取班级顺序失败: {}", e)))?;

        // 1. 解析 + 计划（不加锁）
        let students = self.resolver.resolve(&scope)?;
        let sections = self.section_repo.list_by_scope(&scope, order)?;
        let plan = self.planner.plan(&students, &sections, order);

        // 2. 逐条落库（每条独立事务，容量在事务内复核）
        let outcome = self.applier.apply_plan(&scope, &plan, &actor, cancel)?;

        // 3. 提交后重新读库
        let unassigned_count = self.query.unassigned_count(&scope)?;
        let section_summaries = self.query.list_sections(&scope, order)?;
        let assigned_count = outcome.applied_count();

        let message = if students.is_empty() {
            "没有未分班的学生".to_string()
        } else if outcome.cancelled {
            format!(
                "自动分班已取消: 已分配 {} 名学生，{} 名学生仍未分班",
                assigned_count, unassigned_count
            )
        } else if assigned_count == 0 {
            format!("所有班级已满，{} 名学生未能分班", unassigned_count)
        } else if unassigned_count == 0 {
            format!("已分配 {} 名学生，全部学生已分班", assigned_count)
        } else {
            format!(
                "已分配 {} 名学生，{} 名学生因班级容量不足未分班",
                assigned_count, unassigned_count
            )
        };

        // 4. 审计 + 事件
        let config_snapshot = self
            .config
            .get_config_snapshot()
            .ok()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok());
        self.record(
            ActionLog::new(ActionType::AutoAssign, actor.clone())
                .with_scope(&scope)
                .with_payload(&serde_json::json!({
                    "planned": plan.planned_count(),
                    "assigned": assigned_count,
                    "skipped": outcome.skipped,
                    "not_attempted": outcome.not_attempted.len(),
                    "cancelled": outcome.cancelled,
                    "unassigned_after": unassigned_count,
                    "config_snapshot": config_snapshot,
                }))
                .with_detail(message.clone()),
        );

        let mut touched: Vec<String> = outcome
            .applied
            .iter()
            .map(|c| c.section.section_id.clone())
            .collect();
        touched.sort();
        touched.dedup();
        self.events.publish(
            RosterEvent::new(RosterEventType::AutoAssignCompleted, Some(scope.clone()))
                .with_sections(touched)
                .with_source("RosterApi::auto_assign"),
        );

        tracing::info!(
            scope = %scope,
            assigned_count,
            unassigned_count,
            skipped = outcome.skipped.len(),
            cancelled = outcome.cancelled,
            "自动分班完成"
        );

        Ok(AutoAssignResponse {
            batch_id: scope.batch_id,
            semester_no: scope.semester_no,
            assigned_count,
            unassigned_count,
            message,
            skipped: outcome.skipped,
            not_attempted_count: outcome.not_attempted.len(),
            cancelled: outcome.cancelled,
            sections: section_summaries,
        })
    }

    // ==========================================
    // 人工分配 / 移除
    // ==========================================

    /// CreateManualAssignment
    pub fn create_manual_assignment(
        &self,
        student_id: &str,
        section_id: &str,
        actor: Option<&str>,
    ) -> ApiResult<AssignmentResponse> {
        Self::require_id(student_id, "学生ID")?;
        Self::require_id(section_id, "班级ID")?;
        let actor = self.actor(actor)?;

        let change = self.applier.apply_manual(student_id, section_id, &actor)?;
        let scope = change.assignment.scope();
        let unassigned_count = self.query.unassigned_count(&scope)?;

        self.record(
            ActionLog::new(ActionType::ManualAssign, actor)
                .with_scope(&scope)
                .with_section(section_id)
                .with_payload(&serde_json::json!({
                    "assignment_id": change.assignment.assignment_id,
                    "student_id": student_id,
                    "current_strength": change.section.current_strength,
                    "capacity": change.section.capacity,
                }))
                .with_detail(format!(
                    "学生 {} 人工分配至班级 {}",
                    student_id, change.section.section_code
                )),
        );
        self.events.publish(
            RosterEvent::for_section(
                RosterEventType::AssignmentCreated,
                scope,
                section_id,
                change.section.current_strength,
            )
            .with_source("RosterApi::create_manual_assignment"),
        );

        Ok(AssignmentResponse {
            section: SectionSummary::from(&change.section),
            assignment: change.assignment,
            unassigned_count,
        })
    }

    /// RemoveAssignment
    pub fn remove_assignment(
        &self,
        assignment_id: &str,
        actor: Option<&str>,
        reason: Option<&str>,
    ) -> ApiResult<RemoveAssignmentResponse> {
        Self::require_id(assignment_id, "分配ID")?;
        let actor = self.actor(actor)?;

        let change = self.applier.remove(assignment_id, &actor, reason)?;
        let scope = change.assignment.scope();
        let unassigned_count = self.query.unassigned_count(&scope)?;

        self.record(
            ActionLog::new(ActionType::RemoveAssignment, actor)
                .with_scope(&scope)
                .with_section(change.section.section_id.clone())
                .with_payload(&serde_json::json!({
                    "assignment_id": assignment_id,
                    "student_id": change.assignment.student_id,
                    "reason": reason,
                    "current_strength": change.section.current_strength,
                }))
                .with_detail(format!(
                    "学生 {} 移出班级 {}",
                    change.assignment.student_id, change.section.section_code
                )),
        );
        self.events.publish(
            RosterEvent::for_section(
                RosterEventType::AssignmentRemoved,
                scope,
                change.section.section_id.clone(),
                change.section.current_strength,
            )
            .with_source("RosterApi::remove_assignment"),
        );

        Ok(RemoveAssignmentResponse {
            success: true,
            assignment_id: assignment_id.to_string(),
            section: SectionSummary::from(&change.section),
            unassigned_count,
        })
    }

    // ==========================================
    // 班级管理
    // ==========================================

    /// CreateSection
    pub fn create_section(
        &self,
        request: CreateSectionRequest,
        actor: Option<&str>,
    ) -> ApiResult<SectionSummary> {
        let scope = Self::scope(&request.batch_id, request.semester_no)?;
        let code = request.section_code.trim();
        if code.is_empty() {
            return Err(ApiError::InvalidInput("班级代码不能为空".to_string()));
        }
        if request.capacity <= 0 {
            return Err(ApiError::InvalidInput(format!(
                "容量必须为正整数, 实际={}",
                request.capacity
            )));
        }
        let actor = self.actor(actor)?;

        let name = request.section_name.trim();
        let now = chrono::Local::now().naive_local();
        let section = Section {
            section_id: uuid::Uuid::new_v4().to_string(),
            batch_id: scope.batch_id.clone(),
            semester_no: scope.semester_no,
            section_code: code.to_string(),
            section_name: if name.is_empty() { code.to_string() } else { name.to_string() },
            capacity: request.capacity,
            current_strength: 0,
            created_at: now,
            updated_at: now,
        };

        self.section_repo.create(&section).map_err(|e| match ApiError::from(e) {
            ApiError::BusinessRuleViolation(_) => ApiError::BusinessRuleViolation(format!(
                "班级代码重复: {} @ {}",
                code, scope
            )),
            other => other,
        })?;

        self.record(
            ActionLog::new(ActionType::CreateSection, actor)
                .with_scope(&scope)
                .with_section(section.section_id.clone())
                .with_payload(&section)
                .with_detail(format!("创建班级 {} (容量 {})", code, request.capacity)),
        );
        self.events.publish(
            RosterEvent::for_section(
                RosterEventType::SectionCapacityChanged,
                scope,
                section.section_id.clone(),
                0,
            )
            .with_source("RosterApi::create_section"),
        );

        Ok(SectionSummary::from(&section))
    }

    /// UpdateSectionCapacity
    pub fn update_section_capacity(
        &self,
        section_id: &str,
        capacity: i64,
        actor: Option<&str>,
    ) -> ApiResult<SectionSummary> {
        Self::require_id(section_id, "班级ID")?;
        if capacity <= 0 {
            return Err(ApiError::InvalidInput(format!("容量必须为正整数, 实际={}", capacity)));
        }
        let actor = self.actor(actor)?;

        let before = self.query.section(section_id)?;
        let updated = self.section_repo.update_capacity(section_id, capacity)?;

        self.record(
            ActionLog::new(ActionType::UpdateSectionCapacity, actor)
                .with_scope(&updated.scope())
                .with_section(section_id)
                .with_payload(&serde_json::json!({
                    "old_capacity": before.capacity,
                    "new_capacity": updated.capacity,
                    "current_strength": updated.current_strength,
                }))
                .with_detail(format!(
                    "班级 {} 容量 {} → {}",
                    updated.section_code, before.capacity, updated.capacity
                )),
        );
        self.events.publish(
            RosterEvent::for_section(
                RosterEventType::SectionCapacityChanged,
                updated.scope(),
                section_id,
                updated.current_strength,
            )
            .with_source("RosterApi::update_section_capacity"),
        );

        Ok(SectionSummary::from(&updated))
    }

    /// DeleteSection（仍有有效分配时拒绝）
    pub fn delete_section(&self, section_id: &str, actor: Option<&str>) -> ApiResult<SectionSummary> {
        Self::require_id(section_id, "班级ID")?;
        let actor = self.actor(actor)?;

        let deleted = self.section_repo.delete(section_id)?;

        self.record(
            ActionLog::new(ActionType::DeleteSection, actor)
                .with_scope(&deleted.scope())
                .with_section(section_id)
                .with_payload(&deleted)
                .with_detail(format!("删除班级 {}", deleted.section_code)),
        );
        self.events.publish(
            RosterEvent::for_section(
                RosterEventType::SectionCapacityChanged,
                deleted.scope(),
                section_id,
                0,
            )
            .with_source("RosterApi::delete_section"),
        );

        Ok(SectionSummary::from(&deleted))
    }

    // ==========================================
    // 配置
    // ==========================================

    /// GetConfig（含默认值的快照）
    pub fn get_config(&self) -> ApiResult<serde_json::Value> {
        let snapshot = self
            .config
            .get_config_snapshot()
            .map_err(|e| ApiError::InternalError(format!("读取配置失败: {}", e)))?;
        serde_json::from_str(&snapshot)
            .map_err(|e| ApiError::InternalError(format!("配置快照解析失败: {}", e)))
    }

    /// UpdateConfig
    pub fn update_config(
        &self,
        key: &str,
        value: &str,
        actor: Option<&str>,
    ) -> ApiResult<serde_json::Value> {
        Self::require_id(key, "配置键")?;
        let actor = self.actor(actor)?;

        config_keys::validate(key, value).map_err(ApiError::InvalidInput)?;
        let stored = self
            .config
            .update_global_config(key, value)
            .map_err(|e| ApiError::InternalError(format!("写入配置失败: {}", e)))?;

        self.record(
            ActionLog::new(ActionType::UpdateConfig, actor)
                .with_payload(&serde_json::json!({ "key": key, "value": stored }))
                .with_detail(format!("配置 {} = {}", key, stored)),
        );

        Ok(serde_json::json!({ "key": key, "value": stored }))
    }
}
