// ==========================================
// 学生分班引擎 - 名单查询服务
// ==========================================
// 职责: 班级名单、班级列表、未分班计数（纯读）
// 红线: 不缓存 current_strength，每次读库
// ==========================================

use crate::domain::section::{SeatCapacity, Section};
use crate::domain::types::{RosterScope, SectionOrder};
use crate::engine::unassigned_resolver::UnassignedResolver;
use crate::repository::{
    AssignmentRepository, RepositoryError, RepositoryResult, RosterOccupant, SectionRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 班级名单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRoster {
    pub section: Section,
    pub occupants: Vec<RosterOccupant>,
}

/// 班级列表条目（含剩余座位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section_id: String,
    pub section_code: String,
    pub section_name: String,
    pub capacity: i64,
    pub current_strength: i64,
    pub remaining_seats: i64,
}

impl From<&Section> for SectionSummary {
    fn from(section: &Section) -> Self {
        Self {
            section_id: section.section_id.clone(),
            section_code: section.section_code.clone(),
            section_name: section.section_name.clone(),
            capacity: section.capacity,
            current_strength: section.current_strength,
            remaining_seats: section.remaining_seats(),
        }
    }
}

// ==========================================
// RosterQueryService
// ==========================================
pub struct RosterQueryService {
    section_repo: Arc<SectionRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    resolver: Arc<UnassignedResolver>,
}

impl RosterQueryService {
    pub fn new(
        section_repo: Arc<SectionRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        resolver: Arc<UnassignedResolver>,
    ) -> Self {
        Self {
            section_repo,
            assignment_repo,
            resolver,
        }
    }

    /// 班级名单（占用者按分配时间排序）
    pub fn section_roster(&self, section_id: &str) -> RepositoryResult<SectionRoster> {
        let section = self
            .section_repo
            .find_by_id(section_id)?
            .ok_or_else(|| RepositoryError::not_found("Section", section_id))?;
        let occupants = self.assignment_repo.list_occupants(section_id)?;

        tracing::debug!(
            section_id = %section_id,
            current_strength = section.current_strength,
            occupants = occupants.len(),
            "班级名单查询"
        );
        Ok(SectionRoster { section, occupants })
    }

    /// 作用域内未分班学生数
    pub fn unassigned_count(&self, scope: &RosterScope) -> RepositoryResult<usize> {
        self.resolver.count(scope)
    }

    /// 作用域内班级列表
    pub fn list_sections(
        &self,
        scope: &RosterScope,
        order: SectionOrder,
    ) -> RepositoryResult<Vec<SectionSummary>> {
        let sections = self.section_repo.list_by_scope(scope, order)?;
        Ok(sections.iter().map(SectionSummary::from).collect())
    }

    /// 单个班级当前状态
    pub fn section(&self, section_id: &str) -> RepositoryResult<Section> {
        self.section_repo
            .find_by_id(section_id)?
            .ok_or_else(|| RepositoryError::not_found("Section", section_id))
    }
}
