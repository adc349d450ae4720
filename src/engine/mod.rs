// ==========================================
// 学生分班引擎 - 引擎层
// ==========================================
// 职责: 实现分班规则（解析 → 计划 → 落库），不拼 SQL
// 流程: UnassignedResolver → AutoAssignmentPlanner → AssignmentApplier → 仓储
// ==========================================

pub mod assignment_applier;
pub mod auto_assignment_planner;
pub mod events;
pub mod roster_query;
pub mod unassigned_resolver;

// 重导出核心引擎
pub use assignment_applier::{
    ApplyOutcome, AssignmentApplier, CancelFlag, SkipReason, SkippedPlacement,
};
pub use auto_assignment_planner::AutoAssignmentPlanner;
pub use events::{
    NoOpEventPublisher, OptionalEventPublisher, RosterEvent, RosterEventPublisher,
    RosterEventType,
};
pub use roster_query::{RosterQueryService, SectionRoster, SectionSummary};
pub use unassigned_resolver::{natural_cmp, UnassignedResolver};
