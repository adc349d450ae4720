// ==========================================
// 学生分班引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、容量规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod assignment;
pub mod section;
pub mod student;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use assignment::{Assignment, AssignmentPlan, PlacementItem};
pub use section::{SeatCapacity, Section};
pub use student::{Enrollment, Student};
pub use types::{EnrollmentStatus, Provenance, RosterScope, SectionOrder};
