// ==========================================
// 学生分班引擎 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供 JSON 命令层调用
// ==========================================

pub mod error;
pub mod import_api;
pub mod roster_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{BatchImportItem, ImportApi, ImportFileRequest};
pub use roster_api::{
    AssignmentResponse, AutoAssignResponse, CreateSectionRequest, PreviewAutoAssignResponse,
    RemoveAssignmentResponse, RosterApi, RosterStudentDto, SectionRosterResponse,
    UnassignedCountResponse,
};
