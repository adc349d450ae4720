// ==========================================
// 学生分班引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 教务后台的分班与班级容量台账
// 红线: 任何时刻 0 <= current_strength <= capacity，且等于有效分配数
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 分班规则
pub mod engine;

// 导入层 - 外部名录
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 性能统计（SQL 计数/慢查询）
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - JSON 命令入口
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{EnrollmentStatus, Provenance, RosterScope, SectionOrder};

// 领域实体
pub use domain::{ActionLog, ActionType, Assignment, AssignmentPlan, Enrollment, Section, Student};

// 引擎
pub use engine::{AssignmentApplier, AutoAssignmentPlanner, RosterQueryService, UnassignedResolver};

// API
pub use api::{ApiError, ApiResult, ImportApi, RosterApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "学生分班引擎";
