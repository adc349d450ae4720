// ==========================================
// 学生分班引擎 - 应用层
// ==========================================
// 职责: 装配共享状态，提供 JSON 命令入口
// ==========================================

pub mod commands;
pub mod state;

// 重导出
pub use commands::{
    handle_command, map_api_error, parse_request_line, CommandRequest, CommandResponse,
    ErrorResponse,
};
pub use state::{get_default_db_path, AppState};
