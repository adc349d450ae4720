// ==========================================
// 学生分班引擎 - 日志系统初始化
// ==========================================
// 使用 tracing 和 tracing-subscriber
// 日志一律写 stderr（stdout 留给 JSON 行协议）
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 日志级别过滤器（默认: info）
///   例如: RUST_LOG=debug 或 RUST_LOG=section_roster=trace
/// - SECTION_ROSTER_LOG_FORMAT: `json` 输出结构化日志，其它值为文本
///
/// # 示例
/// ```no_run
/// use section_roster::logging;
/// logging::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("SECTION_ROSTER_LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("日志系统已初始化, 跳过: {}", e);
    }
}
