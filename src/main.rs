// ==========================================
// 学生分班引擎 - 命令行主入口
// ==========================================
// 协议: stdin 每行一个 JSON 请求，stdout 每行一个 JSON 响应
// 日志写 stderr
// ==========================================

use section_roster::app::{get_default_db_path, handle_command, parse_request_line, AppState};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() {
    // 初始化日志系统
    section_roster::logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} v{}", section_roster::APP_NAME, section_roster::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = match AppState::new(db_path) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "AppState初始化失败");
            std::process::exit(1);
        }
    };

    if let Err(e) = serve(&state).await {
        tracing::error!(error = %e, "命令循环异常退出");
        std::process::exit(1);
    }

    tracing::info!("输入结束，退出");
}

/// 逐行处理请求（按到达顺序响应）
async fn serve(state: &AppState) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match parse_request_line(line) {
            Ok(request) => handle_command(state, request).await,
            Err(response) => response,
        };

        let mut out = serde_json::to_string(&response).map_err(std::io::Error::other)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
