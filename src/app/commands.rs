// ==========================================
// 学生分班引擎 - JSON 命令层
// ==========================================
// 协议: 每行一个请求 {id, method, params} → 每行一个响应 {id, ok, result | error}
// 职责: 参数解析、错误映射、阻塞调用移出异步运行时
// ==========================================

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::{ApiError, ApiResult};
use crate::api::{CreateSectionRequest, ImportFileRequest};
use crate::app::state::AppState;
use crate::perf::PerfGuard;

// ==========================================
// 请求 / 响应
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// 调用方关联ID，原样返回
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// 错误响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,

    /// 错误消息
    pub message: String,

    /// 详细信息（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl CommandResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, error: ErrorResponse) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}

/// 将ApiError转换为错误响应
pub fn map_api_error(err: &ApiError) -> ErrorResponse {
    let details = match err {
        ApiError::CapacityExceeded {
            section_id,
            capacity,
        } => Some(serde_json::json!({
            "section_id": section_id,
            "capacity": capacity,
        })),
        ApiError::AlreadyAssigned {
            student_id,
            existing_assignment_id,
        } => Some(serde_json::json!({
            "student_id": student_id,
            "existing_assignment_id": existing_assignment_id,
        })),
        ApiError::CapacityBelowStrength {
            section_id,
            capacity,
            current_strength,
        } => Some(serde_json::json!({
            "section_id": section_id,
            "capacity": capacity,
            "current_strength": current_strength,
        })),
        _ => None,
    };

    ErrorResponse {
        code: err.code().to_string(),
        message: err.to_string(),
        details,
    }
}

/// 解析一行请求；格式错误时直接给出错误响应
pub fn parse_request_line(line: &str) -> Result<CommandRequest, CommandResponse> {
    serde_json::from_str::<CommandRequest>(line).map_err(|e| {
        CommandResponse::failure(
            Value::Null,
            ErrorResponse {
                code: "INVALID_REQUEST".to_string(),
                message: format!("请求格式错误: {}", e),
                details: None,
            },
        )
    })
}

// ==========================================
// 参数结构
// ==========================================

#[derive(Debug, Deserialize)]
struct ScopeParams {
    batch_id: String,
    semester_no: i64,
}

#[derive(Debug, Deserialize)]
struct AutoAssignParams {
    batch_id: String,
    semester_no: i64,
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SectionIdParams {
    section_id: String,
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StudentIdParams {
    student_id: String,
}

#[derive(Debug, Deserialize)]
struct ManualAssignParams {
    student_id: String,
    section_id: String,
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoveAssignmentParams {
    assignment_id: String,
    actor: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateSectionParams {
    #[serde(flatten)]
    request: CreateSectionRequest,
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateCapacityParams {
    section_id: String,
    capacity: i64,
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionLogParams {
    batch_id: String,
    semester_no: i64,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SectionActionLogParams {
    section_id: String,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UpdateConfigParams {
    key: String,
    value: String,
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImportParams {
    file_path: String,
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchImportParams {
    files: Vec<ImportFileRequest>,
    actor: Option<String>,
}

fn parse_params<T: DeserializeOwned>(params: Value) -> ApiResult<T> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| ApiError::InvalidInput(format!("参数错误: {}", e)))
}

fn to_json<T: Serialize>(value: T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::InternalError(format!("序列化失败: {}", e)))
}

/// 在阻塞线程池中执行同步 API 调用
async fn run_blocking<T, F>(op: &'static str, f: F) -> ApiResult<Value>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let _perf = PerfGuard::new(op);
        f()
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("任务执行失败: {}", e)))??;
    to_json(result)
}

// ==========================================
// 命令分发
// ==========================================

/// 处理单个命令
pub async fn handle_command(state: &AppState, request: CommandRequest) -> CommandResponse {
    let CommandRequest { id, method, params } = request;
    tracing::debug!(method = %method, "收到命令");

    match dispatch(state, &method, params).await {
        Ok(result) => CommandResponse::success(id, result),
        Err(err) => {
            match &err {
                ApiError::InternalConsistencyError(_) => {
                    tracing::error!(method = %method, error = %err, "命令失败: 内部一致性错误")
                }
                _ => tracing::info!(method = %method, code = err.code(), "命令返回业务错误"),
            }
            CommandResponse::failure(id, map_api_error(&err))
        }
    }
}

async fn dispatch(state: &AppState, method: &str, params: Value) -> ApiResult<Value> {
    let roster = Arc::clone(&state.roster_api);

    match method {
        "ping" => to_json(serde_json::json!({
            "name": crate::APP_NAME,
            "version": crate::VERSION,
        })),

        // ===== 查询 =====
        "get_unassigned_count" => {
            let p: ScopeParams = parse_params(params)?;
            run_blocking("cmd.get_unassigned_count", move || {
                roster.get_unassigned_count(&p.batch_id, p.semester_no)
            })
            .await
        }
        "list_unassigned_students" => {
            let p: ScopeParams = parse_params(params)?;
            run_blocking("cmd.list_unassigned_students", move || {
                roster.list_unassigned_students(&p.batch_id, p.semester_no)
            })
            .await
        }
        "get_section_roster" => {
            let p: SectionIdParams = parse_params(params)?;
            run_blocking("cmd.get_section_roster", move || {
                roster.get_section_roster(&p.section_id)
            })
            .await
        }
        "list_sections" => {
            let p: ScopeParams = parse_params(params)?;
            run_blocking("cmd.list_sections", move || {
                roster.list_sections(&p.batch_id, p.semester_no)
            })
            .await
        }
        "list_student_assignment_history" => {
            let p: StudentIdParams = parse_params(params)?;
            run_blocking("cmd.list_student_assignment_history", move || {
                roster.list_student_assignment_history(&p.student_id)
            })
            .await
        }
        "list_action_logs" => {
            let p: ActionLogParams = parse_params(params)?;
            run_blocking("cmd.list_action_logs", move || {
                roster.list_action_logs(&p.batch_id, p.semester_no, p.limit)
            })
            .await
        }
        "list_section_action_logs" => {
            let p: SectionActionLogParams = parse_params(params)?;
            run_blocking("cmd.list_section_action_logs", move || {
                roster.list_section_action_logs(&p.section_id, p.limit)
            })
            .await
        }

        // ===== 自动分班 =====
        "preview_auto_assign" => {
            let p: ScopeParams = parse_params(params)?;
            run_blocking("cmd.preview_auto_assign", move || {
                roster.preview_auto_assign(&p.batch_id, p.semester_no)
            })
            .await
        }
        "auto_assign" => {
            let p: AutoAssignParams = parse_params(params)?;
            run_blocking("cmd.auto_assign", move || {
                roster.auto_assign(&p.batch_id, p.semester_no, p.actor.as_deref())
            })
            .await
        }

        // ===== 人工分配 =====
        "create_manual_assignment" => {
            let p: ManualAssignParams = parse_params(params)?;
            run_blocking("cmd.create_manual_assignment", move || {
                roster.create_manual_assignment(&p.student_id, &p.section_id, p.actor.as_deref())
            })
            .await
        }
        "remove_assignment" => {
            let p: RemoveAssignmentParams = parse_params(params)?;
            run_blocking("cmd.remove_assignment", move || {
                roster.remove_assignment(&p.assignment_id, p.actor.as_deref(), p.reason.as_deref())
            })
            .await
        }

        // ===== 班级管理 =====
        "create_section" => {
            let p: CreateSectionParams = parse_params(params)?;
            run_blocking("cmd.create_section", move || {
                roster.create_section(p.request, p.actor.as_deref())
            })
            .await
        }
        "update_section_capacity" => {
            let p: UpdateCapacityParams = parse_params(params)?;
            run_blocking("cmd.update_section_capacity", move || {
                roster.update_section_capacity(&p.section_id, p.capacity, p.actor.as_deref())
            })
            .await
        }
        "delete_section" => {
            let p: SectionIdParams = parse_params(params)?;
            run_blocking("cmd.delete_section", move || {
                roster.delete_section(&p.section_id, p.actor.as_deref())
            })
            .await
        }

        // ===== 配置 =====
        "get_config" => run_blocking("cmd.get_config", move || roster.get_config()).await,
        "update_config" => {
            let p: UpdateConfigParams = parse_params(params)?;
            run_blocking("cmd.update_config", move || {
                roster.update_config(&p.key, &p.value, p.actor.as_deref())
            })
            .await
        }

        // ===== 名录导入 =====
        "import_students" => {
            let p: ImportParams = parse_params(params)?;
            let _perf = PerfGuard::new("cmd.import_students");
            to_json(
                state
                    .import_api
                    .import_students(&p.file_path, p.actor.as_deref())
                    .await?,
            )
        }
        "import_sections" => {
            let p: ImportParams = parse_params(params)?;
            let _perf = PerfGuard::new("cmd.import_sections");
            to_json(
                state
                    .import_api
                    .import_sections(&p.file_path, p.actor.as_deref())
                    .await?,
            )
        }
        "batch_import" => {
            let p: BatchImportParams = parse_params(params)?;
            let _perf = PerfGuard::new("cmd.batch_import");
            to_json(
                state
                    .import_api
                    .batch_import(p.files, p.actor.as_deref())
                    .await?,
            )
        }

        other => Err(ApiError::InvalidInput(format!("未知命令: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_api_error_includes_details() {
        let err = ApiError::CapacityExceeded {
            section_id: "sec-1".to_string(),
            capacity: 30,
        };
        let resp = map_api_error(&err);
        assert_eq!(resp.code, "CAPACITY_EXCEEDED");
        assert_eq!(resp.details.unwrap()["capacity"], 30);

        let resp = map_api_error(&ApiError::NotFound("Section(id=x)不存在".to_string()));
        assert_eq!(resp.code, "NOT_FOUND");
        assert!(resp.details.is_none());
    }

    #[test]
    fn test_parse_request_line_rejects_garbage() {
        let resp = parse_request_line("not json").unwrap_err();
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().code, "INVALID_REQUEST");

        let req = parse_request_line(r#"{"id":7,"method":"ping"}"#).unwrap();
        assert_eq!(req.id, serde_json::json!(7));
        assert!(req.params.is_null());
    }

    #[test]
    fn test_parse_params_missing_field_is_invalid_input() {
        let err = parse_params::<ScopeParams>(serde_json::json!({ "batch_id": "2024" }))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
