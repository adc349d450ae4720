// ==========================================
// 学生分班引擎 - 名录导入 API
// ==========================================
// 职责: 封装学生/班级名录导入，记录审计日志并发布事件
// 红线: 导入不修改分配台账，也不改变 current_strength
// ==========================================

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, RosterConfigReader};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::engine::{OptionalEventPublisher, RosterEvent, RosterEventType};
use crate::importer::{
    DirectoryImportReport, DirectoryImporter, DirectoryImporterImpl, ImportError, ImportKind,
};
use crate::repository::{ActionLogRepository, SectionRepository, StudentRepository};

/// 批量导入中单个文件的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchImportItem {
    pub file_path: String,
    pub report: Option<DirectoryImportReport>,
    pub error: Option<String>,
}

/// 批量导入请求中的单个文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportFileRequest {
    pub kind: ImportKind,
    pub file_path: String,
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::FileNotFound(path) => ApiError::NotFound(format!("文件不存在: {}", path)),
            ImportError::UnsupportedFormat(fmt) => {
                ApiError::InvalidInput(format!("不支持的文件格式: {}", fmt))
            }
            ImportError::Repository(e) => ApiError::from(e),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

// ==========================================
// ImportApi
// ==========================================
pub struct ImportApi {
    importer: DirectoryImporterImpl,
    action_log_repo: Arc<ActionLogRepository>,
    config: Arc<ConfigManager>,
    events: OptionalEventPublisher,
}

impl ImportApi {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        config: Arc<ConfigManager>,
        events: OptionalEventPublisher,
    ) -> Self {
        let student_repo = Arc::new(StudentRepository::new(conn.clone()));
        let section_repo = Arc::new(SectionRepository::new(conn.clone()));
        Self {
            importer: DirectoryImporterImpl::new(student_repo, section_repo),
            action_log_repo: Arc::new(ActionLogRepository::new(conn)),
            config,
            events,
        }
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

    fn require_path(file_path: &str) -> ApiResult<&Path> {
        if file_path.trim().is_empty() {
            return Err(ApiError::InvalidInput("文件路径不能为空".to_string()));
        }
        Ok(Path::new(file_path))
    }

    /// 审计 + 事件（导入已提交，失败只告警）
    fn record(&self, report: &DirectoryImportReport, actor: &str) {
        let log = ActionLog::new(ActionType::ImportDirectory, actor)
            .with_payload(&serde_json::json!({
                "import_id": report.import_id,
                "kind": report.kind,
                "file_path": report.file_path,
                "total_rows": report.total_rows,
                "imported": report.imported,
                "skipped": report.skipped,
            }))
            .with_detail(format!(
                "导入{}: {} 行，成功 {}，跳过 {}",
                report.kind.as_str(),
                report.total_rows,
                report.imported,
                report.skipped.len()
            ));
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!(import_id = %report.import_id, error = %e, "导入日志写入失败");
        }

        self.events.publish(
            RosterEvent::new(RosterEventType::DirectoryImported, None)
                .with_source(format!("ImportApi::{}", report.kind.as_str())),
        );
    }

    /// ImportStudents
    pub async fn import_students(
        &self,
        file_path: &str,
        actor: Option<&str>,
    ) -> ApiResult<DirectoryImportReport> {
        let path = Self::require_path(file_path)?;
        let actor = self.actor(actor)?;
        let report = self.importer.import_students(path).await?;
        self.record(&report, &actor);
        Ok(report)
    }

    /// ImportSections
    pub async fn import_sections(
        &self,
        file_path: &str,
        actor: Option<&str>,
    ) -> ApiResult<DirectoryImportReport> {
        let path = Self::require_path(file_path)?;
        let actor = self.actor(actor)?;
        let report = self.importer.import_sections(path).await?;
        self.record(&report, &actor);
        Ok(report)
    }

    /// 批量导入（单个文件失败不影响其它文件）
    pub async fn batch_import(
        &self,
        files: Vec<ImportFileRequest>,
        actor: Option<&str>,
    ) -> ApiResult<Vec<BatchImportItem>> {
        if files.is_empty() {
            return Err(ApiError::InvalidInput("导入文件列表不能为空".to_string()));
        }
        let actor = self.actor(actor)?;

        let paths: Vec<String> = files.iter().map(|f| f.file_path.clone()).collect();
        let results = self
            .importer
            .batch_import(
                files
                    .into_iter()
                    .map(|f| (f.kind, PathBuf::from(f.file_path)))
                    .collect(),
            )
            .await;

        let mut items = Vec::with_capacity(results.len());
        for (file_path, result) in paths.into_iter().zip(results) {
            match result {
                Ok(report) => {
                    self.record(&report, &actor);
                    items.push(BatchImportItem {
                        file_path,
                        report: Some(report),
                        error: None,
                    });
                }
                Err(error) => items.push(BatchImportItem {
                    file_path,
                    report: None,
                    error: Some(error),
                }),
            }
        }
        Ok(items)
    }
}
