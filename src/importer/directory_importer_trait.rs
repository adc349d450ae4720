// ==========================================
// 学生分班引擎 - 名录导入 Trait
// ==========================================
// 职责: 定义名录导入接口（不包含实现）
// ==========================================

use crate::importer::error::ImportResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 原始行记录（规范化列名 → 值）
pub type RawRow = HashMap<String, String>;

/// 导入对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportKind {
    Students,
    Sections,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Students => "STUDENTS",
            ImportKind::Sections => "SECTIONS",
        }
    }
}

/// 被跳过的行（行号从 2 起算，第 1 行为表头）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}

/// 单个文件的导入报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryImportReport {
    pub import_id: String,
    pub kind: ImportKind,
    pub file_path: String,
    pub total_rows: usize,
    pub imported: usize,
    pub skipped: Vec<SkippedRow>,
    pub elapsed_ms: i64,
}

// ==========================================
// DirectoryImporter Trait
// ==========================================
// 实现者: DirectoryImporterImpl
#[async_trait]
pub trait DirectoryImporter: Send + Sync {
    /// 导入学生名录及注册记录
    ///
    /// 必填列: student_id, name, admission_number, roll_no, batch_id, semester_no
    /// 可选列: status (ACTIVE / WITHDRAWN)
    async fn import_students(&self, file_path: &Path) -> ImportResult<DirectoryImportReport>;

    /// 导入班级
    ///
    /// 必填列: batch_id, semester_no, section_code, capacity
    /// 可选列: section_name
    async fn import_sections(&self, file_path: &Path) -> ImportResult<DirectoryImportReport>;

    /// 批量导入多个文件（并发执行，互不影响）
    async fn batch_import(
        &self,
        files: Vec<(ImportKind, PathBuf)>,
    ) -> Vec<Result<DirectoryImportReport, String>>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 实现者: CsvParser, ExcelParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 解析文件为原始行记录（跳过全空行）
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>>;
}
