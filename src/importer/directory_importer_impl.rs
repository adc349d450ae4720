// ==========================================
// 学生分班引擎 - 名录导入实现
// ==========================================
// 流程: 解析文件 → 字段映射（行级校验）→ 文件内去重 → 单事务落库
// 红线: 导入只写名录与班级，不触碰分配台账
// ==========================================

use crate::importer::directory_importer_trait::{
    DirectoryImportReport, DirectoryImporter, FileParser, ImportKind, SkippedRow,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::{map_section_row, map_student_row};
use crate::importer::file_parser::UniversalFileParser;
use crate::repository::{SectionRepository, SectionUpsert, StudentRepository};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// 数据行号（第 1 行为表头）
fn data_row_number(idx: usize) -> usize {
    idx + 2
}

// ==========================================
// DirectoryImporterImpl
// ==========================================
pub struct DirectoryImporterImpl {
    student_repo: Arc<StudentRepository>,
    section_repo: Arc<SectionRepository>,
    file_parser: Box<dyn FileParser>,
}

impl DirectoryImporterImpl {
    pub fn new(student_repo: Arc<StudentRepository>, section_repo: Arc<SectionRepository>) -> Self {
        Self {
            student_repo,
            section_repo,
            file_parser: Box::new(UniversalFileParser),
        }
    }

    /// 替换文件解析器（测试或自定义格式）
    pub fn with_parser(mut self, parser: Box<dyn FileParser>) -> Self {
        self.file_parser = parser;
        self
    }

    fn report(
        kind: ImportKind,
        file_path: &Path,
        total_rows: usize,
        imported: usize,
        mut skipped: Vec<SkippedRow>,
        start: Instant,
    ) -> DirectoryImportReport {
        skipped.sort_by_key(|s| s.row);
        DirectoryImportReport {
            import_id: uuid::Uuid::new_v4().to_string(),
            kind,
            file_path: file_path.display().to_string(),
            total_rows,
            imported,
            skipped,
            elapsed_ms: start.elapsed().as_millis() as i64,
        }
    }

    async fn import_one(&self, kind: ImportKind, path: &Path) -> ImportResult<DirectoryImportReport> {
        match kind {
            ImportKind::Students => self.import_students(path).await,
            ImportKind::Sections => self.import_sections(path).await,
        }
    }
}

#[async_trait]
impl DirectoryImporter for DirectoryImporterImpl {
    #[instrument(skip(self), fields(file = %file_path.display()))]
    async fn import_students(&self, file_path: &Path) -> ImportResult<DirectoryImportReport> {
        let start = Instant::now();
        info!("开始导入学生名录");

        let raw_rows = self.file_parser.parse_to_raw_records(file_path).map_err(|e| {
            error!(error = %e, "文件解析失败");
            e
        })?;

        let mut skipped = Vec::new();
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(raw_rows.len());

        for (idx, raw) in raw_rows.iter().enumerate() {
            let row = data_row_number(idx);
            match map_student_row(raw) {
                Ok((student, enrollment)) => {
                    let key = (
                        student.student_id.clone(),
                        enrollment.batch_id.clone(),
                        enrollment.semester_no,
                    );
                    if !seen.insert(key) {
                        skipped.push(SkippedRow {
                            row,
                            reason: format!("文件内重复: student_id={}", student.student_id),
                        });
                        continue;
                    }
                    rows.push((student, enrollment));
                }
                Err(reason) => skipped.push(SkippedRow { row, reason }),
            }
        }

        let imported = self.student_repo.upsert_batch(&rows)?;

        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), "部分行未导入");
        }
        info!(total = raw_rows.len(), imported, "学生名录导入完成");

        Ok(Self::report(
            ImportKind::Students,
            file_path,
            raw_rows.len(),
            imported,
            skipped,
            start,
        ))
    }

    #[instrument(skip(self), fields(file = %file_path.display()))]
    async fn import_sections(&self, file_path: &Path) -> ImportResult<DirectoryImportReport> {
        let start = Instant::now();
        info!("开始导入班级");

        let raw_rows = self.file_parser.parse_to_raw_records(file_path).map_err(|e| {
            error!(error = %e, "文件解析失败");
            e
        })?;

        let mut skipped = Vec::new();
        let mut seen = HashSet::new();
        let mut sections = Vec::new();
        let mut section_rows = Vec::new();

        for (idx, raw) in raw_rows.iter().enumerate() {
            let row = data_row_number(idx);
            match map_section_row(raw) {
                Ok(section) => {
                    let key = (
                        section.batch_id.clone(),
                        section.semester_no,
                        section.section_code.clone(),
                    );
                    if !seen.insert(key) {
                        skipped.push(SkippedRow {
                            row,
                            reason: format!("文件内重复: section_code={}", section.section_code),
                        });
                        continue;
                    }
                    section_rows.push(row);
                    sections.push(section);
                }
                Err(reason) => skipped.push(SkippedRow { row, reason }),
            }
        }

        let outcomes = self.section_repo.upsert_batch(&sections)?;
        if outcomes.len() != sections.len() {
            return Err(ImportError::InternalError(format!(
                "班级写入结果数量不一致: {} vs {}",
                outcomes.len(),
                sections.len()
            )));
        }

        let mut imported = 0;
        for ((outcome, section), row) in outcomes.iter().zip(&sections).zip(section_rows) {
            match outcome {
                SectionUpsert::Inserted | SectionUpsert::Updated => imported += 1,
                SectionUpsert::RejectedBelowStrength => skipped.push(SkippedRow {
                    row,
                    reason: format!(
                        "容量 {} 低于班级 {} 当前人数，保持原容量",
                        section.capacity, section.section_code
                    ),
                }),
            }
        }

        info!(total = raw_rows.len(), imported, skipped = skipped.len(), "班级导入完成");

        Ok(Self::report(
            ImportKind::Sections,
            file_path,
            raw_rows.len(),
            imported,
            skipped,
            start,
        ))
    }

    async fn batch_import(
        &self,
        files: Vec<(ImportKind, PathBuf)>,
    ) -> Vec<Result<DirectoryImportReport, String>> {
        use futures::future::join_all;

        info!(count = files.len(), "开始批量导入文件");

        let tasks = files.into_iter().map(|(kind, path)| async move {
            let path_str = path.display().to_string();
            match self.import_one(kind, &path).await {
                Ok(report) => {
                    info!(file = %path_str, imported = report.imported, "文件导入成功");
                    Ok(report)
                }
                Err(e) => {
                    error!(file = %path_str, error = %e, "文件导入失败");
                    Err(format!("文件 {} 导入失败: {}", path_str, e))
                }
            }
        });

        let results = join_all(tasks).await;

        info!(
            total = results.len(),
            success = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "批量导入完成"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{RosterScope, SectionOrder};
    use rusqlite::Connection;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    fn setup() -> (DirectoryImporterImpl, Arc<StudentRepository>, Arc<SectionRepository>) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let student_repo = Arc::new(StudentRepository::new(conn.clone()));
        let section_repo = Arc::new(SectionRepository::new(conn));
        (
            DirectoryImporterImpl::new(student_repo.clone(), section_repo.clone()),
            student_repo,
            section_repo,
        )
    }

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_import_students_skips_bad_and_duplicate_rows() {
        let (importer, student_repo, _) = setup();
        let file = csv_file(
            "student_id,name,admission_number,roll_no,batch_id,semester_no\n\
             st-1,Asha,ADM-1,R1,2024,1\n\
             st-2,Ben,ADM-2,R2,2024,x\n\
             st-1,Asha Again,ADM-1,R1,2024,1\n\
             st-3,Chen,ADM-3,R3,2024,1\n",
        );

        let report = importer.import_students(file.path()).await.unwrap();
        assert_eq!(report.kind, ImportKind::Students);
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.imported, 2);
        assert_eq!(
            report.skipped.iter().map(|s| s.row).collect::<Vec<_>>(),
            vec![3, 4]
        );

        let scope = RosterScope::new("2024", 1);
        assert_eq!(student_repo.list_unassigned(&scope).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_import_sections_then_reimport_updates_capacity() {
        let (importer, _, section_repo) = setup();
        let first = csv_file("batch_id,semester_no,section_code,capacity\n2024,1,A,30\n2024,1,B,25\n");
        let report = importer.import_sections(first.path()).await.unwrap();
        assert_eq!(report.imported, 2);

        let second = csv_file("batch_id,semester_no,section_code,capacity\n2024,1,A,40\n");
        let report = importer.import_sections(second.path()).await.unwrap();
        assert_eq!(report.imported, 1);
        assert!(report.skipped.is_empty());

        let scope = RosterScope::new("2024", 1);
        let sections = section_repo.list_by_scope(&scope, SectionOrder::CodeAsc).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section_code, "A");
        assert_eq!(sections[0].capacity, 40);
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let (importer, _, _) = setup();
        let result = importer
            .import_students(Path::new("/nonexistent/students.csv"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_batch_import_reports_each_file() {
        let (importer, _, _) = setup();
        let sections = csv_file("batch_id,semester_no,section_code,capacity\n2024,1,A,30\n");
        let results = importer
            .batch_import(vec![
                (ImportKind::Sections, sections.path().to_path_buf()),
                (ImportKind::Students, PathBuf::from("/nonexistent/students.csv")),
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
