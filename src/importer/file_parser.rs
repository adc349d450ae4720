// ==========================================
// 学生分班引擎 - 名录文件解析器
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 表头规范化: 去空白、转小写、空格/连字符 → 下划线
// ==========================================

use crate::importer::directory_importer_trait::{FileParser, RawRow};
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::fs::File;
use std::path::Path;

/// 规范化表头（"Roll No" → "roll_no"）
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

/// 把一行单元格按表头组装为 RawRow；全空行返回 None
fn build_row<I>(headers: &[String], cells: I) -> Option<RawRow>
where
    I: Iterator<Item = String>,
{
    let mut row = RawRow::new();
    for (col_idx, value) in cells.enumerate() {
        if let Some(header) = headers.get(col_idx) {
            if !header.is_empty() {
                row.insert(header.clone(), value.trim().to_string());
            }
        }
    }

    if row.values().all(|v| v.is_empty()) {
        None
    } else {
        Some(row)
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        ensure_exists(file_path)?;

        if let Some(ext) = file_path.extension() {
            if !ext.eq_ignore_ascii_case("csv") {
                return Err(ImportError::UnsupportedFormat(
                    ext.to_string_lossy().to_string(),
                ));
            }
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result?;
            if let Some(row) = build_row(&headers, record.iter().map(str::to_string)) {
                records.push(row);
            }
        }

        Ok(records)
    }
}

// ==========================================
// Excel Parser 实现（读取第一个工作表）
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        ensure_exists(file_path)?;

        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无数据行".to_string()))?;
        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| normalize_header(&cell.to_string()))
            .collect();

        let records = rows
            .filter_map(|data_row| build_row(&headers, data_row.iter().map(|c| c.to_string())))
            .collect();

        Ok(records)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => CsvParser.parse_to_raw_records(file_path),
            "xlsx" | "xls" => ExcelParser.parse_to_raw_records(file_path),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" Roll No "), "roll_no");
        assert_eq!(normalize_header("Admission-Number"), "admission_number");
        assert_eq!(normalize_header("\u{feff}student_id"), "student_id");
    }

    #[test]
    fn test_csv_parser_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "Student ID,Name,Roll No").unwrap();
        writeln!(temp_file, "st-1, Asha ,R1").unwrap();
        writeln!(temp_file, "st-2,Ravi,R2").unwrap();

        let records = CsvParser.parse_to_raw_records(temp_file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("student_id"), Some(&"st-1".to_string()));
        assert_eq!(records[0].get("name"), Some(&"Asha".to_string()));
    }

    #[test]
    fn test_csv_parser_file_not_found() {
        let result = CsvParser.parse_to_raw_records(Path::new("non_existent.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_csv_parser_skip_empty_rows() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "student_id,name").unwrap();
        writeln!(temp_file, "st-1,A").unwrap();
        writeln!(temp_file, ",").unwrap();
        writeln!(temp_file, "st-2,B").unwrap();

        let records = CsvParser.parse_to_raw_records(temp_file.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_universal_parser_rejects_unknown_extension() {
        let temp_file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let result = UniversalFileParser.parse_to_raw_records(temp_file.path());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }
}
