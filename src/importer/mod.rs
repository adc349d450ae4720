// ==========================================
// 学生分班引擎 - 导入层
// ==========================================
// 职责: 外部名录导入（学生、注册记录、班级）
// 支持: Excel, CSV
// ==========================================

// 模块声明
pub mod directory_importer_impl;
pub mod directory_importer_trait;
pub mod error;
pub mod field_mapper;
pub mod file_parser;

// 重导出核心类型
pub use directory_importer_impl::DirectoryImporterImpl;
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, UniversalFileParser};

// 重导出 Trait 接口
pub use directory_importer_trait::{
    DirectoryImportReport, DirectoryImporter, FileParser, ImportKind, RawRow, SkippedRow,
};
