// ==========================================
// 学生分班引擎 - 名录字段映射
// ==========================================
// 职责: RawRow → 领域记录；列名支持常见别名
// 约定: 映射失败返回行级原因（由导入器记入 skipped）
// ==========================================

use crate::domain::section::Section;
use crate::domain::student::{Enrollment, Student};
use crate::domain::types::EnrollmentStatus;
use crate::importer::directory_importer_trait::RawRow;

const STUDENT_ID: &[&str] = &["student_id", "studentid", "id"];
const NAME: &[&str] = &["name", "student_name", "full_name"];
const ADMISSION_NUMBER: &[&str] = &["admission_number", "admission_no", "admn_no"];
const ROLL_NO: &[&str] = &["roll_no", "roll_number", "rollno"];
const BATCH_ID: &[&str] = &["batch_id", "batch"];
const SEMESTER_NO: &[&str] = &["semester_no", "semester", "sem"];
const STATUS: &[&str] = &["status", "enrollment_status"];
const SECTION_CODE: &[&str] = &["section_code", "code", "section"];
const SECTION_NAME: &[&str] = &["section_name"];
const CAPACITY: &[&str] = &["capacity", "seats", "max_strength"];

fn field<'a>(row: &'a RawRow, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .find_map(|alias| row.get(*alias))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn required<'a>(row: &'a RawRow, aliases: &[&str]) -> Result<&'a str, String> {
    field(row, aliases).ok_or_else(|| format!("缺少必填字段 {}", aliases[0]))
}

/// 解析正整数（兼容 Excel 数值单元格的 "3.0"）
fn positive_int(raw: &str, name: &str) -> Result<i64, String> {
    let parsed = raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    });
    match parsed {
        Some(v) if v > 0 => Ok(v),
        _ => Err(format!("{} 必须为正整数, 实际={}", name, raw)),
    }
}

/// 学生行映射
pub fn map_student_row(row: &RawRow) -> Result<(Student, Enrollment), String> {
    let student_id = required(row, STUDENT_ID)?.to_string();
    let name = required(row, NAME)?.to_string();
    let admission_number = required(row, ADMISSION_NUMBER)?.to_string();
    let roll_no = required(row, ROLL_NO)?.to_string();
    let batch_id = required(row, BATCH_ID)?.to_string();
    let semester_no = positive_int(required(row, SEMESTER_NO)?, "semester_no")?;

    let status = match field(row, STATUS) {
        None => EnrollmentStatus::Active,
        Some(raw) => EnrollmentStatus::from_db(&raw.to_uppercase())
            .ok_or_else(|| format!("未知注册状态: {}", raw))?,
    };

    Ok((
        Student {
            student_id: student_id.clone(),
            name,
            admission_number,
            roll_no,
        },
        Enrollment {
            student_id,
            batch_id,
            semester_no,
            status,
        },
    ))
}

/// 班级行映射（section_id 由导入器生成）
pub fn map_section_row(row: &RawRow) -> Result<Section, String> {
    let batch_id = required(row, BATCH_ID)?.to_string();
    let semester_no = positive_int(required(row, SEMESTER_NO)?, "semester_no")?;
    let section_code = required(row, SECTION_CODE)?.to_string();
    let section_name = field(row, SECTION_NAME)
        .unwrap_or(section_code.as_str())
        .to_string();
    let capacity = positive_int(required(row, CAPACITY)?, "capacity")?;

    let now = chrono::Local::now().naive_local();
    Ok(Section {
        section_id: uuid::Uuid::new_v4().to_string(),
        batch_id,
        semester_no,
        section_code,
        section_name,
        capacity,
        current_strength: 0,
        created_at: now,
        updated_at: now,
    })
}
