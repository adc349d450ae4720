// ==========================================
// 学生分班引擎 - 学生名录领域模型
// ==========================================
// 来源: 外部教务名录（引擎只读）
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::EnrollmentStatus;

/// 学生（已在某年级学期注册）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,       // 学生ID
    pub name: String,             // 姓名
    pub admission_number: String, // 录取号
    pub roll_no: String,          // 学号（决定自动分班的公平顺序）
}

/// 学生在某作用域下的注册记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: String,
    pub batch_id: String,
    pub semester_no: i64,
    pub status: EnrollmentStatus,
}
