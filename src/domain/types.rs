// ==========================================
// 学生分班引擎 - 领域类型定义
// ==========================================
// 红线: 来源 (AUTO/MANUAL) 是枚举判别，不是自由文本
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 分配来源 (Provenance)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    Auto,   // 自动分班
    Manual, // 人工分班
}

impl Provenance {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Auto => "AUTO",
            Provenance::Manual => "MANUAL",
        }
    }

    /// 从数据库字符串解析
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "AUTO" => Some(Provenance::Auto),
            "MANUAL" => Some(Provenance::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 班级轮转顺序 (Section Order)
// ==========================================
// 自动分班时班级游标的稳定顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionOrder {
    #[default]
    CodeAsc,    // 按班级代码升序
    CreatedAsc, // 按创建时间升序
}

impl SectionOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionOrder::CodeAsc => "CODE_ASC",
            SectionOrder::CreatedAsc => "CREATED_ASC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "CODE_ASC" => Some(SectionOrder::CodeAsc),
            "CREATED_ASC" => Some(SectionOrder::CreatedAsc),
            _ => None,
        }
    }
}

impl fmt::Display for SectionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 在读状态 (Enrollment Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,    // 在读
    Withdrawn, // 退学/转出
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "ACTIVE",
            EnrollmentStatus::Withdrawn => "WITHDRAWN",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "ACTIVE" => Some(EnrollmentStatus::Active),
            "WITHDRAWN" => Some(EnrollmentStatus::Withdrawn),
            _ => None,
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 作用域 (Batch + Semester)
// ==========================================
// 一次规划/落库周期内视为不可变输入
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RosterScope {
    pub batch_id: String,
    pub semester_no: i64,
}

impl RosterScope {
    pub fn new(batch_id: impl Into<String>, semester_no: i64) -> Self {
        Self {
            batch_id: batch_id.into(),
            semester_no,
        }
    }
}

impl fmt::Display for RosterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/S{}", self.batch_id, self.semester_no)
    }
}
