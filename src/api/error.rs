// ==========================================
// 学生分班引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换Repository错误为用户友好的错误消息
// 红线: InternalConsistencyError 不得降级为普通业务错误
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 分班业务错误
    // ==========================================
    #[error("班级已满: section_id={section_id}, capacity={capacity}")]
    CapacityExceeded { section_id: String, capacity: i64 },

    #[error("学生已有有效分配: student_id={student_id}, assignment_id={existing_assignment_id}")]
    AlreadyAssigned {
        student_id: String,
        existing_assignment_id: String,
    },

    #[error("容量不可低于当前人数: section_id={section_id}, capacity={capacity}, current_strength={current_strength}")]
    CapacityBelowStrength {
        section_id: String,
        capacity: i64,
        current_strength: i64,
    },

    /// 原子性缺陷，必须告警
    #[error("内部一致性错误: {0}")]
    InternalConsistencyError(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("操作已取消: {0}")]
    Cancelled(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 稳定错误码（供 JSON 命令层返回）
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            ApiError::AlreadyAssigned { .. } => "ALREADY_ASSIGNED",
            ApiError::CapacityBelowStrength { .. } => "CAPACITY_BELOW_STRENGTH",
            ApiError::InternalConsistencyError(_) => "INTERNAL_CONSISTENCY_ERROR",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::Cancelled(_) => "CANCELLED",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::DatabaseConnectionError(_) => "DATABASE_CONNECTION_ERROR",
            ApiError::DatabaseTransactionError(_) => "DATABASE_TRANSACTION_ERROR",
            ApiError::ImportError(_) => "IMPORT_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将Repository层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 分班业务错误
            RepositoryError::CapacityExceeded {
                section_id,
                capacity,
            } => ApiError::CapacityExceeded {
                section_id,
                capacity,
            },
            RepositoryError::AlreadyAssigned {
                student_id,
                existing_assignment_id,
                ..
            } => ApiError::AlreadyAssigned {
                student_id,
                existing_assignment_id,
            },
            RepositoryError::CapacityBelowStrength {
                section_id,
                capacity,
                current_strength,
            } => ApiError::CapacityBelowStrength {
                section_id,
                capacity,
                current_strength,
            },
            RepositoryError::InternalConsistency(msg) => ApiError::InternalConsistencyError(msg),

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 业务规则错误
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "Section".to_string(),
            id: "sec-1".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Section"));
                assert!(msg.contains("sec-1"));
            }
            _ => panic!("Expected NotFound"),
        }

        let api_err: ApiError = RepositoryError::CapacityExceeded {
            section_id: "sec-1".to_string(),
            capacity: 30,
        }
        .into();
        assert_eq!(api_err.code(), "CAPACITY_EXCEEDED");
    }

    #[test]
    fn test_consistency_error_is_never_downgraded() {
        let api_err: ApiError =
            RepositoryError::InternalConsistency("strength=31 capacity=30".to_string()).into();
        assert!(matches!(api_err, ApiError::InternalConsistencyError(_)));
        assert_eq!(api_err.code(), "INTERNAL_CONSISTENCY_ERROR");
    }

    #[test]
    fn test_already_assigned_keeps_existing_id() {
        let api_err: ApiError = RepositoryError::AlreadyAssigned {
            student_id: "st-1".to_string(),
            batch_id: "2024".to_string(),
            semester_no: 1,
            existing_assignment_id: "asg-1".to_string(),
        }
        .into();
        match api_err {
            ApiError::AlreadyAssigned {
                existing_assignment_id,
                ..
            } => assert_eq!(existing_assignment_id, "asg-1"),
            _ => panic!("Expected AlreadyAssigned"),
        }
    }
}
