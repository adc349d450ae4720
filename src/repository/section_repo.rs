// ==========================================
// 学生分班引擎 - 班级数据仓储
// ==========================================
// 红线: 容量调整只能通过条件更新（不得低于当前人数）
// ==========================================

use crate::domain::section::Section;
use crate::domain::types::{RosterScope, SectionOrder};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{format_ts, ts_column};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::{Arc, Mutex};

const SECTION_COLUMNS: &str = r#"
    section_id, batch_id, semester_no, section_code, section_name,
    capacity, current_strength, created_at, updated_at
"#;

/// 批量导入班级时单行的落库结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionUpsert {
    Inserted,
    Updated,
    /// 新容量低于当前人数，保持原值
    RejectedBelowStrength,
}

// ==========================================
// SectionRepository - 班级仓储
// ==========================================
pub struct SectionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SectionRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub(crate) fn map_row(row: &Row<'_>) -> rusqlite::Result<Section> {
        Ok(Section {
            section_id: row.get(0)?,
            batch_id: row.get(1)?,
            semester_no: row.get(2)?,
            section_code: row.get(3)?,
            section_name: row.get(4)?,
            capacity: row.get(5)?,
            current_strength: row.get(6)?,
            created_at: ts_column(row, 7)?,
            updated_at: ts_column(row, 8)?,
        })
    }

    /// 在给定连接/事务上读取班级（供分配事务内复用）
    pub(crate) fn find_on(conn: &Connection, section_id: &str) -> RepositoryResult<Option<Section>> {
        let sql = format!("SELECT {} FROM section WHERE section_id = ?1", SECTION_COLUMNS);
        let section = conn
            .query_row(&sql, params![section_id], Self::map_row)
            .optional()?;
        Ok(section)
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 创建班级（教务初始化）
    ///
    /// # 返回
    /// - Ok(()): 成功
    /// - Err(UniqueConstraintViolation): 同作用域班级代码重复
    pub fn create(&self, section: &Section) -> RepositoryResult<()> {
        if section.capacity <= 0 {
            return Err(RepositoryError::FieldValueError {
                field: "capacity".to_string(),
                message: format!("容量必须为正整数, 实际={}", section.capacity),
            });
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO section (
                section_id, batch_id, semester_no, section_code, section_name,
                capacity, current_strength, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)
            "#,
            params![
                section.section_id,
                section.batch_id,
                section.semester_no,
                section.section_code,
                section.section_name,
                section.capacity,
                format_ts(&section.created_at),
                format_ts(&section.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 调整班级容量
    ///
    /// 条件更新 `WHERE current_strength <= new_capacity`，不会让已入座学生超员。
    ///
    /// # 返回
    /// - Ok(Section): 更新后的班级
    /// - Err(NotFound): 班级不存在
    /// - Err(CapacityBelowStrength): 新容量低于当前人数
    pub fn update_capacity(&self, section_id: &str, new_capacity: i64) -> RepositoryResult<Section> {
        if new_capacity <= 0 {
            return Err(RepositoryError::FieldValueError {
                field: "capacity".to_string(),
                message: format!("容量必须为正整数, 实际={}", new_capacity),
            });
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let affected = tx.execute(
            r#"
            UPDATE section
               SET capacity = ?1, updated_at = ?2
             WHERE section_id = ?3 AND current_strength <= ?1
            "#,
            params![
                new_capacity,
                format_ts(&chrono::Local::now().naive_local()),
                section_id
            ],
        )?;

        if affected == 0 {
            let err = match Self::find_on(&tx, section_id)? {
                None => RepositoryError::not_found("Section", section_id),
                Some(existing) => RepositoryError::CapacityBelowStrength {
                    section_id: section_id.to_string(),
                    capacity: new_capacity,
                    current_strength: existing.current_strength,
                },
            };
            return Err(err);
        }

        let updated = Self::find_on(&tx, section_id)?
            .ok_or_else(|| RepositoryError::not_found("Section", section_id))?;
        tx.commit()?;
        Ok(updated)
    }

    /// 批量写入班级（单事务，按 batch/semester/code 匹配）
    ///
    /// 已存在的班级只更新名称与容量，且容量不得低于当前人数。
    pub fn upsert_batch(&self, sections: &[Section]) -> RepositoryResult<Vec<SectionUpsert>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = format_ts(&chrono::Local::now().naive_local());

        let mut outcomes = Vec::with_capacity(sections.len());
        for section in sections {
            if section.capacity <= 0 {
                return Err(RepositoryError::FieldValueError {
                    field: "capacity".to_string(),
                    message: format!(
                        "容量必须为正整数, 实际={} (section_code={})",
                        section.capacity, section.section_code
                    ),
                });
            }

            let existing: Option<(String, i64)> = tx
                .query_row(
                    r#"
                    SELECT section_id, current_strength FROM section
                     WHERE batch_id = ?1 AND semester_no = ?2 AND section_code = ?3
                    "#,
                    params![section.batch_id, section.semester_no, section.section_code],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let outcome = match existing {
                None => {
                    tx.execute(
                        r#"
                        INSERT INTO section (
                            section_id, batch_id, semester_no, section_code, section_name,
                            capacity, current_strength, created_at, updated_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)
                        "#,
                        params![
                            section.section_id,
                            section.batch_id,
                            section.semester_no,
                            section.section_code,
                            section.section_name,
                            section.capacity,
                            now,
                        ],
                    )?;
                    SectionUpsert::Inserted
                }
                Some((section_id, _)) => {
                    let affected = tx.execute(
                        r#"
                        UPDATE section
                           SET section_name = ?1, capacity = ?2, updated_at = ?3
                         WHERE section_id = ?4 AND current_strength <= ?2
                        "#,
                        params![section.section_name, section.capacity, now, section_id],
                    )?;
                    if affected == 0 {
                        SectionUpsert::RejectedBelowStrength
                    } else {
                        SectionUpsert::Updated
                    }
                }
            };
            outcomes.push(outcome);
        }

        tx.commit()?;
        Ok(outcomes)
    }

    /// 删除班级（存在有效分配时拒绝）
    pub fn delete(&self, section_id: &str) -> RepositoryResult<Section> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let section = Self::find_on(&tx, section_id)?
            .ok_or_else(|| RepositoryError::not_found("Section", section_id))?;

        let active: i64 = tx.query_row(
            "SELECT COUNT(*) FROM section_assignment WHERE section_id = ?1 AND removed_at IS NULL",
            params![section_id],
            |row| row.get(0),
        )?;

        if active > 0 || section.current_strength > 0 {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "班级仍有 {} 名学生, 不可删除: section_id={}",
                active.max(section.current_strength),
                section_id
            )));
        }

        tx.execute("DELETE FROM section WHERE section_id = ?1", params![section_id])?;
        tx.commit()?;
        Ok(section)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按ID查询班级
    pub fn find_by_id(&self, section_id: &str) -> RepositoryResult<Option<Section>> {
        let conn = self.get_conn()?;
        Self::find_on(&conn, section_id)
    }

    /// 查询作用域内全部班级（按给定稳定顺序）
    pub fn list_by_scope(
        &self,
        scope: &RosterScope,
        order: SectionOrder,
    ) -> RepositoryResult<Vec<Section>> {
        let conn = self.get_conn()?;
        let order_by = match order {
            SectionOrder::CodeAsc => "section_code ASC, section_id ASC",
            SectionOrder::CreatedAsc => "created_at ASC, section_id ASC",
        };

        let sql = format!(
            "SELECT {} FROM section WHERE batch_id = ?1 AND semester_no = ?2 ORDER BY {}",
            SECTION_COLUMNS, order_by
        );
        let mut stmt = conn.prepare(&sql)?;
        let sections = stmt
            .query_map(params![scope.batch_id, scope.semester_no], Self::map_row)?
            .collect::<rusqlite::Result<Vec<Section>>>()?;

        Ok(sections)
    }
}
