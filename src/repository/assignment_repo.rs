// ==========================================
// 学生分班引擎 - 分配台账仓储
// ==========================================
// 红线: 分配写入 + 班级人数变更必须在同一事务内原子完成
// 红线: 容量检查 = 单条条件更新 (current_strength < capacity)
// 红线: 提交前复核不变量，失败即回滚并上报 InternalConsistency
// ==========================================

use crate::domain::assignment::Assignment;
use crate::domain::section::{SeatCapacity, Section};
use crate::domain::types::{Provenance, RosterScope};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::section_repo::SectionRepository;
use crate::repository::{format_ts, opt_ts_column, ts_column};
use chrono::{NaiveDateTime, SubsecRound};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const ASSIGNMENT_COLUMNS: &str = r#"
    assignment_id, student_id, section_id, batch_id, semester_no, provenance,
    assigned_at, assigned_by, removed_at, removed_by, removal_reason
"#;

/// 一次原子写入后的班级状态（事务内复核过的权威值）
#[derive(Debug, Clone)]
pub struct SeatChange {
    pub assignment: Assignment,
    pub section: Section,
}

/// 班级名单条目（联表学生名录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterOccupant {
    pub assignment_id: String,
    pub student_id: String,
    pub name: String,
    pub admission_number: String,
    pub roll_no: String,
    pub provenance: Provenance,
    pub assigned_at: NaiveDateTime,
}

// ==========================================
// AssignmentRepository - 分配台账仓储
// ==========================================
pub struct AssignmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssignmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
        let provenance_raw: String = row.get(5)?;
        let provenance = Provenance::from_db(&provenance_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                format!("未知分配来源: {}", provenance_raw).into(),
            )
        })?;

        Ok(Assignment {
            assignment_id: row.get(0)?,
            student_id: row.get(1)?,
            section_id: row.get(2)?,
            batch_id: row.get(3)?,
            semester_no: row.get(4)?,
            provenance,
            assigned_at: ts_column(row, 6)?,
            assigned_by: row.get(7)?,
            removed_at: opt_ts_column(row, 8)?,
            removed_by: row.get(9)?,
            removal_reason: row.get(10)?,
        })
    }

    fn find_active_on(
        conn: &Connection,
        student_id: &str,
        scope: &RosterScope,
    ) -> RepositoryResult<Option<Assignment>> {
        let sql = format!(
            r#"SELECT {} FROM section_assignment
                WHERE student_id = ?1 AND batch_id = ?2 AND semester_no = ?3
                  AND removed_at IS NULL"#,
            ASSIGNMENT_COLUMNS
        );
        let found = conn
            .query_row(
                &sql,
                params![student_id, scope.batch_id, scope.semester_no],
                Self::map_row,
            )
            .optional()?;
        Ok(found)
    }

    /// 事务内复核班级不变量
    ///
    /// - 0 <= current_strength <= capacity
    /// - current_strength == 有效分配数
    fn verify_section_invariant(conn: &Connection, section_id: &str) -> RepositoryResult<Section> {
        let section = SectionRepository::find_on(conn, section_id)?
            .ok_or_else(|| RepositoryError::not_found("Section", section_id))?;

        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM section_assignment WHERE section_id = ?1 AND removed_at IS NULL",
            params![section_id],
            |row| row.get(0),
        )?;

        if !section.strength_within_bounds() || section.current_strength != active {
            tracing::error!(
                section_id = %section_id,
                capacity = section.capacity,
                current_strength = section.current_strength,
                active_assignments = active,
                "班级容量不变量被破坏"
            );
            return Err(RepositoryError::InternalConsistency(format!(
                "section_id={}, capacity={}, current_strength={}, active_assignments={}",
                section_id, section.capacity, section.current_strength, active
            )));
        }

        Ok(section)
    }

    // ==========================================
    // 原子写入
    // ==========================================

    /// 原子创建分配并占用一个座位
    ///
    /// 事务 (BEGIN IMMEDIATE) 内顺序:
    /// 1) 班级存在且属于分配的作用域
    /// 2) 学生在该作用域无有效分配 (否则 AlreadyAssigned)
    /// 3) 条件更新占座 (0 行受影响 => CapacityExceeded)
    /// 4) 写入分配记录
    /// 5) 复核不变量后提交
    ///
    /// 任一步失败事务回滚，班级人数不变。
    pub fn create_atomic(&self, assignment: &Assignment) -> RepositoryResult<SeatChange> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let section = SectionRepository::find_on(&tx, &assignment.section_id)?
            .ok_or_else(|| RepositoryError::not_found("Section", &assignment.section_id))?;

        if section.batch_id != assignment.batch_id || section.semester_no != assignment.semester_no {
            return Err(RepositoryError::NotFound {
                entity: "Section".to_string(),
                id: format!(
                    "{} (不属于作用域 {}/S{})",
                    assignment.section_id, assignment.batch_id, assignment.semester_no
                ),
            });
        }

        let scope = assignment.scope();
        if let Some(existing) = Self::find_active_on(&tx, &assignment.student_id, &scope)? {
            return Err(RepositoryError::AlreadyAssigned {
                student_id: assignment.student_id.clone(),
                batch_id: scope.batch_id,
                semester_no: scope.semester_no,
                existing_assignment_id: existing.assignment_id,
            });
        }

        let now = format_ts(&chrono::Local::now().naive_local());
        let reserved = tx.execute(
            r#"
            UPDATE section
               SET current_strength = current_strength + 1, updated_at = ?1
             WHERE section_id = ?2 AND current_strength < capacity
            "#,
            params![now, assignment.section_id],
        )?;

        if reserved == 0 {
            return Err(RepositoryError::CapacityExceeded {
                section_id: assignment.section_id.clone(),
                capacity: section.capacity,
            });
        }

        let inserted = tx.execute(
            r#"
            INSERT INTO section_assignment (
                assignment_id, student_id, section_id, batch_id, semester_no,
                provenance, assigned_at, assigned_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                assignment.assignment_id,
                assignment.student_id,
                assignment.section_id,
                assignment.batch_id,
                assignment.semester_no,
                assignment.provenance.as_str(),
                format_ts(&assignment.assigned_at),
                assignment.assigned_by,
            ],
        );

        if let Err(e) = inserted {
            return Err(match RepositoryError::from(e) {
                // 部分唯一索引兜底（理论上已被第 2 步拦截）
                RepositoryError::UniqueConstraintViolation(msg)
                    if msg.contains("section_assignment.student_id") =>
                {
                    RepositoryError::AlreadyAssigned {
                        student_id: assignment.student_id.clone(),
                        batch_id: assignment.batch_id.clone(),
                        semester_no: assignment.semester_no,
                        existing_assignment_id: String::new(),
                    }
                }
                RepositoryError::ForeignKeyViolation(_) => {
                    RepositoryError::not_found("Student", &assignment.student_id)
                }
                other => other,
            });
        }

        let section = Self::verify_section_invariant(&tx, &assignment.section_id)?;
        tx.commit()?;

        Ok(SeatChange {
            assignment: assignment.clone(),
            section,
        })
    }

    /// 原子移除分配（墓碑标记）并释放座位
    ///
    /// # 返回
    /// - Err(NotFound): 分配不存在 / 已移除 / 所属班级已不存在
    /// - Err(InternalConsistency): 人数将为负或不变量不成立
    pub fn remove_atomic(
        &self,
        assignment_id: &str,
        removed_by: &str,
        reason: Option<&str>,
    ) -> RepositoryResult<SeatChange> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let sql = format!(
            "SELECT {} FROM section_assignment WHERE assignment_id = ?1 AND removed_at IS NULL",
            ASSIGNMENT_COLUMNS
        );
        let mut assignment = tx
            .query_row(&sql, params![assignment_id], Self::map_row)
            .optional()?
            .ok_or_else(|| RepositoryError::not_found("Assignment", assignment_id))?;

        if SectionRepository::find_on(&tx, &assignment.section_id)?.is_none() {
            return Err(RepositoryError::not_found("Section", &assignment.section_id));
        }

        let now = chrono::Local::now().naive_local().trunc_subsecs(3);
        let released = tx.execute(
            r#"
            UPDATE section
               SET current_strength = current_strength - 1, updated_at = ?1
             WHERE section_id = ?2 AND current_strength > 0
            "#,
            params![format_ts(&now), assignment.section_id],
        )?;

        if released == 0 {
            tracing::error!(
                assignment_id = %assignment_id,
                section_id = %assignment.section_id,
                "释放座位时班级人数已为 0"
            );
            return Err(RepositoryError::InternalConsistency(format!(
                "班级人数将为负: section_id={}, assignment_id={}",
                assignment.section_id, assignment_id
            )));
        }

        tx.execute(
            r#"
            UPDATE section_assignment
               SET removed_at = ?1, removed_by = ?2, removal_reason = ?3
             WHERE assignment_id = ?4 AND removed_at IS NULL
            "#,
            params![format_ts(&now), removed_by, reason, assignment_id],
        )?;

        let section = Self::verify_section_invariant(&tx, &assignment.section_id)?;
        tx.commit()?;

        assignment.removed_at = Some(now);
        assignment.removed_by = Some(removed_by.to_string());
        assignment.removal_reason = reason.map(str::to_string);

        Ok(SeatChange { assignment, section })
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, assignment_id: &str) -> RepositoryResult<Option<Assignment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM section_assignment WHERE assignment_id = ?1",
            ASSIGNMENT_COLUMNS
        );
        let found = conn
            .query_row(&sql, params![assignment_id], Self::map_row)
            .optional()?;
        Ok(found)
    }

    /// 查询学生在作用域内的有效分配
    pub fn find_active_for_student(
        &self,
        student_id: &str,
        scope: &RosterScope,
    ) -> RepositoryResult<Option<Assignment>> {
        let conn = self.get_conn()?;
        Self::find_active_on(&conn, student_id, scope)
    }

    /// 班级有效名单（按分配时间、写入顺序）
    pub fn list_occupants(&self, section_id: &str) -> RepositoryResult<Vec<RosterOccupant>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT a.assignment_id, a.student_id, s.name, s.admission_number, s.roll_no,
                   a.provenance, a.assigned_at
              FROM section_assignment a
              JOIN student s ON s.student_id = a.student_id
             WHERE a.section_id = ?1 AND a.removed_at IS NULL
             ORDER BY a.assigned_at ASC, a.rowid ASC
            "#,
        )?;

        let occupants = stmt
            .query_map(params![section_id], |row| {
                let provenance_raw: String = row.get(5)?;
                Ok(RosterOccupant {
                    assignment_id: row.get(0)?,
                    student_id: row.get(1)?,
                    name: row.get(2)?,
                    admission_number: row.get(3)?,
                    roll_no: row.get(4)?,
                    provenance: Provenance::from_db(&provenance_raw).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            5,
                            rusqlite::types::Type::Text,
                            format!("未知分配来源: {}", provenance_raw).into(),
                        )
                    })?,
                    assigned_at: ts_column(row, 6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<RosterOccupant>>>()?;

        Ok(occupants)
    }

    /// 学生全部分配历史（含墓碑）
    pub fn list_history_for_student(&self, student_id: &str) -> RepositoryResult<Vec<Assignment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM section_assignment
                WHERE student_id = ?1
                ORDER BY assigned_at ASC, rowid ASC"#,
            ASSIGNMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let history = stmt
            .query_map(params![student_id], Self::map_row)?
            .collect::<rusqlite::Result<Vec<Assignment>>>()?;
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::student::{Enrollment, Student};
    use crate::domain::types::EnrollmentStatus;
    use crate::repository::student_repo::StudentRepository;
    use chrono::Local;

    struct Fixture {
        conn: Arc<Mutex<Connection>>,
        sections: SectionRepository,
        assignments: AssignmentRepository,
    }

    fn setup(capacity: i64, students: &[&str]) -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        let sections = SectionRepository::new(conn.clone());
        let now = Local::now().naive_local();
        sections
            .create(&Section {
                section_id: "sec-a".to_string(),
                batch_id: "2024".to_string(),
                semester_no: 1,
                section_code: "A".to_string(),
                section_name: "Section A".to_string(),
                capacity,
                current_strength: 0,
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        let rows: Vec<_> = students
            .iter()
            .map(|id| {
                (
                    Student {
                        student_id: id.to_string(),
                        name: format!("Student {}", id),
                        admission_number: format!("ADM-{}", id),
                        roll_no: id.to_string(),
                    },
                    Enrollment {
                        student_id: id.to_string(),
                        batch_id: "2024".to_string(),
                        semester_no: 1,
                        status: EnrollmentStatus::Active,
                    },
                )
            })
            .collect();
        StudentRepository::new(conn.clone()).upsert_batch(&rows).unwrap();

        Fixture {
            sections,
            assignments: AssignmentRepository::new(conn.clone()),
            conn,
        }
    }

    fn scope() -> RosterScope {
        RosterScope::new("2024", 1)
    }

    #[test]
    fn test_create_atomic_increments_strength() {
        let f = setup(2, &["st-1"]);
        let a = Assignment::new("st-1", "sec-a", &scope(), Provenance::Manual, "tester");
        let change = f.assignments.create_atomic(&a).unwrap();

        assert_eq!(change.section.current_strength, 1);
        assert_eq!(f.assignments.list_occupants("sec-a").unwrap().len(), 1);
        assert!(f
            .assignments
            .find_active_for_student("st-1", &scope())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_create_atomic_rejects_full_section() {
        let f = setup(1, &["st-1", "st-2"]);
        f.assignments
            .create_atomic(&Assignment::new("st-1", "sec-a", &scope(), Provenance::Manual, "t"))
            .unwrap();

        let err = f
            .assignments
            .create_atomic(&Assignment::new("st-2", "sec-a", &scope(), Provenance::Manual, "t"))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::CapacityExceeded { capacity: 1, .. }));

        let section = f.sections.find_by_id("sec-a").unwrap().unwrap();
        assert_eq!(section.current_strength, 1);
    }

    #[test]
    fn test_create_atomic_rejects_second_active_assignment() {
        let f = setup(5, &["st-1"]);
        let first = Assignment::new("st-1", "sec-a", &scope(), Provenance::Manual, "t");
        f.assignments.create_atomic(&first).unwrap();

        let err = f
            .assignments
            .create_atomic(&Assignment::new("st-1", "sec-a", &scope(), Provenance::Auto, "t"))
            .unwrap_err();
        match err {
            RepositoryError::AlreadyAssigned {
                existing_assignment_id,
                ..
            } => assert_eq!(existing_assignment_id, first.assignment_id),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            f.sections.find_by_id("sec-a").unwrap().unwrap().current_strength,
            1
        );
    }

    #[test]
    fn test_create_atomic_unknown_section() {
        let f = setup(5, &["st-1"]);
        let err = f
            .assignments
            .create_atomic(&Assignment::new("st-1", "missing", &scope(), Provenance::Manual, "t"))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_remove_atomic_tombstones_and_releases_seat() {
        let f = setup(1, &["st-1", "st-2"]);
        let a = Assignment::new("st-1", "sec-a", &scope(), Provenance::Manual, "t");
        f.assignments.create_atomic(&a).unwrap();

        let change = f
            .assignments
            .remove_atomic(&a.assignment_id, "registrar", Some("transfer"))
            .unwrap();
        assert_eq!(change.section.current_strength, 0);
        assert!(!change.assignment.is_active());

        let stored = f.assignments.find_by_id(&a.assignment_id).unwrap().unwrap();
        assert_eq!(stored.removed_by.as_deref(), Some("registrar"));
        assert_eq!(stored.removal_reason.as_deref(), Some("transfer"));

        // 座位已释放，其他学生可入座
        f.assignments
            .create_atomic(&Assignment::new("st-2", "sec-a", &scope(), Provenance::Manual, "t"))
            .unwrap();
        assert_eq!(f.assignments.list_history_for_student("st-1").unwrap().len(), 1);
    }

    #[test]
    fn test_remove_atomic_twice_is_not_found() {
        let f = setup(1, &["st-1"]);
        let a = Assignment::new("st-1", "sec-a", &scope(), Provenance::Manual, "t");
        f.assignments.create_atomic(&a).unwrap();
        f.assignments.remove_atomic(&a.assignment_id, "t", None).unwrap();

        let err = f
            .assignments
            .remove_atomic(&a.assignment_id, "t", None)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert_eq!(
            f.sections.find_by_id("sec-a").unwrap().unwrap().current_strength,
            0
        );
    }

    #[test]
    fn test_malformed_assigned_at_surfaces_as_error() {
        let f = setup(2, &["st-1"]);
        let a = Assignment::new("st-1", "sec-a", &scope(), Provenance::Manual, "tester");
        f.assignments.create_atomic(&a).unwrap();

        f.conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE section_assignment SET assigned_at = 'garbage' WHERE assignment_id = ?1",
                params![a.assignment_id],
            )
            .unwrap();

        assert!(f.assignments.list_occupants("sec-a").is_err());
        assert!(f.assignments.find_by_id(&a.assignment_id).is_err());
    }

    #[test]
    fn test_list_occupants_joins_student_directory() {
        let f = setup(3, &["st-1", "st-2"]);
        for id in ["st-1", "st-2"] {
            f.assignments
                .create_atomic(&Assignment::new(id, "sec-a", &scope(), Provenance::Auto, "t"))
                .unwrap();
        }

        let occupants = f.assignments.list_occupants("sec-a").unwrap();
        let ids: Vec<_> = occupants.iter().map(|o| o.student_id.as_str()).collect();
        assert_eq!(ids, vec!["st-1", "st-2"]);
        assert_eq!(occupants[0].admission_number, "ADM-st-1");
        assert_eq!(occupants[0].provenance, Provenance::Auto);
    }
}
