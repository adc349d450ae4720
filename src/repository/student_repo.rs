// ==========================================
// 学生分班引擎 - 学生名录仓储
// ==========================================
// 说明: 名录属于外部教务数据；引擎只读，导入器负责写入
// ==========================================

use crate::domain::student::{Enrollment, Student};
use crate::domain::types::{EnrollmentStatus, RosterScope};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// StudentRepository - 学生名录仓储
// ==========================================
pub struct StudentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StudentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_student(row: &Row<'_>) -> rusqlite::Result<Student> {
        Ok(Student {
            student_id: row.get(0)?,
            name: row.get(1)?,
            admission_number: row.get(2)?,
            roll_no: row.get(3)?,
        })
    }

    // ==========================================
    // 写入操作（名录导入）
    // ==========================================

    /// 批量写入学生及其注册记录（单事务）
    ///
    /// 使用 ON CONFLICT DO UPDATE 而非 INSERT OR REPLACE，
    /// 避免 REPLACE 删除旧行时级联清掉注册记录。
    ///
    /// # 返回
    /// - Ok(usize): 写入的学生行数
    pub fn upsert_batch(&self, rows: &[(Student, Enrollment)]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (student, enrollment) in rows {
            if student.student_id != enrollment.student_id {
                return Err(RepositoryError::ValidationError(format!(
                    "学生与注册记录不匹配: {} vs {}",
                    student.student_id, enrollment.student_id
                )));
            }

            tx.execute(
                r#"
                INSERT INTO student (student_id, name, admission_number, roll_no, updated_at)
                VALUES (?1, ?2, ?3, ?4, datetime('now'))
                ON CONFLICT(student_id) DO UPDATE SET
                    name = excluded.name,
                    admission_number = excluded.admission_number,
                    roll_no = excluded.roll_no,
                    updated_at = excluded.updated_at
                "#,
                params![
                    student.student_id,
                    student.name,
                    student.admission_number,
                    student.roll_no
                ],
            )?;

            tx.execute(
                r#"
                INSERT INTO student_enrollment (student_id, batch_id, semester_no, status)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(student_id, batch_id, semester_no) DO UPDATE SET
                    status = excluded.status
                "#,
                params![
                    enrollment.student_id,
                    enrollment.batch_id,
                    enrollment.semester_no,
                    enrollment.status.as_str()
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, student_id: &str) -> RepositoryResult<Option<Student>> {
        let conn = self.get_conn()?;
        let student = conn
            .query_row(
                "SELECT student_id, name, admission_number, roll_no FROM student WHERE student_id = ?1",
                params![student_id],
                Self::map_student,
            )
            .optional()?;
        Ok(student)
    }

    /// 查询学生在作用域内的注册记录
    pub fn find_enrollment(
        &self,
        student_id: &str,
        scope: &RosterScope,
    ) -> RepositoryResult<Option<Enrollment>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT student_id, batch_id, semester_no, status
                  FROM student_enrollment
                 WHERE student_id = ?1 AND batch_id = ?2 AND semester_no = ?3
                "#,
                params![student_id, scope.batch_id, scope.semester_no],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((student_id, batch_id, semester_no, status)) => {
                let status = EnrollmentStatus::from_db(&status).ok_or_else(|| {
                    RepositoryError::FieldValueError {
                        field: "status".to_string(),
                        message: format!("未知注册状态: {}", status),
                    }
                })?;
                Ok(Some(Enrollment {
                    student_id,
                    batch_id,
                    semester_no,
                    status,
                }))
            }
        }
    }

    /// 查询作用域内在读且无有效分配的学生（未排序，排序由引擎决定）
    ///
    /// 每次调用都直接读库，不做缓存。
    pub fn list_unassigned(&self, scope: &RosterScope) -> RepositoryResult<Vec<Student>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT s.student_id, s.name, s.admission_number, s.roll_no
              FROM student_enrollment e
              JOIN student s ON s.student_id = e.student_id
             WHERE e.batch_id = ?1
               AND e.semester_no = ?2
               AND e.status = 'ACTIVE'
               AND NOT EXISTS (
                   SELECT 1 FROM section_assignment a
                    WHERE a.student_id = e.student_id
                      AND a.batch_id = e.batch_id
                      AND a.semester_no = e.semester_no
                      AND a.removed_at IS NULL
               )
            "#,
        )?;

        let students = stmt
            .query_map(params![scope.batch_id, scope.semester_no], Self::map_student)?
            .collect::<rusqlite::Result<Vec<Student>>>()?;
        Ok(students)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> StudentRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        StudentRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn row(id: &str, roll: &str, status: EnrollmentStatus) -> (Student, Enrollment) {
        (
            Student {
                student_id: id.to_string(),
                name: format!("Student {}", id),
                admission_number: format!("ADM-{}", id),
                roll_no: roll.to_string(),
            },
            Enrollment {
                student_id: id.to_string(),
                batch_id: "2024".to_string(),
                semester_no: 1,
                status,
            },
        )
    }

    #[test]
    fn test_upsert_and_list_unassigned_excludes_withdrawn() {
        let repo = setup();
        repo.upsert_batch(&[
            row("st-1", "R1", EnrollmentStatus::Active),
            row("st-2", "R2", EnrollmentStatus::Withdrawn),
            row("st-3", "R3", EnrollmentStatus::Active),
        ])
        .unwrap();

        let scope = RosterScope::new("2024", 1);
        let mut ids: Vec<_> = repo
            .list_unassigned(&scope)
            .unwrap()
            .into_iter()
            .map(|s| s.student_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["st-1", "st-3"]);
    }

    #[test]
    fn test_upsert_updates_name_and_keeps_enrollment() {
        let repo = setup();
        repo.upsert_batch(&[row("st-1", "R1", EnrollmentStatus::Active)]).unwrap();

        let (mut student, enrollment) = row("st-1", "R1", EnrollmentStatus::Active);
        student.name = "Renamed".to_string();
        repo.upsert_batch(&[(student, enrollment)]).unwrap();

        let found = repo.find_by_id("st-1").unwrap().unwrap();
        assert_eq!(found.name, "Renamed");
        let enrollment = repo
            .find_enrollment("st-1", &RosterScope::new("2024", 1))
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Active);
    }
}
