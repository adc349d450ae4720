// ==========================================
// 学生分班引擎 - 未分班学生解析
// ==========================================
// 职责: 给定 (batch, semester)，返回在读且无有效分配的学生
// 排序: 学号自然序 → 录取号自然序 → student_id
// 红线: 每次调用都直接读库，不缓存
// ==========================================

use crate::domain::student::Student;
use crate::domain::types::RosterScope;
use crate::repository::{RepositoryResult, StudentRepository};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// 自然序比较
// ==========================================

/// 字符串片段：连续数字 / 连续非数字
#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;

    for (idx, ch) in s.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != is_digit => {
                let piece = &s[start..idx];
                out.push(if prev { Chunk::Digits(piece) } else { Chunk::Text(piece) });
                start = idx;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }

    if let Some(prev) = in_digits {
        let piece = &s[start..];
        out.push(if prev { Chunk::Digits(piece) } else { Chunk::Text(piece) });
    }
    out
}

/// 比较两段数字（任意长度，不溢出）
fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        // 数值相等时前导零少者在前，保证全序
        .then_with(|| a.len().cmp(&b.len()))
}

/// 自然序比较：数字段按数值比较（S2 < S10），其余按字符比较
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = chunks(a);
    let right = chunks(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
            // 数字段排在文字段之前
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len())
}

/// 学生分班顺序
pub fn student_order(a: &Student, b: &Student) -> Ordering {
    natural_cmp(&a.roll_no, &b.roll_no)
        .then_with(|| natural_cmp(&a.admission_number, &b.admission_number))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

// ==========================================
// UnassignedResolver - 未分班学生解析器
// ==========================================
pub struct UnassignedResolver {
    student_repo: Arc<StudentRepository>,
}

impl UnassignedResolver {
    pub fn new(student_repo: Arc<StudentRepository>) -> Self {
        Self { student_repo }
    }

    /// 解析作用域内未分班学生（已按分班顺序排好）
    ///
    /// 空结果不是错误
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn resolve(&self, scope: &RosterScope) -> RepositoryResult<Vec<Student>> {
        let mut students = self.student_repo.list_unassigned(scope)?;
        students.sort_by(student_order);
        tracing::debug!(count = students.len(), "未分班学生解析完成");
        Ok(students)
    }

    /// 作用域内未分班学生数量
    pub fn count(&self, scope: &RosterScope) -> RepositoryResult<usize> {
        Ok(self.student_repo.list_unassigned(scope)?.len())
    }
}
