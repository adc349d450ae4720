// ==========================================
// 学生分班引擎 - 班级领域模型
// ==========================================
// 红线: 0 <= current_strength <= capacity，任何可观测时刻成立
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::RosterScope;

// ==========================================
// Section - 班级
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub section_id: String,        // 班级ID
    pub batch_id: String,          // 所属年级批次
    pub semester_no: i64,          // 学期号
    pub section_code: String,      // 班级代码 (A/B/C...)
    pub section_name: String,      // 班级名称

    // ===== 容量 =====
    pub capacity: i64,             // 容量上限 (正整数)
    pub current_strength: i64,     // 当前人数 (= 有效分配数)

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Section {
    pub fn scope(&self) -> RosterScope {
        RosterScope::new(self.batch_id.clone(), self.semester_no)
    }
}

// ==========================================
// Trait: SeatCapacity
// ==========================================
// 用途: Planner / Applier 容量检查接口
pub trait SeatCapacity {
    /// 剩余座位（不变量被破坏时按 0 处理）
    fn remaining_seats(&self) -> i64;

    /// 是否已满
    fn is_full(&self) -> bool {
        self.remaining_seats() == 0
    }

    /// 容量不变量是否成立
    fn strength_within_bounds(&self) -> bool;
}

impl SeatCapacity for Section {
    fn remaining_seats(&self) -> i64 {
        (self.capacity - self.current_strength).max(0)
    }

    fn strength_within_bounds(&self) -> bool {
        self.current_strength >= 0 && self.current_strength <= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn section(capacity: i64, current_strength: i64) -> Section {
        let now = Local::now().naive_local();
        Section {
            section_id: "SEC-A".to_string(),
            batch_id: "2024".to_string(),
            semester_no: 1,
            section_code: "A".to_string(),
            section_name: "Section A".to_string(),
            capacity,
            current_strength,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_remaining_seats() {
        assert_eq!(section(30, 12).remaining_seats(), 18);
        assert!(!section(30, 12).is_full());
        assert!(section(30, 30).is_full());
    }

    #[test]
    fn test_remaining_seats_never_negative() {
        let s = section(10, 11);
        assert_eq!(s.remaining_seats(), 0);
        assert!(!s.strength_within_bounds());
    }
}
