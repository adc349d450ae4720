// ==========================================
// 学生分班引擎 - 自动分班计划器
// ==========================================
// 职责: 轮转 (round-robin) 把有序学生分到有余量的班级
// 输入: 有序未分班学生 + 班级（含剩余座位）+ 班级顺序
// 输出: AssignmentPlan（不落库）
// 红线: 纯计算，不加锁不读库；落库时由 Applier 逐条复核容量
// ==========================================

use crate::domain::assignment::{AssignmentPlan, PlacementItem};
use crate::domain::section::{SeatCapacity, Section};
use crate::domain::student::Student;
use crate::domain::types::{Provenance, SectionOrder};
use tracing::instrument;

/// 计划阶段的班级座位视图
#[derive(Debug, Clone)]
struct SeatSlot<'a> {
    section: &'a Section,
    remaining: i64,
}

// ==========================================
// AutoAssignmentPlanner - 自动分班计划器
// ==========================================
#[derive(Debug, Default)]
pub struct AutoAssignmentPlanner {
    // 无状态引擎，不需要注入依赖
}

impl AutoAssignmentPlanner {
    pub fn new() -> Self {
        Self {}
    }

    /// 按配置把班级排成稳定顺序
    pub fn order_sections<'a>(sections: &'a [Section], order: SectionOrder) -> Vec<&'a Section> {
        let mut ordered: Vec<&Section> = sections.iter().collect();
        match order {
            SectionOrder::CodeAsc => ordered.sort_by(|a, b| {
                a.section_code
                    .cmp(&b.section_code)
                    .then_with(|| a.section_id.cmp(&b.section_id))
            }),
            SectionOrder::CreatedAsc => ordered.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.section_id.cmp(&b.section_id))
            }),
        }
        ordered
    }

    /// 生成自动分班计划
    ///
    /// 规则:
    /// 1) 学生按传入顺序（解析器已按学号自然序排好）
    /// 2) 游标在班级间轮转，跳过已满班级
    /// 3) 全部班级满员即停止，剩余学生记入 unplaced
    ///
    /// 总余量为 0 时返回空计划（非错误）。
    #[instrument(skip(self, students, sections), fields(
        students_count = students.len(),
        sections_count = sections.len(),
        order = order.as_str()
    ))]
    pub fn plan(
        &self,
        students: &[Student],
        sections: &[Section],
        order: SectionOrder,
    ) -> AssignmentPlan {
        let mut slots: Vec<SeatSlot> = Self::order_sections(sections, order)
            .into_iter()
            .map(|section| SeatSlot {
                section,
                remaining: section.remaining_seats(),
            })
            .collect();

        let mut plan = AssignmentPlan::default();
        let mut cursor = 0usize;
        let mut seats_left: i64 = slots.iter().map(|s| s.remaining).sum();

        for student in students {
            if seats_left <= 0 {
                plan.unplaced.push(student.student_id.clone());
                continue;
            }

            // 从游标处向后找第一个有余量的班级
            let k = slots.len();
            let Some(offset) = (0..k).find(|i| slots[(cursor + i) % k].remaining > 0) else {
                plan.unplaced.push(student.student_id.clone());
                continue;
            };
            let idx = (cursor + offset) % k;

            let slot = &mut slots[idx];
            slot.remaining -= 1;
            seats_left -= 1;
            plan.items.push(PlacementItem {
                student_id: student.student_id.clone(),
                section_id: slot.section.section_id.clone(),
                provenance: Provenance::Auto,
            });

            cursor = (idx + 1) % k;
        }

        tracing::debug!(
            planned = plan.planned_count(),
            unplaced = plan.unplaced_count(),
            "自动分班计划生成完成"
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::collections::HashMap;

    fn make_student(i: usize) -> Student {
        Student {
            student_id: format!("st-{:03}", i),
            name: format!("Student {}", i),
            admission_number: format!("ADM{}", i),
            roll_no: format!("R{}", i),
        }
    }

    fn make_section(code: &str, capacity: i64, strength: i64, created_offset: i64) -> Section {
        let base = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Section {
            section_id: format!("sec-{}", code),
            batch_id: "2024".to_string(),
            semester_no: 1,
            section_code: code.to_string(),
            section_name: format!("Section {}", code),
            capacity,
            current_strength: strength,
            created_at: base + Duration::minutes(created_offset),
            updated_at: base,
        }
    }

    fn students(n: usize) -> Vec<Student> {
        (1..=n).map(make_student).collect()
    }

    fn counts(plan: &AssignmentPlan) -> HashMap<String, i64> {
        let mut map = HashMap::new();
        for item in &plan.items {
            *map.entry(item.section_id.clone()).or_insert(0) += 1;
        }
        map
    }

    #[test]
    fn test_exact_fit_round_robin() {
        // 6 人 2 班各 3 座：A/B 交替
        let planner = AutoAssignmentPlanner::new();
        let sections = vec![make_section("A", 3, 0, 0), make_section("B", 3, 0, 1)];
        let plan = planner.plan(&students(6), &sections, SectionOrder::CodeAsc);

        let order: Vec<_> = plan.items.iter().map(|i| i.section_id.as_str()).collect();
        assert_eq!(order, vec!["sec-A", "sec-B", "sec-A", "sec-B", "sec-A", "sec-B"]);
        assert!(plan.unplaced.is_empty());
        assert!(plan.items.iter().all(|i| i.provenance == Provenance::Auto));
    }

    #[test]
    fn test_overflow_places_earliest_students() {
        let planner = AutoAssignmentPlanner::new();
        let sections = vec![make_section("A", 2, 0, 0), make_section("B", 2, 0, 1)];
        let plan = planner.plan(&students(5), &sections, SectionOrder::CodeAsc);

        assert_eq!(plan.planned_count(), 4);
        assert_eq!(plan.unplaced, vec!["st-005".to_string()]);
        let placed: Vec<_> = plan.items.iter().map(|i| i.student_id.as_str()).collect();
        assert_eq!(placed, vec!["st-001", "st-002", "st-003", "st-004"]);
    }

    #[test]
    fn test_zero_capacity_returns_empty_plan() {
        let planner = AutoAssignmentPlanner::new();
        let sections = vec![make_section("A", 2, 2, 0)];
        let plan = planner.plan(&students(3), &sections, SectionOrder::CodeAsc);
        assert!(plan.is_empty());
        assert_eq!(plan.unplaced_count(), 3);

        let none = planner.plan(&students(3), &[], SectionOrder::CodeAsc);
        assert_eq!(none.planned_count(), 0);
        assert_eq!(none.unplaced_count(), 3);
    }

    #[test]
    fn test_no_students_is_empty() {
        let planner = AutoAssignmentPlanner::new();
        let sections = vec![make_section("A", 2, 0, 0)];
        let plan = planner.plan(&[], &sections, SectionOrder::CodeAsc);
        assert!(plan.is_empty());
        assert!(plan.unplaced.is_empty());
    }

    #[test]
    fn test_skips_full_sections_with_uneven_remaining() {
        // A 剩 1，B 剩 3，C 已满
        let planner = AutoAssignmentPlanner::new();
        let sections = vec![
            make_section("A", 3, 2, 0),
            make_section("B", 3, 0, 1),
            make_section("C", 2, 2, 2),
        ];
        let plan = planner.plan(&students(4), &sections, SectionOrder::CodeAsc);

        let order: Vec<_> = plan.items.iter().map(|i| i.section_id.as_str()).collect();
        assert_eq!(order, vec!["sec-A", "sec-B", "sec-B", "sec-B"]);
        assert!(plan.unplaced.is_empty());
    }

    #[test]
    fn test_created_order_changes_rotation_start() {
        let planner = AutoAssignmentPlanner::new();
        let sections = vec![make_section("A", 5, 0, 10), make_section("B", 5, 0, 0)];
        let plan = planner.plan(&students(1), &sections, SectionOrder::CreatedAsc);
        assert_eq!(plan.items[0].section_id, "sec-B");
    }

    #[test]
    fn test_round_robin_fairness_grid() {
        let planner = AutoAssignmentPlanner::new();

        for n in 0..=25usize {
            for k in 1..=5usize {
                for r in 0..=6i64 {
                    // 余量按 r 错开，制造不均衡
                    let sections: Vec<Section> = (0..k)
                        .map(|i| {
                            let remaining = (r + i as i64) % 7;
                            let capacity = remaining + 1;
                            make_section(&format!("S{}", i), capacity, 1, i as i64)
                        })
                        .collect();
                    let total: i64 = sections.iter().map(|s| s.remaining_seats()).sum();

                    let plan = planner.plan(&students(n), &sections, SectionOrder::CodeAsc);
                    let placed = plan.planned_count() as i64;

                    // 守恒 + 不超员
                    assert_eq!(placed, (n as i64).min(total), "n={n} k={k} r={r}");
                    assert_eq!(plan.planned_count() + plan.unplaced_count(), n);

                    let by_section = counts(&plan);
                    for s in &sections {
                        let got = by_section.get(&s.section_id).copied().unwrap_or(0);
                        assert!(got <= s.remaining_seats(), "n={n} k={k} r={r}");
                    }

                    // 未满班级之间人数差不超过 1
                    let open: Vec<i64> = sections
                        .iter()
                        .filter(|s| {
                            by_section.get(&s.section_id).copied().unwrap_or(0)
                                < s.remaining_seats()
                        })
                        .map(|s| by_section.get(&s.section_id).copied().unwrap_or(0))
                        .collect();
                    if let (Some(max), Some(min)) = (open.iter().max(), open.iter().min()) {
                        assert!(max - min <= 1, "n={n} k={k} r={r} open={open:?}");
                    }

                    // 有人未分配 => 所有班级已满
                    if !plan.unplaced.is_empty() {
                        assert!(open.is_empty(), "n={n} k={k} r={r}");
                    }

                    // 已分配的是学号最靠前的前缀
                    for (idx, item) in plan.items.iter().enumerate() {
                        assert_eq!(item.student_id, make_student(idx + 1).student_id);
                    }
                }
            }
        }
    }

    #[test]
    fn test_equal_remaining_spreads_within_one() {
        let planner = AutoAssignmentPlanner::new();

        for n in 0..=30usize {
            for k in 1..=5usize {
                let fair_share = n.div_ceil(k) as i64;
                for r in fair_share..=fair_share + 3 {
                    let sections: Vec<Section> = (0..k)
                        .map(|i| make_section(&format!("S{}", i), r + 2, 2, i as i64))
                        .collect();

                    let plan = planner.plan(&students(n), &sections, SectionOrder::CodeAsc);
                    assert_eq!(plan.planned_count(), n, "n={n} k={k} r={r}");
                    assert!(plan.unplaced.is_empty());

                    // 含已满班级在内，任意两班人数差不超过 1
                    let by_section = counts(&plan);
                    let per_section: Vec<i64> = sections
                        .iter()
                        .map(|s| by_section.get(&s.section_id).copied().unwrap_or(0))
                        .collect();
                    let max = per_section.iter().max().copied().unwrap_or(0);
                    let min = per_section.iter().min().copied().unwrap_or(0);
                    assert!(max - min <= 1, "n={n} k={k} r={r} counts={per_section:?}");

                    // 多出的人按班级顺序落在靠前的班级
                    let extra = n % k;
                    for (i, got) in per_section.iter().enumerate() {
                        let expected = (n / k) as i64 + i64::from(i < extra);
                        assert_eq!(*got, expected, "n={n} k={k} r={r} section={i}");
                    }
                }
            }
        }
    }
}
