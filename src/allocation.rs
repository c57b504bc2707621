use crate::model::{
    allocated_ids, BenchAssignment, Classroom, ClassroomAllocation, Occupant, Student,
};
use std::collections::HashSet;

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),
    #[error("classroom not found: {0}")]
    ClassroomNotFound(String),
    #[error("not enough students to pair {branch1} ({n1}) with {branch2} ({n2})")]
    InsufficientStudents {
        branch1: String,
        n1: usize,
        branch2: String,
        n2: usize,
    },
    #[error("classroom has no bench capacity")]
    NoBenchCapacity,
    #[error("persistence error: {0}")]
    PersistenceError(String),
    #[error("students already allocated to another classroom: {}", .student_ids.join(", "))]
    AllocationConflict { student_ids: Vec<String> },
    #[error("invalid arrangement: {0}")]
    InvalidArrangement(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AllocationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DataUnavailable(_) => "data_unavailable",
            Self::ClassroomNotFound(_) => "classroom_not_found",
            Self::InsufficientStudents { .. } => "insufficient_students",
            Self::NoBenchCapacity => "no_bench_capacity",
            Self::PersistenceError(_) => "persistence_error",
            Self::AllocationConflict { .. } => "allocation_conflict",
            Self::InvalidArrangement(_) => "invalid_arrangement",
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

const BRANCH_NAMES: &[(&str, &str)] = &[
    ("CSE", "Computer Science and Engineering"),
    ("ECE", "Electronics and Communication Engineering"),
    ("EEE", "Electrical and Electronics Engineering"),
    ("ME", "Mechanical Engineering"),
    ("CE", "Civil Engineering"),
    ("IT", "Information Technology"),
    ("AIDS", "Artificial Intelligence and Data Science"),
    ("AIML", "Artificial Intelligence and Machine Learning"),
    ("CSBS", "Computer Science and Business Systems"),
    ("MBA", "Master of Business Administration"),
    ("MCA", "Master of Computer Applications"),
];

/// Human-readable name for a branch code; unknown codes are returned unchanged.
pub fn branch_display_name(code: &str) -> String {
    let code = code.trim();
    BRANCH_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Union of the allocated lists of every classroom except `target`.
///
/// The target's own list is replaced by the round being planned, so its current
/// occupants stay eligible.
pub fn exclusion_set(per_classroom: &[ClassroomAllocation], target: Option<&str>) -> HashSet<String> {
    per_classroom
        .iter()
        .filter(|c| Some(c.classroom_id.as_str()) != target)
        .flat_map(|c| c.student_ids.iter().cloned())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub benches: Vec<BenchAssignment>,
    pub allocated_student_ids: Vec<String>,
}

pub fn effective_bench_count(classroom: &Classroom, n1: usize, n2: usize) -> usize {
    classroom.bench_limit().min(n1).min(n2)
}

pub fn snapshot(student: &Student, branch: &str) -> Occupant {
    Occupant {
        student_id: student.id.clone(),
        name: student.name.clone(),
        branch: branch.to_string(),
        branch_name: branch_display_name(branch),
        university_no: student.university_no.clone(),
    }
}

/// Both sides of a bench must come from different branches.
pub fn check_distinct_branches(branch1: &str, branch2: &str) -> Result<(), AllocationError> {
    if branch1.trim().eq_ignore_ascii_case(branch2.trim()) {
        return Err(AllocationError::InvalidRequest(format!(
            "branch1 and branch2 must differ (both {})",
            branch1.trim()
        )));
    }
    Ok(())
}

/// Pairs `branch1_students[i]` (left) with `branch2_students[i]` (right) on bench `i + 1`.
///
/// Both pools are expected in seating order already. The row count is truncated to
/// the shorter pool and the classroom's bench limit, so every produced bench is full.
pub fn allocate(
    classroom: &Classroom,
    branch1: &str,
    branch1_students: &[Student],
    branch2: &str,
    branch2_students: &[Student],
) -> Result<Allocation, AllocationError> {
    check_distinct_branches(branch1, branch2)?;
    let left_ids: HashSet<&str> = branch1_students.iter().map(|s| s.id.as_str()).collect();
    if let Some(shared) = branch2_students.iter().find(|s| left_ids.contains(s.id.as_str())) {
        return Err(AllocationError::InvalidRequest(format!(
            "student {} appears in both pools",
            shared.id
        )));
    }

    let n1 = branch1_students.len();
    let n2 = branch2_students.len();
    if n1 == 0 || n2 == 0 {
        return Err(AllocationError::InsufficientStudents {
            branch1: branch1.to_string(),
            n1,
            branch2: branch2.to_string(),
            n2,
        });
    }

    let rows = effective_bench_count(classroom, n1, n2);
    if rows == 0 {
        return Err(AllocationError::NoBenchCapacity);
    }

    let benches: Vec<BenchAssignment> = branch1_students
        .iter()
        .zip(branch2_students.iter())
        .take(rows)
        .enumerate()
        .map(|(i, (left, right))| BenchAssignment {
            bench: (i + 1) as u32,
            left: Some(snapshot(left, branch1)),
            right: Some(snapshot(right, branch2)),
        })
        .collect();
    let allocated_student_ids = allocated_ids(&benches);

    Ok(Allocation {
        benches,
        allocated_student_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn students(prefix: &str, branch: &str, n: usize) -> Vec<Student> {
        (1..=n)
            .map(|i| Student {
                id: format!("{prefix}{i}"),
                name: format!("Student {prefix}{i}"),
                university_no: Some(format!("{branch}{i:03}")),
                branch: branch.to_string(),
                year: Some(2),
                semester: Some(3),
            })
            .collect()
    }

    fn classroom(capacity: i64, bench_count: i64) -> Classroom {
        Classroom {
            id: "room-a".into(),
            name: "Room A".into(),
            capacity,
            bench_count,
            allocated_students: Vec::new(),
        }
    }

    #[test]
    fn pairs_rows_from_both_pools_in_order() {
        let s = students("S", "CSE", 3);
        let t = students("T", "ECE", 2);
        let alloc = allocate(&classroom(20, 5), "CSE", &s, "ECE", &t).expect("allocate");

        assert_eq!(alloc.benches.len(), 2);
        let row1 = &alloc.benches[0];
        assert_eq!(row1.bench, 1);
        assert_eq!(row1.left.as_ref().map(|o| o.student_id.as_str()), Some("S1"));
        assert_eq!(row1.right.as_ref().map(|o| o.student_id.as_str()), Some("T1"));
        let row2 = &alloc.benches[1];
        assert_eq!(row2.bench, 2);
        assert_eq!(row2.left.as_ref().map(|o| o.student_id.as_str()), Some("S2"));
        assert_eq!(row2.right.as_ref().map(|o| o.student_id.as_str()), Some("T2"));
        assert_eq!(alloc.allocated_student_ids, vec!["S1", "S2", "T1", "T2"]);
    }

    #[test]
    fn truncates_to_shorter_pool_and_bench_limit() {
        let k = |n1, n2, benches| {
            allocate(
                &classroom(100, benches),
                "CSE",
                &students("S", "CSE", n1),
                "ECE",
                &students("T", "ECE", n2),
            )
            .expect("allocate")
            .benches
            .len()
        };
        assert_eq!(k(5, 3, 10), 3);
        assert_eq!(k(10, 10, 4), 4);
        assert_eq!(k(2, 7, 4), 2);
    }

    #[test]
    fn bench_limit_falls_back_to_half_capacity() {
        let alloc = allocate(
            &classroom(7, 0),
            "CSE",
            &students("S", "CSE", 10),
            "ECE",
            &students("T", "ECE", 10),
        )
        .expect("allocate");
        assert_eq!(alloc.benches.len(), 3);
    }

    #[test]
    fn rows_are_contiguous_and_occupants_unique() {
        let alloc = allocate(
            &classroom(40, 18),
            "CSE",
            &students("S", "CSE", 18),
            "ECE",
            &students("T", "ECE", 12),
        )
        .expect("allocate");

        let rows: Vec<u32> = alloc.benches.iter().map(|b| b.bench).collect();
        assert_eq!(rows, (1..=12).collect::<Vec<u32>>());
        assert!(alloc
            .benches
            .iter()
            .all(|b| b.left.is_some() && b.right.is_some()));

        let ids: Vec<&str> = alloc
            .benches
            .iter()
            .flat_map(|b| b.occupants())
            .map(|o| o.student_id.as_str())
            .collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(alloc.allocated_student_ids.len(), 24);
    }

    #[test]
    fn same_inputs_give_same_output() {
        let s = students("S", "CSE", 6);
        let t = students("T", "ECE", 6);
        let room = classroom(20, 4);
        let a = allocate(&room, "CSE", &s, "ECE", &t).expect("first");
        let b = allocate(&room, "CSE", &s, "ECE", &t).expect("second");
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.benches).expect("json"),
            serde_json::to_string(&b.benches).expect("json")
        );
    }

    #[test]
    fn empty_pool_is_insufficient() {
        let err = allocate(
            &classroom(20, 5),
            "CSE",
            &[],
            "ECE",
            &students("T", "ECE", 3),
        )
        .expect_err("empty branch1");
        assert_eq!(err.code(), "insufficient_students");

        let err = allocate(
            &classroom(20, 5),
            "CSE",
            &students("S", "CSE", 3),
            "ECE",
            &[],
        )
        .expect_err("empty branch2");
        assert!(matches!(
            err,
            AllocationError::InsufficientStudents { n1: 3, n2: 0, .. }
        ));
    }

    #[test]
    fn same_branch_on_both_sides_is_rejected() {
        let s = students("S", "CSE", 2);
        let err = allocate(&classroom(20, 5), "CSE", &s, "cse ", &s).unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn student_in_both_pools_is_rejected() {
        let s = students("S", "CSE", 2);
        let mut t = students("T", "ECE", 2);
        t[1] = s[0].clone();
        let err = allocate(&classroom(20, 5), "CSE", &s, "ECE", &t).unwrap_err();
        assert!(matches!(err, AllocationError::InvalidRequest(ref m) if m.contains("S1")));
    }

    #[test]
    fn classroom_without_benches_is_rejected() {
        let err = allocate(
            &classroom(1, 0),
            "CSE",
            &students("S", "CSE", 3),
            "ECE",
            &students("T", "ECE", 3),
        )
        .expect_err("no benches");
        assert_eq!(err.code(), "no_bench_capacity");
    }

    #[test]
    fn snapshot_uses_requested_branch_and_display_name() {
        let mut s = students("S", "CSE", 1);
        s[0].university_no = None;
        let t = students("T", "XYZ", 1);
        let alloc = allocate(&classroom(20, 5), "CSE", &s, "XYZ", &t).expect("allocate");

        let left = alloc.benches[0].left.as_ref().expect("left");
        assert_eq!(left.branch, "CSE");
        assert_eq!(left.branch_name, "Computer Science and Engineering");
        assert_eq!(left.university_no, None);

        let right = alloc.benches[0].right.as_ref().expect("right");
        assert_eq!(right.branch_name, "XYZ");
        assert_eq!(right.university_no.as_deref(), Some("XYZ001"));
    }

    #[test]
    fn exclusion_set_is_union_of_other_classrooms() {
        let held = |id: &str, ids: &[&str]| ClassroomAllocation {
            classroom_id: id.to_string(),
            student_ids: ids.iter().map(|s| s.to_string()).collect(),
        };
        let lists = vec![held("r1", &["a", "b"]), held("r2", &[]), held("r3", &["b", "c"])];

        let all = exclusion_set(&lists, None);
        assert_eq!(all.len(), 3);
        assert!(all.contains("a") && all.contains("c"));

        let without_r1 = exclusion_set(&lists, Some("r1"));
        assert!(!without_r1.contains("a"));
        assert!(without_r1.contains("b"));
    }
}
