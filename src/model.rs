use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub university_no: Option<String>,
    pub branch: String,
    pub year: Option<i64>,
    pub semester: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    pub id: String,
    pub name: String,
    pub capacity: i64,
    /// Number of two-seat benches. 0 means unset; the limit is then derived from capacity.
    pub bench_count: i64,
    pub allocated_students: Vec<String>,
}

impl Classroom {
    /// Upper bound on bench rows before the student pools are considered.
    pub fn bench_limit(&self) -> usize {
        let benches = if self.bench_count > 0 {
            self.bench_count
        } else {
            self.capacity / 2
        };
        usize::try_from(benches).unwrap_or(0)
    }
}

/// Copy of a student's fields taken when the seat was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub student_id: String,
    pub name: String,
    pub branch: String,
    pub branch_name: String,
    pub university_no: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchAssignment {
    pub bench: u32,
    #[serde(default)]
    pub left: Option<Occupant>,
    #[serde(default)]
    pub right: Option<Occupant>,
}

impl BenchAssignment {
    pub fn occupants(&self) -> impl Iterator<Item = &Occupant> {
        self.left.iter().chain(self.right.iter())
    }
}

/// Flattens the occupants of `benches` into the classroom's allocated list:
/// left seats in row order, then right seats in row order.
pub fn allocated_ids(benches: &[BenchAssignment]) -> Vec<String> {
    let lefts = benches.iter().filter_map(|b| b.left.as_ref());
    let rights = benches.iter().filter_map(|b| b.right.as_ref());
    lefts.chain(rights).map(|o| o.student_id.clone()).collect()
}

/// The students one classroom currently holds, in allocation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassroomAllocation {
    pub classroom_id: String,
    pub student_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamPair {
    pub exam_id_1: Option<String>,
    pub exam_id_2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatingArrangement {
    pub classroom_id: String,
    pub exam_id_1: Option<String>,
    pub exam_id_2: Option<String>,
    pub seating_data: Vec<BenchAssignment>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}
