use crate::allocation::{self, Allocation, AllocationError};
use crate::config::Config;
use crate::model::{
    allocated_ids, BenchAssignment, Classroom, ExamPair, SeatingArrangement, Student,
};
use crate::store::SeatingStore;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub exam_id_1: Option<String>,
    pub exam_id_2: Option<String>,
    pub classroom_id: String,
    pub branch1: String,
    pub branch2: String,
    pub pool_limit: Option<usize>,
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedSeating {
    pub classroom: String,
    pub classroom_id: String,
    pub exam_id_1: Option<String>,
    pub exam_id_2: Option<String>,
    pub total_students_allocated: usize,
    pub seating_data: Vec<BenchAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GenerateOutcome {
    Success {
        success: bool,
        data: GeneratedSeating,
    },
    Failure {
        success: bool,
        code: String,
        message: String,
    },
}

impl GenerateOutcome {
    fn failure(e: &AllocationError) -> Self {
        Self::Failure {
            success: false,
            code: e.code().to_string(),
            message: format!("Failed to generate seating: {}", e),
        }
    }
}

/// Everything read and computed for one allocation round, before any write.
#[derive(Debug, Clone)]
pub struct AllocationPlan {
    pub classroom: Classroom,
    pub exams: ExamPair,
    pub allocation: Allocation,
}

/// Reads the classroom, the exclusion set and both pools, then pairs them.
pub fn plan_allocation<S: SeatingStore>(
    store: &S,
    config: &Config,
    req: &GenerateRequest,
) -> Result<AllocationPlan, AllocationError> {
    allocation::check_distinct_branches(&req.branch1, &req.branch2)?;
    let classroom = store
        .get_classroom(&req.classroom_id)?
        .ok_or_else(|| AllocationError::ClassroomNotFound(req.classroom_id.clone()))?;

    // Read once; allocations committed elsewhere after this point are not seen.
    let held = store.list_all_classroom_allocated_students()?;
    let excluded = allocation::exclusion_set(&held, Some(&classroom.id));
    let limit = req.pool_limit.unwrap_or(config.pool_limit);

    let pool1 = store.list_eligible_students(&req.branch1, &excluded, limit)?;
    let pool2 = store.list_eligible_students(&req.branch2, &excluded, limit)?;
    debug!(
        classroom_id = %classroom.id,
        excluded = excluded.len(),
        branch1 = %req.branch1,
        pool1 = pool1.len(),
        branch2 = %req.branch2,
        pool2 = pool2.len(),
        "student pools loaded"
    );

    let allocation = allocation::allocate(&classroom, &req.branch1, &pool1, &req.branch2, &pool2)?;
    Ok(AllocationPlan {
        classroom,
        exams: ExamPair {
            exam_id_1: req.exam_id_1.clone(),
            exam_id_2: req.exam_id_2.clone(),
        },
        allocation,
    })
}

/// Students in `ids` that some other classroom currently holds.
fn conflicts<S: SeatingStore>(
    store: &S,
    classroom_id: &str,
    ids: &[String],
) -> Result<Vec<String>, AllocationError> {
    let held = store.list_all_classroom_allocated_students()?;
    let elsewhere = allocation::exclusion_set(&held, Some(classroom_id));
    Ok(ids
        .iter()
        .filter(|id| elsewhere.contains(*id))
        .cloned()
        .collect())
}

/// Writes the classroom's allocated list, then upserts its arrangement.
///
/// The two writes are independent: if the arrangement write fails the allocated
/// list stays written.
pub fn commit_allocation<S: SeatingStore>(
    store: &S,
    classroom_id: &str,
    benches: &[BenchAssignment],
    allocated_student_ids: &[String],
    exams: &ExamPair,
) -> Result<SeatingArrangement, AllocationError> {
    store.write_classroom_allocated_students(classroom_id, allocated_student_ids)?;
    store.upsert_seating_arrangement(classroom_id, benches, exams)
}

/// Like `commit_allocation`, but re-reads the exclusion set under the store's
/// write lock and refuses students another classroom took in the meantime.
pub fn commit_allocation_strict<S: SeatingStore>(
    store: &S,
    classroom_id: &str,
    benches: &[BenchAssignment],
    allocated_student_ids: &[String],
    exams: &ExamPair,
) -> Result<SeatingArrangement, AllocationError> {
    store.with_write_lock(|s| {
        let taken = conflicts(s, classroom_id, allocated_student_ids)?;
        if !taken.is_empty() {
            return Err(AllocationError::AllocationConflict { student_ids: taken });
        }
        commit_allocation(s, classroom_id, benches, allocated_student_ids, exams)
    })
}

fn run_generate<S: SeatingStore>(
    store: &S,
    config: &Config,
    req: &GenerateRequest,
) -> Result<GeneratedSeating, AllocationError> {
    let plan = plan_allocation(store, config, req)?;
    let AllocationPlan {
        classroom,
        exams,
        allocation,
    } = &plan;
    let arrangement = if req.strict.unwrap_or(config.strict_allocation) {
        commit_allocation_strict(
            store,
            &classroom.id,
            &allocation.benches,
            &allocation.allocated_student_ids,
            exams,
        )?
    } else {
        commit_allocation(
            store,
            &classroom.id,
            &allocation.benches,
            &allocation.allocated_student_ids,
            exams,
        )?
    };

    Ok(GeneratedSeating {
        classroom: plan.classroom.name,
        classroom_id: arrangement.classroom_id,
        exam_id_1: arrangement.exam_id_1,
        exam_id_2: arrangement.exam_id_2,
        total_students_allocated: plan.allocation.allocated_student_ids.len(),
        seating_data: arrangement.seating_data,
    })
}

pub fn generate_seating_arrangement<S: SeatingStore>(
    store: &S,
    config: &Config,
    req: &GenerateRequest,
) -> GenerateOutcome {
    info!(
        classroom_id = %req.classroom_id,
        branch1 = %req.branch1,
        branch2 = %req.branch2,
        "generating seating arrangement"
    );
    match run_generate(store, config, req) {
        Ok(data) => {
            info!(
                classroom_id = %data.classroom_id,
                benches = data.seating_data.len(),
                students = data.total_students_allocated,
                "seating arrangement committed"
            );
            GenerateOutcome::Success {
                success: true,
                data,
            }
        }
        Err(e) => {
            warn!(classroom_id = %req.classroom_id, code = e.code(), error = %e, "seating generation failed");
            GenerateOutcome::failure(&e)
        }
    }
}

/// Removes the classroom's arrangement. Its allocated list is left as is.
pub fn delete_seating_arrangement<S: SeatingStore>(
    store: &S,
    classroom_id: &str,
) -> Result<(), AllocationError> {
    if !store.delete_seating_arrangement(classroom_id)? {
        return Err(AllocationError::NotFound(format!(
            "no seating arrangement for classroom {}",
            classroom_id
        )));
    }
    info!(classroom_id, "seating arrangement deleted");
    Ok(())
}

/// Clears the classroom's allocated list without touching its arrangement.
pub fn release_allocation<S: SeatingStore>(
    store: &S,
    classroom_id: &str,
) -> Result<usize, AllocationError> {
    let classroom = store
        .get_classroom(classroom_id)?
        .ok_or_else(|| AllocationError::ClassroomNotFound(classroom_id.to_string()))?;
    store.write_classroom_allocated_students(classroom_id, &[])?;
    info!(
        classroom_id,
        released = classroom.allocated_students.len(),
        "classroom allocation released"
    );
    Ok(classroom.allocated_students.len())
}

pub fn get_seating_arrangement<S: SeatingStore>(
    store: &S,
    classroom_id: &str,
) -> Result<Option<SeatingArrangement>, AllocationError> {
    store.read_seating_arrangement(classroom_id)
}

#[derive(Debug, Clone, Serialize)]
pub struct ArrangementSummary {
    pub classroom: Option<String>,
    #[serde(flatten)]
    pub arrangement: SeatingArrangement,
}

pub fn list_seating_arrangements<S: SeatingStore>(
    store: &S,
) -> Result<Vec<ArrangementSummary>, AllocationError> {
    store
        .list_seating_arrangements()?
        .into_iter()
        .map(|arrangement| {
            let classroom = store
                .get_classroom(&arrangement.classroom_id)?
                .map(|c| c.name);
            Ok(ArrangementSummary {
                classroom,
                arrangement,
            })
        })
        .collect()
}

fn validate_benches(
    classroom: &Classroom,
    benches: &[BenchAssignment],
) -> Result<(), AllocationError> {
    let limit = classroom.bench_limit();
    let mut rows = HashSet::new();
    let mut seen = HashSet::new();
    for b in benches {
        if b.bench == 0 || b.bench as usize > limit {
            return Err(AllocationError::InvalidArrangement(format!(
                "bench {} is outside 1..={}",
                b.bench, limit
            )));
        }
        if !rows.insert(b.bench) {
            return Err(AllocationError::InvalidArrangement(format!(
                "bench {} appears more than once",
                b.bench
            )));
        }
        for occ in b.occupants() {
            if !seen.insert(occ.student_id.as_str()) {
                return Err(AllocationError::InvalidArrangement(format!(
                    "student {} is seated more than once",
                    occ.student_id
                )));
            }
        }
    }
    Ok(())
}

/// Replaces each occupant with a fresh snapshot of the stored student.
///
/// Ids that are not students fail the save; the caller's names and branches are ignored.
fn resnapshot_occupants<S: SeatingStore>(
    store: &S,
    benches: &mut [BenchAssignment],
) -> Result<(), AllocationError> {
    let ids: Vec<String> = benches
        .iter()
        .flat_map(|b| b.occupants())
        .map(|o| o.student_id.clone())
        .collect();
    let students: HashMap<String, Student> = store
        .get_students(&ids)?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();

    let unknown: Vec<&str> = ids
        .iter()
        .filter(|id| !students.contains_key(*id))
        .map(|id| id.as_str())
        .collect();
    if !unknown.is_empty() {
        return Err(AllocationError::InvalidArrangement(format!(
            "not students: {}",
            unknown.join(", ")
        )));
    }

    for bench in benches.iter_mut() {
        for seat in [&mut bench.left, &mut bench.right] {
            if let Some(occ) = seat.as_mut() {
                if let Some(student) = students.get(&occ.student_id) {
                    *occ = allocation::snapshot(student, &student.branch);
                }
            }
        }
    }
    Ok(())
}

/// Replaces a classroom's arrangement with manually edited benches.
pub fn save_seating_arrangement<S: SeatingStore>(
    store: &S,
    classroom_id: &str,
    mut benches: Vec<BenchAssignment>,
) -> Result<SeatingArrangement, AllocationError> {
    let classroom = store
        .get_classroom(classroom_id)?
        .ok_or_else(|| AllocationError::ClassroomNotFound(classroom_id.to_string()))?;
    validate_benches(&classroom, &benches)?;
    benches.sort_by_key(|b| b.bench);
    resnapshot_occupants(store, &mut benches)?;

    let ids = allocated_ids(&benches);
    let taken = conflicts(store, classroom_id, &ids)?;
    if !taken.is_empty() {
        return Err(AllocationError::InvalidArrangement(format!(
            "students already allocated to another classroom: {}",
            taken.join(", ")
        )));
    }

    let exams = store
        .read_seating_arrangement(classroom_id)?
        .map(|a| ExamPair {
            exam_id_1: a.exam_id_1,
            exam_id_2: a.exam_id_2,
        })
        .unwrap_or_default();
    let arrangement = commit_allocation(store, classroom_id, &benches, &ids, &exams)?;
    info!(
        classroom_id,
        benches = arrangement.seating_data.len(),
        version = arrangement.version,
        "seating arrangement saved"
    );
    Ok(arrangement)
}
