use crate::allocation::AllocationError;
use crate::model::{
    BenchAssignment, Classroom, ClassroomAllocation, ExamPair, SeatingArrangement, Student,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;

/// Everything the seating service reads from and writes to the workspace.
///
/// Reads fail with `DataUnavailable`, writes with `PersistenceError`.
pub trait SeatingStore {
    /// Students of `branch` not in `excluded`, ordered by university number, at most `limit`.
    fn list_eligible_students(
        &self,
        branch: &str,
        excluded: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<Student>, AllocationError>;

    /// Students (role `student`) among `ids`; unknown ids and other roles are left out.
    fn get_students(&self, ids: &[String]) -> Result<Vec<Student>, AllocationError>;

    fn get_classroom(&self, id: &str) -> Result<Option<Classroom>, AllocationError>;

    /// One allocated list per classroom that holds any students.
    fn list_all_classroom_allocated_students(
        &self,
    ) -> Result<Vec<ClassroomAllocation>, AllocationError>;

    /// Replaces the classroom's allocated list with `student_ids`.
    fn write_classroom_allocated_students(
        &self,
        id: &str,
        student_ids: &[String],
    ) -> Result<(), AllocationError>;

    fn read_seating_arrangement(
        &self,
        classroom_id: &str,
    ) -> Result<Option<SeatingArrangement>, AllocationError>;

    /// Updates the classroom's arrangement in place when one exists, inserts otherwise.
    fn upsert_seating_arrangement(
        &self,
        classroom_id: &str,
        benches: &[BenchAssignment],
        exams: &ExamPair,
    ) -> Result<SeatingArrangement, AllocationError>;

    /// Returns false when there was nothing to delete.
    fn delete_seating_arrangement(&self, classroom_id: &str) -> Result<bool, AllocationError>;

    fn list_seating_arrangements(&self) -> Result<Vec<SeatingArrangement>, AllocationError>;

    /// Runs `f` so that no other writer can interleave with it.
    ///
    /// The default runs `f` directly.
    fn with_write_lock<T, F>(&self, f: F) -> Result<T, AllocationError>
    where
        F: FnOnce(&Self) -> Result<T, AllocationError>,
    {
        f(self)
    }
}

fn read_err(e: impl std::fmt::Display) -> AllocationError {
    AllocationError::DataUnavailable(e.to_string())
}

fn write_err(e: impl std::fmt::Display) -> AllocationError {
    AllocationError::PersistenceError(e.to_string())
}

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        university_no: r.get(2)?,
        branch: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
        year: r.get(4)?,
        semester: r.get(5)?,
    })
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // Savepoints nest inside an outer BEGIN IMMEDIATE and behave like a transaction without one.
    fn savepoint<T>(
        &self,
        name: &str,
        f: impl FnOnce() -> Result<T, AllocationError>,
    ) -> Result<T, AllocationError> {
        self.conn
            .execute_batch(&format!("SAVEPOINT {name}"))
            .map_err(write_err)?;
        match f() {
            Ok(v) => {
                self.conn
                    .execute_batch(&format!("RELEASE {name}"))
                    .map_err(write_err)?;
                Ok(v)
            }
            Err(e) => {
                let _ = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"));
                Err(e)
            }
        }
    }

    fn allocated_for(&self, classroom_id: &str) -> Result<Vec<String>, AllocationError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT student_id FROM allocated_students
                 WHERE classroom_id = ?
                 ORDER BY position",
            )
            .map_err(read_err)?;
        stmt.query_map([classroom_id], |r| r.get::<_, String>(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(read_err)
    }

    fn arrangement_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(SeatingArrangement, String)> {
        let seating_json: String = row.get(3)?;
        Ok((
            SeatingArrangement {
                classroom_id: row.get(0)?,
                exam_id_1: row.get(1)?,
                exam_id_2: row.get(2)?,
                seating_data: Vec::new(),
                version: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            },
            seating_json,
        ))
    }

    fn decode_arrangement(
        (mut arrangement, seating_json): (SeatingArrangement, String),
    ) -> Result<SeatingArrangement, AllocationError> {
        arrangement.seating_data = serde_json::from_str(&seating_json).map_err(|e| {
            AllocationError::DataUnavailable(format!(
                "corrupt seating_data for classroom {}: {}",
                arrangement.classroom_id, e
            ))
        })?;
        Ok(arrangement)
    }
}

impl SeatingStore for SqliteStore<'_> {
    fn list_eligible_students(
        &self,
        branch: &str,
        excluded: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<Student>, AllocationError> {
        let mut bind_values: Vec<Value> = vec![Value::Text(branch.to_string())];
        let mut sql = String::from(
            "SELECT id, name, university_no, branch, year, semester
             FROM users
             WHERE role = 'student' AND branch = ?",
        );
        if !excluded.is_empty() {
            // Sorted so the statement text is stable for a given exclusion set.
            let mut ids: Vec<&String> = excluded.iter().collect();
            ids.sort();
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND id NOT IN ({})", placeholders));
            bind_values.extend(ids.into_iter().map(|id| Value::Text(id.clone())));
        }
        sql.push_str(" ORDER BY university_no IS NULL, university_no, id LIMIT ?");
        bind_values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

        let mut stmt = self.conn.prepare(&sql).map_err(read_err)?;
        stmt.query_map(params_from_iter(bind_values), student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(read_err)
    }

    fn get_students(&self, ids: &[String]) -> Result<Vec<Student>, AllocationError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, name, university_no, branch, year, semester
             FROM users
             WHERE role = 'student' AND id IN ({})
             ORDER BY id",
            placeholders
        );
        let mut stmt = self.conn.prepare(&sql).map_err(read_err)?;
        stmt.query_map(params_from_iter(ids.iter()), student_from_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(read_err)
    }

    fn get_classroom(&self, id: &str) -> Result<Option<Classroom>, AllocationError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, capacity, bench_count FROM classrooms WHERE id = ?",
                [id],
                |r| {
                    Ok(Classroom {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        capacity: r.get(2)?,
                        bench_count: r.get(3)?,
                        allocated_students: Vec::new(),
                    })
                },
            )
            .optional()
            .map_err(read_err)?;
        let Some(mut classroom) = row else {
            return Ok(None);
        };
        classroom.allocated_students = self.allocated_for(&classroom.id)?;
        Ok(Some(classroom))
    }

    fn list_all_classroom_allocated_students(
        &self,
    ) -> Result<Vec<ClassroomAllocation>, AllocationError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT classroom_id, student_id FROM allocated_students
                 ORDER BY classroom_id, position",
            )
            .map_err(read_err)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(read_err)?;

        let mut out: Vec<ClassroomAllocation> = Vec::new();
        for (classroom_id, student_id) in rows {
            match out.last_mut() {
                Some(last) if last.classroom_id == classroom_id => last.student_ids.push(student_id),
                _ => out.push(ClassroomAllocation {
                    classroom_id,
                    student_ids: vec![student_id],
                }),
            }
        }
        Ok(out)
    }

    fn write_classroom_allocated_students(
        &self,
        id: &str,
        student_ids: &[String],
    ) -> Result<(), AllocationError> {
        self.savepoint("allocated_students_write", || {
            self.conn
                .execute("DELETE FROM allocated_students WHERE classroom_id = ?", [id])
                .map_err(write_err)?;
            let mut stmt = self
                .conn
                .prepare(
                    "INSERT INTO allocated_students(classroom_id, student_id, position)
                     VALUES(?, ?, ?)",
                )
                .map_err(write_err)?;
            for (i, sid) in student_ids.iter().enumerate() {
                stmt.execute((id, sid, i as i64)).map_err(write_err)?;
            }
            Ok(())
        })
    }

    fn read_seating_arrangement(
        &self,
        classroom_id: &str,
    ) -> Result<Option<SeatingArrangement>, AllocationError> {
        let row = self
            .conn
            .query_row(
                "SELECT classroom_id, exam_id_1, exam_id_2, seating_data, version, created_at, updated_at
                 FROM seating_arrangements
                 WHERE classroom_id = ?",
                [classroom_id],
                Self::arrangement_from_row,
            )
            .optional()
            .map_err(read_err)?;
        row.map(Self::decode_arrangement).transpose()
    }

    fn upsert_seating_arrangement(
        &self,
        classroom_id: &str,
        benches: &[BenchAssignment],
        exams: &ExamPair,
    ) -> Result<SeatingArrangement, AllocationError> {
        let seating_json = serde_json::to_string(benches).map_err(write_err)?;
        let now = now_rfc3339();

        let existing: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT version, created_at FROM seating_arrangements WHERE classroom_id = ?",
                [classroom_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(write_err)?;

        let (version, created_at) = match existing {
            Some((version, created_at)) => {
                self.conn
                    .execute(
                        "UPDATE seating_arrangements
                         SET exam_id_1 = ?, exam_id_2 = ?, seating_data = ?, version = ?, updated_at = ?
                         WHERE classroom_id = ?",
                        (
                            exams.exam_id_1.as_deref(),
                            exams.exam_id_2.as_deref(),
                            &seating_json,
                            version + 1,
                            &now,
                            classroom_id,
                        ),
                    )
                    .map_err(write_err)?;
                (version + 1, created_at)
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO seating_arrangements(
                           classroom_id, exam_id_1, exam_id_2, seating_data, version, created_at, updated_at
                         ) VALUES(?, ?, ?, ?, 1, ?, ?)",
                        (
                            classroom_id,
                            exams.exam_id_1.as_deref(),
                            exams.exam_id_2.as_deref(),
                            &seating_json,
                            &now,
                            &now,
                        ),
                    )
                    .map_err(write_err)?;
                (1, now.clone())
            }
        };

        Ok(SeatingArrangement {
            classroom_id: classroom_id.to_string(),
            exam_id_1: exams.exam_id_1.clone(),
            exam_id_2: exams.exam_id_2.clone(),
            seating_data: benches.to_vec(),
            version,
            created_at,
            updated_at: now,
        })
    }

    fn delete_seating_arrangement(&self, classroom_id: &str) -> Result<bool, AllocationError> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM seating_arrangements WHERE classroom_id = ?",
                [classroom_id],
            )
            .map_err(write_err)?;
        Ok(changed > 0)
    }

    fn list_seating_arrangements(&self) -> Result<Vec<SeatingArrangement>, AllocationError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT classroom_id, exam_id_1, exam_id_2, seating_data, version, created_at, updated_at
                 FROM seating_arrangements
                 ORDER BY classroom_id",
            )
            .map_err(read_err)?;
        let rows = stmt
            .query_map([], Self::arrangement_from_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(read_err)?;
        rows.into_iter().map(Self::decode_arrangement).collect()
    }

    fn with_write_lock<T, F>(&self, f: F) -> Result<T, AllocationError>
    where
        F: FnOnce(&Self) -> Result<T, AllocationError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(write_err)?;
        match f(self) {
            Ok(v) => {
                self.conn.execute_batch("COMMIT").map_err(write_err)?;
                Ok(v)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}
