use crate::ipc::error::ok;
use crate::ipc::helpers::{db_err, get_opt_i64, get_required_str, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{SeatingStore, SqliteStore};
use serde_json::json;
use uuid::Uuid;

fn classrooms_list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classrooms": [] }));
    };

    // Correlated subqueries keep the counts independent of each other.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.capacity,
               c.bench_count,
               (SELECT COUNT(*) FROM allocated_students a WHERE a.classroom_id = c.id) AS allocated_count,
               EXISTS(SELECT 1 FROM seating_arrangements sa WHERE sa.classroom_id = c.id) AS has_arrangement
             FROM classrooms c
             ORDER BY c.name",
        )
        .map_err(|e| db_err("db_query_failed", "classrooms", e))?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let capacity: i64 = row.get(2)?;
            let bench_count: i64 = row.get(3)?;
            let allocated_count: i64 = row.get(4)?;
            let has_arrangement: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "capacity": capacity,
                "benchCount": bench_count,
                "allocatedCount": allocated_count,
                "hasArrangement": has_arrangement != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "classrooms", e))?;

    Ok(json!({ "classrooms": rows }))
}

fn classrooms_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_required_str(&req.params, "name")?;
    let capacity = get_opt_i64(&req.params, "capacity")?
        .ok_or_else(|| HandlerErr::new("bad_params", "missing capacity"))?;
    let bench_count = get_opt_i64(&req.params, "benchCount")?.unwrap_or(0);
    if capacity < 0 || bench_count < 0 {
        return Err(HandlerErr::new(
            "bad_params",
            "capacity/benchCount must not be negative",
        ));
    }

    let classroom_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classrooms(id, name, capacity, bench_count) VALUES(?, ?, ?, ?)",
        (&classroom_id, &name, capacity, bench_count),
    )
    .map_err(|e| db_err("db_insert_failed", "classrooms", e))?;

    Ok(json!({ "classroomId": classroom_id, "name": name }))
}

fn classrooms_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let classroom_id = get_required_str(&req.params, "classroomId")?;
    let classroom = SqliteStore::new(conn)
        .get_classroom(&classroom_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "classroom not found"))?;

    Ok(json!({
        "classroom": {
            "id": classroom.id,
            "name": classroom.name,
            "capacity": classroom.capacity,
            "benchCount": classroom.bench_count,
            "benchLimit": classroom.bench_limit(),
            "allocatedStudents": classroom.allocated_students,
        }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "classrooms.list" => classrooms_list(state, req),
        "classrooms.create" => classrooms_create(state, req),
        "classrooms.get" => classrooms_get(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
