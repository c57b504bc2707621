use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, get_opt_i64, get_opt_str, get_required_str, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, ErrorCode};
use serde_json::json;
use uuid::Uuid;

const ROLES: &[&str] = &["student", "faculty", "admin"];

fn students_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let role = get_opt_str(&req.params, "role").unwrap_or_else(|| "student".to_string());
    let branch = get_opt_str(&req.params, "branch");

    let mut sql = String::from(
        "SELECT id, name, email, role, university_no, branch, year, semester
         FROM users
         WHERE role = ?",
    );
    let mut bind_values = vec![Value::Text(role)];
    if let Some(b) = branch {
        sql.push_str(" AND branch = ?");
        bind_values.push(Value::Text(b));
    }
    sql.push_str(" ORDER BY university_no IS NULL, university_no, id");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", "users", e))?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let email: Option<String> = row.get(2)?;
            let role: String = row.get(3)?;
            let university_no: Option<String> = row.get(4)?;
            let branch: Option<String> = row.get(5)?;
            let year: Option<i64> = row.get(6)?;
            let semester: Option<i64> = row.get(7)?;
            Ok(json!({
                "id": id,
                "name": name,
                "email": email,
                "role": role,
                "universityNo": university_no,
                "branch": branch,
                "year": year,
                "semester": semester
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "users", e))?;

    Ok(json!({ "students": rows }))
}

fn students_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_required_str(&req.params, "name")?;
    let role = get_opt_str(&req.params, "role").unwrap_or_else(|| "student".to_string());
    if !ROLES.contains(&role.as_str()) {
        return Err(HandlerErr::new(
            "bad_params",
            format!("role must be one of {}", ROLES.join(", ")),
        ));
    }
    let branch = get_opt_str(&req.params, "branch");
    if role == "student" && branch.is_none() {
        return Err(HandlerErr::new("bad_params", "missing branch"));
    }
    let university_no = get_opt_str(&req.params, "universityNo");
    let email = get_opt_str(&req.params, "email");
    let year = get_opt_i64(&req.params, "year")?;
    let semester = get_opt_i64(&req.params, "semester")?;

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(
           id, name, email, role, university_no, branch, year, semester, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &student_id,
            &name,
            email.as_deref(),
            &role,
            university_no.as_deref(),
            branch.as_deref(),
            year,
            semester,
        ),
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            HandlerErr::new(
                "conflict",
                format!(
                    "university number {} already exists",
                    university_no.as_deref().unwrap_or("")
                ),
            )
        }
        e => db_err("db_insert_failed", "users", e),
    })?;

    Ok(json!({ "studentId": student_id }))
}

// Seating snapshots already rendered keep the student; only the live allocation is dropped.
fn students_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = get_required_str(&req.params, "studentId")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "DELETE FROM allocated_students WHERE student_id = ?",
        [&student_id],
    )
    .map_err(|e| db_err("db_delete_failed", "allocated_students", e))?;
    let changed = tx
        .execute("DELETE FROM users WHERE id = ?", [&student_id])
        .map_err(|e| db_err("db_delete_failed", "users", e))?;
    if changed == 0 {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "students.list" => students_list(state, req),
        "students.create" => students_create(state, req),
        "students.delete" => students_delete(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
