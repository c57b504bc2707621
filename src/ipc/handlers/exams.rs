use crate::ipc::error::ok;
use crate::ipc::helpers::{db_err, get_opt_str, get_required_str, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

fn exams_list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "exams": [] }));
    };
    let mut stmt = conn
        .prepare(
            "SELECT id, name, exam_date, branch
             FROM exams
             ORDER BY exam_date IS NULL, exam_date, name",
        )
        .map_err(|e| db_err("db_query_failed", "exams", e))?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let exam_date: Option<String> = row.get(2)?;
            let branch: Option<String> = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "examDate": exam_date,
                "branch": branch
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "exams", e))?;

    Ok(json!({ "exams": rows }))
}

fn exams_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_required_str(&req.params, "name")?;
    let exam_date = get_opt_str(&req.params, "examDate");
    if let Some(d) = exam_date.as_deref() {
        if NaiveDate::parse_from_str(d, "%Y-%m-%d").is_err() {
            return Err(HandlerErr::new("bad_params", "examDate must be YYYY-MM-DD"));
        }
    }
    let branch = get_opt_str(&req.params, "branch");

    let exam_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exams(id, name, exam_date, branch) VALUES(?, ?, ?, ?)",
        (&exam_id, &name, exam_date.as_deref(), branch.as_deref()),
    )
    .map_err(|e| db_err("db_insert_failed", "exams", e))?;

    Ok(json!({ "examId": exam_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "exams.list" => exams_list(state, req),
        "exams.create" => exams_create(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
