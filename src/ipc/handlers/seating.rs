use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_opt_bool, get_opt_i64, get_opt_str, get_required_str, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::BenchAssignment;
use crate::seating::{self, GenerateRequest};
use crate::store::SqliteStore;
use serde_json::json;

fn parse_generate(params: &serde_json::Value) -> Result<GenerateRequest, HandlerErr> {
    let pool_limit = match get_opt_i64(params, "poolLimit")? {
        Some(n) if n > 0 => Some(n as usize),
        Some(_) => return Err(HandlerErr::new("bad_params", "poolLimit must be positive")),
        None => None,
    };
    Ok(GenerateRequest {
        exam_id_1: get_opt_str(params, "examId1"),
        exam_id_2: get_opt_str(params, "examId2"),
        classroom_id: get_required_str(params, "classroomId")?,
        branch1: get_required_str(params, "branch1")?,
        branch2: get_required_str(params, "branch2")?,
        pool_limit,
        strict: get_opt_bool(params, "strict")?,
    })
}

fn seating_generate(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let gen = parse_generate(&req.params)?;
    let store = SqliteStore::new(conn);
    let outcome = seating::generate_seating_arrangement(&store, &state.config, &gen);
    // Allocation failures are part of the result, not protocol errors.
    serde_json::to_value(&outcome).map_err(|e| HandlerErr::new("encode_failed", e.to_string()))
}

fn seating_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let classroom_id = get_required_str(&req.params, "classroomId")?;
    let arrangement = seating::get_seating_arrangement(&SqliteStore::new(conn), &classroom_id)?;
    Ok(json!({ "arrangement": arrangement }))
}

fn seating_list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let arrangements = seating::list_seating_arrangements(&SqliteStore::new(conn))?;
    Ok(json!({ "arrangements": arrangements }))
}

fn seating_save(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let classroom_id = get_required_str(&req.params, "classroomId")?;
    let raw = req
        .params
        .get("seatingData")
        .cloned()
        .ok_or_else(|| HandlerErr::new("bad_params", "missing seatingData"))?;
    let benches: Vec<BenchAssignment> = serde_json::from_value(raw)
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid seatingData: {}", e)))?;

    let arrangement =
        seating::save_seating_arrangement(&SqliteStore::new(conn), &classroom_id, benches)?;
    Ok(json!({ "arrangement": arrangement }))
}

fn seating_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let classroom_id = get_required_str(&req.params, "classroomId")?;
    seating::delete_seating_arrangement(&SqliteStore::new(conn), &classroom_id)?;
    Ok(json!({ "ok": true }))
}

fn seating_release(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let classroom_id = get_required_str(&req.params, "classroomId")?;
    let released = seating::release_allocation(&SqliteStore::new(conn), &classroom_id)?;
    Ok(json!({ "released": released }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "seating.generate" => seating_generate(state, req),
        "seating.get" => seating_get(state, req),
        "seating.list" => seating_list(state, req),
        "seating.save" => seating_save(state, req),
        "seating.delete" => seating_delete(state, req),
        "seating.release" => seating_release(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
