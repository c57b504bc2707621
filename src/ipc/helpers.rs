use crate::allocation::AllocationError;
use crate::ipc::error::err;
use crate::ipc::types::AppState;
use rusqlite::Connection;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<AllocationError> for HandlerErr {
    fn from(e: AllocationError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Trimmed string param; missing or blank is `bad_params`.
pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match get_opt_str(params, key) {
        Some(v) => Ok(v),
        None => Err(HandlerErr::new("bad_params", format!("missing {}", key))),
    }
}

/// Trimmed string param; blank counts as absent.
pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_opt_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::new("bad_params", format!("{} must be an integer", key))),
    }
}

pub fn get_opt_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::new("bad_params", format!("{} must be a boolean", key))),
    }
}

pub fn db_err(code: &'static str, table: &str, e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new(code, e.to_string()).with_details(serde_json::json!({ "table": table }))
}
