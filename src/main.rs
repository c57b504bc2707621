mod allocation;
mod config;
mod db;
mod ipc;
mod logging;
mod model;
mod seating;
mod store;

use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

fn main() {
    let config = config::Config::from_env();
    logging::init(&config.log_filter);

    let mut state = ipc::AppState::new(config);
    if let Some(path) = state.config.workspace.clone() {
        match db::open_db(&path) {
            Ok(conn) => {
                info!(workspace = %path.display(), "workspace opened from environment");
                state.workspace = Some(path);
                state.db = Some(conn);
            }
            // Keep serving; the client can still select a workspace explicitly.
            Err(e) => warn!(workspace = %path.display(), error = %e, "workspace open failed"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                warn!(error = %e, "unparseable request line");
                let _ = writeln!(
                    stdout,
                    "{}",
                    json!({ "ok": false, "error": { "code": "bad_json", "message": e.to_string() } })
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
