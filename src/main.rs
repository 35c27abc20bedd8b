mod backup;
mod calc;
mod config;
mod db;
mod ipc;
mod model;

use serde_json::json;
use std::io::{self, BufRead, Write};

fn main() {
    let cfg = config::Config::from_env();
    config::init_logging(&cfg.log_filter);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "notasd starting");

    let mut state = ipc::AppState::new();
    if let Some(path) = cfg.workspace.as_deref() {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            tracing::warn!(workspace = %path.display(), error = %e, "startup workspace not opened");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // No id to echo back.
                tracing::debug!(error = %e, "unparseable request");
                json!({ "ok": false, "error": { "code": "bad_json", "message": e.to_string() } })
            }
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed; exiting");
}
