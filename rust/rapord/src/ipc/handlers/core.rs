use crate::db;
use crate::ipc::helpers::{required_str, respond, HandlerResult};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "session": state.session.as_ref().map(|s| json!({
            "principalId": s.principal_id,
            "activeRole": s.active_role,
        })),
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let path = PathBuf::from(required_str(req, "path")?);

    match db::open_db(&path) {
        Ok(conn) => {
            tracing::info!(workspace = %path.display(), "workspace selected");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            Ok(json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => Err(err(&req.id, "db_open_failed", format!("{e:?}"), None)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(respond(req, handle_health(state, req))),
        "workspace.select" => Some(respond(req, handle_workspace_select(state, req))),
        _ => None,
    }
}
