use crate::backup;
use crate::db;
use crate::ipc::error::err;
use crate::ipc::helpers::{optional_str, require_role, required_str, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::session::SETUP_WRITERS;
use serde_json::json;
use std::path::PathBuf;

fn handle_export_workspace_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let out_path = required_str(req, "outPath")?;
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let out = PathBuf::from(&out_path);
    let export = backup::export_workspace_bundle(&workspace_path, &out).map_err(|e| {
        err(
            &req.id,
            "io_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path })),
        )
    })?;

    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

fn handle_import_workspace_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let in_path = required_str(req, "inPath")?;
    let workspace_path = optional_str(req, "workspacePath")?
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone());
    let Some(workspace_path) = workspace_path else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        ));
    }

    // The database file is replaced underneath; release our handle first.
    let replacing_current = state.workspace.as_ref() == Some(&workspace_path);
    if replacing_current {
        state.db = None;
    }

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            if replacing_current {
                state.db = db::open_db(&workspace_path).ok();
            }
            return Err(err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            ));
        }
    };

    let conn = db::open_db(&workspace_path)
        .map_err(|e| err(&req.id, "db_open_failed", format!("{e:?}"), None))?;
    state.workspace = Some(workspace_path.clone());
    state.db = Some(conn);

    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_export_workspace_bundle(state, req),
        "backup.importWorkspaceBundle" => handle_import_workspace_bundle(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
