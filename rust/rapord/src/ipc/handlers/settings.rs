use crate::calc::RaporPolicy;
use crate::db::{settings_get_json, settings_set_json};
use crate::ipc::error::err;
use crate::ipc::helpers::{db_conn, require_role, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::session::{ANY_ROLE, SETUP_WRITERS};
use rusqlite::Connection;
use serde_json::json;

const RAPOR_POLICY_KEY: &str = "rapor.policy";

/// Stored policy, or the default when the workspace never set one.
pub fn load_policy(conn: &Connection) -> anyhow::Result<RaporPolicy> {
    match settings_get_json(conn, RAPOR_POLICY_KEY)? {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(RaporPolicy::default()),
    }
}

fn handle_rapor_get(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, ANY_ROLE)?;
    let conn = db_conn(state, req)?;
    let policy = load_policy(conn)
        .map_err(|e| err(&req.id, "settings_read_failed", format!("{e:?}"), None))?;
    Ok(json!({ "policy": policy }))
}

fn handle_rapor_update(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let conn = db_conn(state, req)?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "patch must be an object", None));
    };

    let mut policy = load_policy(conn)
        .map_err(|e| err(&req.id, "settings_read_failed", format!("{e:?}"), None))?;
    for (key, value) in patch {
        match key.as_str() {
            "includeCategoriesInOverall" => {
                let Some(flag) = value.as_bool() else {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        "includeCategoriesInOverall must be a boolean",
                        Some(json!({ "value": value })),
                    ));
                };
                policy.include_categories_in_overall = flag;
            }
            other => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("unknown rapor setting: {}", other),
                    None,
                ))
            }
        }
    }

    let stored = serde_json::to_value(policy)
        .map_err(|e| err(&req.id, "settings_write_failed", e.to_string(), None))?;
    settings_set_json(conn, RAPOR_POLICY_KEY, &stored)
        .map_err(|e| err(&req.id, "settings_write_failed", format!("{e:?}"), None))?;
    tracing::info!(
        include_categories = policy.include_categories_in_overall,
        "rapor policy updated"
    );
    Ok(json!({ "policy": policy }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "settings.rapor.get" => handle_rapor_get(state, req),
        "settings.rapor.update" => handle_rapor_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
