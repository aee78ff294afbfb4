use crate::ipc::error::err;
use crate::ipc::helpers::{required_str, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::session::{Role, SessionContext};
use serde_json::json;
use std::collections::BTreeSet;

fn parse_role(req: &Request, raw: &str) -> Result<Role, serde_json::Value> {
    Role::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "role must be one of: ADMIN, TEACHER, HOMEROOM, STAFF",
            Some(json!({ "role": raw })),
        )
    })
}

fn handle_session_begin(state: &mut AppState, req: &Request) -> HandlerResult {
    let principal_id = required_str(req, "principalId")?;
    let Some(raw_roles) = req.params.get("roles").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing roles", None));
    };
    let mut roles = BTreeSet::new();
    for raw in raw_roles {
        let Some(s) = raw.as_str() else {
            return Err(err(&req.id, "bad_params", "roles must be strings", None));
        };
        roles.insert(parse_role(req, s)?);
    }
    let active_role = parse_role(req, &required_str(req, "activeRole")?)?;

    let session = SessionContext::new(principal_id, roles, active_role)
        .map_err(|msg| err(&req.id, "bad_params", msg, None))?;
    tracing::info!(
        principal = %session.principal_id,
        role = session.active_role.as_str(),
        "session started"
    );
    let payload = json!(session);
    state.session = Some(session);
    Ok(payload)
}

fn handle_session_switch_role(state: &mut AppState, req: &Request) -> HandlerResult {
    let role = parse_role(req, &required_str(req, "role")?)?;
    let Some(session) = state.session.as_mut() else {
        return Err(err(&req.id, "no_session", "begin a session first", None));
    };
    session
        .switch_role(role)
        .map_err(|msg| err(&req.id, "forbidden", msg, None))?;
    tracing::info!(
        principal = %session.principal_id,
        role = role.as_str(),
        "active role switched"
    );
    Ok(json!(session))
}

fn handle_session_get(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({ "session": state.session }))
}

fn handle_session_end(state: &mut AppState, _req: &Request) -> HandlerResult {
    let ended = state.session.take().is_some();
    Ok(json!({ "ended": ended }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.begin" => Some(respond(req, handle_session_begin(state, req))),
        "session.switchRole" => Some(respond(req, handle_session_switch_role(state, req))),
        "session.get" => Some(respond(req, handle_session_get(state, req))),
        "session.end" => Some(respond(req, handle_session_end(state, req))),
        _ => None,
    }
}
