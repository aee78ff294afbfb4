use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

fn dispatch(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::session::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::subjects::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::categories::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::scores::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::rapor::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::settings::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::backup::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let resp = dispatch(state, &req);
    if resp.get("ok").and_then(|v| v.as_bool()) != Some(true) {
        let code = resp
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let message = resp
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        tracing::warn!(
            id = %req.id,
            method = %req.method,
            code,
            detail = message,
            "request failed"
        );
    } else {
        tracing::debug!(id = %req.id, method = %req.method, "request ok");
    }
    resp
}
