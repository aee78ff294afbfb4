use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use crate::calc::{CalcError, Semester};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::{Role, SessionContext};

/// Handler bodies return either a result payload or a ready error envelope.
pub type HandlerResult = Result<serde_json::Value, serde_json::Value>;

pub fn respond(req: &Request, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e,
    }
}

pub fn db_conn<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn require_role<'a>(
    state: &'a AppState,
    req: &Request,
    allowed: &[Role],
) -> Result<&'a SessionContext, serde_json::Value> {
    let Some(session) = state.session.as_ref() else {
        return Err(err(&req.id, "no_session", "begin a session first", None));
    };
    if !session.allows(allowed) {
        return Err(err(
            &req.id,
            "forbidden",
            format!(
                "role {} may not call {}",
                session.active_role.as_str(),
                req.method
            ),
            Some(json!({
                "activeRole": session.active_role,
                "allowed": allowed,
            })),
        ));
    }
    Ok(session)
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let value = req
        .params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
    if value.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(value)
}

/// A string parameter that may be absent or null. Blank strings count as absent.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a string or null", key),
                    None,
                ));
            };
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

pub fn required_semester(req: &Request, key: &str) -> Result<Semester, serde_json::Value> {
    let Some(raw) = req.params.get(key) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    Semester::from_json(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be \"1\" or \"2\"", key),
            Some(json!({ key: raw })),
        )
    })
}

pub fn calc_err(req: &Request, e: CalcError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

pub fn db_err(
    req: &Request,
    code: &str,
    e: rusqlite::Error,
    table: Option<&str>,
) -> serde_json::Value {
    err(
        &req.id,
        code,
        e.to_string(),
        table.map(|t| json!({ "table": t })),
    )
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Insert failure; a unique-key clash is reported as `conflict`.
pub fn insert_err(req: &Request, e: rusqlite::Error, table: &str) -> serde_json::Value {
    if is_unique_violation(&e) {
        return err(
            &req.id,
            "conflict",
            format!("duplicate row in {}", table),
            Some(json!({ "table": table })),
        );
    }
    db_err(req, "db_insert_failed", e, Some(table))
}

/// `SELECT 1 FROM <table> WHERE id = ?`, mapped to a not_found envelope.
pub fn ensure_exists(
    conn: &Connection,
    req: &Request,
    table: &str,
    id: &str,
    what: &str,
) -> Result<(), serde_json::Value> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn
        .query_row(&sql, [id], |r| r.get(0))
        .optional()
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    if found.is_none() {
        return Err(err(
            &req.id,
            "not_found",
            format!("{} not found", what),
            Some(json!({ "id": id })),
        ));
    }
    Ok(())
}
