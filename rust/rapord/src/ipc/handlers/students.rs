use crate::calc::StudentStatus;
use crate::db::{next_sort_order, now_stamp};
use crate::ipc::error::err;
use crate::ipc::helpers::{
    db_conn, db_err, ensure_exists, insert_err, optional_str, require_role, required_str,
    respond, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{ANY_ROLE, SETUP_WRITERS};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Optional roster filter for `students.list`. Every present field narrows
/// the result; an empty filter lists all students.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StudentFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub status: Option<StudentStatus>,
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl StudentFilter {
    /// WHERE clause (empty or starting with " WHERE") plus its bound values.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut binds: Vec<Value> = Vec::new();

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("(name LIKE ? ESCAPE '\\' OR nis LIKE ? ESCAPE '\\')");
            let pattern = format!("%{}%", escape_like(search));
            binds.push(Value::Text(pattern.clone()));
            binds.push(Value::Text(pattern));
        }
        if let Some(class_id) = self.class_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("class_id = ?");
            binds.push(Value::Text(class_id.to_string()));
        }
        if let Some(status) = self.status {
            clauses.push("status = ?");
            binds.push(Value::Text(status.as_str().to_string()));
        }

        if clauses.is_empty() {
            (String::new(), binds)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), binds)
        }
    }
}

fn parse_status(req: &Request, raw: &str) -> Result<StudentStatus, serde_json::Value> {
    StudentStatus::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "status must be one of: ACTIVE, INACTIVE, GRADUATED, TRANSFERRED",
            Some(json!({ "status": raw })),
        )
    })
}

fn handle_students_create(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let name = required_str(req, "name")?;
    let nis = optional_str(req, "nis")?;
    let status = match optional_str(req, "status")? {
        Some(raw) => parse_status(req, &raw)?,
        None => StudentStatus::Active,
    };
    ensure_exists(conn, req, "classes", &class_id, "class")?;

    let sort_order = next_sort_order(conn, "students", "class_id", &class_id)
        .map_err(|e| db_err(req, "db_query_failed", e, Some("students")))?;
    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, name, nis, status, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &class_id,
            &name,
            &nis,
            status.as_str(),
            sort_order,
            now_stamp(),
        ),
    )
    .map_err(|e| insert_err(req, e, "students"))?;

    Ok(json!({
        "studentId": student_id,
        "classId": class_id,
        "name": name,
        "nis": nis,
        "status": status,
        "sortOrder": sort_order,
    }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, ANY_ROLE)?;
    let conn = db_conn(state, req)?;
    let filter: StudentFilter = match req.params.get("query") {
        None => StudentFilter::default(),
        Some(v) if v.is_null() => StudentFilter::default(),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("invalid query: {}", e),
                Some(json!({ "query": v })),
            )
        })?,
    };

    let (where_sql, binds) = filter.to_sql();
    let sql = format!(
        "SELECT id, class_id, name, nis, status, sort_order
         FROM students{}
         ORDER BY class_id, sort_order, id",
        where_sql
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    let students = stmt
        .query_map(params_from_iter(binds), |row| {
            let id: String = row.get(0)?;
            let class_id: String = row.get(1)?;
            let name: String = row.get(2)?;
            let nis: Option<String> = row.get(3)?;
            let status: String = row.get(4)?;
            let sort_order: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "classId": class_id,
                "name": name,
                "nis": nis,
                "status": status,
                "sortOrder": sort_order,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;

    Ok(json!({ "students": students }))
}

fn handle_students_update_status(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let status = parse_status(req, &required_str(req, "status")?)?;

    let changed = conn
        .execute(
            "UPDATE students SET status = ?, updated_at = ? WHERE id = ?",
            (status.as_str(), now_stamp(), &student_id),
        )
        .map_err(|e| db_err(req, "db_update_failed", e, Some("students")))?;
    if changed == 0 {
        return Err(err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "id": student_id })),
        ));
    }
    tracing::info!(student = %student_id, status = status.as_str(), "student status changed");
    Ok(json!({ "studentId": student_id, "status": status }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.create" => handle_students_create(state, req),
        "students.list" => handle_students_list(state, req),
        "students.updateStatus" => handle_students_update_status(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
