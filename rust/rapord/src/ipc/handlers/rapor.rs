use crate::calc::{
    average_for_subject, compose_report, compute_class_rapor, resolve_scope, score_for_category,
    RaporPolicy, Scope, SqliteSource,
};
use crate::ipc::error::err;
use crate::ipc::handlers::settings::load_policy;
use crate::ipc::helpers::{
    calc_err, db_conn, require_role, required_semester, required_str, respond, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::session::RAPOR_READERS;
use rusqlite::Connection;
use serde_json::json;

fn request_scope(
    source: &SqliteSource<'_>,
    req: &Request,
) -> Result<Scope, serde_json::Value> {
    let academic_year_id = required_str(req, "academicYearId")?;
    let semester = required_semester(req, "semester")?;
    resolve_scope(source, &academic_year_id, semester).map_err(|e| calc_err(req, e))
}

fn workspace_policy(conn: &Connection, req: &Request) -> Result<RaporPolicy, serde_json::Value> {
    load_policy(conn).map_err(|e| err(&req.id, "settings_read_failed", format!("{e:?}"), None))
}

fn handle_subject_average(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, RAPOR_READERS)?;
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let subject_id = required_str(req, "subjectId")?;
    let source = SqliteSource::new(conn);
    let scope = request_scope(&source, req)?;

    let average = average_for_subject(&source, &student_id, &subject_id, &scope)
        .map_err(|e| calc_err(req, e))?;
    Ok(json!({
        "studentId": student_id,
        "subjectId": subject_id,
        "average": average,
    }))
}

fn handle_category_score(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, RAPOR_READERS)?;
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let category_id = required_str(req, "categoryId")?;
    let source = SqliteSource::new(conn);
    let scope = request_scope(&source, req)?;

    let score = score_for_category(&source, &student_id, &category_id, &scope)
        .map_err(|e| calc_err(req, e))?;
    Ok(json!({
        "studentId": student_id,
        "categoryId": category_id,
        "score": score,
    }))
}

fn handle_student(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, RAPOR_READERS)?;
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let class_id = required_str(req, "classId")?;
    let source = SqliteSource::new(conn);
    let scope = request_scope(&source, req)?;
    let policy = workspace_policy(conn, req)?;

    let record = compose_report(&source, &student_id, &class_id, &scope, &policy)
        .map_err(|e| calc_err(req, e))?;
    Ok(json!({
        "academicYearId": scope.academic_year.id,
        "semester": scope.semester,
        "policy": policy,
        "record": record,
    }))
}

fn handle_class(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, RAPOR_READERS)?;
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let source = SqliteSource::new(conn);
    let scope = request_scope(&source, req)?;
    let policy = workspace_policy(conn, req)?;

    let rapor = compute_class_rapor(&source, &class_id, &scope, &policy)
        .map_err(|e| calc_err(req, e))?;
    tracing::info!(
        class_id = %rapor.class.id,
        students = rapor.students.len(),
        ranked = rapor.ranked_count,
        "class rapor computed"
    );
    Ok(json!(rapor))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "rapor.subjectAverage" => handle_subject_average(state, req),
        "rapor.categoryScore" => handle_category_score(state, req),
        "rapor.student" => handle_student(state, req),
        "rapor.class" => handle_class(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
