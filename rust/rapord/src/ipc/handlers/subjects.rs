use crate::calc::{parse_date, Semester, DATE_FORMAT};
use crate::db::next_sort_order;
use crate::ipc::error::err;
use crate::ipc::helpers::{
    db_conn, db_err, ensure_exists, insert_err, optional_str, require_role, required_semester,
    required_str, respond, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{ANY_ROLE, SETUP_WRITERS};
use serde_json::json;
use uuid::Uuid;

fn handle_subjects_create(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let name = required_str(req, "name")?;
    ensure_exists(conn, req, "classes", &class_id, "class")?;

    let sort_order = next_sort_order(conn, "subjects", "class_id", &class_id)
        .map_err(|e| db_err(req, "db_query_failed", e, Some("subjects")))?;
    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, class_id, name, sort_order) VALUES(?, ?, ?, ?)",
        (&subject_id, &class_id, &name, sort_order),
    )
    .map_err(|e| insert_err(req, e, "subjects"))?;

    Ok(json!({
        "subjectId": subject_id,
        "classId": class_id,
        "name": name,
        "sortOrder": sort_order,
    }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, ANY_ROLE)?;
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;

    let mut stmt = conn
        .prepare(
            "SELECT
               m.id,
               m.name,
               m.sort_order,
               (SELECT COUNT(*) FROM exams e WHERE e.subject_id = m.id) AS exam_count
             FROM subjects m
             WHERE m.class_id = ?
             ORDER BY m.sort_order, m.name",
        )
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    let subjects = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let sort_order: i64 = row.get(2)?;
            let exam_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "classId": class_id,
                "name": name,
                "sortOrder": sort_order,
                "examCount": exam_count,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;

    Ok(json!({ "subjects": subjects }))
}

fn handle_exams_create(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let conn = db_conn(state, req)?;
    let subject_id = required_str(req, "subjectId")?;
    let name = required_str(req, "name")?;
    ensure_exists(conn, req, "subjects", &subject_id, "subject")?;

    let exam_date = match optional_str(req, "examDate")? {
        Some(raw) => Some(parse_date(&raw).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "examDate must be a YYYY-MM-DD date",
                Some(json!({ "examDate": raw })),
            )
        })?),
        None => None,
    };
    let academic_year_id = optional_str(req, "academicYearId")?;
    let has_semester = req.params.get("semester").is_some_and(|v| !v.is_null());

    // A tag is both fields or neither.
    let tag: Option<(String, Semester)> = match (academic_year_id, has_semester) {
        (Some(ay), true) => {
            ensure_exists(conn, req, "academic_years", &ay, "academic year")?;
            Some((ay, required_semester(req, "semester")?))
        }
        (None, false) => None,
        _ => {
            return Err(err(
                &req.id,
                "bad_params",
                "academicYearId and semester must be given together",
                None,
            ))
        }
    };
    if tag.is_none() && exam_date.is_none() {
        return Err(err(
            &req.id,
            "bad_params",
            "an exam needs academicYearId + semester or an examDate",
            None,
        ));
    }

    let sort_order = next_sort_order(conn, "exams", "subject_id", &subject_id)
        .map_err(|e| db_err(req, "db_query_failed", e, Some("exams")))?;
    let exam_id = Uuid::new_v4().to_string();
    let date_text = exam_date.map(|d| d.format(DATE_FORMAT).to_string());
    let (tag_year, tag_semester) = match &tag {
        Some((ay, sem)) => (Some(ay.as_str()), Some(sem.as_str())),
        None => (None, None),
    };
    conn.execute(
        "INSERT INTO exams(id, subject_id, name, exam_date, academic_year_id, semester, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &exam_id,
            &subject_id,
            &name,
            &date_text,
            tag_year,
            tag_semester,
            sort_order,
        ),
    )
    .map_err(|e| insert_err(req, e, "exams"))?;

    Ok(json!({
        "examId": exam_id,
        "subjectId": subject_id,
        "name": name,
        "examDate": date_text,
        "academicYearId": tag_year,
        "semester": tag_semester,
        "sortOrder": sort_order,
    }))
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, ANY_ROLE)?;
    let conn = db_conn(state, req)?;
    let subject_id = required_str(req, "subjectId")?;

    let mut stmt = conn
        .prepare(
            "SELECT
               e.id,
               e.name,
               e.exam_date,
               e.academic_year_id,
               e.semester,
               e.sort_order,
               (SELECT COUNT(*) FROM exam_scores x WHERE x.exam_id = e.id) AS score_count
             FROM exams e
             WHERE e.subject_id = ?
             ORDER BY e.sort_order",
        )
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    let exams = stmt
        .query_map([&subject_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let exam_date: Option<String> = row.get(2)?;
            let academic_year_id: Option<String> = row.get(3)?;
            let semester: Option<String> = row.get(4)?;
            let sort_order: i64 = row.get(5)?;
            let score_count: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "subjectId": subject_id,
                "name": name,
                "examDate": exam_date,
                "academicYearId": academic_year_id,
                "semester": semester,
                "sortOrder": sort_order,
                "scoreCount": score_count,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;

    Ok(json!({ "exams": exams }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.create" => handle_subjects_create(state, req),
        "subjects.list" => handle_subjects_list(state, req),
        "exams.create" => handle_exams_create(state, req),
        "exams.list" => handle_exams_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
