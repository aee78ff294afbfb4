use crate::calc::{parse_date, AcademicYear, DATE_FORMAT};
use crate::ipc::error::err;
use crate::ipc::helpers::{
    db_conn, db_err, ensure_exists, insert_err, optional_str, require_role, required_str,
    respond, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{ANY_ROLE, SETUP_WRITERS};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::params_from_iter;
use serde_json::json;
use uuid::Uuid;

fn handle_institutions_create(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let conn = db_conn(state, req)?;
    let name = required_str(req, "name")?;

    let institution_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO institutions(id, name) VALUES(?, ?)",
        (&institution_id, &name),
    )
    .map_err(|e| insert_err(req, e, "institutions"))?;

    Ok(json!({ "institutionId": institution_id, "name": name }))
}

fn handle_institutions_list(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, ANY_ROLE)?;
    let conn = db_conn(state, req)?;

    let mut stmt = conn
        .prepare(
            "SELECT
               i.id,
               i.name,
               (SELECT COUNT(*) FROM classes c WHERE c.institution_id = i.id) AS class_count
             FROM institutions i
             ORDER BY i.name",
        )
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    let institutions = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let class_count: i64 = row.get(2)?;
            Ok(json!({ "id": id, "name": name, "classCount": class_count }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;

    Ok(json!({ "institutions": institutions }))
}

fn required_date(req: &Request, key: &str) -> Result<NaiveDate, serde_json::Value> {
    let raw = required_str(req, key)?;
    parse_date(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be a YYYY-MM-DD date", key),
            Some(json!({ key: raw })),
        )
    })
}

fn handle_academic_years_create(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let conn = db_conn(state, req)?;
    let name = required_str(req, "name")?;
    let start_date = required_date(req, "startDate")?;
    let end_date = required_date(req, "endDate")?;
    if end_date <= start_date {
        return Err(err(
            &req.id,
            "bad_params",
            "endDate must be after startDate",
            None,
        ));
    }
    let semester_two_start = match optional_str(req, "semesterTwoStart")? {
        Some(_) => required_date(req, "semesterTwoStart")?,
        None => AcademicYear::default_semester_two_start(start_date).ok_or_else(|| {
            err(&req.id, "bad_params", "startDate year is out of range", None)
        })?,
    };
    if semester_two_start <= start_date || semester_two_start > end_date {
        return Err(err(
            &req.id,
            "bad_params",
            "semesterTwoStart must fall after startDate and not after endDate",
            Some(json!({ "semesterTwoStart": semester_two_start.format(DATE_FORMAT).to_string() })),
        ));
    }

    let academic_year_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO academic_years(id, name, start_date, end_date, semester_two_start)
         VALUES(?, ?, ?, ?, ?)",
        (
            &academic_year_id,
            &name,
            start_date.format(DATE_FORMAT).to_string(),
            end_date.format(DATE_FORMAT).to_string(),
            semester_two_start.format(DATE_FORMAT).to_string(),
        ),
    )
    .map_err(|e| insert_err(req, e, "academic_years"))?;

    Ok(json!({
        "academicYearId": academic_year_id,
        "name": name,
        "startDate": start_date,
        "endDate": end_date,
        "semesterTwoStart": semester_two_start,
    }))
}

fn handle_academic_years_list(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, ANY_ROLE)?;
    let conn = db_conn(state, req)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, name, start_date, end_date, semester_two_start
             FROM academic_years
             ORDER BY start_date DESC",
        )
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    let years = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let start: String = row.get(2)?;
            let end: String = row.get(3)?;
            let s2: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "startDate": start,
                "endDate": end,
                "semesterTwoStart": s2,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;

    Ok(json!({ "academicYears": years }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let conn = db_conn(state, req)?;
    let institution_id = required_str(req, "institutionId")?;
    let name = required_str(req, "name")?;
    ensure_exists(conn, req, "institutions", &institution_id, "institution")?;

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, institution_id, name) VALUES(?, ?, ?)",
        (&class_id, &institution_id, &name),
    )
    .map_err(|e| insert_err(req, e, "classes"))?;

    Ok(json!({ "classId": class_id, "institutionId": institution_id, "name": name }))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, ANY_ROLE)?;
    let conn = db_conn(state, req)?;
    let institution_id = optional_str(req, "institutionId")?;

    // Correlated subqueries keep the counts free of join fan-out.
    let mut sql = String::from(
        "SELECT
           c.id,
           c.institution_id,
           c.name,
           (SELECT COUNT(*) FROM students s
             WHERE s.class_id = c.id AND s.status = 'ACTIVE') AS active_count,
           (SELECT COUNT(*) FROM subjects m WHERE m.class_id = c.id) AS subject_count
         FROM classes c",
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(id) = institution_id {
        sql.push_str(" WHERE c.institution_id = ?");
        binds.push(Value::Text(id));
    }
    sql.push_str(" ORDER BY c.name");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    let classes = stmt
        .query_map(params_from_iter(binds), |row| {
            let id: String = row.get(0)?;
            let institution_id: String = row.get(1)?;
            let name: String = row.get(2)?;
            let active_count: i64 = row.get(3)?;
            let subject_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "institutionId": institution_id,
                "name": name,
                "activeStudentCount": active_count,
                "subjectCount": subject_count,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;

    Ok(json!({ "classes": classes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "institutions.create" => handle_institutions_create(state, req),
        "institutions.list" => handle_institutions_list(state, req),
        "academicYears.create" => handle_academic_years_create(state, req),
        "academicYears.list" => handle_academic_years_list(state, req),
        "classes.create" => handle_classes_create(state, req),
        "classes.list" => handle_classes_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
