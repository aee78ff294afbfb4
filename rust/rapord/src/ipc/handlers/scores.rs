use crate::calc::{is_valid_exam_score, is_valid_numeric_grade, GradeType, LetterGrade};
use crate::db::now_stamp;
use crate::ipc::error::err;
use crate::ipc::helpers::{
    db_conn, db_err, ensure_exists, require_role, required_semester, required_str, respond,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::session::SCORE_WRITERS;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Class the exam belongs to, through its subject.
fn exam_class_id(
    conn: &Connection,
    req: &Request,
    exam_id: &str,
) -> Result<String, serde_json::Value> {
    conn.query_row(
        "SELECT m.class_id FROM exams e JOIN subjects m ON m.id = e.subject_id WHERE e.id = ?",
        [exam_id],
        |r| r.get(0),
    )
    .optional()
    .map_err(|e| db_err(req, "db_query_failed", e, None))?
    .ok_or_else(|| {
        err(
            &req.id,
            "not_found",
            "exam not found",
            Some(json!({ "id": exam_id })),
        )
    })
}

fn ensure_student_in_class(
    conn: &Connection,
    req: &Request,
    student_id: &str,
    class_id: &str,
) -> Result<(), serde_json::Value> {
    let student_class: Option<String> = conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    match student_class {
        None => Err(err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "id": student_id })),
        )),
        Some(c) if c != class_id => Err(err(
            &req.id,
            "bad_params",
            "student is not enrolled in the exam's class",
            Some(json!({ "studentId": student_id, "classId": class_id })),
        )),
        Some(_) => Ok(()),
    }
}

fn exam_score_value(raw: Option<&serde_json::Value>) -> Result<f64, &'static str> {
    let score = raw
        .and_then(|v| v.as_f64())
        .ok_or("score must be a number")?;
    if !is_valid_exam_score(score) {
        return Err("score must be between 1 and 10");
    }
    Ok(score)
}

fn upsert_exam_score(
    conn: &Connection,
    exam_id: &str,
    student_id: &str,
    score: f64,
) -> rusqlite::Result<usize> {
    let score_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exam_scores(id, exam_id, student_id, score, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(exam_id, student_id) DO UPDATE SET
           score = excluded.score,
           updated_at = excluded.updated_at",
        (&score_id, exam_id, student_id, score, now_stamp()),
    )
}

fn handle_exam_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SCORE_WRITERS)?;
    let conn = db_conn(state, req)?;
    let exam_id = required_str(req, "examId")?;
    let student_id = required_str(req, "studentId")?;
    let raw_score = req.params.get("score");
    let score = exam_score_value(raw_score)
        .map_err(|msg| err(&req.id, "bad_params", msg, Some(json!({ "score": raw_score }))))?;

    let class_id = exam_class_id(conn, req, &exam_id)?;
    ensure_student_in_class(conn, req, &student_id, &class_id)?;
    upsert_exam_score(conn, &exam_id, &student_id, score)
        .map_err(|e| db_err(req, "db_insert_failed", e, Some("exam_scores")))?;

    Ok(json!({ "examId": exam_id, "studentId": student_id, "score": score }))
}

fn handle_exam_bulk_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SCORE_WRITERS)?;
    let conn = db_conn(state, req)?;
    let exam_id = required_str(req, "examId")?;
    let Some(raw_entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing entries", None));
    };
    let class_id = exam_class_id(conn, req, &exam_id)?;

    // Everything is validated before the first write.
    let mut entries: Vec<(String, f64)> = Vec::with_capacity(raw_entries.len());
    for (index, entry) in raw_entries.iter().enumerate() {
        let student_id = entry
            .get("studentId")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    "entry is missing studentId",
                    Some(json!({ "index": index })),
                )
            })?
            .to_string();
        let score = exam_score_value(entry.get("score")).map_err(|msg| {
            err(
                &req.id,
                "bad_params",
                msg,
                Some(json!({
                    "index": index,
                    "studentId": student_id,
                    "score": entry.get("score"),
                })),
            )
        })?;
        ensure_student_in_class(conn, req, &student_id, &class_id)?;
        entries.push((student_id, score));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| db_err(req, "db_tx_failed", e, None))?;
    for (student_id, score) in &entries {
        upsert_exam_score(&tx, &exam_id, student_id, *score)
            .map_err(|e| db_err(req, "db_insert_failed", e, Some("exam_scores")))?;
    }
    tx.commit()
        .map_err(|e| db_err(req, "db_commit_failed", e, None))?;

    tracing::info!(exam = %exam_id, count = entries.len(), "exam scores upserted");
    Ok(json!({ "examId": exam_id, "upserted": entries.len() }))
}

fn handle_category_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SCORE_WRITERS)?;
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let category_id = required_str(req, "categoryId")?;
    let academic_year_id = required_str(req, "academicYearId")?;
    let semester = required_semester(req, "semester")?;
    ensure_exists(conn, req, "academic_years", &academic_year_id, "academic year")?;

    let category: Option<(String, String)> = conn
        .query_row(
            "SELECT grade_type, institution_id FROM categories WHERE id = ?",
            [&category_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    let Some((raw_grade_type, category_institution)) = category else {
        return Err(err(
            &req.id,
            "not_found",
            "category not found",
            Some(json!({ "id": category_id })),
        ));
    };
    let Some(grade_type) = GradeType::parse(&raw_grade_type) else {
        return Err(err(
            &req.id,
            "invalid_input",
            "stored category has an unknown grade type",
            Some(json!({ "gradeType": raw_grade_type })),
        ));
    };

    let student_institution: Option<String> = conn
        .query_row(
            "SELECT c.institution_id
             FROM students s
             JOIN classes c ON c.id = s.class_id
             WHERE s.id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    let Some(student_institution) = student_institution else {
        return Err(err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "id": student_id })),
        ));
    };
    if student_institution != category_institution {
        return Err(err(
            &req.id,
            "bad_params",
            "category belongs to another institution",
            Some(json!({ "studentId": student_id, "categoryId": category_id })),
        ));
    }

    let raw_value = req.params.get("value");
    let (letter, numeric): (Option<LetterGrade>, Option<f64>) = match grade_type {
        GradeType::Letter => {
            let letter = raw_value.and_then(|v| v.as_str()).and_then(LetterGrade::parse);
            let Some(letter) = letter else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "value must be one of the letters A, B, C, D, E",
                    Some(json!({ "value": raw_value })),
                ));
            };
            (Some(letter), None)
        }
        GradeType::Numeric => {
            let value = raw_value.and_then(|v| v.as_f64());
            let Some(value) = value.filter(|v| is_valid_numeric_grade(*v)) else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "value must be a number between 0 and 100",
                    Some(json!({ "value": raw_value })),
                ));
            };
            (None, Some(value))
        }
    };

    let score_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO category_scores(
           id, student_id, category_id, academic_year_id, semester,
           letter_value, numeric_value, updated_at
         )
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, category_id, academic_year_id, semester) DO UPDATE SET
           letter_value = excluded.letter_value,
           numeric_value = excluded.numeric_value,
           updated_at = excluded.updated_at",
        (
            &score_id,
            &student_id,
            &category_id,
            &academic_year_id,
            semester.as_str(),
            letter.map(LetterGrade::as_str),
            numeric,
            now_stamp(),
        ),
    )
    .map_err(|e| db_err(req, "db_insert_failed", e, Some("category_scores")))?;

    let stored = match (letter, numeric) {
        (Some(l), _) => json!(l.as_str()),
        (None, n) => json!(n),
    };
    Ok(json!({
        "studentId": student_id,
        "categoryId": category_id,
        "academicYearId": academic_year_id,
        "semester": semester,
        "value": stored,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "scores.exam.upsert" => handle_exam_upsert(state, req),
        "scores.exam.bulkUpsert" => handle_exam_bulk_upsert(state, req),
        "scores.category.upsert" => handle_category_upsert(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
