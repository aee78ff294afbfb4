use crate::calc::GradeType;
use crate::db::next_sort_order;
use crate::ipc::error::err;
use crate::ipc::helpers::{
    db_conn, db_err, ensure_exists, insert_err, optional_str, require_role, required_str,
    respond, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{ANY_ROLE, SETUP_WRITERS};
use serde_json::json;
use uuid::Uuid;

fn handle_categories_create(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, SETUP_WRITERS)?;
    let conn = db_conn(state, req)?;
    let institution_id = required_str(req, "institutionId")?;
    let name = required_str(req, "name")?;
    let raw_grade_type = required_str(req, "gradeType")?;
    let Some(grade_type) = GradeType::parse(&raw_grade_type) else {
        return Err(err(
            &req.id,
            "bad_params",
            "gradeType must be LETTER or NUMERIC",
            Some(json!({ "gradeType": raw_grade_type })),
        ));
    };
    let group_name = optional_str(req, "groupName")?;
    ensure_exists(conn, req, "institutions", &institution_id, "institution")?;

    let sort_order = next_sort_order(conn, "categories", "institution_id", &institution_id)
        .map_err(|e| db_err(req, "db_query_failed", e, Some("categories")))?;
    let category_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO categories(id, institution_id, name, grade_type, group_name, sort_order)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &category_id,
            &institution_id,
            &name,
            grade_type.as_str(),
            &group_name,
            sort_order,
        ),
    )
    .map_err(|e| insert_err(req, e, "categories"))?;

    Ok(json!({
        "categoryId": category_id,
        "institutionId": institution_id,
        "name": name,
        "gradeType": grade_type,
        "groupName": group_name,
        "sortOrder": sort_order,
    }))
}

fn handle_categories_list(state: &mut AppState, req: &Request) -> HandlerResult {
    require_role(state, req, ANY_ROLE)?;
    let conn = db_conn(state, req)?;
    let institution_id = required_str(req, "institutionId")?;

    let mut stmt = conn
        .prepare(
            "SELECT id, name, grade_type, group_name, sort_order
             FROM categories
             WHERE institution_id = ?
             ORDER BY sort_order, name",
        )
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;
    let categories = stmt
        .query_map([&institution_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let grade_type: String = row.get(2)?;
            let group_name: Option<String> = row.get(3)?;
            let sort_order: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "institutionId": institution_id,
                "name": name,
                "gradeType": grade_type,
                "groupName": group_name,
                "sortOrder": sort_order,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, "db_query_failed", e, None))?;

    Ok(json!({ "categories": categories }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "categories.create" => handle_categories_create(state, req),
        "categories.list" => handle_categories_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
