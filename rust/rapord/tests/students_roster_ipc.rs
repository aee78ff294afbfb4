mod common;

use common::{seed_7a, Sidecar};
use serde_json::json;

fn names(result: &serde_json::Value) -> Vec<String> {
    result["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|s| s["name"].as_str().expect("name").to_string())
        .collect()
}

#[test]
fn list_applies_each_query_field() {
    let mut sidecar = Sidecar::spawn();
    let seed = seed_7a(&mut sidecar, "rapord-roster-query");
    let class_7b = sidecar.id_of(
        "classes.create",
        json!({ "institutionId": seed.institution_id, "name": "7B" }),
        "classId",
    );
    sidecar.request_ok(
        "students.create",
        json!({ "classId": class_7b, "name": "Fauzan", "nis": "2025101" }),
    );

    let all = sidecar.request_ok("students.list", json!({}));
    assert_eq!(all["students"].as_array().expect("students").len(), 5);

    let in_7a = sidecar.request_ok(
        "students.list",
        json!({ "query": { "classId": seed.class_id } }),
    );
    assert_eq!(names(&in_7a), vec!["Ahmad", "Budi", "Chairul", "Dimas"]);

    let active_7a = sidecar.request_ok(
        "students.list",
        json!({ "query": { "classId": seed.class_id, "status": "ACTIVE" } }),
    );
    assert_eq!(names(&active_7a), vec!["Ahmad", "Budi", "Chairul"]);

    let by_nis = sidecar.request_ok("students.list", json!({ "query": { "search": "2025101" } }));
    assert_eq!(names(&by_nis), vec!["Fauzan"]);

    let by_name = sidecar.request_ok("students.list", json!({ "query": { "search": "ud" } }));
    assert_eq!(names(&by_name), vec!["Budi"]);

    // LIKE wildcards in the search text are literal.
    let wildcard = sidecar.request_ok("students.list", json!({ "query": { "search": "%" } }));
    assert!(names(&wildcard).is_empty());

    assert_eq!(
        sidecar.request_err("students.list", json!({ "query": { "status": "ALUMNI" } })),
        "bad_params"
    );
    assert_eq!(
        sidecar.request_err("students.list", json!({ "query": { "kelas": "7A" } })),
        "bad_params"
    );

    let _ = std::fs::remove_dir_all(&seed.workspace);
}

#[test]
fn status_changes_move_students_in_and_out_of_the_rapor() {
    let mut sidecar = Sidecar::spawn();
    let seed = seed_7a(&mut sidecar, "rapord-roster-status");
    let params = json!({
        "classId": seed.class_id,
        "academicYearId": seed.academic_year_id,
        "semester": "1",
    });

    sidecar.request_ok(
        "students.updateStatus",
        json!({ "studentId": seed.dimas, "status": "active" }),
    );
    let rapor = sidecar.request_ok("rapor.class", params.clone());
    assert_eq!(rapor["students"][0]["studentId"], json!(seed.dimas));
    assert_eq!(rapor["students"][0]["overallAverage"], json!(10.0));
    assert_eq!(rapor["rankedCount"], json!(3));

    sidecar.request_ok(
        "students.updateStatus",
        json!({ "studentId": seed.ahmad, "status": "TRANSFERRED" }),
    );
    let rapor = sidecar.request_ok("rapor.class", params);
    let ids: Vec<&str> = rapor["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|r| r["studentId"].as_str().expect("id"))
        .collect();
    assert!(!ids.contains(&seed.ahmad.as_str()));

    // Individual rapor stays available for non-active students.
    let record = sidecar.request_ok(
        "rapor.student",
        json!({
            "studentId": seed.ahmad,
            "classId": seed.class_id,
            "academicYearId": seed.academic_year_id,
            "semester": "1",
        }),
    );
    assert_eq!(record["record"]["overallAverage"], json!(8.5));

    assert_eq!(
        sidecar.request_err(
            "students.updateStatus",
            json!({ "studentId": "missing", "status": "ACTIVE" }),
        ),
        "not_found"
    );

    let classes = sidecar.request_ok(
        "classes.list",
        json!({ "institutionId": seed.institution_id }),
    );
    assert_eq!(classes["classes"][0]["activeStudentCount"], json!(3));
    assert_eq!(classes["classes"][0]["subjectCount"], json!(2));

    let _ = std::fs::remove_dir_all(&seed.workspace);
}
