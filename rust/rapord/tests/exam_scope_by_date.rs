mod common;

use common::{seed_7a, Sidecar};
use serde_json::json;

fn fiqh_average(
    sidecar: &mut Sidecar,
    student: &str,
    subject: &str,
    ay: &str,
    semester: &str,
) -> serde_json::Value {
    sidecar.request_ok(
        "rapor.subjectAverage",
        json!({
            "studentId": student,
            "subjectId": subject,
            "academicYearId": ay,
            "semester": semester,
        }),
    )["average"]
        .clone()
}

#[test]
fn untagged_exams_are_placed_by_their_date() {
    let mut sidecar = Sidecar::spawn();
    let seed = seed_7a(&mut sidecar, "rapord-scope-date");
    let fiqh = sidecar.id_of(
        "subjects.create",
        json!({ "classId": seed.class_id, "name": "Fiqh" }),
        "subjectId",
    );

    let mut dated_exam = |name: &str, date: &str| {
        sidecar.id_of(
            "exams.create",
            json!({ "subjectId": fiqh, "name": name, "examDate": date }),
            "examId",
        )
    };
    let september = dated_exam("Ulangan 1", "2025-09-01");
    let december = dated_exam("Ulangan 2", "2025-12-31");
    let january = dated_exam("Ulangan 3", "2026-01-01");
    let next_year = dated_exam("Ulangan 4", "2026-08-01");

    for (exam, score) in [(&september, 7.0), (&december, 8.0), (&january, 5.0), (&next_year, 1.0)] {
        sidecar.request_ok(
            "scores.exam.upsert",
            json!({ "examId": exam, "studentId": seed.ahmad, "score": score }),
        );
    }

    let ay = seed.academic_year_id.clone();
    assert_eq!(fiqh_average(&mut sidecar, &seed.ahmad, &fiqh, &ay, "1"), json!(7.5));
    assert_eq!(fiqh_average(&mut sidecar, &seed.ahmad, &fiqh, &ay, "2"), json!(5.0));

    // A tag overrides the date.
    let tagged = sidecar.id_of(
        "exams.create",
        json!({
            "subjectId": fiqh,
            "name": "Remedial",
            "examDate": "2025-10-01",
            "academicYearId": ay,
            "semester": "2",
        }),
        "examId",
    );
    sidecar.request_ok(
        "scores.exam.upsert",
        json!({ "examId": tagged, "studentId": seed.ahmad, "score": 10 }),
    );
    assert_eq!(fiqh_average(&mut sidecar, &seed.ahmad, &fiqh, &ay, "1"), json!(7.5));
    assert_eq!(fiqh_average(&mut sidecar, &seed.ahmad, &fiqh, &ay, "2"), json!(7.5));

    let _ = std::fs::remove_dir_all(&seed.workspace);
}

#[test]
fn exams_need_a_full_tag_or_a_date() {
    let mut sidecar = Sidecar::spawn();
    let seed = seed_7a(&mut sidecar, "rapord-scope-create");

    assert_eq!(
        sidecar.request_err(
            "exams.create",
            json!({ "subjectId": seed.math_id, "name": "Kuis" }),
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.request_err(
            "exams.create",
            json!({
                "subjectId": seed.math_id,
                "name": "Kuis",
                "academicYearId": seed.academic_year_id,
            }),
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.request_err(
            "exams.create",
            json!({ "subjectId": seed.math_id, "name": "Kuis", "examDate": "2025-02-30" }),
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.request_err(
            "exams.create",
            json!({
                "subjectId": seed.math_id,
                "name": "Kuis",
                "academicYearId": "missing",
                "semester": "1",
            }),
        ),
        "not_found"
    );

    let listed = sidecar.request_ok("exams.list", json!({ "subjectId": seed.math_id }));
    assert_eq!(listed["exams"].as_array().expect("exams").len(), 1);

    let _ = std::fs::remove_dir_all(&seed.workspace);
}

#[test]
fn academic_year_split_defaults_to_january_and_must_fit() {
    let mut sidecar = Sidecar::spawn();
    let seed = seed_7a(&mut sidecar, "rapord-scope-year");

    let years = sidecar.request_ok("academicYears.list", json!({}));
    assert_eq!(years["academicYears"][0]["semesterTwoStart"], json!("2026-01-01"));

    let created = sidecar.request_ok(
        "academicYears.create",
        json!({
            "name": "2026/2027",
            "startDate": "2026-07-13",
            "endDate": "2027-06-25",
            "semesterTwoStart": "2027-01-04",
        }),
    );
    assert_eq!(created["semesterTwoStart"], json!("2027-01-04"));

    assert_eq!(
        sidecar.request_err(
            "academicYears.create",
            json!({
                "name": "2027/2028",
                "startDate": "2027-07-12",
                "endDate": "2028-06-30",
                "semesterTwoStart": "2028-07-01",
            }),
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.request_err(
            "academicYears.create",
            json!({ "name": "2025/2026", "startDate": "2025-07-14", "endDate": "2026-06-30" }),
        ),
        "conflict"
    );

    let _ = std::fs::remove_dir_all(&seed.workspace);
}
