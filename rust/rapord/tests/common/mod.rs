#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// A running `rapord` process driven over its stdin/stdout pipes.
pub struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_rapord");
        let mut child = Command::new(exe)
            .env_remove("RAPORD_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn rapord");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            _child: child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
        }
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id.to_string();
        self.next_id += 1;
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Sends a request expected to fail and returns its error code.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    pub fn id_of(&mut self, method: &str, params: serde_json::Value, key: &str) -> String {
        let result = self.request_ok(method, params);
        result
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_else(|| panic!("{} missing {}: {}", method, key, result))
            .to_string()
    }

    pub fn begin_admin(&mut self) {
        self.request_ok(
            "session.begin",
            json!({
                "principalId": "admin-1",
                "roles": ["ADMIN", "TEACHER", "HOMEROOM", "STAFF"],
                "activeRole": "ADMIN",
            }),
        );
    }
}

/// Ids of the class 7A fixture built by [`seed_7a`].
pub struct Class7a {
    pub workspace: PathBuf,
    pub institution_id: String,
    pub academic_year_id: String,
    pub class_id: String,
    pub math_id: String,
    pub quran_id: String,
    pub math_exam_id: String,
    pub quran_exam_id: String,
    pub akhlak_id: String,
    pub hadir_id: String,
    pub ahmad: String,
    pub budi: String,
    pub chairul: String,
    pub dimas: String,
}

/// MTs with academic year 2025/2026 and class 7A: Ahmad (MATH 8, QURAN 9),
/// Budi (7, 7), Chairul (no scores) and Dimas (10, 10, then set INACTIVE).
/// Leaves an ADMIN session open.
pub fn seed_7a(sidecar: &mut Sidecar, prefix: &str) -> Class7a {
    let workspace = temp_dir(prefix);
    sidecar.request_ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    sidecar.begin_admin();

    let institution_id = sidecar.id_of(
        "institutions.create",
        json!({ "name": "MTs Al-Hikmah" }),
        "institutionId",
    );
    let academic_year_id = sidecar.id_of(
        "academicYears.create",
        json!({ "name": "2025/2026", "startDate": "2025-07-14", "endDate": "2026-06-30" }),
        "academicYearId",
    );
    let class_id = sidecar.id_of(
        "classes.create",
        json!({ "institutionId": institution_id, "name": "7A" }),
        "classId",
    );

    let mut student = |name: &str, nis: &str| {
        sidecar.id_of(
            "students.create",
            json!({ "classId": class_id, "name": name, "nis": nis }),
            "studentId",
        )
    };
    let ahmad = student("Ahmad", "2025001");
    let budi = student("Budi", "2025002");
    let chairul = student("Chairul", "2025003");
    let dimas = student("Dimas", "2025004");

    let math_id = sidecar.id_of(
        "subjects.create",
        json!({ "classId": class_id, "name": "Matematika" }),
        "subjectId",
    );
    let quran_id = sidecar.id_of(
        "subjects.create",
        json!({ "classId": class_id, "name": "Al-Qur'an" }),
        "subjectId",
    );
    let math_exam_id = sidecar.id_of(
        "exams.create",
        json!({
            "subjectId": math_id,
            "name": "UTS",
            "academicYearId": academic_year_id,
            "semester": "1",
        }),
        "examId",
    );
    let quran_exam_id = sidecar.id_of(
        "exams.create",
        json!({
            "subjectId": quran_id,
            "name": "UTS",
            "academicYearId": academic_year_id,
            "semester": "1",
        }),
        "examId",
    );

    for (exam, scores) in [
        (&math_exam_id, [(&ahmad, 8.0), (&budi, 7.0), (&dimas, 10.0)]),
        (&quran_exam_id, [(&ahmad, 9.0), (&budi, 7.0), (&dimas, 10.0)]),
    ] {
        let entries: Vec<serde_json::Value> = scores
            .iter()
            .map(|(student_id, score)| json!({ "studentId": student_id, "score": score }))
            .collect();
        sidecar.request_ok(
            "scores.exam.bulkUpsert",
            json!({ "examId": exam, "entries": entries }),
        );
    }
    sidecar.request_ok(
        "students.updateStatus",
        json!({ "studentId": dimas, "status": "INACTIVE" }),
    );

    let akhlak_id = sidecar.id_of(
        "categories.create",
        json!({
            "institutionId": institution_id,
            "name": "Akhlak",
            "gradeType": "LETTER",
            "groupName": "Kepribadian",
        }),
        "categoryId",
    );
    let hadir_id = sidecar.id_of(
        "categories.create",
        json!({ "institutionId": institution_id, "name": "Kehadiran", "gradeType": "NUMERIC" }),
        "categoryId",
    );

    Class7a {
        workspace,
        institution_id,
        academic_year_id,
        class_id,
        math_id,
        quran_id,
        math_exam_id,
        quran_exam_id,
        akhlak_id,
        hadir_id,
        ahmad,
        budi,
        chairul,
        dimas,
    }
}
