use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

use super::category::normalize_category_value;
use super::model::{Category, CategoryValue, ExamScore, RaporPolicy, Student, Subject};
use super::scope::Scope;
use super::source::RaporSource;
use super::subject::{is_valid_exam_score, subject_average};
use super::{round_half_up_2, CalcError};

/// One student's rapor for a class and scope. Computed on demand, never stored.
///
/// Maps are ordered so the serialized record is stable across calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReportRecord {
    pub student_id: String,
    pub display_name: String,
    pub nis: Option<String>,
    pub subject_averages: BTreeMap<String, f64>,
    pub category_scores: BTreeMap<String, f64>,
    pub overall_average: f64,
    /// No subject average at all; such a record is never ranked.
    pub no_exam_data: bool,
    pub rank: Option<u32>,
    #[serde(skip)]
    pub sort_order: i64,
}

/// Exam and category scores for a set of students, keyed for lookup while
/// composing. Loaded with one read per subject and one per category.
#[derive(Debug, Default)]
pub(crate) struct ScoreTables {
    exam: HashMap<String, HashMap<String, Vec<ExamScore>>>,
    category: HashMap<String, HashMap<String, CategoryValue>>,
}

impl ScoreTables {
    pub(crate) fn load<S: RaporSource + ?Sized>(
        source: &S,
        subjects: &[Subject],
        categories: &[Category],
        scope: &Scope,
        only_student: Option<&str>,
    ) -> Result<Self, CalcError> {
        let keep = |student_id: &str| only_student.map(|s| s == student_id).unwrap_or(true);

        let mut tables = ScoreTables::default();
        for subject in subjects {
            for score in source.list_exam_scores(&subject.id, scope)? {
                if !keep(&score.student_id) {
                    continue;
                }
                tables
                    .exam
                    .entry(score.subject_id.clone())
                    .or_default()
                    .entry(score.student_id.clone())
                    .or_default()
                    .push(score);
            }
        }
        for category in categories {
            for score in source.list_category_scores(&category.id, scope)? {
                if !keep(&score.student_id) {
                    continue;
                }
                tables
                    .category
                    .entry(score.category_id)
                    .or_default()
                    .insert(score.student_id, score.value);
            }
        }
        Ok(tables)
    }

    fn exam_scores(&self, subject_id: &str, student_id: &str) -> &[ExamScore] {
        self.exam
            .get(subject_id)
            .and_then(|m| m.get(student_id))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn category_value(&self, category_id: &str, student_id: &str) -> Option<&CategoryValue> {
        self.category.get(category_id).and_then(|m| m.get(student_id))
    }
}

pub(crate) fn compose_record(
    student: &Student,
    subjects: &[Subject],
    categories: &[Category],
    tables: &ScoreTables,
    policy: &RaporPolicy,
) -> Result<StudentReportRecord, CalcError> {
    let mut subject_averages = BTreeMap::new();
    for subject in subjects {
        let scores = tables.exam_scores(&subject.id, &student.id);
        let avg = subject_average(scores.iter().map(|s| s.score)).map_err(|e| {
            let exam_id = scores
                .iter()
                .find(|s| !is_valid_exam_score(s.score))
                .map(|s| s.exam_id.as_str());
            e.with_details(json!({
                "studentId": student.id,
                "subjectId": subject.id,
                "examId": exam_id,
            }))
        })?;
        if let Some(avg) = avg {
            subject_averages.insert(subject.id.clone(), avg);
        }
    }

    let mut category_scores = BTreeMap::new();
    for category in categories {
        let Some(value) = tables.category_value(&category.id, &student.id) else {
            continue;
        };
        let score = normalize_category_value(category.grade_type, value).map_err(|e| {
            e.with_details(json!({ "studentId": student.id, "categoryId": category.id }))
        })?;
        category_scores.insert(category.id.clone(), score);
    }

    let no_exam_data = subject_averages.is_empty();
    let overall_average = if no_exam_data {
        0.0
    } else {
        let mut terms: Vec<f64> = subject_averages.values().copied().collect();
        if policy.include_categories_in_overall {
            // Category scores are on 0..100; exams on 1..10.
            terms.extend(category_scores.values().map(|v| v / 10.0));
        }
        round_half_up_2(terms.iter().sum::<f64>() / (terms.len() as f64))
    };

    Ok(StudentReportRecord {
        student_id: student.id.clone(),
        display_name: student.name.clone(),
        nis: student.nis.clone(),
        subject_averages,
        category_scores,
        overall_average,
        no_exam_data,
        rank: None,
        sort_order: student.sort_order,
    })
}

pub fn compose_report<S: RaporSource + ?Sized>(
    source: &S,
    student_id: &str,
    class_id: &str,
    scope: &Scope,
    policy: &RaporPolicy,
) -> Result<StudentReportRecord, CalcError> {
    let Some(class) = source.class_info(class_id)? else {
        return Err(CalcError::not_found("class").with_details(json!({ "classId": class_id })));
    };
    let Some(student) = source.student(student_id)? else {
        return Err(
            CalcError::not_found("student").with_details(json!({ "studentId": student_id }))
        );
    };
    if student.class_id != class.id {
        return Err(
            CalcError::new("not_found", "student is not enrolled in class")
                .with_details(json!({ "studentId": student_id, "classId": class_id })),
        );
    }

    let subjects = source.list_subjects(&class.id)?;
    let categories = source.list_categories(&class.institution_id)?;
    let tables = ScoreTables::load(source, &subjects, &categories, scope, Some(&student.id))?;
    compose_record(&student, &subjects, &categories, &tables, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::testing::{fixture_7a, scope_ay1};

    #[test]
    fn overall_average_ignores_undefined_subjects() {
        let mut src = fixture_7a();
        src.add_subject("FIQH", "7A", "Fiqh");
        src.add_exam_score("S1", "E-FIQH", "FIQH", 9.0);
        src.add_subject("ARAB", "7A", "Bahasa Arab");
        // S1: MATH 8, QURAN 9, FIQH 9, ARAB none.
        let r = compose_report(&src, "S1", "7A", &scope_ay1(), &RaporPolicy::default())
            .expect("report");
        assert_eq!(r.subject_averages.len(), 3);
        assert!(!r.subject_averages.contains_key("ARAB"));
        assert_eq!(r.overall_average, 8.67);
    }

    #[test]
    fn undefined_subject_is_not_a_zero() {
        let mut src = fixture_7a();
        src.add_exam_score("S3", "E-MATH-1", "MATH", 8.0);
        src.add_exam_score("S3", "E-QURAN-1", "QURAN", 9.0);
        src.add_subject("ARAB", "7A", "Bahasa Arab");
        let r = compose_report(&src, "S3", "7A", &scope_ay1(), &RaporPolicy::default())
            .expect("report");
        assert_eq!(r.overall_average, 8.5);
        assert!(!r.no_exam_data);
    }

    #[test]
    fn categories_stay_out_of_overall_by_default() {
        let src = fixture_7a();
        let r = compose_report(&src, "S1", "7A", &scope_ay1(), &RaporPolicy::default())
            .expect("report");
        assert_eq!(r.category_scores.get("AKHLAK"), Some(&95.0));
        assert_eq!(r.overall_average, 8.5);
    }

    #[test]
    fn categories_can_be_folded_in_by_policy() {
        let src = fixture_7a();
        let policy = RaporPolicy {
            include_categories_in_overall: true,
        };
        let r = compose_report(&src, "S1", "7A", &scope_ay1(), &policy).expect("report");
        // (8 + 9 + 9.5) / 3
        assert_eq!(r.overall_average, 8.83);
    }

    #[test]
    fn student_without_exams_is_flagged() {
        let src = fixture_7a();
        let r = compose_report(&src, "S3", "7A", &scope_ay1(), &RaporPolicy::default())
            .expect("report");
        assert!(r.no_exam_data);
        assert_eq!(r.overall_average, 0.0);
        assert_eq!(r.rank, None);
    }

    #[test]
    fn compose_is_idempotent() {
        let src = fixture_7a();
        let a = compose_report(&src, "S1", "7A", &scope_ay1(), &RaporPolicy::default())
            .expect("report");
        let b = compose_report(&src, "S1", "7A", &scope_ay1(), &RaporPolicy::default())
            .expect("report");
        assert_eq!(
            serde_json::to_string(&a).expect("json"),
            serde_json::to_string(&b).expect("json")
        );
    }

    #[test]
    fn lookup_failures_are_not_found() {
        let src = fixture_7a();
        let scope = scope_ay1();
        let policy = RaporPolicy::default();
        let e = compose_report(&src, "S1", "9Z", &scope, &policy).expect_err("class");
        assert_eq!(e.code, "not_found");
        let e = compose_report(&src, "NOPE", "7A", &scope, &policy).expect_err("student");
        assert_eq!(e.code, "not_found");
        let e = compose_report(&src, "S-7B", "7A", &scope, &policy).expect_err("enrolment");
        assert_eq!(e.code, "not_found");
    }

    #[test]
    fn bad_stored_score_aborts_the_report() {
        let mut src = fixture_7a();
        src.add_exam_score("S1", "E-MATH-2", "MATH", 12.0);
        let e = compose_report(&src, "S1", "7A", &scope_ay1(), &RaporPolicy::default())
            .expect_err("invalid");
        assert_eq!(e.code, "invalid_input");
        let details = e.details.expect("details");
        assert_eq!(details["subjectId"], "MATH");
        assert_eq!(details["examId"], "E-MATH-2");
        assert_eq!(details["score"], 12.0);
    }
}
