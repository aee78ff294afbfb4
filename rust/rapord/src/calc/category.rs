use serde_json::json;

use super::model::{CategoryValue, GradeType, LetterGrade};
use super::scope::Scope;
use super::source::RaporSource;
use super::CalcError;

pub const NUMERIC_GRADE_MIN: f64 = 0.0;
pub const NUMERIC_GRADE_MAX: f64 = 100.0;

pub fn is_valid_numeric_grade(value: f64) -> bool {
    value.is_finite() && (NUMERIC_GRADE_MIN..=NUMERIC_GRADE_MAX).contains(&value)
}

/// Resolves a stored category value to its 0..100 score.
pub fn normalize_category_value(
    grade_type: GradeType,
    value: &CategoryValue,
) -> Result<f64, CalcError> {
    match (grade_type, value) {
        (GradeType::Letter, CategoryValue::Letter(raw)) => LetterGrade::parse(raw)
            .map(LetterGrade::points)
            .ok_or_else(|| {
                CalcError::invalid_input("unknown letter grade")
                    .with_details(json!({ "letter": raw }))
            }),
        (GradeType::Numeric, CategoryValue::Numeric(v)) => {
            if is_valid_numeric_grade(*v) {
                Ok(*v)
            } else {
                Err(CalcError::invalid_input("numeric category score outside 0..100")
                    .with_details(json!({ "value": v })))
            }
        }
        (GradeType::Letter, CategoryValue::Numeric(v)) => Err(CalcError::invalid_input(
            "letter category holds a numeric value",
        )
        .with_details(json!({ "value": v }))),
        (GradeType::Numeric, CategoryValue::Letter(raw)) => Err(CalcError::invalid_input(
            "numeric category holds a letter value",
        )
        .with_details(json!({ "letter": raw }))),
    }
}

pub fn score_for_category<S: RaporSource + ?Sized>(
    source: &S,
    student_id: &str,
    category_id: &str,
    scope: &Scope,
) -> Result<Option<f64>, CalcError> {
    if source.student(student_id)?.is_none() {
        return Err(
            CalcError::not_found("student").with_details(json!({ "studentId": student_id }))
        );
    }
    let Some(category) = source.category(category_id)? else {
        return Err(
            CalcError::not_found("category").with_details(json!({ "categoryId": category_id }))
        );
    };
    let scores = source.list_category_scores(category_id, scope)?;
    scores
        .iter()
        .find(|s| s.student_id == student_id)
        .map(|s| normalize_category_value(category.grade_type, &s.value))
        .transpose()
}
