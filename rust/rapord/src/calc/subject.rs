use serde_json::json;

use super::scope::Scope;
use super::source::RaporSource;
use super::{round_half_up_2, CalcError};

pub const EXAM_SCORE_MIN: f64 = 1.0;
pub const EXAM_SCORE_MAX: f64 = 10.0;

pub fn is_valid_exam_score(score: f64) -> bool {
    score.is_finite() && (EXAM_SCORE_MIN..=EXAM_SCORE_MAX).contains(&score)
}

/// Mean of the raw exam scores, rounded half-up to 2 decimals.
///
/// `None` when there is nothing to average; callers must keep that distinct
/// from a real score. A value outside 1..=10 aborts instead of skewing the mean.
pub fn subject_average<I>(scores: I) -> Result<Option<f64>, CalcError>
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0_f64;
    let mut count: usize = 0;
    for score in scores {
        if !is_valid_exam_score(score) {
            return Err(
                CalcError::invalid_input("exam score outside 1..10 reached the rapor")
                    .with_details(json!({ "score": score })),
            );
        }
        sum += score;
        count += 1;
    }
    if count == 0 {
        return Ok(None);
    }
    Ok(Some(round_half_up_2(sum / (count as f64))))
}

pub fn average_for_subject<S: RaporSource + ?Sized>(
    source: &S,
    student_id: &str,
    subject_id: &str,
    scope: &Scope,
) -> Result<Option<f64>, CalcError> {
    if source.student(student_id)?.is_none() {
        return Err(
            CalcError::not_found("student").with_details(json!({ "studentId": student_id }))
        );
    }
    if source.subject(subject_id)?.is_none() {
        return Err(
            CalcError::not_found("subject").with_details(json!({ "subjectId": subject_id }))
        );
    }
    let scores = source.list_exam_scores(subject_id, scope)?;
    subject_average(
        scores
            .iter()
            .filter(|s| s.student_id == student_id)
            .map(|s| s.score),
    )
}
