mod category;
mod model;
mod ranking;
mod report;
mod scope;
mod source;
mod subject;

#[cfg(test)]
pub(crate) mod testing;

use serde::Serialize;
use std::fmt;

pub use category::{is_valid_numeric_grade, score_for_category};
pub use model::{GradeType, LetterGrade, RaporPolicy, StudentStatus};
pub use ranking::compute_class_rapor;
pub use report::compose_report;
pub use scope::{parse_date, AcademicYear, Scope, Semester, DATE_FORMAT};
pub use source::{resolve_scope, SqliteSource};
pub use subject::{average_for_subject, is_valid_exam_score};

/// Half-up rounding to 2 decimals: `floor(100*x + 0.5) / 100`.
///
/// The small bias keeps decimal ties (8.125, 1.005) on the upper side despite
/// their binary representation.
pub fn round_half_up_2(x: f64) -> f64 {
    ((100.0 * x) + 0.5 + 1e-9).floor() / 100.0
}

/// Integer key for comparing averages at 2-decimal precision.
pub fn hundredths(x: f64) -> i64 {
    (x * 100.0).round() as i64
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{} not found", what))
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message)
    }

    pub fn db(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    /// Adds context keys; keys already present are kept.
    pub fn with_details(mut self, extra: serde_json::Value) -> Self {
        match (self.details.as_mut(), extra) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(extra)) => {
                for (k, v) in extra {
                    existing.entry(k).or_insert(v);
                }
            }
            (None, extra) => self.details = Some(extra),
            (Some(_), _) => {}
        }
        self
    }
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}
