use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudentStatus {
    Active,
    Inactive,
    Graduated,
    Transferred,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "ACTIVE",
            StudentStatus::Inactive => "INACTIVE",
            StudentStatus::Graduated => "GRADUATED",
            StudentStatus::Transferred => "TRANSFERRED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(StudentStatus::Active),
            "INACTIVE" => Some(StudentStatus::Inactive),
            "GRADUATED" => Some(StudentStatus::Graduated),
            "TRANSFERRED" => Some(StudentStatus::Transferred),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeType {
    Letter,
    Numeric,
}

impl GradeType {
    pub fn as_str(self) -> &'static str {
        match self {
            GradeType::Letter => "LETTER",
            GradeType::Numeric => "NUMERIC",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LETTER" => Some(GradeType::Letter),
            "NUMERIC" => Some(GradeType::Numeric),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    E,
}

impl LetterGrade {
    #[cfg(test)]
    pub const ALL: [LetterGrade; 5] = [
        LetterGrade::A,
        LetterGrade::B,
        LetterGrade::C,
        LetterGrade::D,
        LetterGrade::E,
    ];

    /// Fixed conversion used on every rapor; other systems reading our
    /// category scores reproduce the same table.
    pub fn points(self) -> f64 {
        match self {
            LetterGrade::A => 95.0,
            LetterGrade::B => 85.0,
            LetterGrade::C => 75.0,
            LetterGrade::D => 65.0,
            LetterGrade::E => 50.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::E => "E",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(LetterGrade::A),
            "B" => Some(LetterGrade::B),
            "C" => Some(LetterGrade::C),
            "D" => Some(LetterGrade::D),
            "E" => Some(LetterGrade::E),
            _ => None,
        }
    }
}

/// A stored category value. Letters are kept as the raw stored text so an
/// unknown code found in the database can be reported instead of dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryValue {
    Letter(String),
    Numeric(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
    pub institution_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub nis: Option<String>,
    pub status: StudentStatus,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub institution_id: String,
    pub name: String,
    pub grade_type: GradeType,
    pub group_name: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExamScore {
    pub student_id: String,
    pub exam_id: String,
    pub subject_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryScore {
    pub student_id: String,
    pub category_id: String,
    pub value: CategoryValue,
}

/// Workspace-level rapor policy, persisted under the `rapor.policy` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaporPolicy {
    /// Fold category scores (scaled to the exam scale) into the overall average.
    #[serde(default)]
    pub include_categories_in_overall: bool,
}
