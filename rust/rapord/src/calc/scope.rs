use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Semester {
    First,
    Second,
}

impl Semester {
    pub fn as_str(self) -> &'static str {
        match self {
            Semester::First => "1",
            Semester::Second => "2",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1" => Some(Semester::First),
            "2" => Some(Semester::Second),
            _ => None,
        }
    }

    /// Accepts `"1"`, `"2"`, `1` or `2`.
    pub fn from_json(v: &serde_json::Value) -> Option<Self> {
        if let Some(s) = v.as_str() {
            return Self::parse(s);
        }
        match v.as_i64() {
            Some(1) => Some(Semester::First),
            Some(2) => Some(Semester::Second),
            _ => None,
        }
    }
}

impl Serialize for Semester {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub semester_two_start: NaiveDate,
}

impl AcademicYear {
    /// Semester two starts on 1 January following the start of the year.
    pub fn default_semester_two_start(start_date: NaiveDate) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(start_date.year() + 1, 1, 1)
    }

    pub fn semester_of(&self, date: NaiveDate) -> Option<Semester> {
        if date < self.start_date || date > self.end_date {
            return None;
        }
        if date < self.semester_two_start {
            Some(Semester::First)
        } else {
            Some(Semester::Second)
        }
    }
}

/// The academic-year/semester window a rapor is computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub academic_year: AcademicYear,
    pub semester: Semester,
}

impl Scope {
    /// An exam tagged with both year and semester is matched on the tag alone.
    /// Otherwise its date decides.
    pub fn includes_exam(
        &self,
        tag_year: Option<&str>,
        tag_semester: Option<Semester>,
        exam_date: Option<NaiveDate>,
    ) -> bool {
        if let (Some(year), Some(semester)) = (tag_year, tag_semester) {
            return year == self.academic_year.id && semester == self.semester;
        }
        exam_date
            .and_then(|d| self.academic_year.semester_of(d))
            .map(|s| s == self.semester)
            .unwrap_or(false)
    }
}
