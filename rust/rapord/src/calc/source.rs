use rusqlite::{Connection, OptionalExtension};

use super::model::{
    Category, CategoryScore, CategoryValue, ClassInfo, ExamScore, GradeType, Student,
    StudentStatus, Subject,
};
use super::scope::{parse_date, AcademicYear, Scope, Semester};
use super::CalcError;

/// Read side of the score repository and the roster, as seen by the rapor
/// computations. Every list call is one batch for the whole class.
pub trait RaporSource {
    fn class_info(&self, class_id: &str) -> Result<Option<ClassInfo>, CalcError>;
    fn academic_year(&self, academic_year_id: &str) -> Result<Option<AcademicYear>, CalcError>;
    fn student(&self, student_id: &str) -> Result<Option<Student>, CalcError>;
    fn subject(&self, subject_id: &str) -> Result<Option<Subject>, CalcError>;
    fn category(&self, category_id: &str) -> Result<Option<Category>, CalcError>;

    fn list_active_students(&self, class_id: &str) -> Result<Vec<Student>, CalcError>;
    fn list_subjects(&self, class_id: &str) -> Result<Vec<Subject>, CalcError>;
    fn list_categories(&self, institution_id: &str) -> Result<Vec<Category>, CalcError>;

    /// Scores of every student for one subject, restricted to exams in scope.
    fn list_exam_scores(&self, subject_id: &str, scope: &Scope)
        -> Result<Vec<ExamScore>, CalcError>;
    /// Scores of every student for one category in scope.
    fn list_category_scores(
        &self,
        category_id: &str,
        scope: &Scope,
    ) -> Result<Vec<CategoryScore>, CalcError>;
}

pub fn resolve_scope<S: RaporSource + ?Sized>(
    source: &S,
    academic_year_id: &str,
    semester: Semester,
) -> Result<Scope, CalcError> {
    let academic_year = source
        .academic_year(academic_year_id)?
        .ok_or_else(|| {
            CalcError::not_found("academic year")
                .with_details(serde_json::json!({ "academicYearId": academic_year_id }))
        })?;
    Ok(Scope {
        academic_year,
        semester,
    })
}

pub struct SqliteSource<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSource<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn stored_date(raw: &str, column: &str) -> Result<chrono::NaiveDate, CalcError> {
    parse_date(raw).ok_or_else(|| {
        CalcError::invalid_input(format!("stored {} is not a YYYY-MM-DD date", column))
            .with_details(serde_json::json!({ "value": raw }))
    })
}

fn stored_status(raw: &str) -> Result<StudentStatus, CalcError> {
    StudentStatus::parse(raw).ok_or_else(|| {
        CalcError::invalid_input("unknown student status")
            .with_details(serde_json::json!({ "status": raw }))
    })
}

fn stored_grade_type(raw: &str) -> Result<GradeType, CalcError> {
    GradeType::parse(raw).ok_or_else(|| {
        CalcError::invalid_input("unknown category grade type")
            .with_details(serde_json::json!({ "gradeType": raw }))
    })
}

type StudentRow = (String, String, String, Option<String>, String, i64);

fn student_from_row(row: StudentRow) -> Result<Student, CalcError> {
    let (id, class_id, name, nis, status, sort_order) = row;
    Ok(Student {
        id,
        class_id,
        name,
        nis,
        status: stored_status(&status)?,
        sort_order,
    })
}

type CategoryRow = (String, String, String, String, Option<String>, i64);

fn category_from_row(row: CategoryRow) -> Result<Category, CalcError> {
    let (id, institution_id, name, grade_type, group_name, sort_order) = row;
    Ok(Category {
        id,
        institution_id,
        name,
        grade_type: stored_grade_type(&grade_type)?,
        group_name,
        sort_order,
    })
}

impl RaporSource for SqliteSource<'_> {
    fn class_info(&self, class_id: &str) -> Result<Option<ClassInfo>, CalcError> {
        self.conn
            .query_row(
                "SELECT id, name, institution_id FROM classes WHERE id = ?",
                [class_id],
                |r| {
                    Ok(ClassInfo {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        institution_id: r.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(CalcError::db)
    }

    fn academic_year(&self, academic_year_id: &str) -> Result<Option<AcademicYear>, CalcError> {
        let row: Option<(String, String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT id, name, start_date, end_date, semester_two_start
                 FROM academic_years
                 WHERE id = ?",
                [academic_year_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .optional()
            .map_err(CalcError::db)?;
        let Some((id, name, start, end, s2)) = row else {
            return Ok(None);
        };
        Ok(Some(AcademicYear {
            id,
            name,
            start_date: stored_date(&start, "start_date")?,
            end_date: stored_date(&end, "end_date")?,
            semester_two_start: stored_date(&s2, "semester_two_start")?,
        }))
    }

    fn student(&self, student_id: &str) -> Result<Option<Student>, CalcError> {
        let row: Option<StudentRow> = self
            .conn
            .query_row(
                "SELECT id, class_id, name, nis, status, sort_order
                 FROM students
                 WHERE id = ?",
                [student_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
            )
            .optional()
            .map_err(CalcError::db)?;
        row.map(student_from_row).transpose()
    }

    fn subject(&self, subject_id: &str) -> Result<Option<Subject>, CalcError> {
        self.conn
            .query_row(
                "SELECT id, class_id, name, sort_order FROM subjects WHERE id = ?",
                [subject_id],
                |r| {
                    Ok(Subject {
                        id: r.get(0)?,
                        class_id: r.get(1)?,
                        name: r.get(2)?,
                        sort_order: r.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(CalcError::db)
    }

    fn category(&self, category_id: &str) -> Result<Option<Category>, CalcError> {
        let row: Option<CategoryRow> = self
            .conn
            .query_row(
                "SELECT id, institution_id, name, grade_type, group_name, sort_order
                 FROM categories
                 WHERE id = ?",
                [category_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
            )
            .optional()
            .map_err(CalcError::db)?;
        row.map(category_from_row).transpose()
    }

    fn list_active_students(&self, class_id: &str) -> Result<Vec<Student>, CalcError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, class_id, name, nis, status, sort_order
                 FROM students
                 WHERE class_id = ? AND status = ?
                 ORDER BY sort_order",
            )
            .map_err(CalcError::db)?;
        let rows: Vec<StudentRow> = stmt
            .query_map((class_id, StudentStatus::Active.as_str()), |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CalcError::db)?;
        rows.into_iter().map(student_from_row).collect()
    }

    fn list_subjects(&self, class_id: &str) -> Result<Vec<Subject>, CalcError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, class_id, name, sort_order
                 FROM subjects
                 WHERE class_id = ?
                 ORDER BY sort_order, name",
            )
            .map_err(CalcError::db)?;
        stmt.query_map([class_id], |r| {
            Ok(Subject {
                id: r.get(0)?,
                class_id: r.get(1)?,
                name: r.get(2)?,
                sort_order: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)
    }

    fn list_categories(&self, institution_id: &str) -> Result<Vec<Category>, CalcError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, institution_id, name, grade_type, group_name, sort_order
                 FROM categories
                 WHERE institution_id = ?
                 ORDER BY sort_order, name",
            )
            .map_err(CalcError::db)?;
        let rows: Vec<CategoryRow> = stmt
            .query_map([institution_id], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CalcError::db)?;
        rows.into_iter().map(category_from_row).collect()
    }

    fn list_exam_scores(
        &self,
        subject_id: &str,
        scope: &Scope,
    ) -> Result<Vec<ExamScore>, CalcError> {
        // Tagged exams outside the scope are dropped in SQL; untagged ones are
        // placed by date below.
        let mut stmt = self
            .conn
            .prepare(
                "SELECT es.student_id, es.exam_id, es.score,
                        e.academic_year_id, e.semester, e.exam_date
                 FROM exam_scores es
                 JOIN exams e ON e.id = es.exam_id
                 WHERE e.subject_id = ?1
                   AND (
                     (e.academic_year_id = ?2 AND e.semester = ?3)
                     OR e.academic_year_id IS NULL
                     OR e.semester IS NULL
                   )
                 ORDER BY e.sort_order, es.student_id",
            )
            .map_err(CalcError::db)?;
        let rows = stmt
            .query_map(
                (
                    subject_id,
                    scope.academic_year.id.as_str(),
                    scope.semester.as_str(),
                ),
                |r| {
                    let student_id: String = r.get(0)?;
                    let exam_id: String = r.get(1)?;
                    let score: f64 = r.get(2)?;
                    let tag_year: Option<String> = r.get(3)?;
                    let tag_semester: Option<String> = r.get(4)?;
                    let exam_date: Option<String> = r.get(5)?;
                    Ok((student_id, exam_id, score, tag_year, tag_semester, exam_date))
                },
            )
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CalcError::db)?;

        let mut out = Vec::with_capacity(rows.len());
        for (student_id, exam_id, score, tag_year, tag_semester, exam_date) in rows {
            let tag_semester = match tag_semester.as_deref() {
                None => None,
                Some(raw) => Some(Semester::parse(raw).ok_or_else(|| {
                    CalcError::invalid_input("stored exam semester must be 1 or 2")
                        .with_details(serde_json::json!({ "examId": exam_id, "semester": raw }))
                })?),
            };
            let exam_date = match exam_date.as_deref() {
                None => None,
                Some(raw) => Some(stored_date(raw, "exam_date")?),
            };
            if !scope.includes_exam(tag_year.as_deref(), tag_semester, exam_date) {
                continue;
            }
            out.push(ExamScore {
                student_id,
                exam_id,
                subject_id: subject_id.to_string(),
                score,
            });
        }
        Ok(out)
    }

    fn list_category_scores(
        &self,
        category_id: &str,
        scope: &Scope,
    ) -> Result<Vec<CategoryScore>, CalcError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT student_id, letter_value, numeric_value
                 FROM category_scores
                 WHERE category_id = ? AND academic_year_id = ? AND semester = ?
                 ORDER BY student_id",
            )
            .map_err(CalcError::db)?;
        let rows = stmt
            .query_map(
                (
                    category_id,
                    scope.academic_year.id.as_str(),
                    scope.semester.as_str(),
                ),
                |r| {
                    let student_id: String = r.get(0)?;
                    let letter: Option<String> = r.get(1)?;
                    let numeric: Option<f64> = r.get(2)?;
                    Ok((student_id, letter, numeric))
                },
            )
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CalcError::db)?;

        rows.into_iter()
            .map(|(student_id, letter, numeric)| {
                let value = match (letter, numeric) {
                    (Some(l), _) => CategoryValue::Letter(l),
                    (None, Some(n)) => CategoryValue::Numeric(n),
                    (None, None) => {
                        return Err(CalcError::invalid_input("category score has no value")
                            .with_details(serde_json::json!({
                                "studentId": student_id,
                                "categoryId": category_id,
                            })))
                    }
                };
                Ok(CategoryScore {
                    student_id,
                    category_id: category_id.to_string(),
                    value,
                })
            })
            .collect()
    }
}
