use chrono::NaiveDate;

use super::model::{
    Category, CategoryScore, CategoryValue, ClassInfo, ExamScore, GradeType, Student,
    StudentStatus, Subject,
};
use super::scope::{AcademicYear, Scope, Semester};
use super::source::RaporSource;
use super::CalcError;

/// In-memory roster and score store for unit tests. Exam scores carry their
/// own (year, semester) tag.
#[derive(Debug, Default)]
pub struct MemorySource {
    pub classes: Vec<ClassInfo>,
    pub years: Vec<AcademicYear>,
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
    pub categories: Vec<Category>,
    pub exam_scores: Vec<(String, Semester, ExamScore)>,
    pub category_scores: Vec<(String, Semester, CategoryScore)>,
}

impl MemorySource {
    pub fn add_subject(&mut self, id: &str, class_id: &str, name: &str) {
        let sort_order = self.subjects.len() as i64;
        self.subjects.push(Subject {
            id: id.to_string(),
            class_id: class_id.to_string(),
            name: name.to_string(),
            sort_order,
        });
    }

    pub fn add_student(&mut self, id: &str, class_id: &str, name: &str, status: StudentStatus) {
        let sort_order = self.students.len() as i64;
        self.students.push(Student {
            id: id.to_string(),
            class_id: class_id.to_string(),
            name: name.to_string(),
            nis: None,
            status,
            sort_order,
        });
    }

    pub fn add_exam_score(
        &mut self,
        student_id: &str,
        exam_id: &str,
        subject_id: &str,
        score: f64,
    ) {
        self.add_exam_score_in("AY1", Semester::First, student_id, exam_id, subject_id, score);
    }

    pub fn add_exam_score_in(
        &mut self,
        year: &str,
        semester: Semester,
        student_id: &str,
        exam_id: &str,
        subject_id: &str,
        score: f64,
    ) {
        self.exam_scores.push((
            year.to_string(),
            semester,
            ExamScore {
                student_id: student_id.to_string(),
                exam_id: exam_id.to_string(),
                subject_id: subject_id.to_string(),
                score,
            },
        ));
    }

    pub fn add_category_score(
        &mut self,
        student_id: &str,
        category_id: &str,
        value: CategoryValue,
    ) {
        self.category_scores.push((
            "AY1".to_string(),
            Semester::First,
            CategoryScore {
                student_id: student_id.to_string(),
                category_id: category_id.to_string(),
                value,
            },
        ));
    }
}

impl RaporSource for MemorySource {
    fn class_info(&self, class_id: &str) -> Result<Option<ClassInfo>, CalcError> {
        Ok(self.classes.iter().find(|c| c.id == class_id).cloned())
    }

    fn academic_year(&self, academic_year_id: &str) -> Result<Option<AcademicYear>, CalcError> {
        Ok(self.years.iter().find(|y| y.id == academic_year_id).cloned())
    }

    fn student(&self, student_id: &str) -> Result<Option<Student>, CalcError> {
        Ok(self.students.iter().find(|s| s.id == student_id).cloned())
    }

    fn subject(&self, subject_id: &str) -> Result<Option<Subject>, CalcError> {
        Ok(self.subjects.iter().find(|s| s.id == subject_id).cloned())
    }

    fn category(&self, category_id: &str) -> Result<Option<Category>, CalcError> {
        Ok(self.categories.iter().find(|c| c.id == category_id).cloned())
    }

    fn list_active_students(&self, class_id: &str) -> Result<Vec<Student>, CalcError> {
        Ok(self
            .students
            .iter()
            .filter(|s| s.class_id == class_id && s.status == StudentStatus::Active)
            .cloned()
            .collect())
    }

    fn list_subjects(&self, class_id: &str) -> Result<Vec<Subject>, CalcError> {
        Ok(self
            .subjects
            .iter()
            .filter(|s| s.class_id == class_id)
            .cloned()
            .collect())
    }

    fn list_categories(&self, institution_id: &str) -> Result<Vec<Category>, CalcError> {
        Ok(self
            .categories
            .iter()
            .filter(|c| c.institution_id == institution_id)
            .cloned()
            .collect())
    }

    fn list_exam_scores(
        &self,
        subject_id: &str,
        scope: &Scope,
    ) -> Result<Vec<ExamScore>, CalcError> {
        Ok(self
            .exam_scores
            .iter()
            .filter(|(year, semester, s)| {
                s.subject_id == subject_id
                    && *year == scope.academic_year.id
                    && *semester == scope.semester
            })
            .map(|(_, _, s)| s.clone())
            .collect())
    }

    fn list_category_scores(
        &self,
        category_id: &str,
        scope: &Scope,
    ) -> Result<Vec<CategoryScore>, CalcError> {
        Ok(self
            .category_scores
            .iter()
            .filter(|(year, semester, s)| {
                s.category_id == category_id
                    && *year == scope.academic_year.id
                    && *semester == scope.semester
            })
            .map(|(_, _, s)| s.clone())
            .collect())
    }
}

pub fn ay1() -> AcademicYear {
    let start = NaiveDate::from_ymd_opt(2025, 7, 14).expect("date");
    AcademicYear {
        id: "AY1".to_string(),
        name: "2025/2026".to_string(),
        start_date: start,
        end_date: NaiveDate::from_ymd_opt(2026, 6, 30).expect("date"),
        semester_two_start: NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
    }
}

pub fn scope_ay1() -> Scope {
    Scope {
        academic_year: ay1(),
        semester: Semester::First,
    }
}

/// Class 7A: S1 (Math 8, Quran 9), S2 (Math 7, Quran 7), S3 with no exams,
/// and three non-active students with perfect scores: S4 inactive, S5
/// graduated, S6 transferred. S-7B sits in another class.
pub fn fixture_7a() -> MemorySource {
    let mut src = MemorySource::default();
    src.years.push(ay1());
    for (id, name) in [("7A", "7A"), ("7B", "7B")] {
        src.classes.push(ClassInfo {
            id: id.to_string(),
            name: name.to_string(),
            institution_id: "INST1".to_string(),
        });
    }
    src.add_student("S1", "7A", "Ahmad", StudentStatus::Active);
    src.add_student("S2", "7A", "Budi", StudentStatus::Active);
    src.add_student("S3", "7A", "Chairul", StudentStatus::Active);
    src.add_student("S4", "7A", "Dimas", StudentStatus::Inactive);
    src.add_student("S5", "7A", "Erlangga", StudentStatus::Graduated);
    src.add_student("S6", "7A", "Faris", StudentStatus::Transferred);
    src.add_student("S-7B", "7B", "Fauzan", StudentStatus::Active);

    src.add_subject("MATH", "7A", "Matematika");
    src.add_subject("QURAN", "7A", "Al-Qur'an");

    src.add_exam_score("S1", "E-MATH-1", "MATH", 8.0);
    src.add_exam_score("S1", "E-QURAN-1", "QURAN", 9.0);
    src.add_exam_score("S2", "E-MATH-1", "MATH", 7.0);
    src.add_exam_score("S2", "E-QURAN-1", "QURAN", 7.0);
    src.add_exam_score("S4", "E-MATH-1", "MATH", 10.0);
    src.add_exam_score("S4", "E-QURAN-1", "QURAN", 10.0);
    for id in ["S5", "S6"] {
        src.add_exam_score(id, "E-MATH-1", "MATH", 10.0);
        src.add_exam_score(id, "E-QURAN-1", "QURAN", 10.0);
    }
    // Second semester must not leak into a first-semester rapor.
    src.add_exam_score_in("AY1", Semester::Second, "S1", "E-MATH-9", "MATH", 1.0);

    src.categories.push(Category {
        id: "AKHLAK".to_string(),
        institution_id: "INST1".to_string(),
        name: "Akhlak".to_string(),
        grade_type: GradeType::Letter,
        group_name: Some("Kepribadian".to_string()),
        sort_order: 0,
    });
    src.categories.push(Category {
        id: "HADIR".to_string(),
        institution_id: "INST1".to_string(),
        name: "Kehadiran".to_string(),
        grade_type: GradeType::Numeric,
        group_name: None,
        sort_order: 1,
    });
    src.add_category_score("S1", "AKHLAK", CategoryValue::Letter("A".to_string()));
    src.add_category_score("S2", "HADIR", CategoryValue::Numeric(90.0));
    src
}
