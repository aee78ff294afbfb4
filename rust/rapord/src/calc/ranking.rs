use serde::Serialize;
use serde_json::json;
use std::cmp::Ordering;

use super::model::{Category, ClassInfo, RaporPolicy, Subject};
use super::report::{compose_record, ScoreTables, StudentReportRecord};
use super::scope::{Scope, Semester};
use super::source::RaporSource;
use super::{hundredths, round_half_up_2, CalcError};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub subject_id: String,
    pub name: String,
    pub class_average: Option<f64>,
    pub student_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRapor {
    pub class: ClassInfo,
    pub academic_year_id: String,
    pub academic_year_name: String,
    pub semester: Semester,
    pub policy: RaporPolicy,
    pub subjects: Vec<Subject>,
    pub categories: Vec<Category>,
    pub subject_stats: Vec<SubjectStats>,
    pub ranked_count: usize,
    pub students: Vec<StudentReportRecord>,
}

/// Ties are broken by name (case-insensitive), then roster order, then id.
fn tie_break(a: &StudentReportRecord, b: &StudentReportRecord) -> Ordering {
    a.display_name
        .to_lowercase()
        .cmp(&b.display_name.to_lowercase())
        .then_with(|| a.sort_order.cmp(&b.sort_order))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

/// Orders records by overall average and assigns standard competition ranks
/// (1, 1, 3). Records without exam data go last with no rank.
pub fn assign_ranks(records: Vec<StudentReportRecord>) -> Vec<StudentReportRecord> {
    let (mut ranked, mut unranked): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|r| !r.no_exam_data);

    ranked.sort_by(|a, b| {
        hundredths(b.overall_average)
            .cmp(&hundredths(a.overall_average))
            .then_with(|| tie_break(a, b))
    });

    let mut previous: Option<i64> = None;
    let mut current_rank: u32 = 0;
    for (pos, record) in ranked.iter_mut().enumerate() {
        let key = hundredths(record.overall_average);
        if previous != Some(key) {
            current_rank = (pos as u32) + 1;
            previous = Some(key);
        }
        record.rank = Some(current_rank);
    }

    unranked.sort_by(tie_break);
    for record in unranked.iter_mut() {
        record.rank = None;
    }

    ranked.extend(unranked);
    ranked
}

/// Rapor records for every active student of the class, ranked.
pub fn rank_class<S: RaporSource + ?Sized>(
    source: &S,
    class_id: &str,
    scope: &Scope,
    policy: &RaporPolicy,
) -> Result<Vec<StudentReportRecord>, CalcError> {
    let Some(class) = source.class_info(class_id)? else {
        return Err(CalcError::not_found("class").with_details(json!({ "classId": class_id })));
    };

    let students = source.list_active_students(&class.id)?;
    let subjects = source.list_subjects(&class.id)?;
    let categories = source.list_categories(&class.institution_id)?;
    let tables = ScoreTables::load(source, &subjects, &categories, scope, None)?;

    let mut records = Vec::with_capacity(students.len());
    for student in &students {
        records.push(compose_record(
            student,
            &subjects,
            &categories,
            &tables,
            policy,
        )?);
    }
    Ok(assign_ranks(records))
}

fn subject_stats(subjects: &[Subject], records: &[StudentReportRecord]) -> Vec<SubjectStats> {
    subjects
        .iter()
        .map(|subject| {
            let values: Vec<f64> = records
                .iter()
                .filter_map(|r| r.subject_averages.get(&subject.id).copied())
                .collect();
            let class_average = if values.is_empty() {
                None
            } else {
                Some(round_half_up_2(
                    values.iter().sum::<f64>() / (values.len() as f64),
                ))
            };
            SubjectStats {
                subject_id: subject.id.clone(),
                name: subject.name.clone(),
                class_average,
                student_count: values.len(),
            }
        })
        .collect()
}

/// [`rank_class`] plus the class header, subject stats and ranked count.
pub fn compute_class_rapor<S: RaporSource + ?Sized>(
    source: &S,
    class_id: &str,
    scope: &Scope,
    policy: &RaporPolicy,
) -> Result<ClassRapor, CalcError> {
    let records = rank_class(source, class_id, scope, policy)?;
    let Some(class) = source.class_info(class_id)? else {
        return Err(CalcError::not_found("class").with_details(json!({ "classId": class_id })));
    };
    let subjects = source.list_subjects(&class.id)?;
    let categories = source.list_categories(&class.institution_id)?;
    let ranked_count = records.iter().filter(|r| r.rank.is_some()).count();

    Ok(ClassRapor {
        subject_stats: subject_stats(&subjects, &records),
        class,
        academic_year_id: scope.academic_year.id.clone(),
        academic_year_name: scope.academic_year.name.clone(),
        semester: scope.semester,
        policy: *policy,
        subjects,
        categories,
        ranked_count,
        students: records,
    })
}
