use rusqlite::Connection;
use serde::Serialize;

use crate::records::RecordError;

/// One result row as the aggregator sees it: the result joined with its
/// course (for credits) and grade (for the grade point).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub result_id: String,
    pub course_id: String,
    pub course_code: String,
    pub course_title: String,
    pub credits: f64,
    pub semester: String,
    pub academic_year: String,
    pub marks: f64,
    pub letter_grade: String,
    pub grade_point: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterGroup {
    pub semester: String,
    pub courses: Vec<ResultRow>,
    pub total_credits: f64,
    pub total_grade_points: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_credits: f64,
    pub total_grade_points: f64,
    pub cgpa: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatistics {
    pub results_by_semester: Vec<SemesterGroup>,
    pub overall: OverallStats,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Credit-weighted aggregation over a student's results.
///
/// Groups by the semester label alone, in first-encounter order; a group
/// can span academic years (historical behavior, kept deliberately — the
/// per-course rows carry their `academic_year` so consumers can tell).
/// CGPA is 0 when no credits have been recorded.
pub fn aggregate_results(rows: &[ResultRow]) -> StudentStatistics {
    let mut groups: Vec<SemesterGroup> = Vec::new();
    let mut total_credits = 0.0;
    let mut total_grade_points = 0.0;

    for row in rows {
        let weighted = row.grade_point * row.credits;
        total_credits += row.credits;
        total_grade_points += weighted;

        let idx = match groups.iter().position(|g| g.semester == row.semester) {
            Some(i) => i,
            None => {
                groups.push(SemesterGroup {
                    semester: row.semester.clone(),
                    courses: Vec::new(),
                    total_credits: 0.0,
                    total_grade_points: 0.0,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        group.courses.push(row.clone());
        group.total_credits += row.credits;
        group.total_grade_points += weighted;
    }

    let cgpa = if total_credits > 0.0 {
        round2(total_grade_points / total_credits)
    } else {
        0.0
    };

    StudentStatistics {
        results_by_semester: groups,
        overall: OverallStats {
            total_credits,
            total_grade_points,
            cgpa,
        },
    }
}

/// Fetch a student's result rows in retrieval (insertion) order.
pub fn fetch_student_results(
    conn: &Connection,
    student_id: &str,
) -> Result<Vec<ResultRow>, RecordError> {
    if !crate::records::student_exists(conn, student_id)? {
        return Err(RecordError::InvalidReference {
            entity: "student",
            id: student_id.to_string(),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT r.id, r.course_id, c.code, c.title, c.credits,
                r.semester, r.academic_year, r.marks, g.letter_grade, g.grade
         FROM results r
         JOIN courses c ON c.id = r.course_id
         JOIN grades g ON g.id = r.grade_id
         WHERE r.student_id = ?
         ORDER BY r.rowid",
    )?;
    let rows = stmt
        .query_map([student_id], |row| {
            Ok(ResultRow {
                result_id: row.get(0)?,
                course_id: row.get(1)?,
                course_code: row.get(2)?,
                course_title: row.get(3)?,
                credits: row.get(4)?,
                semester: row.get(5)?,
                academic_year: row.get(6)?,
                marks: row.get(7)?,
                letter_grade: row.get(8)?,
                grade_point: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn student_statistics(
    conn: &Connection,
    student_id: &str,
) -> Result<StudentStatistics, RecordError> {
    let rows = fetch_student_results(conn, student_id)?;
    Ok(aggregate_results(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(semester: &str, year: &str, credits: f64, grade_point: f64) -> ResultRow {
        ResultRow {
            result_id: format!("r-{}-{}", semester, credits),
            course_id: "c".to_string(),
            course_code: "CS101".to_string(),
            course_title: "Intro".to_string(),
            credits,
            semester: semester.to_string(),
            academic_year: year.to_string(),
            marks: 0.0,
            letter_grade: "A".to_string(),
            grade_point,
        }
    }

    #[test]
    fn no_results_means_zero_cgpa_and_no_groups() {
        let stats = aggregate_results(&[]);
        assert!(stats.results_by_semester.is_empty());
        assert_eq!(stats.overall.total_credits, 0.0);
        assert_eq!(stats.overall.cgpa, 0.0);
    }

    #[test]
    fn single_result_weighted_by_credits() {
        let stats = aggregate_results(&[row("Semester I", "2024-2025", 4.0, 4.0)]);
        assert_eq!(stats.overall.total_credits, 4.0);
        assert_eq!(stats.overall.total_grade_points, 16.0);
        assert_eq!(stats.overall.cgpa, 4.0);
        assert_eq!(stats.results_by_semester.len(), 1);
    }

    #[test]
    fn cgpa_rounds_to_two_decimals() {
        // (4.0*4 + 1.0*3) / 7 = 19/7 = 2.714..., reported as 2.71.
        let stats = aggregate_results(&[
            row("Semester I", "2024-2025", 4.0, 4.0),
            row("Semester I", "2024-2025", 3.0, 1.0),
        ]);
        assert_eq!(stats.overall.total_credits, 7.0);
        assert_eq!(stats.overall.total_grade_points, 19.0);
        assert_eq!(stats.overall.cgpa, 2.71);

        let group = &stats.results_by_semester[0];
        assert_eq!(group.courses.len(), 2);
        assert_eq!(group.total_credits, 7.0);
        assert_eq!(group.total_grade_points, 19.0);
    }

    #[test]
    fn groups_follow_first_encounter_order_and_span_years() {
        let stats = aggregate_results(&[
            row("Semester II", "2023-2024", 3.0, 3.0),
            row("Semester I", "2024-2025", 3.0, 2.0),
            row("Semester II", "2024-2025", 3.0, 4.0),
        ]);

        let labels: Vec<&str> = stats
            .results_by_semester
            .iter()
            .map(|g| g.semester.as_str())
            .collect();
        assert_eq!(labels, vec!["Semester II", "Semester I"]);

        // The label groups across academic years; both years land in the
        // same "Semester II" bucket.
        let sem2 = &stats.results_by_semester[0];
        assert_eq!(sem2.courses.len(), 2);
        assert_eq!(sem2.total_credits, 6.0);
        let years: Vec<&str> = sem2
            .courses
            .iter()
            .map(|c| c.academic_year.as_str())
            .collect();
        assert_eq!(years, vec!["2023-2024", "2024-2025"]);
    }
}
