use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::scale::{self, GradeScaleEntry};

pub const SEMESTER_I: &str = "Semester I";
pub const SEMESTER_II: &str = "Semester II";

/// Error taxonomy of the record engine. Everything except
/// `GradeScaleNotFound` and `Db` is an ordinary caller-recoverable
/// rejection; `GradeScaleNotFound` indicates corrupted reference data.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{entity} not found: {id}")]
    InvalidReference { entity: &'static str, id: String },
    #[error("student {student_id} is not enrolled in course {course_id}")]
    NotEnrolled {
        student_id: String,
        course_id: String,
    },
    #[error("a result already exists for this student, course, semester and academic year")]
    DuplicateResult,
    #[error("no grade scale band covers marks {0}")]
    GradeScaleNotFound(f64),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl RecordError {
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::InvalidInput(_) => "invalid_input",
            RecordError::InvalidReference { .. } => "invalid_reference",
            RecordError::NotEnrolled { .. } => "not_enrolled",
            RecordError::DuplicateResult => "duplicate_result",
            RecordError::GradeScaleNotFound(_) => "grade_scale_not_found",
            RecordError::NotFound { .. } => "not_found",
            RecordError::Db(_) => "db_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewResult {
    pub student_id: String,
    pub course_id: String,
    pub semester: String,
    pub academic_year: String,
    pub marks: f64,
    pub remarks: Option<String>,
    pub graded_by: Option<String>,
    /// Strict mode: reject with `NotEnrolled` when no enrollment exists,
    /// instead of lazily creating one.
    pub require_enrollment: bool,
}

/// Partial update. `None` leaves a field untouched; for `remarks` the
/// inner `Option` distinguishes "set" from "clear".
#[derive(Debug, Clone, Default)]
pub struct ResultPatch {
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub marks: Option<f64>,
    pub remarks: Option<Option<String>>,
    pub graded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub enrolled_at: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDetail {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub enrollment_id: String,
    pub grade_id: String,
    pub semester: String,
    pub academic_year: String,
    pub marks: f64,
    pub remarks: Option<String>,
    pub letter_grade: String,
    pub grade_point: f64,
    pub graded_by: Option<String>,
    pub graded_date: String,
}

pub fn validate_marks(marks: f64) -> Result<f64, RecordError> {
    if !marks.is_finite() || !(0.0..=100.0).contains(&marks) {
        return Err(RecordError::InvalidInput(format!(
            "marks must be between 0 and 100, got {}",
            marks
        )));
    }
    Ok(marks)
}

pub fn parse_semester(raw: &str) -> Result<&'static str, RecordError> {
    match raw {
        SEMESTER_I => Ok(SEMESTER_I),
        SEMESTER_II => Ok(SEMESTER_II),
        _ => Err(RecordError::InvalidInput(format!(
            "semester must be \"{}\" or \"{}\", got \"{}\"",
            SEMESTER_I, SEMESTER_II, raw
        ))),
    }
}

pub fn validate_academic_year(raw: &str) -> Result<(), RecordError> {
    let bytes = raw.as_bytes();
    let well_formed = bytes.len() == 9
        && bytes[4] == b'-'
        && bytes[..4].iter().all(|b| b.is_ascii_digit())
        && bytes[5..].iter().all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(RecordError::InvalidInput(format!(
            "academic_year must match YYYY-YYYY, got \"{}\"",
            raw
        )));
    }
    Ok(())
}

pub fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, RecordError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub fn course_exists(conn: &Connection, course_id: &str) -> Result<bool, RecordError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

fn ensure_student(conn: &Connection, student_id: &str) -> Result<(), RecordError> {
    if !student_exists(conn, student_id)? {
        return Err(RecordError::InvalidReference {
            entity: "student",
            id: student_id.to_string(),
        });
    }
    Ok(())
}

fn ensure_course(conn: &Connection, course_id: &str) -> Result<(), RecordError> {
    if !course_exists(conn, course_id)? {
        return Err(RecordError::InvalidReference {
            entity: "course",
            id: course_id.to_string(),
        });
    }
    Ok(())
}

pub fn find_enrollment(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
) -> Result<Option<Enrollment>, RecordError> {
    let row = conn
        .query_row(
            "SELECT id, student_id, course_id, enrolled_at, status
             FROM enrollments WHERE student_id = ? AND course_id = ?",
            (student_id, course_id),
            enrollment_from_row,
        )
        .optional()?;
    Ok(row)
}

fn enrollment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: row.get(0)?,
        student_id: row.get(1)?,
        course_id: row.get(2)?,
        enrolled_at: row.get(3)?,
        status: row.get(4)?,
    })
}

/// Find-or-create for the (student, course) pair. `INSERT OR IGNORE`
/// against the pair's UNIQUE constraint makes the operation idempotent;
/// run inside the caller's transaction it cannot mint two rows for one
/// pair.
pub fn resolve_enrollment(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
) -> Result<Enrollment, RecordError> {
    ensure_student(conn, student_id)?;
    ensure_course(conn, course_id)?;

    conn.execute(
        "INSERT OR IGNORE INTO enrollments(id, student_id, course_id, enrolled_at, status)
         VALUES(?, ?, ?, ?, 'enrolled')",
        (
            Uuid::new_v4().to_string(),
            student_id,
            course_id,
            Utc::now().to_rfc3339(),
        ),
    )?;

    find_enrollment(conn, student_id, course_id)?.ok_or(RecordError::Db(
        rusqlite::Error::QueryReturnedNoRows,
    ))
}

struct GradeRow {
    id: String,
    grade_point: f64,
    letter_grade: String,
}

/// Resolve the scale band for `marks` and attach it to the enrollment:
/// update the existing grade row in place, or insert one.
fn resolve_grade(
    conn: &Connection,
    scale: &[GradeScaleEntry],
    enrollment_id: &str,
    marks: f64,
    graded_by: Option<&str>,
) -> Result<GradeRow, RecordError> {
    let entry =
        scale::resolve_scale(scale, marks).ok_or(RecordError::GradeScaleNotFound(marks))?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM grades WHERE enrollment_id = ?",
            [enrollment_id],
            |r| r.get(0),
        )
        .optional()?;

    let graded_date = Utc::now().to_rfc3339();
    let grade_id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE grades
                 SET grade = ?, letter_grade = ?, graded_date = ?,
                     graded_by = COALESCE(?, graded_by)
                 WHERE id = ?",
                (
                    entry.grade_point,
                    &entry.letter_grade,
                    &graded_date,
                    graded_by,
                    &id,
                ),
            )?;
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO grades(id, enrollment_id, grade, letter_grade, graded_date, graded_by)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    enrollment_id,
                    entry.grade_point,
                    &entry.letter_grade,
                    &graded_date,
                    graded_by,
                ),
            )?;
            id
        }
    };

    Ok(GradeRow {
        id: grade_id,
        grade_point: entry.grade_point,
        letter_grade: entry.letter_grade.clone(),
    })
}

fn result_tuple_exists(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    semester: &str,
    academic_year: &str,
    exclude_id: Option<&str>,
) -> Result<bool, RecordError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM results
             WHERE student_id = ? AND course_id = ? AND semester = ? AND academic_year = ?
               AND id != COALESCE(?, '')",
            (student_id, course_id, semester, academic_year, exclude_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// The UNIQUE index is the authoritative duplicate guard; the advisory
/// SELECT in the callers only exists for a friendlier error.
fn map_constraint_to_duplicate(e: rusqlite::Error) -> RecordError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            RecordError::DuplicateResult
        }
        _ => RecordError::Db(e),
    }
}

/// Record a result: validate, (optionally) enforce enrollment, reject
/// duplicates, resolve the grade, insert. One transaction; any failure
/// rolls everything back.
pub fn create_result(conn: &Connection, input: &NewResult) -> Result<ResultDetail, RecordError> {
    let marks = validate_marks(input.marks)?;
    let semester = parse_semester(&input.semester)?;
    validate_academic_year(&input.academic_year)?;
    ensure_student(conn, &input.student_id)?;
    ensure_course(conn, &input.course_id)?;

    let tx = conn.unchecked_transaction()?;

    if input.require_enrollment
        && find_enrollment(&tx, &input.student_id, &input.course_id)?.is_none()
    {
        return Err(RecordError::NotEnrolled {
            student_id: input.student_id.clone(),
            course_id: input.course_id.clone(),
        });
    }

    if result_tuple_exists(
        &tx,
        &input.student_id,
        &input.course_id,
        semester,
        &input.academic_year,
        None,
    )? {
        return Err(RecordError::DuplicateResult);
    }

    let enrollment = resolve_enrollment(&tx, &input.student_id, &input.course_id)?;
    let scale = scale::load_scale(&tx)?;
    let grade = resolve_grade(
        &tx,
        &scale,
        &enrollment.id,
        marks,
        input.graded_by.as_deref(),
    )?;

    let result_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO results(id, student_id, course_id, grade_id, semester, academic_year,
                             marks, remarks, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &result_id,
            &input.student_id,
            &input.course_id,
            &grade.id,
            semester,
            &input.academic_year,
            marks,
            &input.remarks,
            Utc::now().to_rfc3339(),
        ),
    )
    .map_err(map_constraint_to_duplicate)?;

    tx.commit()?;
    fetch_result(conn, &result_id)
}

/// Partial update. A `marks` change re-derives the attached grade row in
/// place before the result row itself is touched.
pub fn update_result(
    conn: &Connection,
    result_id: &str,
    patch: &ResultPatch,
) -> Result<ResultDetail, RecordError> {
    let existing = fetch_result(conn, result_id)?;

    let semester = match &patch.semester {
        Some(raw) => parse_semester(raw)?.to_string(),
        None => existing.semester.clone(),
    };
    let academic_year = match &patch.academic_year {
        Some(raw) => {
            validate_academic_year(raw)?;
            raw.clone()
        }
        None => existing.academic_year.clone(),
    };
    let marks = match patch.marks {
        Some(m) => validate_marks(m)?,
        None => existing.marks,
    };
    let remarks = match &patch.remarks {
        Some(r) => r.clone(),
        None => existing.remarks.clone(),
    };

    let tx = conn.unchecked_transaction()?;

    let tuple_changed = semester != existing.semester || academic_year != existing.academic_year;
    if tuple_changed
        && result_tuple_exists(
            &tx,
            &existing.student_id,
            &existing.course_id,
            &semester,
            &academic_year,
            Some(result_id),
        )?
    {
        return Err(RecordError::DuplicateResult);
    }

    if patch.marks.is_some() {
        let scale = scale::load_scale(&tx)?;
        resolve_grade(
            &tx,
            &scale,
            &existing.enrollment_id,
            marks,
            patch.graded_by.as_deref(),
        )?;
    }

    tx.execute(
        "UPDATE results SET semester = ?, academic_year = ?, marks = ?, remarks = ?
         WHERE id = ?",
        (&semester, &academic_year, marks, &remarks, result_id),
    )
    .map_err(map_constraint_to_duplicate)?;

    tx.commit()?;
    fetch_result(conn, result_id)
}

/// Remove a result and the grade it owns. The enrollment survives; the
/// grade row is kept while another result (same enrollment, different
/// cycle) still references it, since the FK cascade would otherwise take
/// that sibling result down too.
pub fn delete_result(conn: &Connection, result_id: &str) -> Result<(), RecordError> {
    let tx = conn.unchecked_transaction()?;

    let grade_id: Option<String> = tx
        .query_row("SELECT grade_id FROM results WHERE id = ?", [result_id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(grade_id) = grade_id else {
        return Err(RecordError::NotFound {
            entity: "result",
            id: result_id.to_string(),
        });
    };

    tx.execute("DELETE FROM results WHERE id = ?", [result_id])?;
    tx.execute(
        "DELETE FROM grades
         WHERE id = ? AND NOT EXISTS (SELECT 1 FROM results WHERE grade_id = ?)",
        (&grade_id, &grade_id),
    )?;

    tx.commit()?;
    Ok(())
}

pub fn fetch_result(conn: &Connection, result_id: &str) -> Result<ResultDetail, RecordError> {
    let row = conn
        .query_row(
            "SELECT r.id, r.student_id, r.course_id, g.enrollment_id, r.grade_id,
                    r.semester, r.academic_year, r.marks, r.remarks,
                    g.letter_grade, g.grade, g.graded_by, g.graded_date
             FROM results r
             JOIN grades g ON g.id = r.grade_id
             WHERE r.id = ?",
            [result_id],
            |row| {
                Ok(ResultDetail {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    course_id: row.get(2)?,
                    enrollment_id: row.get(3)?,
                    grade_id: row.get(4)?,
                    semester: row.get(5)?,
                    academic_year: row.get(6)?,
                    marks: row.get(7)?,
                    remarks: row.get(8)?,
                    letter_grade: row.get(9)?,
                    grade_point: row.get(10)?,
                    graded_by: row.get(11)?,
                    graded_date: row.get(12)?,
                })
            },
        )
        .optional()?;

    row.ok_or_else(|| RecordError::NotFound {
        entity: "result",
        id: result_id.to_string(),
    })
}
