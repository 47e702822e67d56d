use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

/// One band of the grade scale. Bounds are inclusive; marks are recorded
/// to two decimals, so adjacent bands meet at a 0.01 step (e.g. 59.99 / 60).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GradeScaleEntry {
    pub name: String,
    pub description: Option<String>,
    pub min_marks: f64,
    pub max_marks: f64,
    pub grade_point: f64,
    pub letter_grade: String,
}

/// Find the unique band covering `marks`. `None` means the scale has a
/// coverage gap, which is a configuration defect, not a user error.
pub fn resolve_scale(scale: &[GradeScaleEntry], marks: f64) -> Option<&GradeScaleEntry> {
    scale
        .iter()
        .find(|e| e.min_marks <= marks && marks <= e.max_marks)
}

/// The standard 13-band table seeded into fresh workspaces.
pub fn default_scale() -> Vec<GradeScaleEntry> {
    let band = |name: &str, desc: &str, min: f64, max: f64, gp: f64| GradeScaleEntry {
        name: name.to_string(),
        description: Some(desc.to_string()),
        min_marks: min,
        max_marks: max,
        grade_point: gp,
        letter_grade: name.to_string(),
    };
    vec![
        band("A+", "Excellent", 97.0, 100.0, 4.00),
        band("A", "Excellent", 93.0, 96.99, 4.00),
        band("A-", "Excellent", 90.0, 92.99, 3.70),
        band("B+", "Good", 87.0, 89.99, 3.30),
        band("B", "Good", 83.0, 86.99, 3.00),
        band("B-", "Good", 80.0, 82.99, 2.70),
        band("C+", "Satisfactory", 77.0, 79.99, 2.30),
        band("C", "Satisfactory", 73.0, 76.99, 2.00),
        band("C-", "Satisfactory", 70.0, 72.99, 1.70),
        band("D+", "Passing", 67.0, 69.99, 1.30),
        band("D", "Passing", 63.0, 66.99, 1.00),
        band("D-", "Passing", 60.0, 62.99, 0.70),
        band("F", "Fail", 0.0, 59.99, 0.00),
    ]
}

/// Check a candidate table before it replaces the live one: bands must be
/// individually sane, non-overlapping, contiguous at two-decimal
/// resolution, and jointly cover [0, 100].
pub fn validate_scale(entries: &[GradeScaleEntry]) -> Result<(), String> {
    if entries.is_empty() {
        return Err("scale must contain at least one band".to_string());
    }

    for e in entries {
        if e.min_marks > e.max_marks {
            return Err(format!(
                "band {} has min_marks {} above max_marks {}",
                e.name, e.min_marks, e.max_marks
            ));
        }
        if !(0.0..=4.0).contains(&e.grade_point) {
            return Err(format!(
                "band {} grade_point {} outside [0, 4]",
                e.name, e.grade_point
            ));
        }
    }

    let mut sorted: Vec<&GradeScaleEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        a.min_marks
            .partial_cmp(&b.min_marks)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if sorted[0].min_marks != 0.0 {
        return Err("scale must start at 0".to_string());
    }
    if sorted[sorted.len() - 1].max_marks != 100.0 {
        return Err("scale must end at 100".to_string());
    }

    for pair in sorted.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let step = hi.min_marks - lo.max_marks;
        if step <= 0.0 {
            return Err(format!(
                "bands {} and {} overlap",
                lo.name, hi.name
            ));
        }
        if step > 0.01 + 1e-9 {
            return Err(format!(
                "coverage gap between {} ({}) and {} ({})",
                lo.name, lo.max_marks, hi.name, hi.min_marks
            ));
        }
    }

    Ok(())
}

/// Load the scale ordered from the top band down, matching the seeded order.
pub fn load_scale(conn: &Connection) -> rusqlite::Result<Vec<GradeScaleEntry>> {
    let mut stmt = conn.prepare(
        "SELECT name, description, min_marks, max_marks, grade_point, letter_grade
         FROM grade_scales
         ORDER BY min_marks DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(GradeScaleEntry {
            name: row.get(0)?,
            description: row.get(1)?,
            min_marks: row.get(2)?,
            max_marks: row.get(3)?,
            grade_point: row.get(4)?,
            letter_grade: row.get(5)?,
        })
    })?;
    rows.collect()
}

pub fn seed_default_scale_if_empty(conn: &Connection) -> rusqlite::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM grade_scales", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    insert_scale(conn, &default_scale())
}

/// Replace the live table wholesale. The caller validates first; this
/// runs inside its own transaction so a failed insert leaves the old
/// table intact.
pub fn replace_scale(conn: &Connection, entries: &[GradeScaleEntry]) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM grade_scales", [])?;
    insert_scale(&tx, entries)?;
    tx.commit()
}

fn insert_scale(conn: &Connection, entries: &[GradeScaleEntry]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO grade_scales(id, name, description, min_marks, max_marks, grade_point, letter_grade)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
    )?;
    for e in entries {
        stmt.execute((
            Uuid::new_v4().to_string(),
            &e.name,
            &e.description,
            e.min_marks,
            e.max_marks,
            e.grade_point,
            &e.letter_grade,
        ))?;
    }
    Ok(())
}
