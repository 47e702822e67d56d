use crate::ipc::error::{err, ok, record_err};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, NewResult, ResultPatch};
use serde_json::json;

const BULK_CREATE_MAX_ROWS: usize = 1000;

fn handle_results_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };
    let semester = match req.params.get("semester").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing semester", None),
    };
    let academic_year = match req.params.get("academicYear").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing academicYear", None),
    };
    let marks = match req.params.get("marks").and_then(|v| v.as_f64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing numeric marks", None),
    };

    let input = NewResult {
        student_id,
        course_id,
        semester,
        academic_year,
        marks,
        remarks: req
            .params
            .get("remarks")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        graded_by: req
            .params
            .get("gradedBy")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        require_enrollment: req
            .params
            .get("requireEnrollment")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    };

    match records::create_result(conn, &input) {
        Ok(detail) => ok(&req.id, serde_json::to_value(&detail).unwrap_or_default()),
        Err(e) => record_err(&req.id, e),
    }
}

fn handle_results_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let result_id = match req.params.get("resultId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing resultId", None),
    };

    match records::fetch_result(conn, &result_id) {
        Ok(detail) => ok(&req.id, serde_json::to_value(&detail).unwrap_or_default()),
        Err(e) => record_err(&req.id, e),
    }
}

fn handle_results_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "results": [] }));
    };

    let student_id = req.params.get("studentId").and_then(|v| v.as_str());
    let course_id = req.params.get("courseId").and_then(|v| v.as_str());
    let semester = req.params.get("semester").and_then(|v| v.as_str());
    let academic_year = req.params.get("academicYear").and_then(|v| v.as_str());

    let mut stmt = match conn.prepare(
        "SELECT r.id, r.student_id, r.course_id, r.semester, r.academic_year,
                r.marks, r.remarks, g.letter_grade, g.grade
         FROM results r
         JOIN grades g ON g.id = r.grade_id
         WHERE (?1 IS NULL OR r.student_id = ?1)
           AND (?2 IS NULL OR r.course_id = ?2)
           AND (?3 IS NULL OR r.semester = ?3)
           AND (?4 IS NULL OR r.academic_year = ?4)
         ORDER BY r.rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map((student_id, course_id, semester, academic_year), |row| {
            let id: String = row.get(0)?;
            let student_id: String = row.get(1)?;
            let course_id: String = row.get(2)?;
            let semester: String = row.get(3)?;
            let academic_year: String = row.get(4)?;
            let marks: f64 = row.get(5)?;
            let remarks: Option<String> = row.get(6)?;
            let letter_grade: String = row.get(7)?;
            let grade_point: f64 = row.get(8)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "courseId": course_id,
                "semester": semester,
                "academicYear": academic_year,
                "marks": marks,
                "remarks": remarks,
                "letterGrade": letter_grade,
                "gradePoint": grade_point
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(results) => ok(&req.id, json!({ "results": results })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_results_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let result_id = match req.params.get("resultId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing resultId", None),
    };

    // A key that is present but null clears the field (remarks only);
    // an absent key leaves it untouched.
    let remarks = match req.params.get("remarks") {
        None => None,
        Some(serde_json::Value::Null) => Some(None),
        Some(v) => match v.as_str() {
            Some(s) => Some(Some(s.to_string())),
            None => return err(&req.id, "bad_params", "remarks must be a string or null", None),
        },
    };
    if let Some(v) = req.params.get("marks") {
        if v.as_f64().is_none() {
            return err(&req.id, "bad_params", "marks must be numeric", None);
        }
    }

    let patch = ResultPatch {
        semester: req
            .params
            .get("semester")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        academic_year: req
            .params
            .get("academicYear")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        marks: req.params.get("marks").and_then(|v| v.as_f64()),
        remarks,
        graded_by: req
            .params
            .get("gradedBy")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    };

    match records::update_result(conn, &result_id, &patch) {
        Ok(detail) => ok(&req.id, serde_json::to_value(&detail).unwrap_or_default()),
        Err(e) => record_err(&req.id, e),
    }
}

fn handle_results_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let result_id = match req.params.get("resultId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing resultId", None),
    };

    match records::delete_result(conn, &result_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => record_err(&req.id, e),
    }
}

/// Bulk entry for a fixed (course, semester, year): each row runs the
/// full create pipeline; one bad row never aborts the batch.
fn handle_results_bulk_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };
    let semester = match req.params.get("semester").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing semester", None),
    };
    let academic_year = match req.params.get("academicYear").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing academicYear", None),
    };
    let graded_by = req
        .params
        .get("gradedBy")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let require_enrollment = req
        .params
        .get("requireEnrollment")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let Some(rows) = req.params.get("rows").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing rows[]", None);
    };

    if rows.len() > BULK_CREATE_MAX_ROWS {
        return err(
            &req.id,
            "bad_params",
            format!(
                "bulk payload exceeds max rows: {} > {}",
                rows.len(),
                BULK_CREATE_MAX_ROWS
            ),
            Some(json!({ "maxRows": BULK_CREATE_MAX_ROWS })),
        );
    }

    let mut created: usize = 0;
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let Some(obj) = row.as_object() else {
            errors.push(json!({
                "row": i,
                "code": "bad_params",
                "message": format!("row at index {} must be an object", i),
            }));
            continue;
        };

        let Some(student_id) = obj.get("studentId").and_then(|v| v.as_str()) else {
            errors.push(json!({
                "row": i,
                "code": "bad_params",
                "message": format!("row at index {} missing studentId", i),
            }));
            continue;
        };
        let Some(marks) = obj.get("marks").and_then(|v| v.as_f64()) else {
            errors.push(json!({
                "row": i,
                "code": "bad_params",
                "message": format!("row at index {} missing numeric marks", i),
            }));
            continue;
        };

        let input = NewResult {
            student_id: student_id.to_string(),
            course_id: course_id.clone(),
            semester: semester.clone(),
            academic_year: academic_year.clone(),
            marks,
            remarks: obj
                .get("remarks")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            graded_by: graded_by.clone(),
            require_enrollment,
        };

        match records::create_result(conn, &input) {
            Ok(_) => created += 1,
            Err(e) => errors.push(json!({
                "row": i,
                "code": e.code(),
                "message": e.to_string(),
            })),
        }
    }

    let rejected = errors.len();
    let mut result = json!({ "ok": true, "created": created });
    if rejected > 0 {
        let obj = result.as_object_mut().expect("result should be object");
        obj.insert("rejected".into(), json!(rejected));
        obj.insert("errors".into(), json!(errors));
    }

    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.create" => Some(handle_results_create(state, req)),
        "results.get" => Some(handle_results_get(state, req)),
        "results.list" => Some(handle_results_list(state, req)),
        "results.update" => Some(handle_results_update(state, req)),
        "results.delete" => Some(handle_results_delete(state, req)),
        "results.bulkCreate" => Some(handle_results_bulk_create(state, req)),
        _ => None,
    }
}
