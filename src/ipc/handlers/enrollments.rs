use crate::ipc::error::{err, ok, record_err};
use crate::ipc::types::{AppState, Request};
use crate::records;
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "enrollments": [] }));
    };

    let student_id = req.params.get("studentId").and_then(|v| v.as_str());
    let course_id = req.params.get("courseId").and_then(|v| v.as_str());

    let mut stmt = match conn.prepare(
        "SELECT id, student_id, course_id, enrolled_at, status
         FROM enrollments
         WHERE (?1 IS NULL OR student_id = ?1)
           AND (?2 IS NULL OR course_id = ?2)
         ORDER BY enrolled_at",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map((student_id, course_id), |row| {
            let id: String = row.get(0)?;
            let student_id: String = row.get(1)?;
            let course_id: String = row.get(2)?;
            let enrolled_at: String = row.get(3)?;
            let status: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "courseId": course_id,
                "enrolledAt": enrolled_at,
                "status": status
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(enrollments) => ok(&req.id, json!({ "enrollments": enrollments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_enrollments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    match records::find_enrollment(conn, &student_id, &course_id) {
        Ok(Some(existing)) => {
            return err(
                &req.id,
                "already_enrolled",
                "student is already enrolled in this course",
                Some(json!({ "enrollmentId": existing.id })),
            );
        }
        Ok(None) => {}
        Err(e) => return record_err(&req.id, e),
    }

    match records::resolve_enrollment(conn, &student_id, &course_id) {
        Ok(enrollment) => ok(
            &req.id,
            serde_json::to_value(&enrollment).unwrap_or_default(),
        ),
        Err(e) => record_err(&req.id, e),
    }
}

/// Unenroll. The enrollment owns its grade, and results hang off that
/// grade, so the delete walks the dependency chain explicitly inside one
/// transaction.
fn handle_enrollments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let enrollment_id = match req.params.get("enrollmentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing enrollmentId", None),
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE id = ?",
            [&enrollment_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "enrollment not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute(
        "DELETE FROM results
         WHERE grade_id IN (SELECT id FROM grades WHERE enrollment_id = ?)",
        [&enrollment_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "results" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM grades WHERE enrollment_id = ?",
        [&enrollment_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM enrollments WHERE id = ?", [&enrollment_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.list" => Some(handle_enrollments_list(state, req)),
        "enrollments.create" => Some(handle_enrollments_create(state, req)),
        "enrollments.delete" => Some(handle_enrollments_delete(state, req)),
        _ => None,
    }
}
