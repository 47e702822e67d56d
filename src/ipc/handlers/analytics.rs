use crate::ipc::error::{err, ok, record_err};
use crate::ipc::types::{AppState, Request};
use crate::stats;

fn handle_student_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    match stats::student_statistics(conn, &student_id) {
        Ok(statistics) => ok(
            &req.id,
            serde_json::to_value(&statistics).unwrap_or_default(),
        ),
        Err(e) => record_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.studentStats" => Some(handle_student_stats(state, req)),
        _ => None,
    }
}
