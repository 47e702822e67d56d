use serde_json::json;

use crate::records::RecordError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Map a domain error to the wire. Validation rejections go back
/// verbatim; a scale coverage gap is corrupted reference data, so the
/// cause is logged for operators and the caller gets a generic failure.
pub fn record_err(id: &str, e: RecordError) -> serde_json::Value {
    match &e {
        RecordError::GradeScaleNotFound(marks) => {
            tracing::error!(marks = *marks, "grade scale has no band covering marks");
            err(id, e.code(), "unable to grade: grade scale is misconfigured", None)
        }
        RecordError::Db(db) => {
            tracing::error!(error = %db, "database operation failed");
            err(id, e.code(), db.to_string(), None)
        }
        _ => {
            tracing::debug!(code = e.code(), "request rejected: {}", e);
            err(id, e.code(), e.to_string(), None)
        }
    }
}
