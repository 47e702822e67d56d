use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::scale::{self, GradeScaleEntry};
use serde_json::json;

fn handle_scale_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match scale::load_scale(conn) {
        Ok(entries) => ok(
            &req.id,
            json!({ "scale": serde_json::to_value(entries).unwrap_or_default() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn parse_entry(i: usize, v: &serde_json::Value) -> Result<GradeScaleEntry, String> {
    let obj = v
        .as_object()
        .ok_or_else(|| format!("band at index {} must be an object", i))?;
    let field = |name: &str| {
        obj.get(name)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| format!("band at index {} missing {}", i, name))
    };
    let num = |name: &str| {
        obj.get(name)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| format!("band at index {} missing numeric {}", i, name))
    };

    Ok(GradeScaleEntry {
        name: field("name")?,
        description: obj
            .get("description")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        min_marks: num("minMarks")?,
        max_marks: num("maxMarks")?,
        grade_point: num("gradePoint")?,
        letter_grade: field("letterGrade")?,
    })
}

/// Administrative wholesale replacement. A table that fails coverage
/// validation is rejected before the live one is touched.
fn handle_scale_replace(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(bands) = req.params.get("scale").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing scale[]", None);
    };

    let mut entries = Vec::with_capacity(bands.len());
    for (i, band) in bands.iter().enumerate() {
        match parse_entry(i, band) {
            Ok(e) => entries.push(e),
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        }
    }

    if let Err(msg) = scale::validate_scale(&entries) {
        return err(&req.id, "invalid_input", msg, None);
    }

    match scale::replace_scale(conn, &entries) {
        Ok(()) => {
            tracing::info!(bands = entries.len(), "grade scale replaced");
            ok(&req.id, json!({ "ok": true, "bands": entries.len() }))
        }
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scale.list" => Some(handle_scale_list(state, req)),
        "scale.replace" => Some(handle_scale_replace(state, req)),
        _ => None,
    }
}
