use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn fresh_workspace_seeds_the_thirteen_band_scale() {
    let workspace = temp_dir("registrar-scale-seed");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "3", "scale.list", json!({}));
    let bands = listed.get("scale").and_then(|v| v.as_array()).expect("scale");
    assert_eq!(bands.len(), 13);
    assert_eq!(bands[0].get("name").and_then(|v| v.as_str()), Some("A+"));
    assert_eq!(
        bands[12].get("name").and_then(|v| v.as_str()),
        Some("F")
    );
    assert_eq!(bands[12].get("min_marks").and_then(|v| v.as_f64()), Some(0.0));

    let unknown = request(&mut stdin, &mut reader, "4", "grades.frobnicate", json!({}));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );
}

#[test]
fn replace_validates_coverage_before_touching_the_table() {
    let workspace = temp_dir("registrar-scale-replace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Gap between 49.99 and 60: rejected wholesale.
    let gapped = request(
        &mut stdin,
        &mut reader,
        "2",
        "scale.replace",
        json!({
            "scale": [
                { "name": "P", "minMarks": 60.0, "maxMarks": 100.0, "gradePoint": 4.0, "letterGrade": "P" },
                { "name": "F", "minMarks": 0.0, "maxMarks": 49.99, "gradePoint": 0.0, "letterGrade": "F" }
            ]
        }),
    );
    assert_eq!(
        gapped
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("invalid_input")
    );

    // The seeded table is still intact after the rejection.
    let listed = request_ok(&mut stdin, &mut reader, "3", "scale.list", json!({}));
    assert_eq!(
        listed.get("scale").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(13)
    );

    // A contiguous pass/fail table is accepted and drives grading.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scale.replace",
        json!({
            "scale": [
                { "name": "P", "description": "Pass", "minMarks": 50.0, "maxMarks": 100.0, "gradePoint": 4.0, "letterGrade": "P" },
                { "name": "F", "description": "Fail", "minMarks": 0.0, "maxMarks": 49.99, "gradePoint": 0.0, "letterGrade": "F" }
            ]
        }),
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "name": "Rosa Kim" }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "courses.create",
        json!({ "code": "EN101", "title": "Composition", "credits": 2 }),
    );
    let course_id = course
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "results.create",
        json!({
            "studentId": &student_id,
            "courseId": &course_id,
            "semester": "Semester II",
            "academicYear": "2025-2026",
            "marks": 75
        }),
    );
    assert_eq!(created.get("letterGrade").and_then(|v| v.as_str()), Some("P"));
    assert_eq!(created.get("gradePoint").and_then(|v| v.as_f64()), Some(4.0));
}
