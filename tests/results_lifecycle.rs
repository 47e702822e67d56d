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

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn result_create_update_delete_roundtrip() {
    let workspace = temp_dir("registrar-results-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "name": "Amina Diallo", "studentNo": "S-1007" }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let course = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "code": "CS101", "title": "Intro to Computing", "credits": 4 }),
    );
    let course_id = course
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.create",
        json!({
            "studentId": &student_id,
            "courseId": &course_id,
            "semester": "Semester I",
            "academicYear": "2024-2025",
            "marks": 88,
            "gradedBy": "lecturer-1"
        }),
    );
    assert_eq!(created.get("letterGrade").and_then(|v| v.as_str()), Some("B+"));
    assert_eq!(created.get("gradePoint").and_then(|v| v.as_f64()), Some(3.3));
    assert_eq!(created.get("gradedBy").and_then(|v| v.as_str()), Some("lecturer-1"));
    let result_id = created
        .get("id")
        .and_then(|v| v.as_str())
        .expect("result id")
        .to_string();

    // Same four-column tuple again: rejected, caller should update instead.
    let dup = request(
        &mut stdin,
        &mut reader,
        "5",
        "results.create",
        json!({
            "studentId": &student_id,
            "courseId": &course_id,
            "semester": "Semester I",
            "academicYear": "2024-2025",
            "marks": 91
        }),
    );
    assert_eq!(dup.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&dup), "duplicate_result");

    // Remarks-only update leaves the grade alone.
    let remarked = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "results.update",
        json!({ "resultId": &result_id, "remarks": "resubmitted project" }),
    );
    assert_eq!(
        remarked.get("remarks").and_then(|v| v.as_str()),
        Some("resubmitted project")
    );
    assert_eq!(remarked.get("letterGrade").and_then(|v| v.as_str()), Some("B+"));
    assert_eq!(remarked.get("marks").and_then(|v| v.as_f64()), Some(88.0));

    // Marks update re-derives the letter grade and grade point in place.
    let regraded = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "results.update",
        json!({ "resultId": &result_id, "marks": 65 }),
    );
    assert_eq!(regraded.get("letterGrade").and_then(|v| v.as_str()), Some("D"));
    assert_eq!(regraded.get("gradePoint").and_then(|v| v.as_f64()), Some(1.0));
    assert_eq!(
        regraded.get("gradeId").and_then(|v| v.as_str()),
        created.get("gradeId").and_then(|v| v.as_str()),
        "grade row is updated, not replaced"
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "results.list",
        json!({ "studentId": &student_id }),
    );
    let results = listed
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results array");
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].get("letterGrade").and_then(|v| v.as_str()),
        Some("D")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "results.delete",
        json!({ "resultId": &result_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "10",
        "results.get",
        json!({ "resultId": &result_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    // The enrollment minted for the result survives the delete.
    let enrollments = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "enrollments.list",
        json!({ "studentId": &student_id }),
    );
    assert_eq!(
        enrollments
            .get("enrollments")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );
}

#[test]
fn result_validation_rejects_bad_fields() {
    let workspace = temp_dir("registrar-results-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "name": "Bela Horvat" }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "code": "MA201", "title": "Linear Algebra", "credits": 3 }),
    );
    let course_id = course
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    let base = |marks: serde_json::Value, semester: &str, year: &str| {
        json!({
            "studentId": &student_id,
            "courseId": &course_id,
            "semester": semester,
            "academicYear": year,
            "marks": marks
        })
    };

    let too_high = request(
        &mut stdin,
        &mut reader,
        "4",
        "results.create",
        base(json!(100.5), "Semester I", "2024-2025"),
    );
    assert_eq!(error_code(&too_high), "invalid_input");

    let bad_semester = request(
        &mut stdin,
        &mut reader,
        "5",
        "results.create",
        base(json!(75), "Summer", "2024-2025"),
    );
    assert_eq!(error_code(&bad_semester), "invalid_input");

    let bad_year = request(
        &mut stdin,
        &mut reader,
        "6",
        "results.create",
        base(json!(75), "Semester I", "2024/25"),
    );
    assert_eq!(error_code(&bad_year), "invalid_input");

    let unknown_student = request(
        &mut stdin,
        &mut reader,
        "7",
        "results.create",
        json!({
            "studentId": "no-such-student",
            "courseId": &course_id,
            "semester": "Semester I",
            "academicYear": "2024-2025",
            "marks": 75
        }),
    );
    assert_eq!(error_code(&unknown_student), "invalid_reference");

    // Nothing was created along the way.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "results.list",
        json!({}),
    );
    assert_eq!(
        listed.get("results").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
}
