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
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .args(["--institution", "Green Valley School"])
        .env_remove("CAMPUSD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
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

fn count(result: &serde_json::Value, collection: &str) -> i64 {
    result
        .get("counts")
        .and_then(|c| c.get(collection))
        .and_then(|v| v.as_i64())
        .expect("count")
}

#[test]
fn backup_reset_restore_over_ipc() {
    let workspace = temp_dir("campusd-ipc");
    let snapshot_in = workspace.join("seed.json");
    std::fs::write(
        &snapshot_in,
        json!({
            "branches": [{ "id": 1, "name": "North Campus" }],
            "classes": [{ "id": 10, "branch_id": 1, "name": "Grade 7" }],
            "students": [{ "id": "s-1", "branch_id": 1, "class_id": 10, "full_name": "Asha Rao",
                           "branch": { "name": "North Campus" } }],
            "archived_logs": [{ "id": 1 }]
        })
        .to_string(),
    )
    .expect("write seed snapshot");

    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["institution"], json!("Green Valley School"));

    let no_ws = request(&mut stdin, &mut reader, "2", "dataset.counts", json!({}));
    assert_eq!(error_code(&no_ws), "no_workspace");

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "operators.create",
        json!({ "email": "Admin@School.test", "password": "correct horse" }),
    );
    assert_eq!(created["bootstrap"], json!(true));

    let second_operator = request(
        &mut stdin,
        &mut reader,
        "5",
        "operators.create",
        json!({ "email": "other@school.test", "password": "another secret" }),
    );
    assert_eq!(error_code(&second_operator), "not_signed_in");

    let anon_reset = request(
        &mut stdin,
        &mut reader,
        "6",
        "dataset.reset",
        json!({ "password": "correct horse", "confirm": "RESET" }),
    );
    assert_eq!(error_code(&anon_reset), "not_signed_in");

    let bad_sign_in = request(
        &mut stdin,
        &mut reader,
        "7",
        "session.signIn",
        json!({ "email": "admin@school.test", "password": "nope nope" }),
    );
    assert_eq!(error_code(&bad_sign_in), "access_denied");
    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "session.signIn",
        json!({ "email": "admin@school.test", "password": "correct horse" }),
    );

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "dataset.previewSnapshot",
        json!({ "inPath": snapshot_in.to_string_lossy() }),
    );
    assert_eq!(preview["recordsTotal"], json!(4));
    assert_eq!(preview["ignored"], json!(["archived_logs"]));
    assert_eq!(preview["restoreOrder"][0]["collection"], json!("branches"));

    let no_input = request(
        &mut stdin,
        &mut reader,
        "10",
        "dataset.restore",
        json!({ "password": "correct horse" }),
    );
    assert_eq!(error_code(&no_input), "no_input");

    let denied = request(
        &mut stdin,
        &mut reader,
        "11",
        "dataset.restore",
        json!({ "inPath": snapshot_in.to_string_lossy(), "password": "wrong horse" }),
    );
    assert_eq!(error_code(&denied), "access_denied");
    let counts = request_ok(&mut stdin, &mut reader, "12", "dataset.counts", json!({}));
    assert_eq!(count(&counts, "branches"), 0);

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "dataset.restore",
        json!({ "inPath": snapshot_in.to_string_lossy(), "password": "correct horse" }),
    );
    assert_eq!(restored["status"], json!("success"));
    assert_eq!(restored["ignored"], json!(["archived_logs"]));
    let counts = request_ok(&mut stdin, &mut reader, "14", "dataset.counts", json!({}));
    assert_eq!(count(&counts, "students"), 1);

    let backup_dir = workspace.join("exports");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "dataset.backup",
        json!({ "outDir": backup_dir.to_string_lossy() }),
    );
    assert_eq!(exported["status"], json!("success"));
    let file_name = exported["fileName"].as_str().expect("fileName").to_string();
    assert!(
        file_name.starts_with("green-valley-school_backup_") && file_name.ends_with(".json"),
        "{}",
        file_name
    );
    let backup_path = backup_dir.join(&file_name);
    let text = std::fs::read_to_string(&backup_path).expect("read backup");
    let doc: serde_json::Value = serde_json::from_str(&text).expect("backup is JSON");
    assert_eq!(doc["students"][0]["full_name"], json!("Asha Rao"));
    assert!(doc["students"][0].get("branch").is_none());
    assert!(doc.get("archived_logs").is_none());

    let unconfirmed = request(
        &mut stdin,
        &mut reader,
        "16",
        "dataset.reset",
        json!({ "password": "correct horse" }),
    );
    assert_eq!(error_code(&unconfirmed), "confirmation_required");
    let wrong_pw_reset = request(
        &mut stdin,
        &mut reader,
        "17",
        "dataset.reset",
        json!({ "password": "wrong horse", "confirm": "RESET" }),
    );
    assert_eq!(error_code(&wrong_pw_reset), "access_denied");
    let counts = request_ok(&mut stdin, &mut reader, "18", "dataset.counts", json!({}));
    assert_eq!(count(&counts, "students"), 1);

    let reset = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "dataset.reset",
        json!({ "password": "correct horse", "confirm": "RESET" }),
    );
    assert_eq!(reset["status"], json!("success"));
    assert_eq!(reset["outcomes"][0]["collection"], json!("site_content"));
    let counts = request_ok(&mut stdin, &mut reader, "20", "dataset.counts", json!({}));
    for name in ["branches", "classes", "students"] {
        assert_eq!(count(&counts, name), 0, "{}", name);
    }

    let back = request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "dataset.restore",
        json!({ "inPath": backup_path.to_string_lossy(), "password": "correct horse" }),
    );
    assert_eq!(back["status"], json!("success"));
    let counts = request_ok(&mut stdin, &mut reader, "22", "dataset.counts", json!({}));
    assert_eq!(count(&counts, "branches"), 1);
    assert_eq!(count(&counts, "classes"), 1);
    assert_eq!(count(&counts, "students"), 1);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_snapshot_and_unknown_method_are_reported() {
    let workspace = temp_dir("campusd-ipc-malformed");
    let bad = workspace.join("bad.json");
    std::fs::write(&bad, r#"{"branches": {"id": 1}}"#).expect("write bad snapshot");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "operators.create",
        json!({ "email": "admin@school.test", "password": "correct horse" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.signIn",
        json!({ "email": "admin@school.test", "password": "correct horse" }),
    );

    let malformed = request(
        &mut stdin,
        &mut reader,
        "4",
        "dataset.restore",
        json!({ "inPath": bad.to_string_lossy(), "password": "correct horse" }),
    );
    assert_eq!(error_code(&malformed), "malformed_input");

    let catalog = request_ok(&mut stdin, &mut reader, "5", "dataset.catalog", json!({}));
    let names: Vec<&str> = catalog["collections"]
        .as_array()
        .expect("collections")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names.first().copied(), Some("branches"));
    assert_eq!(names.len(), 12);

    let unknown = request(&mut stdin, &mut reader, "6", "students.list", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    let _ = std::fs::remove_dir_all(workspace);
}
