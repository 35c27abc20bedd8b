mod test_support;

use serde_json::json;
use test_support::{request, request_err_code, request_ok, send_line, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("notasd-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").expect("workspacePath").is_null());

    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "2",
            "subjects.list",
            json!({ "userId": "u1" })
        ),
        "no_workspace"
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let mut id = 10;
    for (method, params) in [
        ("settings.get", json!({})),
        ("subjects.list", json!({ "userId": "u1" })),
        ("subjects.get", json!({ "userId": "u1", "subjectId": "missing" })),
        ("subjects.update", json!({ "userId": "u1", "subjectId": "missing", "patch": {} })),
        ("subjects.delete", json!({ "userId": "u1", "subjectId": "missing" })),
        (
            "grades.create",
            json!({ "userId": "u1", "subjectId": "missing", "evaluationName": "x", "value": 4.0 }),
        ),
        ("grades.delete", json!({ "userId": "u1", "subjectId": "missing", "evaluationName": "x" })),
        ("calc.average", json!({ "subject": {} })),
        ("calc.projection", json!({ "subject": {} })),
        ("calc.exam", json!({ "subject": {} })),
        ("calc.scenarios", json!({ "currentWeightedSum": 0, "pendingEvaluations": [] })),
        ("backup.exportWorkspace", json!({ "outPath": bundle_out.to_string_lossy() })),
        ("backup.importWorkspace", json!({ "inPath": bundle_out.to_string_lossy() })),
    ] {
        id += 1;
        let resp = request(&mut stdin, &mut reader, &id.to_string(), method, params);
        let code = resp
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        assert_ne!(code, "not_implemented", "{} is not routed", method);
    }

    assert_eq!(
        request_err_code(&mut stdin, &mut reader, "99", "grades.list", json!({})),
        "not_implemented"
    );

    let bad = send_line(&mut stdin, &mut reader, "{not json");
    assert_eq!(bad.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        bad.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_json")
    );

    // The process keeps serving after a bad line.
    let _ = request_ok(&mut stdin, &mut reader, "100", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn inline_calculations_do_not_need_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let avg = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.average",
        json!({
            "subject": {
                "evaluations": [{ "name": "A", "weight": 50 }, { "name": "B", "weight": 50 }],
                "grades": [{ "evaluationName": "A", "value": 6.0, "weight": 50 }]
            }
        }),
    );
    assert_eq!(avg, json!({ "average": 6.0, "passing": true }));

    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "2",
            "calc.projection",
            json!({ "userId": "u1", "subjectId": "s1" })
        ),
        "no_workspace"
    );

    drop(stdin);
    let _ = child.wait();
}
