mod test_support;

use serde_json::json;
use test_support::{create_subject, request_err_code, request_ok, spawn_sidecar, temp_dir};

#[test]
fn subjects_crud_roundtrip_with_ownership() {
    let workspace = temp_dir("notasd-subjects-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let subject_id = create_subject(
        &mut stdin,
        &mut reader,
        "2",
        json!({
            "userId": "ana",
            "name": "Cálculo I",
            "teacher": "Prof. Rojas",
            "evaluations": [
                { "name": "Control 1", "weight": 30 },
                { "name": "Control 2", "weight": 30 },
                { "name": "Examen", "weight": 40 }
            ]
        }),
    );
    let _ = create_subject(
        &mut stdin,
        &mut reader,
        "3",
        json!({ "userId": "ana", "name": "Álgebra" }),
    );
    let _ = create_subject(
        &mut stdin,
        &mut reader,
        "4",
        json!({ "userId": "beto", "name": "Física" }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "subjects.list",
        json!({ "userId": "ana" }),
    );
    let subjects = listed
        .get("subjects")
        .and_then(|v| v.as_array())
        .expect("subjects");
    assert_eq!(subjects.len(), 2);
    let calc = subjects
        .iter()
        .find(|s| s.get("id").and_then(|v| v.as_str()) == Some(subject_id.as_str()))
        .expect("created subject listed");
    assert_eq!(calc.get("evaluationCount").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(calc.get("gradeCount").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(calc.get("average").and_then(|v| v.as_f64()), Some(0.0));
    assert_eq!(calc.get("passing").and_then(|v| v.as_bool()), Some(false));

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "subjects.get",
        json!({ "userId": "ana", "subjectId": subject_id }),
    );
    let subject = got.get("subject").expect("subject");
    assert_eq!(subject.get("name").and_then(|v| v.as_str()), Some("Cálculo I"));
    assert_eq!(subject.get("passingGrade").and_then(|v| v.as_f64()), Some(4.0));
    let names: Vec<&str> = subject
        .get("evaluations")
        .and_then(|v| v.as_array())
        .expect("evaluations")
        .iter()
        .filter_map(|e| e.get("name").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(names, vec!["Control 1", "Control 2", "Examen"]);

    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "7",
            "subjects.get",
            json!({ "userId": "beto", "subjectId": subject_id })
        ),
        "forbidden"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "8",
            "subjects.delete",
            json!({ "userId": "beto", "subjectId": subject_id })
        ),
        "forbidden"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "9",
            "subjects.get",
            json!({ "userId": "ana", "subjectId": "nope" })
        ),
        "not_found"
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "subjects.update",
        json!({
            "userId": "ana",
            "subjectId": subject_id,
            "patch": { "name": "Cálculo Diferencial", "passingGrade": 4.5 }
        }),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "subjects.get",
        json!({ "userId": "ana", "subjectId": subject_id }),
    );
    assert_eq!(
        got.pointer("/subject/name").and_then(|v| v.as_str()),
        Some("Cálculo Diferencial")
    );
    assert_eq!(
        got.pointer("/subject/passingGrade").and_then(|v| v.as_f64()),
        Some(4.5)
    );
    assert_eq!(
        got.pointer("/subject/evaluations")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(3)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "subjects.delete",
        json!({ "userId": "ana", "subjectId": subject_id }),
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "13",
            "subjects.get",
            json!({ "userId": "ana", "subjectId": subject_id })
        ),
        "not_found"
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn subject_validation_rejects_bad_plans_and_fields() {
    let workspace = temp_dir("notasd-subjects-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let cases = [
        json!({ "userId": "ana", "name": "" }),
        json!({ "name": "Sin dueño" }),
        json!({ "userId": "ana", "name": "X", "passingGrade": 7.5 }),
        json!({ "userId": "ana", "name": "X", "examWeight": 100 }),
        json!({
            "userId": "ana",
            "name": "X",
            "evaluations": [{ "name": "A", "weight": 50 }, { "name": "A", "weight": 50 }]
        }),
        json!({ "userId": "ana", "name": "X", "evaluations": [{ "name": "A", "weight": 120 }] }),
        json!({ "userId": "ana", "name": "X", "evaluations": [{ "name": " ", "weight": 10 }] }),
        json!({ "userId": "ana", "name": "X", "evaluations": "A" }),
    ];
    for (i, params) in cases.into_iter().enumerate() {
        assert_eq!(
            request_err_code(
                &mut stdin,
                &mut reader,
                &format!("c{}", i),
                "subjects.create",
                params
            ),
            "bad_params",
            "case {}",
            i
        );
    }

    let subject_id = create_subject(
        &mut stdin,
        &mut reader,
        "2",
        json!({ "userId": "ana", "name": "Química" }),
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "3",
            "subjects.update",
            json!({ "userId": "ana", "subjectId": subject_id, "patch": { "color": "red" } })
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "4",
            "subjects.update",
            json!({ "userId": "ana", "subjectId": subject_id, "patch": "rename" })
        ),
        "bad_params"
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
