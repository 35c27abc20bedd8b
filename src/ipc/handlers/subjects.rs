use crate::calc::compute_average;
use crate::config::{parse_exam_weight, parse_scale_grade, CalcSettings};
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    authorize_subject, load_owned_subject, optional_bool, optional_str, parse_evaluations,
    query_failed, require_conn, require_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Evaluation;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashSet;
use uuid::Uuid;

const SUBJECT_FIELDS: &[&str] = &[
    "name",
    "teacher",
    "description",
    "passingGrade",
    "hasExam",
    "examWeight",
    "examThreshold",
    "evaluations",
];

#[derive(Debug, Default)]
struct SubjectFields {
    name: Option<String>,
    teacher: Option<String>,
    description: Option<String>,
    passing_grade: Option<f64>,
    has_exam: Option<bool>,
    exam_weight: Option<f64>,
    exam_threshold: Option<f64>,
    evaluations: Option<Vec<Evaluation>>,
}

fn optional_number(
    raw: &Value,
    key: &str,
    parse: fn(&Value, &str) -> Result<f64, String>,
) -> Result<Option<f64>, HandlerErr> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse(v, key).map(Some).map_err(HandlerErr::bad_params),
    }
}

fn parse_subject_fields(raw: &Value, reject_unknown: bool) -> Result<SubjectFields, HandlerErr> {
    if reject_unknown {
        if let Some(obj) = raw.as_object() {
            if let Some(k) = obj.keys().find(|k| !SUBJECT_FIELDS.contains(&k.as_str())) {
                return Err(HandlerErr::bad_params(format!("unknown subject field: {}", k)));
            }
        }
    }

    let evaluations = match raw.get("evaluations") {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_evaluations(v, "evaluations")?),
    };

    Ok(SubjectFields {
        name: optional_str(raw, "name")?,
        teacher: optional_str(raw, "teacher")?,
        description: optional_str(raw, "description")?,
        passing_grade: optional_number(raw, "passingGrade", parse_scale_grade)?,
        has_exam: optional_bool(raw, "hasExam")?,
        exam_weight: optional_number(raw, "examWeight", parse_exam_weight)?,
        exam_threshold: optional_number(raw, "examThreshold", parse_scale_grade)?,
        evaluations,
    })
}

fn insert_evaluations(
    conn: &Connection,
    subject_id: &str,
    evaluations: &[Evaluation],
) -> Result<(), HandlerErr> {
    for (idx, e) in evaluations.iter().enumerate() {
        conn.execute(
            "INSERT INTO evaluations(id, subject_id, idx, name, weight) VALUES(?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                subject_id,
                idx as i64,
                &e.name,
                e.weight,
            ),
        )
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "evaluations" }))
        })?;
    }
    Ok(())
}

fn list_subjects(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user_id = require_str(params, "userId")?;
    let ids = db::list_subject_ids(conn, &user_id).map_err(query_failed)?;

    let mut subjects = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(subject) = db::load_subject(conn, &id).map_err(query_failed)? else {
            continue;
        };
        let avg = compute_average(&subject);
        subjects.push(json!({
            "id": &subject.id,
            "name": &subject.name,
            "teacher": &subject.teacher,
            "evaluationCount": subject.evaluations.len(),
            "gradeCount": subject.effective_grades().len(),
            "passingGrade": subject.passing_grade,
            "average": avg.average,
            "passing": avg.passing,
        }));
    }
    Ok(json!({ "subjects": subjects }))
}

fn get_subject(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = load_owned_subject(conn, params)?;
    let average = compute_average(&subject);
    Ok(json!({ "subject": subject, "average": average }))
}

fn create_subject(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user_id = require_str(params, "userId")?;
    let fields = parse_subject_fields(params, false)?;
    let name = fields.name.unwrap_or_default();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let settings = CalcSettings::load(conn).map_err(query_failed)?;

    let has_exam = fields.has_exam.unwrap_or(false);
    let (exam_weight, exam_threshold) = if has_exam {
        (
            Some(fields.exam_weight.unwrap_or(settings.default_exam_weight)),
            Some(
                fields
                    .exam_threshold
                    .unwrap_or(settings.default_exam_threshold),
            ),
        )
    } else {
        (fields.exam_weight, fields.exam_threshold)
    };

    let subject_id = Uuid::new_v4().to_string();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "INSERT INTO subjects(
            id, owner_id, name, teacher, description, passing_grade,
            has_exam, exam_weight, exam_threshold, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &subject_id,
            &user_id,
            &name,
            fields.teacher.unwrap_or_default(),
            fields.description.unwrap_or_default(),
            fields
                .passing_grade
                .unwrap_or(settings.default_passing_grade),
            has_exam as i64,
            exam_weight,
            exam_threshold,
            Utc::now().to_rfc3339(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "subjects" }))
    })?;
    insert_evaluations(&tx, &subject_id, fields.evaluations.as_deref().unwrap_or(&[]))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    tracing::info!(subject_id = %subject_id, user_id = %user_id, "subject created");
    Ok(json!({ "subjectId": subject_id }))
}

fn update_subject(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut current = load_owned_subject(conn, params)?;
    let Some(patch) = params.get("patch").filter(|v| v.is_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let fields = parse_subject_fields(patch, true)?;

    if let Some(name) = fields.name {
        if name.is_empty() {
            return Err(HandlerErr::bad_params("name must not be empty"));
        }
        current.name = name;
    }
    if let Some(v) = fields.teacher {
        current.teacher = v;
    }
    if let Some(v) = fields.description {
        current.description = v;
    }
    if let Some(v) = fields.passing_grade {
        current.passing_grade = v;
    }
    if let Some(v) = fields.has_exam {
        current.has_exam = v;
    }
    if fields.exam_weight.is_some() {
        current.exam_weight = fields.exam_weight;
    }
    if fields.exam_threshold.is_some() {
        current.exam_threshold = fields.exam_threshold;
    }
    if current.has_exam && (current.exam_weight.is_none() || current.exam_threshold.is_none()) {
        let settings = CalcSettings::load(conn).map_err(query_failed)?;
        current.exam_weight.get_or_insert(settings.default_exam_weight);
        current
            .exam_threshold
            .get_or_insert(settings.default_exam_threshold);
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE subjects
         SET name = ?, teacher = ?, description = ?, passing_grade = ?,
             has_exam = ?, exam_weight = ?, exam_threshold = ?, updated_at = ?
         WHERE id = ?",
        (
            &current.name,
            &current.teacher,
            &current.description,
            current.passing_grade,
            current.has_exam as i64,
            current.exam_weight,
            current.exam_threshold,
            Utc::now().to_rfc3339(),
            &current.id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    let mut removed_grades = 0usize;
    if let Some(evaluations) = fields.evaluations {
        tx.execute(
            "DELETE FROM evaluations WHERE subject_id = ?",
            [&current.id],
        )
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
        insert_evaluations(&tx, &current.id, &evaluations)?;

        // Grades only make sense against the current plan.
        let kept: HashSet<&str> = evaluations.iter().map(|e| e.name.as_str()).collect();
        for g in current
            .grades
            .iter()
            .filter(|g| !kept.contains(g.evaluation_name.as_str()))
        {
            removed_grades += tx
                .execute(
                    "DELETE FROM grades WHERE subject_id = ? AND evaluation_name = ?",
                    (&current.id, &g.evaluation_name),
                )
                .map_err(|e| {
                    HandlerErr::new("db_delete_failed", e.to_string())
                        .with_details(json!({ "table": "grades" }))
                })?;
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    tracing::info!(subject_id = %current.id, removed_grades, "subject updated");
    Ok(json!({ "ok": true, "removedGrades": removed_grades }))
}

fn delete_subject(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user_id = require_str(params, "userId")?;
    let subject_id = require_str(params, "subjectId")?;
    authorize_subject(conn, &subject_id, &user_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    // Children first; there is no ON DELETE CASCADE.
    for (table, sql) in [
        ("grades", "DELETE FROM grades WHERE subject_id = ?"),
        ("evaluations", "DELETE FROM evaluations WHERE subject_id = ?"),
        ("subjects", "DELETE FROM subjects WHERE id = ?"),
    ] {
        tx.execute(sql, [&subject_id]).map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": table }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    tracing::info!(subject_id = %subject_id, "subject deleted");
    Ok(json!({ "ok": true }))
}

fn respond(
    state: &AppState,
    req: &Request,
    f: fn(&Connection, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    match require_conn(state.db.as_ref()).and_then(|conn| f(conn, &req.params)) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "subjects.list" => Some(respond(state, req, list_subjects)),
        "subjects.get" => Some(respond(state, req, get_subject)),
        "subjects.create" => Some(respond(state, req, create_subject)),
        "subjects.update" => Some(respond(state, req, update_subject)),
        "subjects.delete" => Some(respond(state, req, delete_subject)),
        _ => None,
    }
}
