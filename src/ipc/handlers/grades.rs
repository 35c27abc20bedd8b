use crate::config::parse_scale_grade;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    authorize_subject, optional_str, query_failed, require_conn, require_str,
};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

const NOTE_MAX_CHARS: usize = 500;

/// Records a grade for one evaluation, replacing any earlier grade for it.
/// The evaluation's current weight is copied onto the grade.
fn create_grade(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user_id = require_str(params, "userId")?;
    let subject_id = require_str(params, "subjectId")?;
    let evaluation_name = require_str(params, "evaluationName")?;
    let value = match params.get("value") {
        Some(v) => parse_scale_grade(v, "value").map_err(HandlerErr::bad_params)?,
        None => return Err(HandlerErr::bad_params("missing value")),
    };
    let note = optional_str(params, "note")?.filter(|n| !n.is_empty());
    if note.as_ref().map(|n| n.chars().count() > NOTE_MAX_CHARS).unwrap_or(false) {
        return Err(HandlerErr::bad_params(format!(
            "note must be at most {} characters",
            NOTE_MAX_CHARS
        )));
    }
    authorize_subject(conn, &subject_id, &user_id)?;

    let weight: Option<f64> = conn
        .query_row(
            "SELECT weight FROM evaluations WHERE subject_id = ? AND name = ?",
            (&subject_id, &evaluation_name),
            |r| r.get(0),
        )
        .optional()
        .map_err(query_failed)?;
    let Some(weight) = weight else {
        return Err(HandlerErr::new("not_found", "evaluation not found")
            .with_details(json!({ "evaluationName": evaluation_name })));
    };

    let existing_id: Option<String> = conn
        .query_row(
            "SELECT id FROM grades WHERE subject_id = ? AND evaluation_name = ?",
            (&subject_id, &evaluation_name),
            |r| r.get(0),
        )
        .optional()
        .map_err(query_failed)?;
    let replaced = existing_id.is_some();
    let grade_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        "INSERT INTO grades(id, subject_id, evaluation_name, value, weight, note, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(subject_id, evaluation_name) DO UPDATE SET
           value = excluded.value,
           weight = excluded.weight,
           note = excluded.note,
           created_at = excluded.created_at",
        (
            &grade_id,
            &subject_id,
            &evaluation_name,
            value,
            weight,
            note,
            Utc::now().to_rfc3339(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "grades" }))
    })?;

    tracing::info!(
        subject_id = %subject_id,
        evaluation = %evaluation_name,
        value,
        replaced,
        "grade recorded"
    );
    Ok(json!({ "gradeId": grade_id, "weight": weight, "replaced": replaced }))
}

fn delete_grade(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let user_id = require_str(params, "userId")?;
    let subject_id = require_str(params, "subjectId")?;
    let evaluation_name = require_str(params, "evaluationName")?;
    authorize_subject(conn, &subject_id, &user_id)?;

    let removed = conn
        .execute(
            "DELETE FROM grades WHERE subject_id = ? AND evaluation_name = ?",
            (&subject_id, &evaluation_name),
        )
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if removed == 0 {
        return Err(HandlerErr::new("not_found", "grade not found")
            .with_details(json!({ "evaluationName": evaluation_name })));
    }

    tracing::info!(subject_id = %subject_id, evaluation = %evaluation_name, "grade deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "grades.create" => create_grade,
        "grades.delete" => delete_grade,
        _ => return None,
    };
    let resp = match require_conn(state.db.as_ref()).and_then(|conn| f(conn, &req.params)) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    };
    Some(resp)
}
