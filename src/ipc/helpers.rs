use crate::config::parse_scale_grade;
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::model::{Evaluation, Subject, SubjectSnapshot};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashSet;

pub fn query_failed(e: impl std::fmt::Display) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}

pub fn require_conn(conn: Option<&Connection>) -> Result<&Connection, HandlerErr> {
    conn.ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

/// Validated evaluation plan: non-empty unique names, weights within 0..=100.
/// The total is not checked here; the projection reports a mismatch.
pub fn parse_evaluations(raw: &Value, field: &str) -> Result<Vec<Evaluation>, HandlerErr> {
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", field)));
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let name = item
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        if name.is_empty() {
            return Err(HandlerErr::bad_params(format!(
                "{}[{}].name must not be empty",
                field, i
            )));
        }
        let weight = match item.get("weight").and_then(|v| v.as_f64()) {
            Some(w) if (0.0..=100.0).contains(&w) => w,
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "{}[{}].weight must be a percentage between 0 and 100",
                    field, i
                )))
            }
        };
        if !seen.insert(name.to_string()) {
            return Err(
                HandlerErr::bad_params("duplicate evaluation name")
                    .with_details(json!({ "name": name })),
            );
        }
        out.push(Evaluation {
            name: name.to_string(),
            weight,
        });
    }
    Ok(out)
}

pub fn authorize_subject(
    conn: &Connection,
    subject_id: &str,
    user_id: &str,
) -> Result<(), HandlerErr> {
    match db::subject_owner(conn, subject_id).map_err(query_failed)? {
        None => Err(HandlerErr::new("not_found", "subject not found")
            .with_details(json!({ "subjectId": subject_id }))),
        Some(owner) if owner != user_id => Err(HandlerErr::new(
            "forbidden",
            "subject belongs to another user",
        )),
        Some(_) => Ok(()),
    }
}

/// Stored subject addressed by `userId` + `subjectId`, after the ownership check.
pub fn load_owned_subject(conn: &Connection, params: &Value) -> Result<Subject, HandlerErr> {
    let user_id = require_str(params, "userId")?;
    let subject_id = require_str(params, "subjectId")?;
    authorize_subject(conn, &subject_id, &user_id)?;
    db::load_subject(conn, &subject_id)
        .map_err(query_failed)?
        .ok_or_else(|| HandlerErr::new("not_found", "subject not found"))
}

/// Either the inline `subject` document or the stored subject it names.
pub fn resolve_snapshot(
    conn: Option<&Connection>,
    params: &Value,
) -> Result<SubjectSnapshot, HandlerErr> {
    if let Some(raw) = params.get("subject") {
        if !raw.is_object() {
            return Err(HandlerErr::bad_params("subject must be an object"));
        }
        return Ok(SubjectSnapshot::from_json(raw));
    }
    let conn = require_conn(conn)?;
    Ok(SubjectSnapshot::from_stored(load_owned_subject(conn, params)?))
}

pub fn target_grade(params: &Value, default: f64) -> Result<f64, HandlerErr> {
    match params.get("targetGrade") {
        None | Some(Value::Null) => Ok(default),
        Some(v) => parse_scale_grade(v, "targetGrade").map_err(HandlerErr::bad_params),
    }
}
