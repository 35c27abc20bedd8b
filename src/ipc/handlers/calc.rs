use crate::calc::{
    compute_average, compute_snapshot_projection, exam_outlook, generate_scenarios,
    DEFAULT_TARGET_GRADE,
};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{parse_evaluations, resolve_snapshot, target_grade};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

fn to_result(value: impl Serialize) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn calc_average(conn: Option<&Connection>, params: &Value) -> Result<Value, HandlerErr> {
    let snapshot = resolve_snapshot(conn, params)?;
    to_result(compute_average(&snapshot.subject))
}

fn calc_projection(conn: Option<&Connection>, params: &Value) -> Result<Value, HandlerErr> {
    let snapshot = resolve_snapshot(conn, params)?;
    let target = target_grade(params, snapshot.subject.passing_grade)?;
    let projection = compute_snapshot_projection(&snapshot, target);
    tracing::debug!(
        subject_id = %snapshot.subject.id,
        target,
        status = projection.status(),
        "projection computed"
    );
    to_result(projection)
}

fn calc_exam(conn: Option<&Connection>, params: &Value) -> Result<Value, HandlerErr> {
    let snapshot = resolve_snapshot(conn, params)?;
    let target = target_grade(params, snapshot.subject.passing_grade)?;
    to_result(exam_outlook(&snapshot.subject, target))
}

fn calc_scenarios(_conn: Option<&Connection>, params: &Value) -> Result<Value, HandlerErr> {
    let current = params
        .get("currentWeightedSum")
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| HandlerErr::bad_params("currentWeightedSum must be a non-negative number"))?;
    let pending = match params.get("pendingEvaluations") {
        Some(raw) => parse_evaluations(raw, "pendingEvaluations")?,
        None => return Err(HandlerErr::bad_params("missing pendingEvaluations")),
    };
    let target = target_grade(params, DEFAULT_TARGET_GRADE)?;
    let scenarios = to_result(generate_scenarios(current, &pending, target))?;
    Ok(serde_json::json!({ "scenarios": scenarios }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let f: fn(Option<&Connection>, &Value) -> Result<Value, HandlerErr> =
        match req.method.as_str() {
            "calc.average" => calc_average,
            "calc.projection" => calc_projection,
            "calc.exam" => calc_exam,
            "calc.scenarios" => calc_scenarios,
            _ => return None,
        };
    let resp = match f(state.db.as_ref(), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    };
    Some(resp)
}
