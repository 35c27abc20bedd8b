use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

pub const GRADE_MIN: f64 = 1.0;
pub const GRADE_MAX: f64 = 7.0;
pub const DEFAULT_PASSING_GRADE: f64 = 4.0;
pub const DEFAULT_EXAM_WEIGHT: f64 = 30.0;
pub const DEFAULT_EXAM_THRESHOLD: f64 = 5.0;

/// One weighted item of a subject's evaluation plan. `weight` is a percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub name: String,
    pub weight: f64,
}

/// A recorded result. `weight` is copied from the evaluation when the grade is
/// recorded and is what the calculations use.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub evaluation_name: String,
    pub value: f64,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub teacher: String,
    pub description: String,
    pub evaluations: Vec<Evaluation>,
    pub grades: Vec<Grade>,
    pub passing_grade: f64,
    pub has_exam: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExamRule {
    pub weight: f64,
    pub threshold: f64,
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            owner_id: String::new(),
            name: name.into(),
            teacher: String::new(),
            description: String::new(),
            evaluations: Vec::new(),
            grades: Vec::new(),
            passing_grade: DEFAULT_PASSING_GRADE,
            has_exam: false,
            exam_weight: None,
            exam_threshold: None,
        }
    }

    pub fn evaluation(&self, name: &str) -> Option<&Evaluation> {
        self.evaluations.iter().find(|e| e.name == name)
    }

    /// Grades with at most one entry per evaluation name. A later grade for the
    /// same evaluation replaces an earlier one unless its timestamp is older.
    pub fn effective_grades(&self) -> Vec<&Grade> {
        let mut slot_by_name: HashMap<&str, usize> = HashMap::new();
        let mut out: Vec<&Grade> = Vec::with_capacity(self.grades.len());
        for g in &self.grades {
            match slot_by_name.get(g.evaluation_name.as_str()) {
                Some(&slot) => {
                    if !is_older(g, out[slot]) {
                        out[slot] = g;
                    }
                }
                None => {
                    slot_by_name.insert(g.evaluation_name.as_str(), out.len());
                    out.push(g);
                }
            }
        }
        out
    }

    /// Effective grades that reference an evaluation of the current plan.
    pub fn plan_grades(&self) -> Vec<&Grade> {
        self.effective_grades()
            .into_iter()
            .filter(|g| self.evaluation(&g.evaluation_name).is_some())
            .collect()
    }

    /// Plan evaluations without a recorded grade, in plan order.
    pub fn pending_evaluations(&self) -> Vec<Evaluation> {
        let graded = self.plan_grades();
        self.evaluations
            .iter()
            .filter(|e| !graded.iter().any(|g| g.evaluation_name == e.name))
            .cloned()
            .collect()
    }

    pub fn exam_rule(&self) -> Option<ExamRule> {
        if !self.has_exam {
            return None;
        }
        let weight = self
            .exam_weight
            .filter(|w| w.is_finite() && *w > 0.0 && *w < 100.0)
            .unwrap_or(DEFAULT_EXAM_WEIGHT);
        let threshold = self
            .exam_threshold
            .filter(|t| t.is_finite())
            .unwrap_or(DEFAULT_EXAM_THRESHOLD);
        Some(ExamRule { weight, threshold })
    }
}

fn is_older(candidate: &Grade, current: &Grade) -> bool {
    match (candidate.created_at, current.created_at) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    }
}

/// A subject read from a loosely-shaped JSON document, e.g. a UI cache that
/// may still be loading. Records whether the collections were usable.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectSnapshot {
    pub subject: Subject,
    pub plan_present: bool,
    pub grades_present: bool,
}

impl SubjectSnapshot {
    pub fn from_stored(subject: Subject) -> Self {
        Self {
            subject,
            plan_present: true,
            grades_present: true,
        }
    }

    pub fn from_json(raw: &serde_json::Value) -> Self {
        let mut subject = Subject::new(str_field(raw, "name"));
        subject.id = str_field(raw, "id");
        subject.owner_id = str_field(raw, "ownerId");
        subject.teacher = str_field(raw, "teacher");
        subject.description = str_field(raw, "description");
        subject.passing_grade = raw
            .get("passingGrade")
            .and_then(|v| v.as_f64())
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_PASSING_GRADE);
        subject.has_exam = raw
            .get("hasExam")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        subject.exam_weight = raw.get("examWeight").and_then(|v| v.as_f64());
        subject.exam_threshold = raw.get("examThreshold").and_then(|v| v.as_f64());

        let plan = raw.get("evaluations").and_then(|v| v.as_array());
        if let Some(items) = plan {
            subject.evaluations = items.iter().filter_map(evaluation_from_json).collect();
        }

        let grades = raw.get("grades").and_then(|v| v.as_array());
        if let Some(items) = grades {
            for item in items {
                match grade_from_json(item) {
                    Some(g) => subject.grades.push(g),
                    None => tracing::debug!(grade = %item, "skipping malformed grade"),
                }
            }
        }

        Self {
            subject,
            plan_present: plan.is_some(),
            grades_present: grades.is_some(),
        }
    }
}

fn str_field(raw: &serde_json::Value, key: &str) -> String {
    raw.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn evaluation_from_json(raw: &serde_json::Value) -> Option<Evaluation> {
    let name = raw.get("name").and_then(|v| v.as_str())?;
    let weight = raw
        .get("weight")
        .and_then(|v| v.as_f64())
        .filter(|w| w.is_finite())
        .unwrap_or(0.0);
    Some(Evaluation {
        name: name.to_string(),
        weight,
    })
}

fn grade_from_json(raw: &serde_json::Value) -> Option<Grade> {
    let evaluation_name = raw.get("evaluationName").and_then(|v| v.as_str())?;
    let value = raw.get("value").and_then(|v| v.as_f64())?;
    let weight = raw.get("weight").and_then(|v| v.as_f64())?;
    if !value.is_finite() || !weight.is_finite() {
        return None;
    }
    Some(Grade {
        id: raw.get("id").and_then(|v| v.as_str()).map(str::to_string),
        evaluation_name: evaluation_name.to_string(),
        value,
        weight,
        note: raw.get("note").and_then(|v| v.as_str()).map(str::to_string),
        created_at: raw
            .get("createdAt")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp),
    })
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
