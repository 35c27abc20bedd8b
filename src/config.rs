use crate::db;
use crate::model::{
    DEFAULT_EXAM_THRESHOLD, DEFAULT_EXAM_WEIGHT, DEFAULT_PASSING_GRADE, GRADE_MAX, GRADE_MIN,
};
use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "NOTASD_LOG";
pub const WORKSPACE_ENV: &str = "NOTASD_WORKSPACE";
const DEFAULT_LOG_FILTER: &str = "info";

/// Process-level settings read from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            log_filter: non_empty(LOG_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            workspace: non_empty(WORKSPACE_ENV).map(PathBuf::from),
        }
    }
}

/// Logs go to stderr; stdout carries the protocol.
pub fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

pub const CALC_SETTINGS_KEY: &str = "calc";

/// Workspace defaults applied when subjects are created without explicit figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcSettings {
    pub default_passing_grade: f64,
    pub default_exam_weight: f64,
    pub default_exam_threshold: f64,
}

impl Default for CalcSettings {
    fn default() -> Self {
        Self {
            default_passing_grade: DEFAULT_PASSING_GRADE,
            default_exam_weight: DEFAULT_EXAM_WEIGHT,
            default_exam_threshold: DEFAULT_EXAM_THRESHOLD,
        }
    }
}

impl CalcSettings {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let mut current = Self::default();
        if let Some(saved) = db::settings_get_json(conn, CALC_SETTINGS_KEY)? {
            if let Some(saved_obj) = saved.as_object() {
                // A malformed stored patch is ignored as a whole.
                let mut merged = current;
                match merged.merge_patch(saved_obj) {
                    Ok(()) => current = merged,
                    Err(e) => tracing::warn!(error = %e, "ignoring stored calc settings"),
                }
            }
        }
        Ok(current)
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(conn, CALC_SETTINGS_KEY, &serde_json::to_value(self)?)
    }

    pub fn merge_patch(
        &mut self,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "defaultPassingGrade" => self.default_passing_grade = parse_scale_grade(v, k)?,
                "defaultExamThreshold" => self.default_exam_threshold = parse_scale_grade(v, k)?,
                "defaultExamWeight" => self.default_exam_weight = parse_exam_weight(v, k)?,
                _ => return Err(format!("unknown calc field: {}", k)),
            }
        }
        Ok(())
    }
}

pub fn parse_scale_grade(v: &serde_json::Value, field: &str) -> Result<f64, String> {
    match v.as_f64() {
        Some(n) if (GRADE_MIN..=GRADE_MAX).contains(&n) => Ok(n),
        _ => Err(format!(
            "{} must be a number between {:.1} and {:.1}",
            field, GRADE_MIN, GRADE_MAX
        )),
    }
}

pub fn parse_exam_weight(v: &serde_json::Value, field: &str) -> Result<f64, String> {
    match v.as_f64() {
        Some(n) if n > 0.0 && n < 100.0 => Ok(n),
        _ => Err(format!("{} must be a percentage between 0 and 100", field)),
    }
}
