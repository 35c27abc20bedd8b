use crate::model::{Evaluation, Grade, Subject, SubjectSnapshot, GRADE_MAX, GRADE_MIN};
use serde::Serialize;

mod exam;
mod scenarios;

pub use exam::{exam_outlook, ExamOutlook};
pub use scenarios::{generate_scenarios, Scenario, ScenarioGrade};

pub const DEFAULT_TARGET_GRADE: f64 = 4.0;

/// Allowed deviation of a plan's total weight from 100, in percentage points.
pub const WEIGHT_TOLERANCE: f64 = 0.1;

/// Remaining weight at or below this is treated as none left.
const REMAINING_WEIGHT_EPSILON: f64 = 1e-9;

/// Half-up rounding to one decimal: `floor(10x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AverageResult {
    pub average: f64,
    pub passing: bool,
}

/// Weighted mean renormalized over the weight recorded so far. Grades with a
/// non-finite value or weight are skipped. `None` when no weight was seen.
pub fn weighted_average<'a, I>(grades: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a Grade>,
{
    let mut terms: Vec<(f64, f64)> = grades
        .into_iter()
        .filter(|g| g.value.is_finite() && g.weight.is_finite())
        .map(|g| (g.value, g.weight / 100.0))
        .collect();
    // Sum in a canonical order so the result does not depend on list order.
    terms.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)));

    let mut weighted_sum = 0.0_f64;
    let mut total_fraction_seen = 0.0_f64;
    for (value, fraction) in terms {
        weighted_sum += value * fraction;
        total_fraction_seen += fraction;
    }

    if total_fraction_seen == 0.0 {
        None
    } else {
        Some(weighted_sum / total_fraction_seen)
    }
}

pub fn compute_average(subject: &Subject) -> AverageResult {
    match weighted_average(subject.effective_grades()) {
        Some(raw) => {
            let average = round_off_1_decimal(raw);
            AverageResult {
                average,
                passing: average >= subject.passing_grade,
            }
        }
        None => AverageResult {
            average: 0.0,
            passing: false,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigIssue {
    /// The snapshot carried no usable grade collection.
    GradesUnavailable,
    /// Recorded grades already account for all of the weight.
    NoRemainingWeight,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "status",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ProjectionResult {
    NoPlan,
    WeightMismatch {
        total_weight: f64,
    },
    NoGradesYet,
    ConfigError {
        reason: ConfigIssue,
    },
    Completed {
        average: f64,
        passed: bool,
    },
    ImpossibleToPass {
        max_possible_final: f64,
    },
    AlreadyPassing {
        current_weighted_sum: f64,
    },
    TooHard {
        required_grade: f64,
    },
    EasyPass {
        required_grade: f64,
    },
    Possible {
        required_grade: f64,
        pending_evaluations: Vec<Evaluation>,
        scenarios: Vec<Scenario>,
    },
}

impl ProjectionResult {
    pub fn status(&self) -> &'static str {
        match self {
            ProjectionResult::NoPlan => "noPlan",
            ProjectionResult::WeightMismatch { .. } => "weightMismatch",
            ProjectionResult::NoGradesYet => "noGradesYet",
            ProjectionResult::ConfigError { .. } => "configError",
            ProjectionResult::Completed { .. } => "completed",
            ProjectionResult::ImpossibleToPass { .. } => "impossibleToPass",
            ProjectionResult::AlreadyPassing { .. } => "alreadyPassing",
            ProjectionResult::TooHard { .. } => "tooHard",
            ProjectionResult::EasyPass { .. } => "easyPass",
            ProjectionResult::Possible { .. } => "possible",
        }
    }
}

/// Missing plan or a plan whose weights do not add up to 100.
fn plan_issue(subject: &Subject) -> Option<ProjectionResult> {
    if subject.evaluations.is_empty() {
        return Some(ProjectionResult::NoPlan);
    }
    let total_weight: f64 = subject.evaluations.iter().map(|e| e.weight).sum();
    if !total_weight.is_finite() || (total_weight - 100.0).abs() > WEIGHT_TOLERANCE {
        return Some(ProjectionResult::WeightMismatch { total_weight });
    }
    None
}

/// Projects what is still needed on pending evaluations to reach `target_grade`.
///
/// The "already passing" check compares the current weighted sum against the
/// target without crediting the 1.0 minimum the remaining evaluations will add,
/// so it only fires once the recorded grades reach the target on their own.
/// `ImpossibleToPass` and `TooHard` describe the same condition from two angles
/// and are kept apart because clients show different messages for them.
pub fn compute_projection(subject: &Subject, target_grade: f64) -> ProjectionResult {
    if let Some(issue) = plan_issue(subject) {
        return issue;
    }

    if subject.grades.is_empty() {
        return ProjectionResult::NoGradesYet;
    }

    let graded = subject.plan_grades();
    let pending = subject.pending_evaluations();
    if pending.is_empty() {
        let average = weighted_average(graded.iter().copied())
            .map(round_off_1_decimal)
            .unwrap_or(0.0);
        return ProjectionResult::Completed {
            average,
            passed: average >= target_grade,
        };
    }

    let mut current_weighted_sum = 0.0_f64;
    let mut completed_weight_fraction = 0.0_f64;
    for g in graded
        .iter()
        .filter(|g| g.value.is_finite() && g.weight.is_finite())
    {
        let fraction = g.weight / 100.0;
        current_weighted_sum += g.value * fraction;
        completed_weight_fraction += fraction;
    }
    let remaining_weight_fraction = 1.0 - completed_weight_fraction;
    if remaining_weight_fraction <= REMAINING_WEIGHT_EPSILON {
        return ProjectionResult::ConfigError {
            reason: ConfigIssue::NoRemainingWeight,
        };
    }

    let max_possible_final = current_weighted_sum + GRADE_MAX * remaining_weight_fraction;
    if max_possible_final < target_grade {
        return ProjectionResult::ImpossibleToPass { max_possible_final };
    }

    if current_weighted_sum >= target_grade {
        return ProjectionResult::AlreadyPassing {
            current_weighted_sum,
        };
    }

    let required_grade = (target_grade - current_weighted_sum) / remaining_weight_fraction;
    if required_grade > GRADE_MAX {
        return ProjectionResult::TooHard { required_grade };
    }
    if required_grade <= GRADE_MIN {
        return ProjectionResult::EasyPass { required_grade };
    }

    let scenarios = generate_scenarios(current_weighted_sum, &pending, target_grade);
    ProjectionResult::Possible {
        required_grade,
        pending_evaluations: pending,
        scenarios,
    }
}

/// Projection over a snapshot whose collections may not have loaded.
pub fn compute_snapshot_projection(
    snapshot: &SubjectSnapshot,
    target_grade: f64,
) -> ProjectionResult {
    if !snapshot.plan_present {
        return ProjectionResult::NoPlan;
    }
    if !snapshot.grades_present {
        // Plan problems are reported before the missing grades.
        if let Some(issue) = plan_issue(&snapshot.subject) {
            return issue;
        }
        return ProjectionResult::ConfigError {
            reason: ConfigIssue::GradesUnavailable,
        };
    }
    compute_projection(&snapshot.subject, target_grade)
}
