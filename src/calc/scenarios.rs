use super::round_off_1_decimal;
use crate::model::{Evaluation, GRADE_MAX, GRADE_MIN};
use serde::Serialize;

const STRONG_START_GRADE: f64 = 6.5;
const STRONG_FINISH_OPENING_GRADE: f64 = 3.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioGrade {
    pub evaluation_name: String,
    pub weight: f64,
    pub grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub grades: Vec<ScenarioGrade>,
    /// Final grade if the scenario plays out. Can fall short of the target
    /// when a clamped grade could not absorb everything needed.
    pub projected_final: f64,
}

fn clamp_grade(x: f64) -> f64 {
    if x.is_nan() {
        return GRADE_MIN;
    }
    x.clamp(GRADE_MIN, GRADE_MAX)
}

/// Grade needed on `fraction` of the final weight to collect `points`.
fn solve(points: f64, fraction: f64) -> f64 {
    if fraction <= 0.0 {
        return GRADE_MIN;
    }
    clamp_grade(points / fraction)
}

fn build(
    name: &str,
    description: String,
    current_weighted_sum: f64,
    pending: &[Evaluation],
    grades: &[f64],
) -> Scenario {
    let grades: Vec<ScenarioGrade> = pending
        .iter()
        .zip(grades)
        .map(|(e, g)| ScenarioGrade {
            evaluation_name: e.name.clone(),
            weight: e.weight,
            grade: round_off_1_decimal(clamp_grade(*g)),
        })
        .collect();
    let projected: f64 = grades.iter().map(|g| g.grade * g.weight / 100.0).sum();
    Scenario {
        name: name.to_string(),
        description,
        grades,
        projected_final: round_off_1_decimal(current_weighted_sum + projected),
    }
}

/// Illustrative ways of spreading the remaining points over `pending`.
///
/// Always yields the uniform scenario; focus and proportional need at least two
/// pending evaluations, the strong start/finish splits need three.
pub fn generate_scenarios(
    current_weighted_sum: f64,
    pending: &[Evaluation],
    target_grade: f64,
) -> Vec<Scenario> {
    if pending.is_empty() {
        return Vec::new();
    }

    let points_needed = target_grade - current_weighted_sum;
    let fractions: Vec<f64> = pending.iter().map(|e| e.weight / 100.0).collect();
    let total_fraction: f64 = fractions.iter().sum();
    let n = pending.len();

    let uniform = solve(points_needed, total_fraction);
    let mut scenarios = vec![build(
        "uniform",
        format!(
            "{:.1} on every pending evaluation",
            round_off_1_decimal(uniform)
        ),
        current_weighted_sum,
        pending,
        &vec![uniform; n],
    )];

    if n >= 2 {
        let heaviest = (0..n).fold(0, |best, i| {
            if fractions[i] > fractions[best] {
                i
            } else {
                best
            }
        });
        let others: f64 = (0..n)
            .filter(|&i| i != heaviest)
            .map(|i| GRADE_MIN * fractions[i])
            .sum();
        let focus = solve(points_needed - others, fractions[heaviest]);
        let grades: Vec<f64> = (0..n)
            .map(|i| if i == heaviest { focus } else { GRADE_MIN })
            .collect();
        scenarios.push(build(
            "focus-heaviest",
            format!(
                "Minimum everywhere except {}, the heaviest evaluation",
                pending[heaviest].name
            ),
            current_weighted_sum,
            pending,
            &grades,
        ));

        let mean_fraction = total_fraction / n as f64;
        let mut grades: Vec<f64> = Vec::with_capacity(n);
        let mut assigned = 0.0_f64;
        for f in &fractions[..n - 1] {
            let g = if mean_fraction > 0.0 {
                round_off_1_decimal(clamp_grade(uniform * f / mean_fraction))
            } else {
                uniform
            };
            assigned += g * f;
            grades.push(g);
        }
        grades.push(solve(points_needed - assigned, fractions[n - 1]));
        scenarios.push(build(
            "proportional",
            "Higher grades on the heavier evaluations".to_string(),
            current_weighted_sum,
            pending,
            &grades,
        ));
    }

    if n >= 3 {
        scenarios.push(split_scenario(
            "strong-start",
            STRONG_START_GRADE,
            current_weighted_sum,
            points_needed,
            pending,
            &fractions,
        ));
        scenarios.push(split_scenario(
            "strong-finish",
            STRONG_FINISH_OPENING_GRADE,
            current_weighted_sum,
            points_needed,
            pending,
            &fractions,
        ));
    }

    scenarios
}

/// First half (rounded down) fixed at `opening_grade`, the rest solved uniformly.
fn split_scenario(
    name: &str,
    opening_grade: f64,
    current_weighted_sum: f64,
    points_needed: f64,
    pending: &[Evaluation],
    fractions: &[f64],
) -> Scenario {
    let split = pending.len() / 2;
    let opening_points: f64 = fractions[..split].iter().map(|f| opening_grade * f).sum();
    let closing_fraction: f64 = fractions[split..].iter().sum();
    let closing = solve(points_needed - opening_points, closing_fraction);

    let grades: Vec<f64> = (0..pending.len())
        .map(|i| if i < split { opening_grade } else { closing })
        .collect();
    build(
        name,
        format!(
            "{:.1} on the first {} pending, then {:.1} on the remaining {}",
            opening_grade,
            split,
            round_off_1_decimal(closing),
            pending.len() - split
        ),
        current_weighted_sum,
        pending,
        &grades,
    )
}
