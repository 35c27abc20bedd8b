use super::{round_off_1_decimal, weighted_average};
use crate::model::{Subject, GRADE_MAX, GRADE_MIN};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "status",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ExamOutlook {
    NotApplicable,
    NoGradesYet,
    Exempt {
        presentation_grade: f64,
        exam_threshold: f64,
    },
    ExamRequired {
        presentation_grade: f64,
        exam_weight: f64,
        exam_threshold: f64,
        required_exam_grade: f64,
        reachable: bool,
        /// Pending evaluations remain, so the presentation grade can still move.
        provisional: bool,
    },
}

/// Exam exemption and the exam grade needed to reach `target_grade`.
///
/// The presentation grade is the average over the evaluation plan; the final
/// grade is `presentation * (1 - w) + exam * w` with `w` the exam weight.
pub fn exam_outlook(subject: &Subject, target_grade: f64) -> ExamOutlook {
    let Some(rule) = subject.exam_rule() else {
        return ExamOutlook::NotApplicable;
    };

    let graded = subject.plan_grades();
    let Some(raw) = weighted_average(graded.iter().copied()) else {
        return ExamOutlook::NoGradesYet;
    };
    let presentation_grade = round_off_1_decimal(raw);
    let provisional = !subject.pending_evaluations().is_empty();

    if !provisional && presentation_grade >= rule.threshold {
        return ExamOutlook::Exempt {
            presentation_grade,
            exam_threshold: rule.threshold,
        };
    }

    let w = rule.weight / 100.0;
    let needed = (target_grade - presentation_grade * (1.0 - w)) / w;
    let required_exam_grade = round_off_1_decimal(needed.max(GRADE_MIN));
    ExamOutlook::ExamRequired {
        presentation_grade,
        exam_weight: rule.weight,
        exam_threshold: rule.threshold,
        required_exam_grade,
        reachable: required_exam_grade <= GRADE_MAX,
        provisional,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Evaluation, Grade};

    fn with_exam(grades: &[(&str, f64)]) -> Subject {
        let mut s = Subject::new("Programacion");
        s.has_exam = true;
        s.exam_weight = Some(40.0);
        s.exam_threshold = Some(5.5);
        s.evaluations = vec![
            Evaluation {
                name: "C1".into(),
                weight: 50.0,
            },
            Evaluation {
                name: "C2".into(),
                weight: 50.0,
            },
        ];
        s.grades = grades
            .iter()
            .map(|(name, value)| Grade {
                id: None,
                evaluation_name: name.to_string(),
                value: *value,
                weight: 50.0,
                note: None,
                created_at: None,
            })
            .collect();
        s
    }

    #[test]
    fn subject_without_exam_is_not_applicable() {
        let mut s = with_exam(&[("C1", 6.0)]);
        s.has_exam = false;
        assert_eq!(exam_outlook(&s, 4.0), ExamOutlook::NotApplicable);
    }

    #[test]
    fn no_grades_yet() {
        assert_eq!(exam_outlook(&with_exam(&[]), 4.0), ExamOutlook::NoGradesYet);
    }

    #[test]
    fn exempt_once_plan_is_complete_above_threshold() {
        assert_eq!(
            exam_outlook(&with_exam(&[("C1", 6.0), ("C2", 5.5)]), 4.0),
            ExamOutlook::Exempt {
                presentation_grade: 5.8,
                exam_threshold: 5.5
            }
        );
    }

    #[test]
    fn provisional_outlook_never_exempts() {
        match exam_outlook(&with_exam(&[("C1", 6.5)]), 4.0) {
            ExamOutlook::ExamRequired {
                provisional,
                required_exam_grade,
                ..
            } => {
                assert!(provisional);
                // 6.5 * 0.6 = 3.9 already covers most of 4.0
                assert_eq!(required_exam_grade, 1.0);
            }
            other => panic!("unexpected outlook: {other:?}"),
        }
    }

    #[test]
    fn required_exam_grade_below_threshold() {
        match exam_outlook(&with_exam(&[("C1", 2.0), ("C2", 4.0)]), 4.0) {
            ExamOutlook::ExamRequired {
                presentation_grade,
                required_exam_grade,
                reachable,
                provisional,
                ..
            } => {
                assert_eq!(presentation_grade, 3.0);
                // (4.0 - 3.0 * 0.6) / 0.4
                assert_eq!(required_exam_grade, 5.5);
                assert!(reachable);
                assert!(!provisional);
            }
            other => panic!("unexpected outlook: {other:?}"),
        }
    }

    #[test]
    fn unreachable_exam_grade_is_flagged() {
        match exam_outlook(&with_exam(&[("C1", 1.0), ("C2", 1.0)]), 4.0) {
            ExamOutlook::ExamRequired {
                required_exam_grade,
                reachable,
                ..
            } => {
                assert_eq!(required_exam_grade, 8.5);
                assert!(!reachable);
            }
            other => panic!("unexpected outlook: {other:?}"),
        }
    }
}
