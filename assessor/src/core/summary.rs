//! Derived per-goal figures for text views of the result map.
//!
//! Scores arrive as fractions in `[0, 1]`; summaries report percentages.

use crate::core::types::GoalResult;

/// Condensed view of one goal's latest results.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalSummary {
    pub name: String,
    /// Latest global score as a percentage, if the goal was assessed yet.
    pub latest_score_pct: Option<f64>,
    pub assessments: usize,
    /// `(metric label, average contribution %)` in metric order.
    pub contributions: Vec<(String, f64)>,
}

pub fn summarize(goal: &GoalResult) -> GoalSummary {
    GoalSummary {
        name: goal.name.clone(),
        latest_score_pct: latest_score_pct(goal),
        assessments: goal.assessments.len(),
        contributions: metric_contributions(goal),
    }
}

pub fn latest_score_pct(goal: &GoalResult) -> Option<f64> {
    goal.assessments.last().map(|a| a.global_score * 100.0)
}

/// Average contribution of every metric across all assessments.
///
/// Assessment details reference metrics by acronym or by name. Metrics never
/// mentioned in any detail contribute 0. Goals without assessments yield an
/// empty list.
pub fn metric_contributions(goal: &GoalResult) -> Vec<(String, f64)> {
    if goal.assessments.is_empty() {
        return Vec::new();
    }
    goal.metrics
        .iter()
        .map(|metric| {
            let values: Vec<f64> = goal
                .assessments
                .iter()
                .flat_map(|a| a.details.iter())
                .filter(|d| d.metric == metric.acronym || d.metric == metric.name)
                .map(|d| d.value)
                .collect();
            let avg = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            (metric.label().to_string(), avg * 100.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{GoalAssessment, MetricAssessment, MetricResult};

    fn detail(metric: &str, value: f64) -> MetricAssessment {
        MetricAssessment {
            metric: metric.to_string(),
            value,
            weight: 1.0,
            timestamp: String::new(),
        }
    }

    fn sample_goal() -> GoalResult {
        GoalResult {
            name: "Performance".to_string(),
            metrics: vec![
                MetricResult {
                    name: "Load Time".to_string(),
                    acronym: "LT".to_string(),
                    ..MetricResult::default()
                },
                MetricResult {
                    name: "Errors".to_string(),
                    ..MetricResult::default()
                },
                MetricResult {
                    name: "Unused".to_string(),
                    acronym: "UN".to_string(),
                    ..MetricResult::default()
                },
            ],
            assessments: vec![
                GoalAssessment {
                    timestamp: "t0".to_string(),
                    global_score: 0.5,
                    details: vec![detail("LT", 0.2), detail("Errors", 0.1)],
                },
                GoalAssessment {
                    timestamp: "t1".to_string(),
                    global_score: 0.75,
                    details: vec![detail("LT", 0.4)],
                },
            ],
            ..GoalResult::default()
        }
    }

    #[test]
    fn summary_reports_latest_score_and_average_contributions() {
        let summary = summarize(&sample_goal());
        assert_eq!(summary.latest_score_pct, Some(75.0));
        assert_eq!(summary.assessments, 2);
        let labels: Vec<_> = summary.contributions.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["LT", "Errors", "UN"]);
        assert!((summary.contributions[0].1 - 30.0).abs() < 1e-9);
        assert!((summary.contributions[1].1 - 10.0).abs() < 1e-9);
        assert_eq!(summary.contributions[2].1, 0.0);
    }

    #[test]
    fn unassessed_goal_has_no_score_or_contributions() {
        let goal = GoalResult {
            assessments: Vec::new(),
            ..sample_goal()
        };
        assert_eq!(latest_score_pct(&goal), None);
        assert!(metric_contributions(&goal).is_empty());
    }
}
