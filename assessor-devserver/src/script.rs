//! Scripted payloads served on the progress and results streams.
//!
//! Everything here is deterministic in the session request and the round
//! number, so a client sees the same session every time.

use serde_json::json;

use assessor::core::types::{
    AssessmentSnapshot, COMPLETION_SENTINEL, GoalAssessment, GoalResult, MetricAssessment,
    MetricResult, MetricSample, ProgressEvent, StartRequest,
};

/// Number of results snapshots streamed per session.
pub const RESULT_ROUNDS: usize = 4;

/// Progress messages for one session, ending with the completion sentinel.
pub fn progress_script(request: &StartRequest) -> Vec<ProgressEvent> {
    let metadata = &request.metadata;
    let mut lines = vec![
        format!("Fetching sources from {}", metadata.path),
        format!(
            "Instrumenting {} application {}",
            metadata.technology, metadata.name
        ),
    ];
    lines.extend(
        request
            .selected_goals
            .iter()
            .map(|goal| format!("Attaching monitors to {}", goal)),
    );
    lines.push(format!("Deploying instrumented build to {}", metadata.url));
    lines.push(format!("{}: {}", metadata.name, COMPLETION_SENTINEL));
    lines.into_iter().map(ProgressEvent::progress).collect()
}

fn timestamp(round: usize) -> String {
    format!("2026-01-01T00:{:02}:{:02}Z", (round / 60) % 60, round % 60)
}

fn score(goal_index: usize, round: usize) -> f64 {
    (0.5 + 0.1 * round as f64 + 0.05 * goal_index as f64).min(1.0)
}

fn goal_at(goal_index: usize, name: &str, round: usize) -> GoalResult {
    let history = |scale: f64| {
        (0..=round)
            .map(|r| MetricSample {
                timestamp: timestamp(r),
                value: json!(score(goal_index, r) * scale),
            })
            .collect::<Vec<_>>()
    };
    let metrics = vec![
        MetricResult {
            name: "Response time".to_string(),
            acronym: "RT".to_string(),
            description: format!("Median response time observed for {}", name),
            value: json!(score(goal_index, round) * 800.0),
            unit: "ms".to_string(),
            history: history(800.0),
        },
        MetricResult {
            name: "Error rate".to_string(),
            acronym: "ER".to_string(),
            description: format!("Share of failed interactions for {}", name),
            value: json!((1.0 - score(goal_index, round)) * 10.0),
            unit: "%".to_string(),
            history: history(10.0),
        },
    ];
    let assessments = (0..=round)
        .map(|r| {
            let global = score(goal_index, r);
            GoalAssessment {
                timestamp: timestamp(r),
                global_score: global,
                details: vec![
                    MetricAssessment {
                        metric: "RT".to_string(),
                        value: global * 0.6,
                        weight: 0.6,
                        timestamp: timestamp(r),
                    },
                    MetricAssessment {
                        metric: "ER".to_string(),
                        value: global * 0.4,
                        weight: 0.4,
                        timestamp: timestamp(r),
                    },
                ],
            }
        })
        .collect();

    GoalResult {
        name: name.to_string(),
        description: format!("Scripted results for {}", name),
        weight: 1.0,
        metrics,
        assessments,
    }
}

/// Full results snapshot after `round` scoring passes (0-based).
pub fn snapshot_at(request: &StartRequest, round: usize) -> AssessmentSnapshot {
    AssessmentSnapshot {
        metadata: Some(request.metadata.clone()),
        selected_goals: request
            .selected_goals
            .iter()
            .enumerate()
            .map(|(index, name)| goal_at(index, name, round))
            .collect(),
    }
}
