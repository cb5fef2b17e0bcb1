//! Wire and state types shared between the orchestrator and its channels.
//!
//! Field names follow the backend's JSON contract (camelCase, underscored
//! metadata keys). Result payloads are decoded leniently: absent fields take
//! their defaults so that a single missing optional field never costs a whole
//! snapshot. Structural checks live in [`crate::core::reconcile`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Substring of a progress message that marks instrumentation completion.
pub const COMPLETION_SENTINEL: &str = "injection completed";

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Running,
    Stopped,
    Completed,
    Failed,
}

impl Phase {
    /// True while a session owns (or is acquiring) a session id.
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Starting | Phase::Running)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Stopped => "stopped",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Logical name of a push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Progress,
    Results,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Progress => f.write_str("progress"),
            ChannelKind::Results => f.write_str("results"),
        }
    }
}

/// Description of the application under assessment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(rename = "_name", default)]
    pub name: String,
    #[serde(rename = "_type", default)]
    pub app_type: String,
    #[serde(rename = "_technology", default)]
    pub technology: String,
    #[serde(rename = "_path", default)]
    pub path: String,
    #[serde(rename = "_url", default)]
    pub url: String,
}

impl AppMetadata {
    /// Names of required fields that are empty (after trimming).
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("type", &self.app_type),
            ("technology", &self.technology),
            ("path", &self.path),
            ("url", &self.url),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }
}

/// Body of the start call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub metadata: AppMetadata,
    pub selected_goals: Vec<String>,
}

/// Successful answer to the start call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub assessment_id: String,
    #[serde(default)]
    pub progress_endpoint: String,
    #[serde(default)]
    pub assessment_endpoint: String,
}

/// Discriminator of progress channel messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Progress,
    #[serde(other)]
    Other,
}

/// One message on the progress channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn progress(message: impl Into<String>) -> Self {
        Self {
            kind: ProgressKind::Progress,
            message: Some(message.into()),
        }
    }
}

/// Full-state payload delivered on the results channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSnapshot {
    #[serde(default)]
    pub metadata: Option<AppMetadata>,
    #[serde(default)]
    pub selected_goals: Vec<GoalResult>,
}

/// Latest known assessment state of one goal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalResult {
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub metrics: Vec<MetricResult>,
    pub assessments: Vec<GoalAssessment>,
}

/// Current value and history of one metric feeding a goal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricResult {
    pub name: String,
    pub acronym: String,
    pub description: String,
    pub value: Value,
    pub unit: String,
    pub history: Vec<MetricSample>,
}

impl MetricResult {
    /// Acronym when present, otherwise the full name.
    pub fn label(&self) -> &str {
        if self.acronym.is_empty() {
            &self.name
        } else {
            &self.acronym
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSample {
    pub timestamp: String,
    pub value: Value,
}

/// One scoring pass over a goal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoalAssessment {
    pub timestamp: String,
    pub global_score: f64,
    pub details: Vec<MetricAssessment>,
}

/// Contribution of one metric to a goal assessment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricAssessment {
    pub metric: String,
    pub value: f64,
    pub weight: f64,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_uses_underscored_keys() {
        let metadata = AppMetadata {
            name: "App".to_string(),
            app_type: "Web".to_string(),
            technology: "X".to_string(),
            path: "/p".to_string(),
            url: "http://x".to_string(),
        };
        let json = serde_json::to_value(&metadata).expect("serialize");
        assert_eq!(json["_name"], "App");
        assert_eq!(json["_type"], "Web");
        assert_eq!(json["_url"], "http://x");
        assert!(metadata.missing_fields().is_empty());
    }

    #[test]
    fn missing_fields_lists_blank_entries() {
        let metadata = AppMetadata {
            name: "App".to_string(),
            path: "  ".to_string(),
            ..AppMetadata::default()
        };
        assert_eq!(
            metadata.missing_fields(),
            vec!["type", "technology", "path", "url"]
        );
    }

    #[test]
    fn progress_event_tolerates_unknown_type_and_missing_message() {
        let event: ProgressEvent =
            serde_json::from_str(r#"{"type":"heartbeat"}"#).expect("decode");
        assert_eq!(event.kind, ProgressKind::Other);
        assert_eq!(event.message, None);

        let event: ProgressEvent =
            serde_json::from_str(r#"{"type":"progress","message":"injection completed"}"#)
                .expect("decode");
        assert_eq!(event, ProgressEvent::progress(COMPLETION_SENTINEL));
    }

    #[test]
    fn start_response_reads_camel_case_fields() {
        let response: StartResponse = serde_json::from_str(
            r#"{"assessmentId":"abc","progressEndpoint":"/api/progress/abc","assessmentEndpoint":"/api/assessments/abc"}"#,
        )
        .expect("decode");
        assert_eq!(response.assessment_id, "abc");
        assert_eq!(response.progress_endpoint, "/api/progress/abc");
    }

    #[test]
    fn snapshot_decodes_nested_results() {
        let snapshot: AssessmentSnapshot = serde_json::from_str(
            r#"{
                "metadata": {"_name":"App","_type":"Web","_technology":"X","_path":"/p","_url":"http://x"},
                "selectedGoals": [{
                    "name": "Performance",
                    "description": "Speed",
                    "weight": 0.5,
                    "metrics": [{"name":"Load Time","acronym":"LT","description":"","value":1.2,"unit":"s",
                                 "history":[{"timestamp":"t0","value":1.4}]}],
                    "assessments": [{"timestamp":"t0","globalScore":0.8,
                                     "details":[{"metric":"LT","value":0.8,"weight":1.0,"timestamp":"t0"}]}]
                }]
            }"#,
        )
        .expect("decode");
        let goal = &snapshot.selected_goals[0];
        assert_eq!(goal.name, "Performance");
        assert_eq!(goal.metrics[0].label(), "LT");
        assert_eq!(goal.metrics[0].history.len(), 1);
        assert_eq!(goal.assessments[0].global_score, 0.8);
    }
}
