//! Quality model payload validation (schema) and goal tree construction.

use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::core::goal_tree::{GoalTree, QualityModel};
use crate::error::AssessError;

/// JSON Schema for the quality model document served by the backend.
pub const QUALITY_MODEL_SCHEMA: &str =
    include_str!("../../../schemas/quality_model/v1.schema.json");

/// Validate a quality model document against the schema and deserialize it.
pub fn parse_quality_model(value: &Value) -> Result<QualityModel, AssessError> {
    let schema: Value = serde_json::from_str(QUALITY_MODEL_SCHEMA)
        .map_err(|err| AssessError::MalformedModel(format!("invalid schema: {}", err)))?;
    let validator = validator_for(&schema)
        .map_err(|err| AssessError::MalformedModel(format!("invalid schema: {}", err)))?;
    if !validator.is_valid(value) {
        let messages = validator
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(AssessError::MalformedModel(format!(
            "schema validation failed: {}",
            messages.join("; ")
        )));
    }
    serde_json::from_value(value.clone())
        .map_err(|err| AssessError::MalformedModel(format!("deserialize: {}", err)))
}

/// Validate a quality model document and build a fresh goal tree from it.
pub fn build_goal_tree(value: &Value) -> Result<GoalTree, AssessError> {
    let model = parse_quality_model(value)?;
    let tree = GoalTree::build(&model)?;
    debug!(goals = tree.len(), roots = tree.roots().len(), "goal tree built");
    Ok(tree)
}
