//! Whole-subtree reconciliation of results snapshots into per-goal state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::types::{AssessmentSnapshot, GoalResult};
use crate::error::AssessError;

/// Latest known result per goal name.
pub type ResultMap = BTreeMap<String, GoalResult>;

/// Outcome of folding one snapshot into the current map.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub results: Arc<ResultMap>,
    /// Goal names replaced by the snapshot, in snapshot order.
    pub updated: Vec<String>,
}

/// Replace every goal present in `snapshot` wholesale; keep the rest untouched.
///
/// The returned map is always a fresh allocation when anything was replaced,
/// so observers can detect change with [`Arc::ptr_eq`]. A snapshot carrying no
/// goals returns the current map as-is. A snapshot with any unnamed entry is
/// rejected whole and `current` is not touched.
pub fn reconcile(
    current: &Arc<ResultMap>,
    snapshot: &AssessmentSnapshot,
) -> Result<Reconciled, AssessError> {
    if let Some(index) = snapshot
        .selected_goals
        .iter()
        .position(|goal| goal.name.trim().is_empty())
    {
        return Err(AssessError::MalformedSnapshot(format!(
            "goal entry {} has no name",
            index
        )));
    }

    if snapshot.selected_goals.is_empty() {
        return Ok(Reconciled {
            results: Arc::clone(current),
            updated: Vec::new(),
        });
    }

    let mut next = ResultMap::clone(current);
    let mut updated = Vec::with_capacity(snapshot.selected_goals.len());
    for goal in &snapshot.selected_goals {
        next.insert(goal.name.clone(), goal.clone());
        if !updated.contains(&goal.name) {
            updated.push(goal.name.clone());
        }
    }

    Ok(Reconciled {
        results: Arc::new(next),
        updated,
    })
}
