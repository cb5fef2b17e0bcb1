//! Hierarchical goal selection over a fetched quality model.
//!
//! Nodes live in an arena addressed by [`GoalId`]; each node records its
//! parent index and an ordered child-index list. The shape is fixed once the
//! tree is built; only the `selected` and `expanded` flags change afterwards.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AssessError;

/// Maximum nesting accepted when building a tree.
pub const MAX_GOAL_DEPTH: usize = 64;

/// Quality model document: `{ "goals": [...] }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityModel {
    #[serde(default)]
    pub goals: Vec<GoalDefinition>,
}

/// One goal of the quality model definition, possibly with nested sub-goals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default, alias = "children")]
    pub sub_goals: Vec<GoalDefinition>,
}

impl GoalDefinition {
    pub fn new(name: &str, sub_goals: Vec<GoalDefinition>) -> Self {
        Self {
            name: Some(name.to_string()),
            description: String::new(),
            weight: 0.0,
            sub_goals,
        }
    }
}

/// Stable index of a node inside one [`GoalTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GoalId(usize);

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalNode {
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub parent: Option<GoalId>,
    pub children: Vec<GoalId>,
    pub selected: bool,
    pub expanded: bool,
}

/// Forest of goals with cascading selection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoalTree {
    nodes: Vec<GoalNode>,
    roots: Vec<GoalId>,
    selected: Vec<String>,
}

impl GoalTree {
    /// Build a forest from a quality model definition. All flags start cleared.
    pub fn build(model: &QualityModel) -> Result<Self, AssessError> {
        let mut tree = GoalTree::default();
        for definition in &model.goals {
            let id = tree.insert(definition, None, 0)?;
            tree.roots.push(id);
        }
        Ok(tree)
    }

    fn insert(
        &mut self,
        definition: &GoalDefinition,
        parent: Option<GoalId>,
        depth: usize,
    ) -> Result<GoalId, AssessError> {
        if depth >= MAX_GOAL_DEPTH {
            return Err(AssessError::MalformedModel(format!(
                "goal nesting exceeds {} levels",
                MAX_GOAL_DEPTH
            )));
        }
        let location = || match parent {
            Some(parent) => format!("under '{}'", self.path_of(parent).unwrap_or_default()),
            None => "at top level".to_string(),
        };
        // Stored verbatim; result snapshots are keyed by the server's spelling.
        let name = match definition.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => {
                return Err(AssessError::MalformedModel(format!(
                    "goal {} has no name",
                    location()
                )));
            }
        };
        if name.contains('/') {
            return Err(AssessError::MalformedModel(format!(
                "goal '{}' {} contains '/'",
                name,
                location()
            )));
        }

        let id = GoalId(self.nodes.len());
        self.nodes.push(GoalNode {
            name,
            description: definition.description.clone(),
            weight: definition.weight,
            parent,
            children: Vec::new(),
            selected: false,
            expanded: false,
        });
        for child in &definition.sub_goals {
            let child_id = self.insert(child, Some(id), depth + 1)?;
            self.nodes[id.0].children.push(child_id);
        }
        Ok(id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> &[GoalId] {
        &self.roots
    }

    pub fn node(&self, id: GoalId) -> Option<&GoalNode> {
        self.nodes.get(id.0)
    }

    /// Flip `selected` on `id` and cascade the new value to every descendant.
    ///
    /// Ancestors and siblings are left alone, so partial selection of a
    /// subtree is representable. Returns the node's new flag.
    pub fn toggle_selection(&mut self, id: GoalId) -> Result<bool, AssessError> {
        let node = self.nodes.get_mut(id.0).ok_or(AssessError::UnknownGoal(id))?;
        let value = !node.selected;
        node.selected = value;

        let mut stack = node.children.clone();
        while let Some(child) = stack.pop() {
            let child = &mut self.nodes[child.0];
            child.selected = value;
            stack.extend_from_slice(&child.children);
        }

        self.selected = self.collect_selected();
        Ok(value)
    }

    /// Flip `expanded` on `id`. Presentation only: nothing cascades.
    pub fn toggle_expand(&mut self, id: GoalId) -> Result<bool, AssessError> {
        let node = self.nodes.get_mut(id.0).ok_or(AssessError::UnknownGoal(id))?;
        node.expanded = !node.expanded;
        Ok(node.expanded)
    }

    /// Names of all selected nodes in pre-order, left-to-right, without duplicates.
    pub fn selected_names(&self) -> &[String] {
        &self.selected
    }

    fn collect_selected(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.flatten()
            .into_iter()
            .map(|id| &self.nodes[id.0])
            .filter(|node| node.selected && seen.insert(node.name.as_str()))
            .map(|node| node.name.clone())
            .collect()
    }

    /// Every node id in pre-order, left-to-right.
    pub fn flatten(&self) -> Vec<GoalId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<GoalId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    /// Nodes a tree view shows: roots plus children of expanded nodes, with depth.
    pub fn visible(&self) -> Vec<(GoalId, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(GoalId, usize)> = self.roots.iter().rev().map(|id| (*id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            out.push((id, depth));
            let node = &self.nodes[id.0];
            if node.expanded {
                stack.extend(node.children.iter().rev().map(|child| (*child, depth + 1)));
            }
        }
        out
    }

    /// `/`-separated name path from a root to `id`.
    pub fn path_of(&self, id: GoalId) -> Option<String> {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.nodes.get(current.0)?;
            names.push(node.name.as_str());
            cursor = node.parent;
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Resolve a `/`-separated name path such as `Performance/LoadTime`.
    ///
    /// Segments match names exactly first, then ignoring surrounding whitespace.
    pub fn find_path(&self, path: &str) -> Option<GoalId> {
        let mut candidates = self.roots.as_slice();
        let mut found = None;
        for segment in path.split('/').filter(|s| !s.trim().is_empty()) {
            let name_of = |id: &GoalId| self.nodes[id.0].name.as_str();
            let id = candidates
                .iter()
                .copied()
                .find(|id| name_of(id) == segment)
                .or_else(|| {
                    candidates
                        .iter()
                        .copied()
                        .find(|id| name_of(id).trim() == segment.trim())
                })?;
            candidates = &self.nodes[id.0].children;
            found = Some(id);
        }
        found
    }
}
