//! Parent/child graph over branch names.
//!
//! The lineage is stored as a child → parent map. It is acyclic at all times:
//! every mutation goes through [`Lineage::set_parent`], which refuses edges
//! that would make a branch its own ancestor, and deserialization replays the
//! stored edges through the same check.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected lineage mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineageError {
    #[error("branch name must not be empty")]
    EmptyName,
    #[error("branch '{0}' cannot be its own parent")]
    SelfParent(String),
    #[error("cannot make '{parent}' the parent of '{branch}': '{branch}' is an ancestor of '{parent}'")]
    Cycle { branch: String, parent: String },
}

/// Child → parent edges for all branches with a known parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct Lineage {
    parents: BTreeMap<String, String>,
}

impl TryFrom<BTreeMap<String, String>> for Lineage {
    type Error = LineageError;

    fn try_from(entries: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mut lineage = Lineage::default();
        for (branch, parent) in entries {
            lineage.set_parent(&branch, &parent)?;
        }
        Ok(lineage)
    }
}

impl From<Lineage> for BTreeMap<String, String> {
    fn from(lineage: Lineage) -> Self {
        lineage.parents
    }
}

impl Lineage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Number of parent edges.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Parent of `branch`, if it has one.
    pub fn parent(&self, branch: &str) -> Option<&str> {
        self.parents.get(branch).map(String::as_str)
    }

    /// True if `branch` has a recorded parent.
    pub fn has_parent(&self, branch: &str) -> bool {
        self.parents.contains_key(branch)
    }

    /// True if `branch` appears in the lineage as a child or as a parent.
    pub fn contains(&self, branch: &str) -> bool {
        self.has_parent(branch) || self.parents.values().any(|parent| parent == branch)
    }

    /// Record `parent` as the parent of `branch`, replacing any previous edge.
    pub fn set_parent(&mut self, branch: &str, parent: &str) -> Result<(), LineageError> {
        if branch.trim().is_empty() || parent.trim().is_empty() {
            return Err(LineageError::EmptyName);
        }
        if branch == parent {
            return Err(LineageError::SelfParent(branch.to_string()));
        }
        if self.ancestors(parent).iter().any(|ancestor| ancestor == branch) {
            return Err(LineageError::Cycle {
                branch: branch.to_string(),
                parent: parent.to_string(),
            });
        }
        self.parents.insert(branch.to_string(), parent.to_string());
        Ok(())
    }

    /// Remove the parent edge of `branch`, returning the old parent.
    pub fn remove(&mut self, branch: &str) -> Option<String> {
        self.parents.remove(branch)
    }

    /// Ancestors of `branch`, root first, excluding `branch` itself.
    pub fn ancestors(&self, branch: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::from([branch]);
        let mut current = branch;
        while let Some(parent) = self.parent(current) {
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent.to_string());
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// The topmost ancestor of `branch` (the branch itself if it has no parent).
    pub fn root<'a>(&'a self, branch: &'a str) -> &'a str {
        let mut current = branch;
        let mut seen = BTreeSet::from([branch]);
        while let Some(parent) = self.parent(current) {
            if !seen.insert(parent) {
                break;
            }
            current = parent;
        }
        current
    }

    /// Direct children of `branch`, alphabetically.
    pub fn children(&self, branch: &str) -> Vec<String> {
        self.parents
            .iter()
            .filter(|(_, parent)| parent.as_str() == branch)
            .map(|(child, _)| child.clone())
            .collect()
    }

    /// All descendants of `branch`, depth-first so that every branch comes
    /// after its parent. Siblings are visited alphabetically.
    pub fn descendants(&self, branch: &str) -> Vec<String> {
        let mut result = Vec::new();
        self.collect_descendants(branch, &mut result);
        result
    }

    fn collect_descendants(&self, branch: &str, result: &mut Vec<String>) {
        for child in self.children(branch) {
            result.push(child.clone());
            self.collect_descendants(&child, result);
        }
    }

    /// The full stack `branch` belongs to: its ancestors, the branch itself,
    /// and its descendants, root to leaf.
    pub fn stack(&self, branch: &str) -> Vec<String> {
        let mut stack = self.ancestors(branch);
        stack.push(branch.to_string());
        stack.extend(self.descendants(branch));
        stack
    }

    /// Branches that are parents but have no parent themselves, alphabetically.
    pub fn roots(&self) -> Vec<String> {
        let roots: BTreeSet<&String> = self
            .parents
            .values()
            .filter(|parent| !self.has_parent(parent))
            .collect();
        roots.into_iter().cloned().collect()
    }

    /// Every branch in the lineage, each root followed by its descendants.
    pub fn ordered_branches(&self) -> Vec<String> {
        let mut ordered = Vec::new();
        for root in self.roots() {
            ordered.push(root.clone());
            ordered.extend(self.descendants(&root));
        }
        ordered
    }

    /// Point every child of `branch` at `new_parent`. Returns the moved children.
    pub fn reparent_children(
        &mut self,
        branch: &str,
        new_parent: &str,
    ) -> Result<Vec<String>, LineageError> {
        let children = self.children(branch);
        for child in &children {
            self.set_parent(child, new_parent)?;
        }
        Ok(children)
    }

    /// Iterate over `(branch, parent)` edges in branch order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parents
            .iter()
            .map(|(branch, parent)| (branch.as_str(), parent.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stack_lineage() -> Lineage {
        let mut lineage = Lineage::new();
        lineage.set_parent("team", "main").expect("team");
        lineage.set_parent("feature-x", "team").expect("feature-x");
        lineage.set_parent("feature-y", "feature-x").expect("feature-y");
        lineage.set_parent("hotfix", "main").expect("hotfix");
        lineage
    }

    #[test]
    fn ancestors_are_root_first() {
        let lineage = stack_lineage();
        assert_eq!(
            lineage.ancestors("feature-y"),
            vec!["main", "team", "feature-x"]
        );
        assert!(lineage.ancestors("main").is_empty());
        assert_eq!(lineage.root("feature-y"), "main");
    }

    #[test]
    fn stack_orders_root_to_leaf() {
        let lineage = stack_lineage();
        assert_eq!(
            lineage.stack("feature-y"),
            vec!["main", "team", "feature-x", "feature-y"]
        );
        assert_eq!(
            lineage.stack("team"),
            vec!["main", "team", "feature-x", "feature-y"]
        );
    }

    #[test]
    fn ordered_branches_lists_descendants_after_parents() {
        let lineage = stack_lineage();
        assert_eq!(
            lineage.ordered_branches(),
            vec!["main", "hotfix", "team", "feature-x", "feature-y"]
        );
    }

    #[test]
    fn set_parent_rejects_cycles() {
        let mut lineage = stack_lineage();
        let err = lineage.set_parent("team", "feature-y").expect_err("cycle");
        assert_eq!(
            err,
            LineageError::Cycle {
                branch: "team".to_string(),
                parent: "feature-y".to_string(),
            }
        );
        assert_eq!(lineage.parent("team"), Some("main"));
    }

    #[test]
    fn set_parent_rejects_self_parent() {
        let mut lineage = Lineage::new();
        let err = lineage.set_parent("a", "a").expect_err("self parent");
        assert_eq!(err, LineageError::SelfParent("a".to_string()));
    }

    #[test]
    fn reparent_children_moves_direct_children_only() {
        let mut lineage = stack_lineage();
        let moved = lineage.reparent_children("team", "main").expect("reparent");
        assert_eq!(moved, vec!["feature-x"]);
        assert_eq!(lineage.parent("feature-x"), Some("main"));
        assert_eq!(lineage.parent("feature-y"), Some("feature-x"));
    }

    #[test]
    fn deserialization_rejects_cyclic_edges() {
        let raw = r#"{"a": "b", "b": "a"}"#;
        let err = serde_json::from_str::<Lineage>(raw).expect_err("cycle");
        assert!(err.to_string().contains("ancestor"));
    }

    #[test]
    fn serializes_as_plain_map() {
        let lineage = stack_lineage();
        let json = serde_json::to_string(&lineage).expect("serialize");
        let back: Lineage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, lineage);
        assert!(json.contains("\"feature-x\":\"team\""));
    }

    proptest! {
        /// Random edge insertions never produce a cycle, and every ancestor chain
        /// is finite with no repeated branch.
        #[test]
        fn ancestor_chains_never_repeat(
            edges in proptest::collection::vec((0u8..12, 0u8..12), 0..40),
        ) {
            let mut lineage = Lineage::new();
            for (child, parent) in edges {
                let _ = lineage.set_parent(&format!("b{child}"), &format!("b{parent}"));
            }
            for index in 0u8..12 {
                let branch = format!("b{index}");
                let chain = lineage.ancestors(&branch);
                let unique: BTreeSet<&String> = chain.iter().collect();
                prop_assert_eq!(unique.len(), chain.len());
                prop_assert!(!chain.contains(&branch));
                prop_assert!(chain.len() <= lineage.len());
                prop_assert_eq!(lineage.ancestors(&branch), chain);
            }
        }
    }
}
