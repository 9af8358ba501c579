//! Branch roles and the operation gates derived from them.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Role of a branch, derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchType {
    Main,
    Perennial,
    Feature,
    Parked,
    Observed,
    Contribution,
}

impl BranchType {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchType::Main => "main",
            BranchType::Perennial => "perennial",
            BranchType::Feature => "feature",
            BranchType::Parked => "parked",
            BranchType::Observed => "observed",
            BranchType::Contribution => "contribution",
        }
    }

    /// Main and perennial branches are long-lived and never rewritten.
    pub fn is_perennial(self) -> bool {
        matches!(self, BranchType::Main | BranchType::Perennial)
    }

    /// Branches owned by the local developer: they may be rewritten and shipped.
    pub fn is_owned(self) -> bool {
        matches!(self, BranchType::Feature | BranchType::Parked)
    }
}

impl fmt::Display for BranchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BranchType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "main" => Ok(BranchType::Main),
            "perennial" => Ok(BranchType::Perennial),
            "feature" => Ok(BranchType::Feature),
            "parked" => Ok(BranchType::Parked),
            "observed" => Ok(BranchType::Observed),
            "contribution" => Ok(BranchType::Contribution),
            other => Err(format!("unknown branch type '{other}'")),
        }
    }
}

/// Role assignments as stored in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchRoles {
    pub main: String,
    pub perennial: Vec<String>,
    pub perennial_regex: Option<String>,
    pub observed: Vec<String>,
    pub contribution: Vec<String>,
    pub parked: Vec<String>,
}

impl Default for BranchRoles {
    fn default() -> Self {
        Self {
            main: "main".to_string(),
            perennial: Vec::new(),
            perennial_regex: None,
            observed: Vec::new(),
            contribution: Vec::new(),
            parked: Vec::new(),
        }
    }
}

impl BranchRoles {
    /// Classify `branch`. Explicit assignments win over the perennial regex;
    /// everything unassigned is a feature branch.
    pub fn branch_type(&self, branch: &str) -> BranchType {
        let listed = |list: &[String]| list.iter().any(|entry| entry == branch);
        if branch == self.main {
            BranchType::Main
        } else if listed(&self.perennial) {
            BranchType::Perennial
        } else if listed(&self.observed) {
            BranchType::Observed
        } else if listed(&self.contribution) {
            BranchType::Contribution
        } else if listed(&self.parked) {
            BranchType::Parked
        } else if self.matches_perennial_regex(branch) {
            BranchType::Perennial
        } else {
            BranchType::Feature
        }
    }

    fn matches_perennial_regex(&self, branch: &str) -> bool {
        self.perennial_regex
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .and_then(|pattern| Regex::new(pattern).ok())
            .is_some_and(|regex| regex.is_match(branch))
    }

    /// Assign `role` to `branch`, removing it from every other role list.
    /// Assigning `Feature` just clears the explicit assignment.
    pub fn set_role(&mut self, branch: &str, role: BranchType) -> Result<(), ValidationError> {
        if branch == self.main {
            return Err(ValidationError::Perennial {
                branch: branch.to_string(),
                operation: format!("mark as {role}"),
            });
        }
        for list in [
            &mut self.perennial,
            &mut self.observed,
            &mut self.contribution,
            &mut self.parked,
        ] {
            list.retain(|entry| entry != branch);
        }
        let target = match role {
            BranchType::Main => {
                return Err(ValidationError::Perennial {
                    branch: branch.to_string(),
                    operation: "mark as main".to_string(),
                });
            }
            BranchType::Feature => return Ok(()),
            BranchType::Perennial => &mut self.perennial,
            BranchType::Observed => &mut self.observed,
            BranchType::Contribution => &mut self.contribution,
            BranchType::Parked => &mut self.parked,
        };
        target.push(branch.to_string());
        target.sort();
        Ok(())
    }

    /// Drop `branch` from every role list, e.g. after it was deleted.
    pub fn forget(&mut self, branch: &str) {
        for list in [
            &mut self.perennial,
            &mut self.observed,
            &mut self.contribution,
            &mut self.parked,
        ] {
            list.retain(|entry| entry != branch);
        }
    }

    /// Gate for operations that rewrite history of the branch (compress, ship, kill).
    pub fn ensure_owned(&self, branch: &str, operation: &str) -> Result<BranchType, ValidationError> {
        let branch_type = self.branch_type(branch);
        match branch_type {
            BranchType::Main | BranchType::Perennial => Err(ValidationError::Perennial {
                branch: branch.to_string(),
                operation: operation.to_string(),
            }),
            BranchType::Observed | BranchType::Contribution => {
                Err(ValidationError::RoleNotAllowed {
                    branch: branch.to_string(),
                    role: branch_type,
                    operation: operation.to_string(),
                })
            }
            BranchType::Feature | BranchType::Parked => Ok(branch_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> BranchRoles {
        BranchRoles {
            main: "main".to_string(),
            perennial: vec!["develop".to_string()],
            perennial_regex: Some("^release-".to_string()),
            observed: vec!["their-work".to_string()],
            contribution: vec!["shared".to_string()],
            parked: vec!["someday".to_string()],
        }
    }

    #[test]
    fn classifies_configured_roles() {
        let roles = roles();
        assert_eq!(roles.branch_type("main"), BranchType::Main);
        assert_eq!(roles.branch_type("develop"), BranchType::Perennial);
        assert_eq!(roles.branch_type("release-1.2"), BranchType::Perennial);
        assert_eq!(roles.branch_type("their-work"), BranchType::Observed);
        assert_eq!(roles.branch_type("shared"), BranchType::Contribution);
        assert_eq!(roles.branch_type("someday"), BranchType::Parked);
        assert_eq!(roles.branch_type("feature-x"), BranchType::Feature);
    }

    #[test]
    fn ensure_owned_gates_by_role() {
        let roles = roles();
        let err = roles.ensure_owned("develop", "compress").expect_err("perennial");
        assert!(err.to_string().contains("perennial"));

        let err = roles.ensure_owned("shared", "compress").expect_err("contribution");
        let message = err.to_string();
        assert!(message.contains("shared"));
        assert!(message.contains("contribution"));

        assert_eq!(
            roles.ensure_owned("someday", "compress").expect("parked"),
            BranchType::Parked
        );
        assert_eq!(
            roles.ensure_owned("feature-x", "compress").expect("feature"),
            BranchType::Feature
        );
    }

    #[test]
    fn set_role_moves_branch_between_lists() {
        let mut roles = roles();
        roles
            .set_role("someday", BranchType::Observed)
            .expect("observe");
        assert!(roles.parked.is_empty());
        assert_eq!(roles.branch_type("someday"), BranchType::Observed);

        roles.set_role("someday", BranchType::Feature).expect("feature");
        assert_eq!(roles.branch_type("someday"), BranchType::Feature);
    }

    #[test]
    fn set_role_refuses_main() {
        let mut roles = roles();
        assert!(roles.set_role("main", BranchType::Parked).is_err());
    }

    #[test]
    fn parses_role_names() {
        assert_eq!("parked".parse::<BranchType>(), Ok(BranchType::Parked));
        assert!("bogus".parse::<BranchType>().is_err());
    }
}
