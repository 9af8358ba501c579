//! Repository configuration stored under `<git-common-dir>/branchwise/config.toml`.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::branch_type::BranchRoles;
use crate::core::lineage::Lineage;
use crate::hosting::HostingPlatform;

/// Branchwise configuration (TOML).
///
/// Edited by humans and by branchwise itself (lineage and role changes).
/// Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Skip every network operation (fetch, push, hosting API calls).
    pub offline: bool,

    /// Create tracking branches for new local branches during sync.
    pub push_new_branches: bool,

    /// How feature branches pick up changes from their parent during sync.
    pub sync_feature_strategy: SyncStrategy,

    pub branches: BranchRoles,

    /// Child → parent edges.
    pub lineage: Lineage,

    pub hosting: HostingConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    #[default]
    Merge,
    Rebase,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostingConfig {
    /// Overrides platform detection from the `origin` URL.
    pub platform: Option<HostingPlatform>,
    /// Overrides the host parsed from the `origin` URL (SSH aliases).
    pub origin_hostname: Option<String>,
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
    pub gitea_token: Option<String>,
}

impl HostingConfig {
    /// API token for `platform`: the configured value, else the platform's
    /// environment variable.
    pub fn token(&self, platform: HostingPlatform) -> Option<String> {
        let (configured, env_var) = match platform {
            HostingPlatform::GitHub => (&self.github_token, "GITHUB_TOKEN"),
            HostingPlatform::GitLab => (&self.gitlab_token, "GITLAB_TOKEN"),
            HostingPlatform::Gitea => (&self.gitea_token, "GITEA_TOKEN"),
            HostingPlatform::Bitbucket => return None,
        };
        configured
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|token| !token.trim().is_empty())
    }
}

/// The parts of the configuration a run may change and undo restores.
/// Tokens are excluded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub branches: BranchRoles,
    pub lineage: Lineage,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            offline: false,
            push_new_branches: false,
            sync_feature_strategy: SyncStrategy::Merge,
            branches: BranchRoles::default(),
            lineage: Lineage::default(),
            hosting: HostingConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let roles = &self.branches;
        if roles.main.trim().is_empty() {
            return Err(anyhow!("branches.main must not be empty"));
        }
        if let Some(pattern) = roles.perennial_regex.as_deref()
            && !pattern.is_empty()
        {
            Regex::new(pattern)
                .with_context(|| format!("branches.perennial_regex is invalid: {pattern}"))?;
        }
        let mut seen = BTreeSet::from([roles.main.as_str()]);
        for (list_name, list) in [
            ("perennial", &roles.perennial),
            ("observed", &roles.observed),
            ("contribution", &roles.contribution),
            ("parked", &roles.parked),
        ] {
            for branch in list {
                if !seen.insert(branch.as_str()) {
                    return Err(anyhow!(
                        "branch '{branch}' in branches.{list_name} already has another role"
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            branches: self.branches.clone(),
            lineage: self.lineage.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: &ConfigSnapshot) {
        self.branches = snapshot.branches.clone();
        self.lineage = snapshot.lineage.clone();
    }

    /// Forget everything recorded about `branch` (after it was deleted).
    pub fn forget_branch(&mut self, branch: &str) {
        self.lineage.remove(branch);
        self.branches.forget(branch);
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `Config::default()`.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = Config::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &Config) -> Result<()> {
    cfg.validate()?;
    debug!(path = %path.display(), edges = cfg.lineage.len(), "writing config");
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
