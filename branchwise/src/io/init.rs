//! State directory layout and `branchwise init`.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use super::config::{Config, load_config, write_config};

/// Canonical paths inside `<git-common-dir>/branchwise/`.
///
/// The directory lives in the common dir so that every worktree of a
/// repository shares one configuration and one run state.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub run_state_path: PathBuf,
}

impl StatePaths {
    pub fn new(git_common_dir: impl AsRef<Path>) -> Self {
        let state_dir = git_common_dir.as_ref().join("branchwise");
        Self {
            config_path: state_dir.join("config.toml"),
            run_state_path: state_dir.join("runstate.json"),
            state_dir,
        }
    }
}

/// Options for `init_config`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Overwrite an existing configuration file.
    pub force: bool,
    pub main: Option<String>,
    pub perennial: Vec<String>,
}

/// Write the configuration file with the given main and perennial branches.
///
/// Fails if the file already exists unless `options.force` is set; with
/// `force`, lineage and other settings from the existing file are kept.
pub fn init_config(paths: &StatePaths, options: &InitOptions) -> Result<Config> {
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "branchwise init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }
    let mut config = load_config(&paths.config_path)?;
    if let Some(main) = &options.main {
        config.branches.main = main.clone();
    }
    for branch in &options.perennial {
        if !config.branches.perennial.contains(branch) {
            config.branches.perennial.push(branch.clone());
        }
    }
    config.branches.perennial.sort();
    write_config(&paths.config_path, &config)?;
    Ok(config)
}
