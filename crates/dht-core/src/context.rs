//! `CommandContext`, generalized from the teacher's
//! `core::config::context::CommandContext`
//! (`px-core/src/core/config/context.rs`): bundles global options, the
//! assembled `Config`, the `Effects` handle, and a lazily-resolved project
//! root behind one object so the engine/runner layers take a single
//! argument instead of threading four.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};

use crate::config::{Config, GlobalOptions};
use crate::effects::{Effects, SharedEffects};

/// Filenames that mark a directory as a project root, checked from the
/// current directory upward (spec §4.D's scanner starts here).
const ROOT_MARKERS: &[&str] = &[".dhtconfig", "pyproject.toml", "setup.py", "requirements.txt", ".git"];

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    project_root: OnceLock<PathBuf>,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Creates a new command context with the provided global options.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be assembled from the
    /// process environment.
    pub fn new(global: &'a GlobalOptions, effects: SharedEffects) -> Result<Self> {
        let config = Config::from_env(global)?;
        Ok(Self {
            global,
            config,
            project_root: OnceLock::new(),
            effects,
        })
    }

    #[must_use]
    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    #[must_use]
    pub fn shared_effects(&self) -> SharedEffects {
        self.effects.clone()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.config.network().online
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.config.strict().enabled
    }

    #[cfg(test)]
    pub(crate) fn testing(global: &'a GlobalOptions, effects: SharedEffects, project_root: PathBuf) -> Self {
        let config = Config::from_env(global).expect("assembling config from a clean test environment");
        let cell = OnceLock::new();
        let _ = cell.set(project_root);
        Self { global, config, project_root: cell, effects }
    }

    /// Resolves the current project's root directory by walking up from the
    /// current directory looking for [`ROOT_MARKERS`], memoizing the result
    /// for the lifetime of this context.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be read or no
    /// ancestor contains a recognized marker.
    pub fn project_root(&self) -> Result<PathBuf> {
        if let Some(path) = self.project_root.get() {
            return Ok(path.clone());
        }
        let cwd = std::env::current_dir().context("reading current directory")?;
        let path = find_project_root(&cwd)?;
        let _ = self.project_root.set(path.clone());
        Ok(path)
    }
}

fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut dir = Some(start);
    while let Some(candidate) = dir {
        if ROOT_MARKERS.iter().any(|marker| candidate.join(marker).exists()) {
            return Ok(candidate.to_path_buf());
        }
        dir = candidate.parent();
    }
    Ok(start.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_root_marker_in_ancestor_directory() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path();
        std::fs::write(root.join("pyproject.toml"), "[project]\nname = \"x\"\n")?;
        let nested = root.join("src").join("pkg");
        std::fs::create_dir_all(&nested)?;
        assert_eq!(find_project_root(&nested)?, root);
        Ok(())
    }

    #[test]
    fn falls_back_to_start_when_no_marker_found() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let nested = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&nested)?;
        assert_eq!(find_project_root(&nested)?, nested);
        Ok(())
    }
}
