// src/config.rs

//! Optional `git-cochange.toml` settings.
//!
//! ```toml
//! database = "git_log.db"
//! users_file = "users.csv"
//! unknown_users_file = "unknown_users.csv"
//! modules_file = "modules.csv"
//! commit_batch = 500
//!
//! [graph]
//! max_files_per_commit = 21
//! threshold = 1.0
//! ```
//!
//! Command-line flags win over anything set here.

use crate::error::{Error, Result};
use crate::store::DEFAULT_COMMIT_BATCH;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "git-cochange.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: PathBuf,
    pub users_file: PathBuf,
    pub unknown_users_file: PathBuf,
    pub modules_file: PathBuf,
    pub commit_batch: usize,
    pub graph: GraphDefaults,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphDefaults {
    pub max_files_per_commit: usize,
    pub threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("git_log.db"),
            users_file: PathBuf::from("users.csv"),
            unknown_users_file: PathBuf::from("unknown_users.csv"),
            modules_file: PathBuf::from("modules.csv"),
            commit_batch: DEFAULT_COMMIT_BATCH,
            graph: GraphDefaults::default(),
        }
    }
}

impl Default for GraphDefaults {
    fn default() -> Self {
        Self {
            max_files_per_commit: 21,
            threshold: 1.0,
        }
    }
}

impl Config {
    /// Reads `path` if given, else [`DEFAULT_CONFIG_FILE`] when present,
    /// else the built-in defaults. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) if !path.exists() => {
                return Err(Error::Config(format!(
                    "config file {} not found",
                    path.display()
                )))
            }
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        if config.commit_batch == 0 {
            return Err(Error::Config("commit_batch must be at least 1".to_string()));
        }
        if config.graph.max_files_per_commit < 2 {
            return Err(Error::Config(
                "graph.max_files_per_commit must be at least 2".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml(
            r#"
            database = "history.db"
            [graph]
            threshold = 3.0
            "#,
        )
        .unwrap();
        assert_eq!(config.database, PathBuf::from("history.db"));
        assert_eq!(config.graph.threshold, 3.0);
        assert_eq!(config.graph.max_files_per_commit, 21);
        assert_eq!(config.commit_batch, DEFAULT_COMMIT_BATCH);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            Config::from_toml("databse = \"typo.db\""),
            Err(Error::Toml(_))
        ));
        assert!(matches!(
            Config::from_toml("[graph]\ncap = 3"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_toml("commit_batch = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[graph]\nmax_files_per_commit = 1"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/git-cochange.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "modules_file = \"mods.csv\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.modules_file, PathBuf::from("mods.csv"));
    }
}
