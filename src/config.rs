//! Configuration module for the claim matcher.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `MISINFO_` and use double
//! underscores to separate nested levels:
//! - `MISINFO_MATCHING__SEARCH_BUDGET=500` sets `matching.search_budget`
//! - `MISINFO_INDEX__QUERY_DURING_REBUILD=wait` sets `index.query_during_rebuild`
//! - `MISINFO_DEBUG=true` sets `debug`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ann::{BuildParams, SearchParams};
use crate::vector::{VECTOR_DIMENSION_768, VectorDimension};

/// Directory holding the settings file, searched for from the current
/// directory upwards.
pub const CONFIG_DIR: &str = ".misinfo";

const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "MISINFO_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {field} {reason}\nSuggestion: Fix the value in .misinfo/settings.toml or the matching MISINFO_ variable")]
    Invalid { field: &'static str, reason: String },

    #[error("Configuration file already exists at '{path}'\nSuggestion: Use --force to overwrite")]
    AlreadyExists { path: PathBuf },

    #[error("Failed to write configuration to '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding the vector file, record log and index file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Similarity matching parameters
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Index file and rebuild behavior
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MatchingConfig {
    /// Dimension of every stored and queried embedding
    #[serde(default = "default_vector_dimension")]
    pub vector_dimension: usize,

    /// Number of trees in the forest
    #[serde(default = "default_tree_count")]
    pub tree_count: usize,

    /// Maximum ids per leaf
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,

    /// Candidates kept per query vector after re-ranking
    #[serde(default = "default_max_results_per_query")]
    pub max_results_per_query: usize,

    /// Tree nodes visited per query vector
    #[serde(default = "default_search_budget")]
    pub search_budget: usize,

    /// Matches farther than this Euclidean distance are dropped
    #[serde(default = "default_max_distance_threshold")]
    pub max_distance_threshold: f32,

    /// Fixed seed for reproducible index builds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// What a query does when it arrives while the index is being rebuilt.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryDuringRebuild {
    /// Answer from the previous forest without waiting.
    #[default]
    Stale,
    /// Block until the new forest is in place.
    Wait,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexConfig {
    /// Index file name inside `data_dir`
    #[serde(default = "default_index_file_name")]
    pub file_name: String,

    /// Query behavior while a rebuild is in progress
    #[serde(default)]
    pub query_during_rebuild: QueryDuringRebuild,

    /// Write the index to disk after each rebuild
    #[serde(default = "default_true")]
    pub persist: bool,
}

fn default_version() -> u32 {
    1
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("data")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_vector_dimension() -> usize {
    VECTOR_DIMENSION_768
}
fn default_tree_count() -> usize {
    10
}
fn default_leaf_capacity() -> usize {
    32
}
fn default_max_results_per_query() -> usize {
    10
}
fn default_search_budget() -> usize {
    2000
}
fn default_max_distance_threshold() -> f32 {
    6.0
}
fn default_index_file_name() -> String {
    "trees.ann".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: default_data_dir(),
            debug: false,
            matching: MatchingConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            vector_dimension: default_vector_dimension(),
            tree_count: default_tree_count(),
            leaf_capacity: default_leaf_capacity(),
            max_results_per_query: default_max_results_per_query(),
            search_budget: default_search_budget(),
            max_distance_threshold: default_max_distance_threshold(),
            seed: None,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            file_name: default_index_file_name(),
            query_during_rebuild: QueryDuringRebuild::default(),
            persist: true,
        }
    }
}

impl MatchingConfig {
    /// The configured dimension as a validated type.
    pub fn dimension(&self) -> Result<VectorDimension, ConfigError> {
        VectorDimension::new(self.vector_dimension).map_err(|e| ConfigError::Invalid {
            field: "matching.vector_dimension",
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn build_params(&self) -> BuildParams {
        BuildParams {
            tree_count: self.tree_count,
            leaf_capacity: self.leaf_capacity,
            seed: self.seed,
        }
    }

    #[must_use]
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            max_results: self.max_results_per_query,
            search_budget: self.search_budget,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, ConfigError> {
        // Try to find the workspace root by looking for the config directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_layered(path.as_ref(), ENV_PREFIX)
    }

    fn load_layered(path: &Path, env_prefix: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed(env_prefix).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Find the settings file by walking from the current directory to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Get the workspace root directory (where the config directory is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Rejects values the matcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.matching;
        m.dimension()?;

        let positive = [
            ("matching.tree_count", m.tree_count),
            ("matching.leaf_capacity", m.leaf_capacity),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        if !m.max_distance_threshold.is_finite() || m.max_distance_threshold < 0.0 {
            return Err(ConfigError::Invalid {
                field: "matching.max_distance_threshold",
                reason: format!(
                    "must be a finite, non-negative number, got {}",
                    m.max_distance_threshold
                ),
            });
        }

        if self.index.file_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "index.file_name",
                reason: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Full path of the index file.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index.file_name)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string).map_err(write_err)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, ConfigError> {
        Self::init_config_file_in(Path::new("."), force)
    }

    /// Like [`Settings::init_config_file`], rooted at `root`.
    pub fn init_config_file_in(root: &Path, force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = root.join(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err(ConfigError::AlreadyExists { path: config_path });
        }

        let write_err = |source| ConfigError::Write {
            path: config_path.clone(),
            source,
        };
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let defaults = Settings::default();
        let m = &defaults.matching;
        let template = format!(
            r#"# Misinformation claim matcher configuration

# Version of the configuration schema
version = {version}

# Directory holding vectors.vec, records.log and the index file
data_dir = "{data_dir}"

# Global debug mode
debug = false

[matching]
# Dimension of the sentence embeddings (DistilBERT produces 768)
vector_dimension = {dimension}

# Number of randomized partition trees; more trees raise recall and build time
tree_count = {tree_count}

# Maximum vector ids per leaf
leaf_capacity = {leaf_capacity}

# Candidates kept per query vector
max_results_per_query = {max_results}

# Tree nodes visited per query vector; higher values trade speed for recall
search_budget = {search_budget}

# Matches farther than this Euclidean distance are discarded
max_distance_threshold = {threshold:.1}

# Fixed seed for reproducible index builds
# seed = 42

[index]
# Index file name inside data_dir
file_name = "{file_name}"

# Queries arriving during a rebuild: "stale" answers from the previous
# index, "wait" blocks until the rebuild completes
query_during_rebuild = "stale"

# Write the index to disk after each rebuild
persist = true
"#,
            version = defaults.version,
            data_dir = defaults.data_dir.display(),
            dimension = m.vector_dimension,
            tree_count = m.tree_count,
            leaf_capacity = m.leaf_capacity,
            max_results = m.max_results_per_query,
            search_budget = m.search_budget,
            threshold = m.max_distance_threshold,
            file_name = defaults.index.file_name,
        );

        std::fs::write(&config_path, template).map_err(write_err)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.data_dir, PathBuf::from(".misinfo/data"));
        assert_eq!(settings.matching.vector_dimension, 768);
        assert_eq!(settings.matching.tree_count, 10);
        assert_eq!(settings.matching.max_distance_threshold, 6.0);
        assert_eq!(settings.index.query_during_rebuild, QueryDuringRebuild::Stale);
        assert_eq!(settings.index_path(), PathBuf::from(".misinfo/data/trees.ann"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2
data_dir = "/var/lib/misinfo"

[matching]
vector_dimension = 3
tree_count = 4
seed = 99

[index]
query_during_rebuild = "wait"
persist = false
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/misinfo"));
        assert_eq!(settings.matching.vector_dimension, 3);
        assert_eq!(settings.matching.tree_count, 4);
        assert_eq!(settings.matching.seed, Some(99));
        assert_eq!(settings.index.query_during_rebuild, QueryDuringRebuild::Wait);
        assert!(!settings.index.persist);

        // Unspecified values keep their defaults
        assert_eq!(settings.matching.leaf_capacity, 32);
        assert_eq!(settings.index.file_name, "trees.ann");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.matching.search_budget = 123;
        settings.matching.seed = Some(7);
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        for content in [
            "[matching]\nvector_dimension = 0\n",
            "[matching]\ntree_count = 0\n",
            "[matching]\nleaf_capacity = 0\n",
            "[matching]\nmax_distance_threshold = -1.0\n",
        ] {
            fs::write(&config_path, content).unwrap();
            assert!(
                matches!(
                    Settings::load_from(&config_path),
                    Err(ConfigError::Invalid { .. })
                ),
                "accepted: {content}"
            );
        }

        fs::write(&config_path, "[index]\nquery_during_rebuild = \"never\"\n").unwrap();
        assert!(matches!(
            Settings::load_from(&config_path),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[matching]\nsearch_budget = 100\ntree_count = 3\n").unwrap();

        // Private prefix so concurrently running tests never see the override
        unsafe {
            std::env::set_var("MISINFO_CFGTEST_MATCHING__SEARCH_BUDGET", "250");
        }
        let settings = Settings::load_layered(&config_path, "MISINFO_CFGTEST_");
        unsafe {
            std::env::remove_var("MISINFO_CFGTEST_MATCHING__SEARCH_BUDGET");
        }

        let settings = settings.unwrap();
        assert_eq!(settings.matching.search_budget, 250);
        assert_eq!(settings.matching.tree_count, 3);
    }

    #[test]
    fn test_init_template_parses_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file_in(temp_dir.path(), false).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, Settings::default());

        assert!(matches!(
            Settings::init_config_file_in(temp_dir.path(), false),
            Err(ConfigError::AlreadyExists { .. })
        ));
        assert!(Settings::init_config_file_in(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_params_from_matching_config() {
        let m = MatchingConfig {
            seed: Some(5),
            ..MatchingConfig::default()
        };
        assert_eq!(m.build_params().seed, Some(5));
        assert_eq!(m.build_params().tree_count, 10);
        assert_eq!(m.search_params().search_budget, 2000);
        assert_eq!(m.dimension().unwrap().get(), 768);
    }
}
