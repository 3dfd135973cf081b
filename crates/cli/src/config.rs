use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "scout.toml";
pub const STATE_DIR: &str = ".scout";

/// Project configuration, read from `scout.toml` at the project root.
/// Every field has a default, so a missing file means default behavior.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_batch_wait_ms")]
    pub max_batch_wait_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_batch_wait_ms: default_max_batch_wait_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_max_file_kb")]
    pub max_file_kb: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_kb: default_max_file_kb(),
        }
    }
}

fn default_dimension() -> usize {
    256
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_cache_capacity() -> usize {
    10_000
}
fn default_debounce_ms() -> u64 {
    400
}
fn default_max_batch_wait_ms() -> u64 {
    2_000
}
fn default_max_file_kb() -> u64 {
    2_048
}

impl Config {
    /// Load `scout.toml` from the project root, falling back to defaults
    /// when the file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("invalid config at {}", path.display()))?;
        Ok(config)
    }

    #[must_use]
    pub fn state_dir(root: &Path) -> PathBuf {
        root.join(STATE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.embedding.dimension, 256);
        assert_eq!(config.watch.debounce_ms, 400);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[embedding]\ndimension = 64\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.watch.max_batch_wait_ms, 2_000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[embedding\n").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }
}
