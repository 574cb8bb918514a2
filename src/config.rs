use anyhow::{Context, Result};
use folio_core::ranking::{
    RankingConfig as CoreRankingConfig, DEFAULT_HISTORY_CAPACITY, DEFAULT_LEARNING_RATE,
    DEFAULT_TRUSTED_AUTHOR,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Logical collection name; rows from other collections are invisible.
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn default_collection() -> String {
    "book_versions".to_string()
}
fn default_query_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_trusted_author")]
    pub trusted_author: String,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            history_capacity: default_history_capacity(),
            default_limit: default_limit(),
            trusted_author: default_trusted_author(),
        }
    }
}

impl RankingConfig {
    pub fn to_core(&self) -> CoreRankingConfig {
        CoreRankingConfig {
            learning_rate: self.learning_rate,
            history_capacity: self.history_capacity,
            trusted_author: self.trusted_author.clone(),
        }
    }
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}
fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}
fn default_limit() -> usize {
    5
}
fn default_trusted_author() -> String {
    DEFAULT_TRUSTED_AUTHOR.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Store
    if config.store.collection.trim().is_empty() {
        anyhow::bail!("store.collection must not be empty");
    }
    if config.store.query_timeout_ms == 0 {
        anyhow::bail!("store.query_timeout_ms must be >= 1");
    }

    // Ranking
    if !config.ranking.learning_rate.is_finite() || config.ranking.learning_rate < 0.0 {
        anyhow::bail!("ranking.learning_rate must be a finite number >= 0");
    }
    if config.ranking.history_capacity == 0 {
        anyhow::bail!("ranking.history_capacity must be >= 1");
    }
    if config.ranking.default_limit == 0 {
        anyhow::bail!("ranking.default_limit must be >= 1");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "hashing" => {
            if config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'hashing'");
            }
        }
        "openai" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hashing, openai, or local.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = parse("[db]\npath = \"./data/folio.sqlite\"\n").unwrap();
        assert_eq!(config.store.collection, "book_versions");
        assert_eq!(config.store.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.ranking.learning_rate, 0.01);
        assert_eq!(config.ranking.history_capacity, 1000);
        assert_eq!(config.ranking.default_limit, 5);
        assert_eq!(config.ranking.trusted_author, "human_editor");
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn test_rejects_zero_history_capacity() {
        let err = parse("[db]\npath = \"x\"\n[ranking]\nhistory_capacity = 0\n").unwrap_err();
        assert!(err.to_string().contains("history_capacity"));
    }

    #[test]
    fn test_rejects_negative_learning_rate() {
        let err = parse("[db]\npath = \"x\"\n[ranking]\nlearning_rate = -0.5\n").unwrap_err();
        assert!(err.to_string().contains("learning_rate"));
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("dims"));

        let src = "[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\ndims = 1536\n";
        let err = parse(src).unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"ollama\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_to_core_ranking_config() {
        let config = parse(
            "[db]\npath = \"x\"\n[ranking]\nlearning_rate = 0.05\nhistory_capacity = 7\ntrusted_author = \"editor\"\n",
        )
        .unwrap();
        let core = config.ranking.to_core();
        assert_eq!(core.learning_rate, 0.05);
        assert_eq!(core.history_capacity, 7);
        assert_eq!(core.trusted_author, "editor");
    }
}
