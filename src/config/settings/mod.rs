
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
        }
    }
}

/// File names of the persisted index artifacts, relative to the base directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    pub index_file: String,
    pub id_map_file: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_file: "index.bin".to_string(),
            id_map_file: "id_map.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestionConfig {
    /// Number of log entries embedded and added per batch
    pub batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self { batch_size: 64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Neighbours requested from the vector index per question
    pub search_k: usize,
    /// Candidates handed to the answer generator
    pub context_limit: usize,
    /// Candidates shown back to the user
    pub display_limit: usize,
    /// Matches scoring below this are dropped; `None` keeps everything
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_k: 20,
            context_limit: 8,
            display_limit: 3,
            min_score: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    Gemini,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Gemini,
            api_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid file name: {0:?} (must be a plain, non-empty file name)")]
    InvalidFileName(String),
    #[error("Index file and id map file must differ: {0}")]
    DuplicateFileName(String),
    #[error("Invalid ingestion batch size: {0} (must be between 1 and 1024)")]
    InvalidIngestionBatchSize(usize),
    #[error("Invalid search k: {0} (must be between 1 and 1000)")]
    InvalidSearchK(usize),
    #[error("Invalid context limit: {0} (must be between 1 and search k {1})")]
    InvalidContextLimit(usize, usize),
    #[error("Invalid display limit: {0} (must be between 1 and search k {1})")]
    InvalidDisplayLimit(usize, usize),
    #[error("Invalid minimum score: {0} (must be between -1.0 and 1.0)")]
    InvalidMinScore(f32),
    #[error("Invalid generation timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            index: IndexConfig::default(),
            ingestion: IngestionConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            base_dir: Self::default_base_dir().unwrap_or_else(|_| PathBuf::from(".log-rag")),
        }
    }
}

impl Config {
    /// Default data directory, `~/.log-rag`
    #[inline]
    pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".log-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("log-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.index.validate()?;
        self.ingestion.validate()?;
        self.retrieval.validate()?;
        self.generation.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.get_base_dir().join(&self.index.index_file)
    }

    #[inline]
    pub fn id_map_path(&self) -> PathBuf {
        self.get_base_dir().join(&self.index.id_map_file)
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [&self.index_file, &self.id_map_file] {
            let trimmed = name.trim();
            if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed == ".." {
                return Err(ConfigError::InvalidFileName(name.clone()));
            }
        }

        if self.index_file == self.id_map_file {
            return Err(ConfigError::DuplicateFileName(self.index_file.clone()));
        }

        Ok(())
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1024).contains(&self.batch_size) {
            return Err(ConfigError::InvalidIngestionBatchSize(self.batch_size));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.search_k) {
            return Err(ConfigError::InvalidSearchK(self.search_k));
        }

        if self.context_limit == 0 || self.context_limit > self.search_k {
            return Err(ConfigError::InvalidContextLimit(
                self.context_limit,
                self.search_k,
            ));
        }

        if self.display_limit == 0 || self.display_limit > self.search_k {
            return Err(ConfigError::InvalidDisplayLimit(
                self.display_limit,
                self.search_k,
            ));
        }

        if let Some(min_score) = self.min_score {
            if !(-1.0..=1.0).contains(&min_score) {
                return Err(ConfigError::InvalidMinScore(min_score));
            }
        }

        Ok(())
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider == GenerationProvider::None {
            return Ok(());
        }

        let url = Url::parse(&self.api_url)
            .map_err(|_| ConfigError::InvalidUrl(self.api_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    /// API key from the environment, falling back to the config file
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(GEMINI_API_KEY_ENV)
            .ok()
            .or_else(|| self.api_key.clone())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    /// Whether answers should be requested from the hosted model
    pub fn is_enabled(&self) -> bool {
        self.provider == GenerationProvider::Gemini && self.resolved_api_key().is_some()
    }
}
