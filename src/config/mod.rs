// Configuration management module
// TOML settings plus the interactive setup flow

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, GEMINI_API_KEY_ENV, GenerationConfig, GenerationProvider, IndexConfig,
    IngestionConfig, OllamaConfig, RetrievalConfig,
};
