// Configuration management module
// TOML settings loaded from a config directory, validated before use

pub mod settings;

pub use settings::{Config, ConfigError, GeminiConfig, IngestionConfig, QdrantConfig, RetrievalConfig};

/// Get the default configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}
