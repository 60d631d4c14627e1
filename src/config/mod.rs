// Configuration management module
// TOML settings for the model endpoints, chunking, retrieval and harvesting

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ChunkingConfig, Config, ConfigError, HarvestConfig, IngestionConfig, OllamaConfig,
    RetrievalConfig, StorefrontConfig,
};

/// Environment variable overriding the base directory
pub const HOME_ENV_VAR: &str = "SUPPORT_RAG_HOME";

/// Get the configuration directory path
///
/// `SUPPORT_RAG_HOME` wins over the platform config directory.
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os(HOME_ENV_VAR) {
        return Ok(std::path::PathBuf::from(home));
    }

    dirs::config_dir()
        .map(|dir| dir.join("support-rag"))
        .ok_or(ConfigError::DirectoryError)
}
