//! services/advisor/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub data_dir: PathBuf,
    pub app_id: String,
    pub app_base_url: String,
    pub functions_url: String,
    pub identity_url: String,
    pub identity_api_key: String,
    pub upgrade_url: String,
    pub wholesale_url: String,
    pub anon_grace_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        // --- Load Hub Settings ---
        let app_id = std::env::var("APP_ID").unwrap_or_else(|_| "makerprice".to_string());

        let app_base_url = std::env::var("APP_BASE_URL")
            .unwrap_or_else(|_| "https://makerprice.ixiacreativestudio.com/".to_string());

        let functions_url = std::env::var("FUNCTIONS_URL").unwrap_or_else(|_| {
            "https://australia-southeast1-ixia-creative-hub.cloudfunctions.net".to_string()
        });

        let identity_url = std::env::var("IDENTITY_URL")
            .unwrap_or_else(|_| "https://identitytoolkit.googleapis.com/v1".to_string());

        let identity_api_key = std::env::var("IDENTITY_API_KEY")
            .map_err(|_| ConfigError::MissingVar("IDENTITY_API_KEY".to_string()))?;

        let upgrade_url = std::env::var("UPGRADE_URL").unwrap_or_else(|_| {
            "https://ixiacreativestudio.com/checkout/?add-to-cart=1779".to_string()
        });

        let wholesale_url = std::env::var("WHOLESALE_URL")
            .unwrap_or_else(|_| "https://wholesaleprice.ixiacreativestudio.com/".to_string());

        // --- Load Session Settings ---
        let anon_grace_str =
            std::env::var("ANON_GRACE_MS").unwrap_or_else(|_| "400".to_string());
        let anon_grace_ms = anon_grace_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "ANON_GRACE_MS".to_string(),
                format!("'{}' is not a valid duration in milliseconds", anon_grace_str),
            )
        })?;

        Ok(Self {
            bind_address,
            log_level,
            data_dir,
            app_id,
            app_base_url,
            functions_url,
            identity_url,
            identity_api_key,
            upgrade_url,
            wholesale_url,
            anon_grace_ms,
        })
    }
}
