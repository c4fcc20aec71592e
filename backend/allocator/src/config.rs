//! Application configuration loaded from environment variables.

use crate::errors::{AllocatorError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the indexer serving round metadata and votes
    pub indexer_url: String,
    /// Base URL of the USD price feed
    pub price_api_url: String,
    /// Path to the SQLite database holding committed distributions
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Per-request timeout for outbound HTTP calls
    pub http_timeout_secs: u64,
    /// Retries on transient collaborator failures before giving up
    pub max_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            indexer_url: env_var("INDEXER_URL").map_err(|_| {
                AllocatorError::Config("INDEXER_URL environment variable is required".to_string())
            })?,
            price_api_url: env_var("PRICE_API_URL").map_err(|_| {
                AllocatorError::Config("PRICE_API_URL environment variable is required".to_string())
            })?,
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./distributions.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| AllocatorError::Config("Invalid API_PORT".to_string()))?,
            http_timeout_secs: env_var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| AllocatorError::Config("Invalid HTTP_TIMEOUT_SECS".to_string()))?,
            max_retries: env_var("MAX_RETRIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| AllocatorError::Config("Invalid MAX_RETRIES".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AllocatorError::Config(format!("Missing env var: {key}")))
}
