//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocatorError {
    /// A request parameter is missing or malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The round declares a voting strategy that is not in the registry.
    #[error("Unsupported voting strategy: {0}")]
    UnsupportedStrategy(String),

    /// No USD price could be resolved for `token` at `timestamp`.
    #[error("No USD conversion available for token {token} at {timestamp}")]
    ConversionUnavailable { token: String, timestamp: i64 },

    /// Fixed-point accumulation exceeded the 256-bit range.
    #[error("Arithmetic overflow while computing {0}")]
    Overflow(&'static str),

    #[error("No eligible projects in round")]
    NoEligibleProjects,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid distribution transition: {0}")]
    InvalidTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A computation moved off the async runtime panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// An upstream collaborator answered with something we could not use.
    #[error("Upstream source error: {0}")]
    Source(String),
}

impl AllocatorError {
    /// Stable, machine-readable cause carried in the `data` field of a
    /// failed API response.
    pub fn cause(&self) -> String {
        match self {
            Self::Validation(msg) => format!("error: {msg}"),
            Self::UnsupportedStrategy(_) => "error: unsupported voting strategy".to_string(),
            Self::ConversionUnavailable { .. } => "error: conversion unavailable".to_string(),
            Self::Overflow(_) | Self::NoEligibleProjects | Self::InvalidAmount(_) => {
                format!("error: computation failed: {self}")
            }
            Self::InvalidTransition(msg) => format!("error: {msg}"),
            Self::NotFound(what) => format!("error: {what} not found"),
            other => format!("error: {other}"),
        }
    }

    /// Computation errors abort a whole matching run.
    pub fn is_computation(&self) -> bool {
        matches!(
            self,
            Self::Overflow(_) | Self::NoEligibleProjects | Self::InvalidAmount(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AllocatorError>;
