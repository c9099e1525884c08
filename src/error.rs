// src/error.rs

//! Unified error handling for the monitoring engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Page or file fetch failed (network error or non-success status)
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Downloaded file exceeds the configured size cap
    #[error("File too large: {url} exceeds {limit_bytes} bytes")]
    SizeLimit { url: String, limit_bytes: u64 },

    /// Durable store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Notification delivery failed
    #[error("Delivery error for {subject}: {message}")]
    Delivery { subject: String, message: String },
}

impl AppError {
    /// Create a fetch error with the URL as context.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a size limit error.
    pub fn size_limit(url: impl Into<String>, limit_bytes: u64) -> Self {
        Self::SizeLimit {
            url: url.into(),
            limit_bytes,
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a delivery error with the subject as context.
    pub fn delivery(subject: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Delivery {
            subject: subject.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error is transient: the cycle that hit it is simply
    /// retried on the next scheduled fire, never escalated.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Fetch { .. } | Self::SizeLimit { .. } | Self::Delivery { .. }
        )
    }
}
