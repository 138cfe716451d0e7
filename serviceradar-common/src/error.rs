//! Error types shared across the ingest core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur anywhere in the ingest → correlation → emission
/// pipeline.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("configuration validation failed: {0}")]
    ConfigValidation(String),

    /// A service payload could not be decoded.
    #[error("decode error for service '{service}': {message}")]
    Decode { service: String, message: String },

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Device registry enrichment or publish failure.
    #[error("registry error: {0}")]
    Registry(String),

    /// A datastore call failed.
    #[error("datastore error: {0}")]
    Datastore(String),

    /// An alert was suppressed by cooldown. Expected, not a real failure.
    #[error("alert suppressed by cooldown for ({poller_id}, {title}, {service})")]
    AlertCooldown {
        poller_id: String,
        title: String,
        service: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    pub fn decode(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decode {
            service: service.into(),
            message: msg.into(),
        }
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn datastore(msg: impl Into<String>) -> Self {
        Self::Datastore(msg.into())
    }

    /// True if this is the expected cooldown-suppression sentinel.
    pub fn is_cooldown(&self) -> bool {
        matches!(self, Self::AlertCooldown { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<json5::Error> for CoreError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}
