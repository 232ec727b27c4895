//! Error handling for vispipe-rs
//!
//! This module defines the crate-level error type and a Result alias used by
//! configuration loading and the demo binary. Graph operations return the
//! narrower [`PipelineError`](crate::pipeline::PipelineError).

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for vispipe-rs operations
#[derive(Error, Debug)]
pub enum VisPipeError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while building or updating a pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VisPipeError>,
    },
}

impl VisPipeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VisPipeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    fn from_err(err: impl Into<VisPipeError>) -> Self {
        err.into()
    }
}

impl From<toml::de::Error> for VisPipeError {
    fn from(err: toml::de::Error) -> Self {
        VisPipeError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for VisPipeError {
    fn from(err: toml::ser::Error) -> Self {
        VisPipeError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for VisPipeError {
    fn from(err: serde_json::Error) -> Self {
        VisPipeError::Serialization(err.to_string())
    }
}

/// Result type alias for vispipe-rs operations
pub type Result<T> = std::result::Result<T, VisPipeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<VisPipeError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| VisPipeError::from_err(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| VisPipeError::from_err(e).with_context(f()))
    }
}
