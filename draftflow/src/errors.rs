//! Error types for the draftflow engine.
//!
//! The taxonomy separates failures of a single external generation call
//! ([`GenerationError`]), of the persisted stores ([`StoreError`]) and of the
//! engine as a whole ([`DraftflowError`]). Only a small, closed subset of
//! generation errors is retried inside the call deduplicator; everything else
//! propagates to the step builder and from there to the run report.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for draftflow operations.
#[derive(Debug, Clone, Error)]
pub enum DraftflowError {
    /// An external generation call failed.
    #[error("{0}")]
    Generation(#[from] GenerationError),

    /// The artifact or call store failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Invalid engine configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A step failed; carries the step name.
    #[error("{0}")]
    Step(#[from] StepFailure),

    /// Input data failed validation (e.g. an outline with no sections).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A section key that is not present in the registry.
    #[error("Unknown section: {0}")]
    UnknownSection(String),

    /// A profile name that is not registered.
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DraftflowError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable error type name.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Generation(e) => e.error_type(),
            Self::Store(_) => "StoreError",
            Self::Config(_) => "ConfigError",
            Self::Step(_) => "StepFailure",
            Self::Validation(_) => "ValidationError",
            Self::UnknownSection(_) => "UnknownSection",
            Self::UnknownProfile(_) => "UnknownProfile",
            Self::Serialization(_) => "SerializationError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.error_type()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Self::Generation(e) = self {
            map.extend(e.to_dict());
        }
        map
    }
}

impl From<serde_json::Error> for DraftflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by a single external generation call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Missing credentials or other provider misconfiguration. Never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider did not answer in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The provider rejected the call due to rate limiting.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// A provider-side failure; retried only when flagged.
    #[error("Provider error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Provider {
        /// Error message.
        message: String,
        /// HTTP status, when the provider returned one.
        status: Option<u16>,
        /// Whether the error is transient.
        retryable: bool,
    },

    /// The request exceeds the configured input limit.
    #[error("Input too large: {actual} chars exceeds limit of {limit}")]
    InputTooLarge {
        /// Actual size in characters.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The provider response could not be interpreted (e.g. invalid JSON).
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The parsed response does not match the requested schema.
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    /// The call record store failed.
    #[error("Call store error: {0}")]
    Store(String),
}

impl GenerationError {
    /// Creates a provider error, retryable when the status is absent or a 5xx.
    #[must_use]
    pub fn provider(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Provider {
            message: message.into(),
            status,
            retryable: status.map_or(true, |s| s >= 500),
        }
    }

    /// Returns true if the deduplicator may retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::Provider { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Stable machine-readable error type name.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::Timeout(_) => "TimeoutError",
            Self::RateLimited(_) => "RateLimitError",
            Self::Provider { .. } => "ProviderError",
            Self::InputTooLarge { .. } => "InputTooLargeError",
            Self::InvalidResponse(_) => "InvalidResponseError",
            Self::SchemaValidation(_) => "SchemaValidationError",
            Self::Store(_) => "StoreError",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.error_type()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));
        if let Self::Provider { status: Some(status), .. } = self {
            map.insert("status".to_string(), serde_json::json!(status));
        }
        map
    }
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

/// Errors raised by artifact and call repositories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A row with the same identity already exists.
    #[error("Record already exists: {0}")]
    Conflict(String),

    /// The backend reported an unexpected failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration for '{field}': {message}")]
pub struct ConfigError {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ConfigError {
    /// Creates a new config error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The first failing step of a run, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("Step '{step}' failed: {error}")]
pub struct StepFailure {
    /// Step identifier, e.g. `section:intro` or `assemble`.
    pub step: String,
    /// Error message.
    pub error: String,
}

impl StepFailure {
    /// Creates a new step failure.
    #[must_use]
    pub fn new(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            error: error.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("step".to_string(), serde_json::json!(self.step));
        map.insert("error".to_string(), serde_json::json!(self.error));
        map
    }
}

/// Result alias used across the crate.
pub type Result<T, E = DraftflowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Timeout("t".into()).is_retryable());
        assert!(GenerationError::RateLimited("r".into()).is_retryable());
        assert!(GenerationError::provider("boom", Some(503)).is_retryable());
        assert!(GenerationError::provider("net", None).is_retryable());
        assert!(!GenerationError::provider("bad request", Some(400)).is_retryable());
        assert!(!GenerationError::Config("no key".into()).is_retryable());
        assert!(!GenerationError::InputTooLarge { actual: 10, limit: 5 }.is_retryable());
        assert!(!GenerationError::InvalidResponse("x".into()).is_retryable());
        assert!(!GenerationError::SchemaValidation("x".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = GenerationError::provider("upstream", Some(502));
        assert_eq!(err.to_string(), "Provider error (502): upstream");
        let err = GenerationError::provider("upstream", None);
        assert_eq!(err.to_string(), "Provider error: upstream");
    }

    #[test]
    fn test_draftflow_error_to_dict() {
        let err: DraftflowError = GenerationError::RateLimited("slow down".into()).into();
        let dict = err.to_dict();
        assert_eq!(dict.get("type"), Some(&serde_json::json!("RateLimitError")));
        assert_eq!(dict.get("retryable"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_provider_error_to_dict_carries_status() {
        let dict = GenerationError::provider("bad gateway", Some(502)).to_dict();
        assert_eq!(dict.get("status"), Some(&serde_json::json!(502)));
        assert_eq!(dict.get("retryable"), Some(&serde_json::json!(true)));
        assert!(!GenerationError::Timeout("t".into()).to_dict().contains_key("status"));
    }

    #[test]
    fn test_step_failure_display() {
        let failure = StepFailure::new("section:intro", "Timeout: 60s");
        assert_eq!(failure.to_string(), "Step 'section:intro' failed: Timeout: 60s");
        assert_eq!(failure.to_dict().len(), 2);
    }
}
