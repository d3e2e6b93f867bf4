//! Artifact and call-record status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an artifact row.
///
/// An artifact is created `Running` and transitions exactly once to
/// `Success` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// The builder is executing.
    Running,
    /// The builder finished and the payload is authoritative.
    Success,
    /// The builder raised; `error` holds the truncated message.
    Failed,
}

impl ArtifactStatus {
    /// Returns true for `Success` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Status of a call dedup/lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// A caller holds the lock and is talking to the provider.
    InProgress,
    /// The response is cached in the record.
    Success,
    /// The last attempt failed.
    Failed,
}

impl CallStatus {
    /// Returns true for `Success` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
