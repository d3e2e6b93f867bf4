//! The dedup/lock record for one external generation call.

use crate::core::CallStatus;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Usage recorded with a successful call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallUsage {
    /// Prompt tokens reported by the provider.
    pub prompt_tokens: u64,
    /// Completion tokens reported by the provider.
    pub completion_tokens: u64,
    /// Provider latency.
    pub latency_ms: u64,
    /// Estimated cost in USD.
    pub cost_estimate: f64,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Dedup/lock record keyed by call fingerprint.
///
/// The fingerprint is unique in the store: a failed insert signals that a
/// (possibly concurrent) caller already owns the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Hash of the call's full semantic input.
    pub fingerprint: String,
    /// Model the call was made against.
    pub model: String,
    /// Lock / result status.
    pub status: CallStatus,
    /// Raw response text.
    #[serde(default)]
    pub response_text: Option<String>,
    /// Parsed response for JSON-mode calls.
    #[serde(default)]
    pub response_json: Option<Value>,
    /// Usage for successful calls.
    #[serde(default)]
    pub usage: CallUsage,
    /// Error of the last failed attempt.
    #[serde(default)]
    pub error: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last touch; used to detect stale locks.
    pub updated_at: Timestamp,
}

impl CallRecord {
    /// A fresh `InProgress` record, i.e. a lock claim.
    #[must_use]
    pub fn in_progress(fingerprint: impl Into<String>, model: impl Into<String>) -> Self {
        let now = now_utc();
        Self {
            fingerprint: fingerprint.into(),
            model: model.into(),
            status: CallStatus::InProgress,
            response_text: None,
            response_json: None,
            usage: CallUsage::default(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the record successful.
    #[must_use]
    pub fn succeeded(mut self, text: String, json: Option<Value>, usage: CallUsage) -> Self {
        self.status = CallStatus::Success;
        self.response_text = Some(text);
        self.response_json = json;
        self.usage = usage;
        self.error = None;
        self.updated_at = now_utc();
        self
    }

    /// Marks the record failed.
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = CallStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = now_utc();
        self
    }

    /// Overrides `updated_at`; used to model stale locks.
    #[must_use]
    pub fn touched_at(mut self, ts: Timestamp) -> Self {
        self.updated_at = ts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_record_transitions() {
        let record = CallRecord::in_progress("fp", "gpt-4o-mini");
        assert_eq!(record.status, CallStatus::InProgress);

        let done = record.clone().succeeded(
            "hello".to_string(),
            None,
            CallUsage {
                attempts: 1,
                ..CallUsage::default()
            },
        );
        assert_eq!(done.status, CallStatus::Success);
        assert_eq!(done.response_text.as_deref(), Some("hello"));
        assert!(done.updated_at >= record.updated_at);

        let failed = record.failed("boom");
        assert_eq!(failed.status, CallStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
