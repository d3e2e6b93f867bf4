//! The artifact row: one cached step result for one document.

use crate::core::ArtifactStatus;
use crate::utils::{content_hash, generate_uuid_v7, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Opaque payload of an artifact: structured data, text, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Text payload (markdown).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ArtifactPayload {
    /// Content hash over data and text, used for equality checks.
    #[must_use]
    pub fn hash(&self) -> String {
        content_hash(self)
    }
}

/// What a step builder hands back to `ensure`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOutput {
    /// The payload to store.
    pub payload: ArtifactPayload,
    /// Builder metadata (token usage, cost, timings).
    pub meta: Map<String, Value>,
}

impl BuildOutput {
    /// Output carrying structured data.
    #[must_use]
    pub fn data(data: Value) -> Self {
        Self {
            payload: ArtifactPayload {
                data: Some(data),
                text: None,
            },
            meta: Map::new(),
        }
    }

    /// Output carrying text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: ArtifactPayload {
                data: None,
                text: Some(text.into()),
            },
            meta: Map::new(),
        }
    }

    /// Adds structured data to a text output.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.payload.data = Some(data);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

/// One cached step result.
///
/// At most one artifact per `(owner_id, kind)` is authoritative: the latest
/// by creation time with status `Success` that has not been invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Row id (UUID v7, sorts by creation).
    pub id: Uuid,
    /// Owning document.
    pub owner_id: Uuid,
    /// Step identifier, see [`crate::core::ArtifactKind`].
    pub kind: String,
    /// Content hash of the payload.
    #[serde(default)]
    pub hash: Option<String>,
    /// Lifecycle status.
    pub status: ArtifactStatus,
    /// Payload (empty while running).
    #[serde(default)]
    pub payload: ArtifactPayload,
    /// Free-form metadata: timing, usage, cost.
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Truncated error text for failed rows.
    #[serde(default)]
    pub error: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last status change.
    pub updated_at: Timestamp,
    /// Set when upstream content changed and this row must not be served.
    #[serde(default)]
    pub invalidated_at: Option<Timestamp>,
}

impl Artifact {
    /// Creates a new `Running` artifact.
    #[must_use]
    pub fn running(owner_id: Uuid, kind: impl Into<String>) -> Self {
        let now = now_utc();
        let mut meta = Map::new();
        meta.insert("status".to_string(), Value::String("running".to_string()));
        meta.insert(
            "started_at".to_string(),
            Value::String(crate::utils::timestamps::format_iso8601(&now)),
        );
        Self {
            id: generate_uuid_v7(),
            owner_id,
            kind: kind.into(),
            hash: None,
            status: ArtifactStatus::Running,
            payload: ArtifactPayload::default(),
            meta,
            error: None,
            created_at: now,
            updated_at: now,
            invalidated_at: None,
        }
    }

    /// Returns true if this row may be served from cache.
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        self.status.is_success() && self.invalidated_at.is_none()
    }

    /// Structured payload, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.payload.data.as_ref()
    }

    /// Text payload, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.payload.text.as_deref()
    }

    /// Converts the artifact to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), serde_json::json!(self.id));
        map.insert("owner_id".to_string(), serde_json::json!(self.owner_id));
        map.insert("kind".to_string(), serde_json::json!(self.kind));
        map.insert("status".to_string(), serde_json::json!(self.status));
        map.insert("hash".to_string(), serde_json::json!(self.hash));
        map.insert("created_at".to_string(), serde_json::json!(self.created_at));
        if !self.meta.is_empty() {
            map.insert("meta".to_string(), Value::Object(self.meta.clone()));
        }
        if let Some(ref error) = self.error {
            map.insert("error".to_string(), serde_json::json!(error));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_uuid;

    #[test]
    fn test_running_artifact() {
        let owner = generate_uuid();
        let artifact = Artifact::running(owner, "outline:v1");

        assert_eq!(artifact.owner_id, owner);
        assert_eq!(artifact.status, ArtifactStatus::Running);
        assert!(artifact.meta.contains_key("started_at"));
        assert!(!artifact.is_authoritative());
    }

    #[test]
    fn test_build_output_builders() {
        let out = BuildOutput::text("# Intro")
            .with_data(serde_json::json!({"words": 1}))
            .with_meta("tokens", serde_json::json!(12));

        assert_eq!(out.payload.text.as_deref(), Some("# Intro"));
        assert!(out.payload.data.is_some());
        assert_eq!(out.meta.get("tokens"), Some(&serde_json::json!(12)));
    }

    #[test]
    fn test_payload_hash_distinguishes_content() {
        let a = BuildOutput::text("a").payload;
        let b = BuildOutput::text("b").payload;
        assert_eq!(a.hash(), a.clone().hash());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_artifact_serialization() {
        let artifact = Artifact::running(generate_uuid(), "toc:v1");
        let json = serde_json::to_string(&artifact).unwrap();
        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(artifact, back);
    }
}
