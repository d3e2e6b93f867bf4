//! Run lifecycle events.
//!
//! The orchestrator reports what it does through an [`EventSink`] passed in
//! at construction. Events are fire-and-forget: a sink never fails a run.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde_json::{json, Value};
use uuid::Uuid;

/// A lifecycle event of a document run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A run began.
    RunStarted {
        /// Document id.
        document_id: Uuid,
        /// Run mode (`full`, `section`, `resume`).
        mode: String,
        /// Profile name.
        profile: String,
    },
    /// A step is about to be ensured.
    StepStarted {
        /// Document id.
        document_id: Uuid,
        /// Step key.
        step: String,
    },
    /// A step produced or reused its artifact.
    StepCompleted {
        /// Document id.
        document_id: Uuid,
        /// Step key.
        step: String,
        /// Artifact id.
        artifact_id: Uuid,
        /// True when served from cache.
        cached: bool,
        /// Wall time of the step.
        duration_ms: u64,
    },
    /// A step failed; the run stops.
    StepFailed {
        /// Document id.
        document_id: Uuid,
        /// Step key.
        step: String,
        /// Error message.
        error: String,
    },
    /// Assembly artifacts were invalidated after new content.
    ArtifactsInvalidated {
        /// Document id.
        document_id: Uuid,
        /// Number of rows flagged.
        count: usize,
    },
    /// A run finished successfully.
    RunCompleted {
        /// Document id.
        document_id: Uuid,
        /// Artifacts built.
        created: usize,
        /// Artifacts reused.
        cached: usize,
        /// Wall time of the run.
        duration_ms: u64,
    },
    /// A run stopped at a failing step.
    RunFailed {
        /// Document id.
        document_id: Uuid,
        /// Failing step.
        step: String,
        /// Error message.
        error: String,
    },
}

impl PipelineEvent {
    /// Dotted event type, e.g. `step.completed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::StepStarted { .. } => "step.started",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepFailed { .. } => "step.failed",
            Self::ArtifactsInvalidated { .. } => "artifacts.invalidated",
            Self::RunCompleted { .. } => "run.completed",
            Self::RunFailed { .. } => "run.failed",
        }
    }

    /// Event payload.
    #[must_use]
    pub fn data(&self) -> Value {
        match self {
            Self::RunStarted {
                document_id,
                mode,
                profile,
            } => json!({"document_id": document_id, "mode": mode, "profile": profile}),
            Self::StepStarted { document_id, step } => {
                json!({"document_id": document_id, "step": step})
            }
            Self::StepCompleted {
                document_id,
                step,
                artifact_id,
                cached,
                duration_ms,
            } => json!({
                "document_id": document_id,
                "step": step,
                "artifact_id": artifact_id,
                "cached": cached,
                "duration_ms": duration_ms,
            }),
            Self::StepFailed {
                document_id,
                step,
                error,
            }
            | Self::RunFailed {
                document_id,
                step,
                error,
            } => json!({"document_id": document_id, "step": step, "error": error}),
            Self::ArtifactsInvalidated { document_id, count } => {
                json!({"document_id": document_id, "count": count})
            }
            Self::RunCompleted {
                document_id,
                created,
                cached,
                duration_ms,
            } => json!({
                "document_id": document_id,
                "created": created,
                "cached": cached,
                "duration_ms": duration_ms,
            }),
        }
    }

    /// Sends the event to `sink` without waiting.
    pub fn send(self, sink: &dyn EventSink) {
        sink.try_emit(self.event_type(), Some(self.data()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types_and_payloads() {
        let document_id = Uuid::new_v4();
        let event = PipelineEvent::StepFailed {
            document_id,
            step: "section:intro".to_string(),
            error: "boom".to_string(),
        };
        assert_eq!(event.event_type(), "step.failed");
        assert_eq!(event.data()["step"], "section:intro");

        let sink = CollectingEventSink::new();
        PipelineEvent::ArtifactsInvalidated { document_id, count: 2 }.send(&sink);
        let events = sink.events();
        assert_eq!(events[0].0, "artifacts.invalidated");
        assert_eq!(events[0].1.as_ref().unwrap()["count"], 2);
    }
}
