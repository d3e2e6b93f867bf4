//! Core domain model types for draftflow.
//!
//! This module contains the records shared by the stores and the engine:
//! - Artifact and call-record status enums
//! - The artifact row and its payload
//! - Artifact kinds (step identifiers)
//! - The call dedup/lock record

mod artifact;
mod call_record;
mod kind;
mod status;

pub use artifact::{Artifact, ArtifactPayload, BuildOutput};
pub use call_record::{CallRecord, CallUsage};
pub use kind::ArtifactKind;
pub use status::{ArtifactStatus, CallStatus};
