//! # Draftflow
//!
//! An idempotent, budget-aware engine for generating long structured
//! documents section by section with an LLM.
//!
//! Every step of a run (outline, per-section context packs, texts and
//! summaries, refinement passes, assembly) produces a versioned artifact.
//! Steps are looked up before they are built, so re-running a document only
//! pays for what is missing or explicitly forced:
//!
//! - **Artifact store**: [`store::ArtifactStore::ensure`] returns the latest
//!   successful artifact or runs the builder exactly once
//! - **Call deduplication**: [`llm::CallDeduplicator`] fingerprints requests
//!   and shares one provider call between identical callers
//! - **Context budgeting**: [`budget::ContextBudgeter`] fits facts, outline and
//!   prior summaries into the token budget, trimming in a fixed order
//! - **Orchestration**: [`pipeline::StepOrchestrator`] runs full documents,
//!   single sections and resumes, invalidating downstream artifacts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use draftflow::prelude::*;
//!
//! let config = EngineConfig::from_env()?;
//! let orchestrator = StepOrchestrator::from_config(&config, provider, artifacts, calls)?;
//! let profile = GenerationProfile::by_name("default")?;
//!
//! let result = orchestrator
//!     .run_full(&document, &profile, RunOptions::new())
//!     .await;
//! assert!(result.success);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod budget;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::budget::{BudgetConfig, ContextBudgeter, ContextPack, Fact, FactSet};
    pub use crate::config::{EngineConfig, LlmConfig, PipelineConfig, QueueConfig};
    pub use crate::core::{Artifact, ArtifactKind, ArtifactStatus, BuildOutput};
    pub use crate::errors::{DraftflowError, GenerationError, StepFailure, StoreError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::llm::{CallDeduplicator, DedupSettings, GenerationProvider, GenerationRequest};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        Document, GenerationProfile, Outline, RunOptions, RunResult, SectionRegistry, SectionSpec,
        StepOrchestrator,
    };
    pub use crate::queue::{JobHandle, JobKind, JobRequest, TaskQueue};
    pub use crate::store::{ArtifactRepository, ArtifactStore, CallRepository, DocumentLocks};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
