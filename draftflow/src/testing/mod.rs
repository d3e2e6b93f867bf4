//! Test support: a scripted generation provider, sample data and run
//! assertions.

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_authoritative, assert_progress_monotonic, assert_run_failed_at, assert_run_succeeded,
};
pub use fixtures::{
    document_provider, document_response, sample_document, sample_facts, sample_outline,
    two_section_registry, TestEngine,
};
pub use mocks::ScriptedProvider;
