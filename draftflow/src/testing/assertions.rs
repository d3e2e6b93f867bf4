//! Assertions over run results.

use crate::core::Artifact;
use crate::pipeline::RunResult;

/// Asserts that the run finished without errors.
pub fn assert_run_succeeded(result: &RunResult) {
    assert!(
        result.success && result.errors.is_empty(),
        "Expected a successful run, got errors: {:?}",
        result.errors
    );
}

/// Asserts that the run stopped at `step`.
pub fn assert_run_failed_at(result: &RunResult, step: &str) {
    assert!(!result.success, "Expected run to fail at '{step}', but it succeeded");
    let failed = result.first_error().map(|e| e.step.as_str());
    assert_eq!(failed, Some(step), "Expected failure at '{step}', got {:?}", result.errors);
}

/// Asserts that a progress sequence never decreases and ends at `last`.
pub fn assert_progress_monotonic(progress: &[u8], last: u8) {
    assert!(
        progress.windows(2).all(|w| w[0] <= w[1]),
        "Progress went backwards: {progress:?}"
    );
    assert_eq!(progress.last().copied(), Some(last), "Unexpected final progress: {progress:?}");
}

/// Asserts that an artifact is the authoritative row of its key.
pub fn assert_authoritative(artifact: &Artifact) {
    assert!(
        artifact.is_authoritative(),
        "Artifact {} ({}) is not authoritative: status {}, invalidated {:?}",
        artifact.id,
        artifact.kind,
        artifact.status,
        artifact.invalidated_at
    );
}
