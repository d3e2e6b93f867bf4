//! Document pipeline: section registry, profiles, step builders and the
//! orchestrator that runs them over the artifact store.

mod model;
mod orchestrator;
mod profiles;
mod spec;
pub mod steps;


pub use model::{Document, Outline, OutlineSection, SectionSummary};
pub use orchestrator::{
    step_name, ProgressFn, RunMode, RunOptions, RunResult, StepOrchestrator, StepRecord,
};
pub use profiles::{GenerationProfile, SectionBudget, StageToggles};
pub use spec::{OutlineMode, SectionRegistry, SectionSpec, StageFlag, StepSpec, WritingStyle};
pub use steps::assemble::{DocumentDraft, SectionDraft, TextSource};
pub use steps::literature::{Literature, LiteratureSource};
pub use steps::quality::{QualityIssue, QualityReport, QualityStats, Severity};
pub use steps::refine::{RefinedSection, RefinementReport};
pub use steps::toc::{Toc, TocItem, TocSource};
