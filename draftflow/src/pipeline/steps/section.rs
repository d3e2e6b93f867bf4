//! Per-section steps: context pack, section text and summary.

use super::{artifact_data, with_call_meta, StepContext};
use crate::budget::{BudgetInputs, BudgetLimits, ContextPack};
use crate::core::{ArtifactKind, BuildOutput};
use crate::errors::DraftflowError;
use crate::pipeline::{Outline, SectionSpec, SectionSummary};
use crate::utils::count_words;
use serde_json::json;

/// Sampling temperature for summaries.
const SUMMARY_TEMPERATURE: f64 = 0.3;
/// Completion cap for summaries.
const SUMMARY_MAX_TOKENS: usize = 500;

/// Summaries of the sections that precede `spec`, in document order.
pub async fn prior_summaries(
    ctx: &StepContext<'_>,
    spec: &SectionSpec,
) -> Result<Vec<SectionSummary>, DraftflowError> {
    let mut summaries = Vec::new();
    for earlier in ctx.registry.ordered().iter().take_while(|s| s.key != spec.key) {
        if let Some(summary) = ctx
            .data::<SectionSummary>(&ArtifactKind::SectionSummary(earlier.key.clone()))
            .await?
        {
            summaries.push(summary);
        }
    }
    Ok(summaries)
}

/// Builds the budgeted request for a section. Makes no external call.
pub async fn context_pack(ctx: &StepContext<'_>, spec: &SectionSpec) -> Result<BuildOutput, DraftflowError> {
    let outline: Outline = artifact_data(&ctx.require(&ArtifactKind::Outline).await?)?;
    let summaries = prior_summaries(ctx, spec).await?;
    let global_context = ctx.document.global_context();

    let inputs = BudgetInputs {
        facts: &ctx.document.facts,
        outline: &outline,
        summaries: &summaries,
        global_context: &global_context,
    };
    let limits = BudgetLimits {
        budget: ctx.profile.request_budget(&spec.key, ctx.budgeter.config()),
        max_facts: ctx.profile.max_facts,
        target_words: ctx.profile.target_words(spec.target_words),
    };
    let pack = ctx.budgeter.build_with(spec, &inputs, &limits);

    Ok(BuildOutput::data(serde_json::to_value(&pack)?)
        .with_meta("prompt_fingerprint", json!(pack.prompt_fingerprint))
        .with_meta("estimated_input_tokens", json!(pack.budget.estimated_input_tokens))
        .with_meta("facts_selected", json!(pack.selected_facts.len()))
        .with_meta("trims_applied", json!(pack.trims_applied)))
}

/// Generates the section text from its context pack.
pub async fn generate(ctx: &StepContext<'_>, spec: &SectionSpec) -> Result<BuildOutput, DraftflowError> {
    let pack: ContextPack = artifact_data(&ctx.require(&ArtifactKind::ContextPack(spec.key.clone())).await?)?;

    let mut params = ctx.params_for(&spec.key);
    params.max_tokens = params
        .max_tokens
        .map(|cap| cap.min(u32::try_from(pack.budget.max_output_tokens).unwrap_or(u32::MAX)));

    let result = ctx.dedup.call_text(pack.system.clone(), pack.user.clone(), params).await?;
    let text = result.text.trim().to_string();
    let words = count_words(&text);
    if words == 0 {
        tracing::warn!(document_id = %ctx.document.id, section = %spec.key, "Generated section is empty");
    }

    let output = BuildOutput::text(text)
        .with_data(json!({
            "key": spec.key,
            "word_count": words,
            "prompt_fingerprint": pack.prompt_fingerprint,
            "facts_used": pack.fact_ids(),
        }))
        .with_meta("word_count", json!(words));
    Ok(with_call_meta(output, &result.meta, ctx.profile))
}

/// Summarizes the generated section into bullets.
pub async fn summarize(ctx: &StepContext<'_>, spec: &SectionSpec) -> Result<BuildOutput, DraftflowError> {
    let section = ctx.require(&ArtifactKind::Section(spec.key.clone())).await?;
    let text = section.text().unwrap_or_default();
    if text.trim().is_empty() {
        return Err(DraftflowError::validation(format!(
            "Section '{}' has no text to summarize",
            spec.key
        )));
    }

    let (min, max) = ctx.profile.summary_bullets;
    let system = format!(
        "You summarize document sections for the writer of the following sections. \
         Reply with {min} to {max} bullet points, one per line, each starting with '- '. \
         Capture terms, decisions and results; do not add new information."
    );
    let user = format!("Section '{}':\n\n{text}", spec.key);
    let params = ctx.params(SUMMARY_TEMPERATURE, SUMMARY_MAX_TOKENS);

    let result = ctx.dedup.call_text(system, user, params).await?;
    let mut summary = SectionSummary::parse(spec.key.clone(), &result.text);
    if summary.points.len() < min {
        tracing::warn!(
            section = %spec.key,
            bullets = summary.points.len(),
            expected = min,
            "Summary has fewer bullets than expected"
        );
    }
    summary.points = ctx.profile.clamp_bullets(summary.points);

    let rendered = summary
        .points
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    let output = BuildOutput::text(rendered)
        .with_data(serde_json::to_value(&summary)?)
        .with_meta("bullet_count", json!(summary.points.len()));
    Ok(with_call_meta(output, &result.meta, ctx.profile))
}
