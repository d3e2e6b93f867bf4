//! Outline step: one JSON call producing the document plan.

use super::{with_call_meta, StepContext};
use crate::core::BuildOutput;
use crate::errors::DraftflowError;
use crate::pipeline::{Outline, SectionRegistry};
use crate::utils::truncate_chars;

/// Facts beyond this many characters are cut from the outline prompt.
const FACTS_PROMPT_LIMIT: usize = 8000;

/// Builds the outline.
pub async fn build(ctx: &StepContext<'_>) -> Result<BuildOutput, DraftflowError> {
    let system = system_prompt(ctx.registry);
    let user = user_prompt(ctx)?;
    let params = ctx.params(
        ctx.profile.budget.temperature * 0.5,
        ctx.profile.budget.max_output_tokens,
    );

    let result = ctx
        .dedup
        .call_json(system, user, params, Some(Outline::schema()))
        .await?;
    let value = result.json.clone().unwrap_or_default();
    let outline = Outline::from_value(&value)?;

    let missing: Vec<&str> = ctx
        .registry
        .keys()
        .into_iter()
        .filter(|key| !outline.contains(key))
        .collect();
    if !missing.is_empty() {
        tracing::warn!(document_id = %ctx.document.id, ?missing, "Outline omits registered sections");
    }

    let output = BuildOutput::data(serde_json::to_value(&outline)?)
        .with_meta("section_count", serde_json::json!(outline.sections.len()));
    Ok(with_call_meta(output, &result.meta, ctx.profile))
}

fn system_prompt(registry: &SectionRegistry) -> String {
    let sections = registry
        .ordered()
        .iter()
        .map(|s| format!("    {{\"key\": \"{}\", \"title\": \"{}\", \"points\": [\"...\"]}}", s.key, s.title))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "You are a technical writer planning a structured document.\n\
         Respond with a JSON object of this shape:\n\
         {{\n  \"title\": \"Document title\",\n  \"sections\": [\n{sections}\n  ]\n}}\n\
         Keep the section keys exactly as given; give each section two to five points."
    )
}

fn user_prompt(ctx: &StepContext<'_>) -> Result<String, DraftflowError> {
    let document = ctx.document;
    let facts = serde_json::to_string_pretty(&document.facts)?;
    let params = serde_json::to_string(&document.params)?;
    let mut prompt = format!(
        "Analysis facts:\n{}\n\nPlan a document titled: {}\nLanguage: {}",
        truncate_chars(&facts, FACTS_PROMPT_LIMIT),
        document.title,
        document.language,
    );
    if !document.topic.trim().is_empty() {
        prompt.push_str(&format!("\nTopic: {}", document.topic.trim()));
    }
    if !document.params.is_empty() {
        prompt.push_str(&format!("\nAdditional parameters: {params}"));
    }
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_lists_registry_keys() {
        let prompt = system_prompt(&SectionRegistry::defaults());
        for key in SectionRegistry::defaults().keys() {
            assert!(prompt.contains(&format!("\"key\": \"{key}\"")));
        }
    }
}
