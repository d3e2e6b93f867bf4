//! Sample data and a wired-up in-memory engine for tests.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde_json::json;

use super::ScriptedProvider;
use crate::budget::{Fact, FactSet};
use crate::errors::GenerationError;
use crate::events::CollectingEventSink;
use crate::llm::{CallDeduplicator, DedupSettings, GenerationRequest, ProviderResponse, RetryPolicy};
use crate::pipeline::{Document, Outline, OutlineSection, SectionRegistry, SectionSpec, StepOrchestrator};
use crate::store::{ArtifactStore, InMemoryArtifactRepository, InMemoryCallRepository};

#[allow(clippy::expect_used)]
static OUTLINE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""key": "([^"]+)""#).expect("outline key pattern is valid"));

#[allow(clippy::expect_used)]
static TASK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Write section '([^']+)'").expect("task pattern is valid"));

/// Facts of a small web service, tagged for every default section.
#[must_use]
pub fn sample_facts() -> FactSet {
    FactSet::new(vec![
        Fact::new("project", "Orders service for a small online shop")
            .with_tags(["project_name", "description", "purpose"]),
        Fact::new("stack", "Python 3.12 with Django and Celery")
            .with_tags(["tech_stack", "frameworks"])
            .with_details(json!({"web": "Django 5", "tasks": "Celery 5", "db": "PostgreSQL 16"})),
        Fact::new("layers", "Three layers: HTTP views, domain services, repositories")
            .with_tags(["architecture", "layers"])
            .with_details(json!({"views": "orders/views.py", "services": "orders/services.py"})),
        Fact::new("modules", "Modules: orders, payments, inventory, notifications")
            .with_tags(["modules", "architecture"])
            .with_key_path("modules")
            .with_details(json!({"count": 4, "largest": "orders"})),
        Fact::new("storage", "PostgreSQL for orders, Redis for sessions and task results")
            .with_tags(["storage", "infra"])
            .with_details(json!({"primary": "postgres", "cache": "redis", "migrations": 42})),
        Fact::new("queue", "Celery workers consume order events from RabbitMQ")
            .with_tags(["queue", "infra"])
            .with_details(json!({"broker": "rabbitmq", "workers": 4})),
        Fact::new("endpoints", "REST endpoints for orders, carts and refunds")
            .with_tags(["api", "endpoints"])
            .with_key_path("api.endpoints.orders")
            .with_details(json!({"GET /orders": "list", "POST /orders": "create", "POST /refunds": "refund"})),
        Fact::new("models", "Models Order, OrderLine, Payment and Refund")
            .with_tags(["models"])
            .with_key_path("models")
            .with_details(json!({"Order": ["id", "status", "total"], "Payment": ["id", "amount"]})),
        Fact::new("tests", "312 pytest tests with 87% line coverage")
            .with_tags(["testing", "quality"])
            .with_details(json!({"unit": 280, "integration": 32})),
    ])
}

/// Outline matching [`SectionRegistry::defaults`].
#[must_use]
pub fn sample_outline() -> Outline {
    Outline {
        title: "Orders Service".to_string(),
        sections: vec![
            OutlineSection::new("intro", "Introduction").with_points(["Motivation", "Goals", "Scope"]),
            OutlineSection::new("theory", "Theoretical Background")
                .with_points(["Web frameworks", "Task queues", "Relational storage"]),
            OutlineSection::new("analysis", "Domain Analysis").with_points(["Order lifecycle", "Payments"]),
            OutlineSection::new("architecture", "System Architecture")
                .with_points(["Layers", "Modules", "Storage", "Messaging"]),
            OutlineSection::new("implementation", "Implementation")
                .with_points(["Endpoints", "Models", "Background jobs"]),
            OutlineSection::new("testing", "Testing").with_points(["Unit tests", "Integration tests"]),
            OutlineSection::new("conclusion", "Conclusion").with_points(["Results", "Future work"]),
        ],
    }
}

/// Registry with just `intro` and `conclusion`.
#[must_use]
pub fn two_section_registry() -> SectionRegistry {
    SectionRegistry::empty()
        .with_section(
            SectionSpec::new("intro", "Introduction", 1)
                .with_target_words(20, 400)
                .with_fact_tags(["project_name", "purpose"])
                .with_summaries(false),
        )
        .with_section(
            SectionSpec::new("conclusion", "Conclusion", 2)
                .with_dependencies(["intro"])
                .with_target_words(20, 400)
                .with_fact_tags(["project_name", "purpose"]),
        )
}

/// Registry with sections `a`, `b` and `c`.
#[must_use]
pub fn three_section_registry() -> SectionRegistry {
    ["a", "b", "c"]
        .into_iter()
        .zip(1..)
        .fold(SectionRegistry::empty(), |registry, (key, order)| {
            registry.with_section(
                SectionSpec::new(key, format!("Section {}", key.to_uppercase()), order)
                    .with_target_words(20, 400)
                    .with_fact_tags(["modules"]),
            )
        })
}

/// A document carrying [`sample_facts`].
#[must_use]
pub fn sample_document() -> Document {
    Document::new("Orders Service")
        .with_topic("Design and implementation of an order processing service")
        .with_facts(sample_facts())
}

/// Section key the request is writing, if it is a section request.
#[must_use]
pub fn requested_section(request: &GenerationRequest) -> Option<String> {
    TASK_RE.captures(&request.user).map(|c| c[1].to_string())
}

/// Plausible answers for every request the pipeline makes: outline and
/// literature JSON, summary bullets, and section prose.
pub fn document_response(request: &GenerationRequest) -> Result<ProviderResponse, GenerationError> {
    let text = if request.json_mode && request.system.contains("planning a structured document") {
        let keys: Vec<String> = OUTLINE_KEY_RE
            .captures_iter(&request.system)
            .map(|c| c[1].to_string())
            .collect();
        let sections: Vec<_> = keys
            .iter()
            .map(|key| {
                json!({
                    "key": key,
                    "title": format!("{} chapter", key.to_uppercase()),
                    "points": [format!("Scope of {key}"), format!("Findings on {key}")],
                })
            })
            .collect();
        json!({"title": "Orders Service", "sections": sections}).to_string()
    } else if request.json_mode {
        json!({
            "sources": [
                {"type": "book", "citation": "Fowler M. Patterns of Enterprise Application Architecture. 2002.", "relevance": "architecture"},
                {"type": "web", "citation": "Django documentation. https://docs.djangoproject.com", "relevance": "technology"}
            ]
        })
        .to_string()
    } else if request.system.contains("summarize document sections") {
        [
            "- The section states its scope",
            "- Key terms are introduced",
            "- The main decision is explained",
            "- Results are compared with goals",
            "- Open issues are listed",
            "- The next section is motivated",
        ]
        .join("\n")
    } else if let Some(key) = requested_section(request) {
        format!(
            "The {key} section describes how the orders service accepts, validates and stores \
             customer orders. Payments are captured asynchronously by background workers, while \
             inventory reservations expire after fifteen minutes. Each module owns its tables \
             and publishes events when state changes, which keeps notifications decoupled from \
             checkout latency and lets refunds reuse the same audit trail."
        )
    } else {
        // Enrichment and editing passes echo a revised section.
        format!("Revised: {}", request.user.lines().last().unwrap_or_default())
    };
    Ok(ProviderResponse::text(text).with_usage(120, 80))
}

/// A provider answering every pipeline request with [`document_response`].
#[must_use]
pub fn document_provider() -> ScriptedProvider {
    ScriptedProvider::new(|request, _| document_response(request))
}

/// An in-memory engine with handles on every backend.
#[derive(Debug, Clone)]
pub struct TestEngine {
    /// The scripted provider.
    pub provider: Arc<ScriptedProvider>,
    /// Artifact rows.
    pub artifacts: InMemoryArtifactRepository,
    /// Call records.
    pub calls: InMemoryCallRepository,
    /// Collected run events.
    pub events: Arc<CollectingEventSink>,
    /// The orchestrator under test.
    pub orchestrator: Arc<StepOrchestrator>,
}

impl TestEngine {
    /// Wires an engine around `provider` and `registry`. Retries and lock
    /// polling are near-immediate so tests do not sleep.
    #[must_use]
    pub fn new(provider: ScriptedProvider, registry: SectionRegistry) -> Self {
        let provider = Arc::new(provider);
        let artifacts = InMemoryArtifactRepository::new();
        let calls = InMemoryCallRepository::new();
        let events = Arc::new(CollectingEventSink::new());

        let settings = DedupSettings::default()
            .with_poll_interval(Duration::from_millis(5))
            .with_retry(
                RetryPolicy::new()
                    .with_max_attempts(2)
                    .with_base_delay_ms(1)
                    .with_max_delay_ms(2),
            );
        let dedup = CallDeduplicator::new(provider.clone(), Arc::new(calls.clone()), settings);
        let orchestrator = StepOrchestrator::new(ArtifactStore::new(Arc::new(artifacts.clone())), dedup)
            .with_registry(registry)
            .with_event_sink(events.clone());

        Self {
            provider,
            artifacts,
            calls,
            events,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Engine over the default seven sections.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(document_provider(), SectionRegistry::defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(system: &str, user: &str, json_mode: bool) -> GenerationRequest {
        GenerationRequest {
            system: system.to_string(),
            user: user.to_string(),
            model: "m".to_string(),
            temperature: None,
            max_tokens: None,
            json_mode,
            schema: None,
        }
    }

    #[test]
    fn test_patterns_compile() {
        LazyLock::force(&OUTLINE_KEY_RE);
        LazyLock::force(&TASK_RE);
    }

    #[test]
    fn test_outline_response_uses_prompt_keys() {
        let system = "You are a technical writer planning a structured document.\n\
                      {\"key\": \"intro\", \"title\": \"Introduction\"}, {\"key\": \"conclusion\"}";
        let response = document_response(&request(system, "plan", true)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&response.text).unwrap();
        let outline = Outline::from_value(&value).unwrap();
        assert!(outline.contains("intro"));
        assert!(outline.contains("conclusion"));
    }

    #[test]
    fn test_section_response_names_section() {
        let req = request("writer", "# TASK\nWrite section 'intro' (Introduction) of the document.", false);
        assert_eq!(requested_section(&req).as_deref(), Some("intro"));
        assert!(document_response(&req).unwrap().text.contains("The intro section"));
    }

    #[test]
    fn test_fixtures_cover_default_sections() {
        let facts = sample_facts();
        let outline = sample_outline();
        for spec in SectionRegistry::defaults().ordered() {
            assert!(outline.contains(&spec.key), "{} missing from outline", spec.key);
            assert!(
                !facts.select(&spec.fact_keys, &spec.fact_tags, 10).is_empty(),
                "no facts for {}",
                spec.key
            );
        }
    }
}
