//! Benchmarks for prompt budgeting and call fingerprinting.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use draftflow::budget::{BudgetConfig, ContextBudgeter};
use draftflow::llm::{call_fingerprint, normalize_params};
use draftflow::pipeline::{SectionRegistry, SectionSummary};
use draftflow::testing::{sample_facts, sample_outline};
use serde_json::{json, Map, Value};

fn budget_benchmark(c: &mut Criterion) {
    let registry = SectionRegistry::defaults();
    let facts = sample_facts();
    let outline = sample_outline();
    let summaries: Vec<SectionSummary> = registry
        .ordered()
        .iter()
        .map(|spec| {
            SectionSummary::new(
                spec.key.clone(),
                (0..6).map(|i| format!("Point {i} of {}", spec.key)).collect(),
            )
        })
        .collect();

    let budgeter = ContextBudgeter::new(BudgetConfig::default());
    let Some(spec) = registry.get("conclusion") else {
        return;
    };
    c.bench_function("context_pack_conclusion", |b| {
        b.iter(|| {
            black_box(budgeter.build(
                black_box(spec),
                &facts,
                &outline,
                &summaries,
                "Design and implementation of an order processing service",
            ))
        });
    });

    let tight = ContextBudgeter::new(BudgetConfig {
        max_input_tokens: 400,
        ..BudgetConfig::default()
    });
    c.bench_function("context_pack_trimmed", |b| {
        b.iter(|| black_box(tight.build(spec, &facts, &outline, &summaries, "")));
    });
}

fn fingerprint_benchmark(c: &mut Criterion) {
    let mut raw = Map::new();
    raw.insert("temperature".to_string(), json!(0.3));
    raw.insert("max_tokens".to_string(), json!(1200));
    raw.insert("response_format".to_string(), Value::Null);
    let params = normalize_params(&raw);
    let user = "Write section 'intro' (Introduction) of the document.\n".repeat(40);
    c.bench_function("call_fingerprint", |b| {
        b.iter(|| {
            black_box(call_fingerprint(
                "gpt-4o-mini",
                "You are a technical writer.",
                black_box(&user),
                &params,
                None,
            ))
        });
    });
}

criterion_group!(benches, budget_benchmark, fingerprint_benchmark);
criterion_main!(benches);
