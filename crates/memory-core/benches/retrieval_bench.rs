//! Checks the sub-10ms-at-10k-memories target (spec §5 "Scheduling model").

use std::collections::HashSet;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use memory_core::ids::{ProjectId, SessionId};
use memory_core::memory::{ContextType, MemoryBuilder, Scope};
use memory_core::retrieval::{select, RetrievalConfig, RetrievalQuery};

fn corpus(size: usize, project: &ProjectId) -> Vec<memory_core::memory::Memory> {
    let context_types = [
        ContextType::Technical,
        ContextType::Debug,
        ContextType::Architecture,
        ContextType::Decision,
        ContextType::Workflow,
    ];

    (0..size)
        .map(|i| {
            let context_type = context_types[i % context_types.len()];
            MemoryBuilder::new(
                SessionId::from("bench-session"),
                context_type,
                format!("headline {i}"),
                format!(
                    "notes about retrieval gate tuning and embedding staleness, entry {i}, \
                     covering debugging sessions and architecture decisions alike"
                ),
                "bench fixture",
            )
            .project_id(project.clone())
            .scope(Scope::Project)
            .trigger_phrases(vec!["debugging retrieval gate".to_string()])
            .semantic_tags(vec!["retrieval".to_string(), "gate".to_string(), format!("tag-{i}")])
            .domain("retrieval")
            .build(1, Utc::now())
        })
        .collect()
}

fn bench_retrieval(c: &mut Criterion) {
    let project = ProjectId::from("bench-project");
    let candidates = corpus(10_000, &project);
    let already_injected = HashSet::new();

    c.bench_function("select_over_10k_candidates", |b| {
        b.iter(|| {
            let query = RetrievalQuery {
                project_id: &project,
                message: "I'm debugging the retrieval gate again, architecture decisions pending",
                query_embedding: None,
                already_injected: &already_injected,
            };
            let result = select(black_box(&candidates), &query, &RetrievalConfig::default());
            black_box(result.selected.len())
        })
    });
}

criterion_group!(benches, bench_retrieval);
criterion_main!(benches);
