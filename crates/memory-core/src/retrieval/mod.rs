//! Retrieval Engine (spec §4.2, the hardest ~30% of the system).
//!
//! *Silence over noise*: a memory surfaces only when at least two
//! independent signals agree it's relevant to the current message. This
//! module is pure with respect to storage — it takes an in-memory slice of
//! candidates and returns a selection plus a diagnostic record; the Engine
//! owns loading candidates from the Store and writing back surfacing state.

mod signals;
mod tokens;

pub use signals::Signals;

use std::collections::{HashMap, HashSet};

use crate::ids::MemoryId;
use crate::memory::{ContextType, Memory, TemporalClass};

/// Tunables; spec defaults are `max_global = 2`, `max_total = 7` (5 project
/// + 2 global).
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    pub max_global: usize,
    pub max_total: usize,
    pub vector_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_global: 2,
            max_total: 7,
            vector_threshold: 0.40,
        }
    }
}

pub struct RetrievalQuery<'a> {
    pub project_id: &'a crate::ids::ProjectId,
    pub message: &'a str,
    pub query_embedding: Option<&'a [f32]>,
    pub already_injected: &'a HashSet<MemoryId>,
}

#[derive(Debug, Clone)]
pub struct SelectedMemory {
    pub memory: Memory,
    pub signals: Signals,
    pub importance_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalDiagnostics {
    pub candidate_count: usize,
    pub passed_gate_count: usize,
    pub trigger_fired: usize,
    pub tags_fired: usize,
    pub domain_fired: usize,
    pub feature_fired: usize,
    pub content_fired: usize,
    pub vector_fired: usize,
    pub global_selected: usize,
    pub project_selected: usize,
    pub related_backfilled: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub selected: Vec<SelectedMemory>,
    pub diagnostics: RetrievalDiagnostics,
}

/// Context-type keyword bonus; fires at most once per candidate (spec
/// §4.2 "at most one such bonus per candidate").
fn context_type_keyword_hit(context_type: ContextType, message_lower: &str) -> bool {
    context_type
        .keyword_bonus_terms()
        .iter()
        .any(|kw| message_lower.contains(kw))
}

const PROBLEM_WORDS: &[&str] = &[
    "error", "bug", "issue", "problem", "wrong", "fail", "broken", "help", "stuck",
];

fn importance_score(memory: &Memory, signals: &Signals, message_lower: &str) -> f64 {
    let mut score = memory.importance_weight;

    if signals.signal_count() >= 4 {
        score += 0.20;
    } else if signals.signal_count() >= 3 {
        score += 0.10;
    }

    if memory.awaiting_implementation {
        score += 0.15;
    }
    if memory.awaiting_decision {
        score += 0.10;
    }

    if context_type_keyword_hit(memory.context_type, message_lower) {
        score += 0.10;
    }

    if memory.problem_solution_pair && PROBLEM_WORDS.iter().any(|w| message_lower.contains(w)) {
        score += 0.10;
    }

    match memory.temporal_class {
        TemporalClass::Eternal => score += 0.10,
        TemporalClass::LongTerm => score += 0.05,
        TemporalClass::Ephemeral if memory.sessions_since_surfaced <= 1 => score += 0.10,
        _ => {}
    }

    if memory.confidence_score < 0.5 {
        score -= 0.10;
    }

    score
}

/// Global-selection priority (spec §4.2 "Priority (lower = higher)").
/// The source table lists a `preference` category (priority 2) that has no
/// counterpart in the closed [`ContextType`] set — there is no memory kind
/// left over from the migration to canonical 11 that maps to it. Treated
/// as an unreachable slot rather than inventing a type; everything not
/// named in the table (debug, milestone, unresolved, state) sorts last.
/// See DESIGN.md.
fn global_priority(context_type: ContextType) -> u8 {
    match context_type {
        ContextType::Technical => 1,
        ContextType::Architecture => 3,
        ContextType::Workflow => 4,
        ContextType::Decision => 5,
        ContextType::Breakthrough => 6,
        ContextType::Philosophy => 7,
        ContextType::Personal => 8,
        ContextType::Debug | ContextType::Milestone | ContextType::Unresolved | ContextType::State => 9,
    }
}

/// Binary pre-filter (spec §4.2 "Pre-filter").
fn passes_pre_filter(memory: &Memory, q: &RetrievalQuery<'_>, message_lower: &str) -> bool {
    if !memory.status.is_retrievable() {
        return false;
    }
    if memory.exclude_from_retrieval || memory.superseded_by.is_some() {
        return false;
    }
    if memory.scope == crate::memory::Scope::Project && &memory.project_id != q.project_id {
        return false;
    }
    if memory
        .anti_triggers
        .iter()
        .any(|phrase| message_lower.contains(&phrase.to_lowercase()))
    {
        return false;
    }
    if q.already_injected.contains(&memory.id) {
        return false;
    }
    true
}

struct ScoredCandidate {
    memory: Memory,
    signals: Signals,
    importance_score: f64,
}

/// Run the full retrieval pipeline over a candidate slice (already loaded
/// from the Store for the relevant scopes).
pub fn select(
    candidates: &[Memory],
    query: &RetrievalQuery<'_>,
    config: &RetrievalConfig,
) -> RetrievalResult {
    let message_lower = query.message.to_lowercase();
    let message_tokens = tokens::significant_tokens(&message_lower);

    let mut diagnostics = RetrievalDiagnostics {
        candidate_count: candidates.len(),
        ..Default::default()
    };

    let mut passing: Vec<ScoredCandidate> = Vec::new();
    for memory in candidates {
        if !passes_pre_filter(memory, query, &message_lower) {
            continue;
        }
        let signals = signals::compute(memory, &message_lower, &message_tokens, query.query_embedding, config);

        if signals.trigger {
            diagnostics.trigger_fired += 1;
        }
        if signals.tags {
            diagnostics.tags_fired += 1;
        }
        if signals.domain {
            diagnostics.domain_fired += 1;
        }
        if signals.feature {
            diagnostics.feature_fired += 1;
        }
        if signals.content {
            diagnostics.content_fired += 1;
        }
        if signals.vector {
            diagnostics.vector_fired += 1;
        }

        if signals.signal_count() < 2 {
            continue;
        }
        diagnostics.passed_gate_count += 1;

        let importance_score = importance_score(memory, &signals, &message_lower);
        passing.push(ScoredCandidate {
            memory: memory.clone(),
            signals,
            importance_score,
        });
    }

    let (mut global, mut project): (Vec<ScoredCandidate>, Vec<ScoredCandidate>) = {
        let mut g = Vec::new();
        let mut p = Vec::new();
        for c in passing {
            if c.memory.scope == crate::memory::Scope::Global {
                g.push(c);
            } else {
                p.push(c);
            }
        }
        (g, p)
    };

    global.sort_by(|a, b| {
        global_priority(a.memory.context_type)
            .cmp(&global_priority(b.memory.context_type))
            .then(b.signals.signal_count().cmp(&a.signals.signal_count()))
            .then(b.importance_score.partial_cmp(&a.importance_score).unwrap_or(std::cmp::Ordering::Equal))
    });

    project.sort_by(|a, b| {
        b.memory
            .action_required
            .cmp(&a.memory.action_required)
            .then(b.signals.signal_count().cmp(&a.signals.signal_count()))
            .then(b.importance_score.partial_cmp(&a.importance_score).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut selected: Vec<SelectedMemory> = Vec::new();
    let mut selected_ids: HashSet<MemoryId> = HashSet::new();

    // `split_off` (not `drain().take()`) so the untaken tail survives as
    // `leftover_global` for the backfill pass below — `Vec::drain`'s
    // destructor removes the whole drained range even when a `take()`
    // adapter stops short, which would otherwise silently discard excess
    // global candidates instead of making them eligible for backfill.
    let split_at = config.max_global.min(global.len());
    let leftover_global: Vec<ScoredCandidate> = global.split_off(split_at);
    for c in global.drain(..) {
        selected_ids.insert(c.memory.id.clone());
        selected.push(SelectedMemory {
            memory: c.memory,
            signals: c.signals,
            importance_score: c.importance_score,
        });
    }
    diagnostics.global_selected = selected.len();

    let remaining_after_global = config.max_total.saturating_sub(selected.len());

    for c in project.drain(..).take(remaining_after_global) {
        selected_ids.insert(c.memory.id.clone());
        selected.push(SelectedMemory {
            memory: c.memory,
            signals: c.signals,
            importance_score: c.importance_score,
        });
    }
    diagnostics.project_selected = selected.len() - diagnostics.global_selected;

    // Related-memory backfill (spec §4.2 "Related backfill").
    let remaining = config.max_total.saturating_sub(selected.len());
    if remaining > 0 {
        let related_union: HashSet<MemoryId> = selected
            .iter()
            .flat_map(|s| s.memory.related_to.iter().cloned())
            .collect();

        let mut leftovers: Vec<ScoredCandidate> = leftover_global.into_iter().chain(project).collect();
        leftovers.sort_by(|a, b| {
            b.signals
                .signal_count()
                .cmp(&a.signals.signal_count())
                .then(b.importance_score.partial_cmp(&a.importance_score).unwrap_or(std::cmp::Ordering::Equal))
        });

        for c in leftovers {
            if selected.len() >= config.max_total {
                break;
            }
            if !selected_ids.contains(&c.memory.id) && related_union.contains(&c.memory.id) {
                selected_ids.insert(c.memory.id.clone());
                diagnostics.related_backfilled += 1;
                selected.push(SelectedMemory {
                    memory: c.memory,
                    signals: c.signals,
                    importance_score: c.importance_score,
                });
            }
        }
    }

    RetrievalResult {
        selected,
        diagnostics,
    }
}

/// The `already_injected_ids` union performed on successful selection
/// (spec §4.2 "Per-session deduplication").
pub fn ids_to_inject(result: &RetrievalResult) -> HashSet<MemoryId> {
    result.selected.iter().map(|s| s.memory.id.clone()).collect()
}

#[allow(dead_code)]
fn signal_counts_by_name(d: &RetrievalDiagnostics) -> HashMap<&'static str, usize> {
    HashMap::from([
        ("trigger", d.trigger_fired),
        ("tags", d.tags_fired),
        ("domain", d.domain_fired),
        ("feature", d.feature_fired),
        ("content", d.content_fired),
        ("vector", d.vector_fired),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SessionId;
    use crate::memory::MemoryBuilder;
    use chrono::Utc;

    fn project() -> crate::ids::ProjectId {
        crate::ids::ProjectId::from("acme")
    }

    fn base_memory() -> Memory {
        MemoryBuilder::new(
            SessionId::from("s1"),
            ContextType::Debug,
            "headline",
            "the retrieval gate was rejecting valid candidates under load",
            "why",
        )
        .project_id(project())
        .scope(crate::memory::Scope::Project)
        .trigger_phrases(vec!["retrieval gate".to_string()])
        .semantic_tags(vec!["retrieval".to_string(), "gate".to_string()])
        .build(1, Utc::now())
    }

    #[test]
    fn gate_rejects_single_signal_candidates() {
        let mut m = base_memory();
        m.trigger_phrases = vec!["totally unrelated phrase".to_string()];
        m.semantic_tags = vec!["unrelated".to_string()];
        let already_injected = HashSet::new();
        let q = RetrievalQuery {
            project_id: &project(),
            message: "why is the retrieval gate dropping candidates",
            query_embedding: None,
            already_injected: &already_injected,
        };
        let result = select(&[m], &q, &RetrievalConfig::default());
        assert!(result.selected.is_empty());
    }

    #[test]
    fn two_signals_clears_the_gate_and_is_selected() {
        let m = base_memory();
        let already_injected = HashSet::new();
        let q = RetrievalQuery {
            project_id: &project(),
            message: "the retrieval gate keeps dropping candidates again",
            query_embedding: None,
            already_injected: &already_injected,
        };
        let result = select(&[m.clone()], &q, &RetrievalConfig::default());
        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.selected[0].memory.id, m.id);
        assert!(result.selected[0].signals.signal_count() >= 2);
    }

    #[test]
    fn already_injected_ids_are_pre_filtered() {
        let m = base_memory();
        let mut already_injected = HashSet::new();
        already_injected.insert(m.id.clone());
        let q = RetrievalQuery {
            project_id: &project(),
            message: "the retrieval gate keeps dropping candidates again",
            query_embedding: None,
            already_injected: &already_injected,
        };
        let result = select(&[m], &q, &RetrievalConfig::default());
        assert!(result.selected.is_empty());
    }

    #[test]
    fn project_scope_mismatch_is_filtered() {
        let m = base_memory();
        let other = crate::ids::ProjectId::from("other-project");
        let already_injected = HashSet::new();
        let q = RetrievalQuery {
            project_id: &other,
            message: "the retrieval gate keeps dropping candidates again",
            query_embedding: None,
            already_injected: &already_injected,
        };
        let result = select(&[m], &q, &RetrievalConfig::default());
        assert!(result.selected.is_empty());
    }

    #[test]
    fn selection_never_exceeds_max_total_or_max_global() {
        let mut candidates = Vec::new();
        for i in 0..20 {
            let mut m = base_memory();
            m.id = crate::ids::MemoryId::generate();
            m.scope = if i % 3 == 0 {
                crate::memory::Scope::Global
            } else {
                crate::memory::Scope::Project
            };
            if m.scope == crate::memory::Scope::Global {
                m.project_id = crate::ids::ProjectId::global();
            }
            candidates.push(m);
        }
        let already_injected = HashSet::new();
        let q = RetrievalQuery {
            project_id: &project(),
            message: "the retrieval gate keeps dropping candidates again",
            query_embedding: None,
            already_injected: &already_injected,
        };
        let config = RetrievalConfig::default();
        let result = select(&candidates, &q, &config);
        assert!(result.selected.len() <= config.max_total);
        assert!(result.diagnostics.global_selected <= config.max_global);
    }
}
