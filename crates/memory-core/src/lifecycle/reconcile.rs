//! Relationship reconciliation (spec §4.3 item 1).

use chrono::{DateTime, Utc};

use super::LifecycleError;
use crate::ids::MemoryId;
use crate::memory::{ContextType, Memory, Status};
use crate::store::ProjectDb;

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub superseded: u32,
    pub resolved: u32,
    pub linked: u32,
}

/// Crude "this supersedes the thing it's talking about" detector. Looks for
/// explicit reversal language in the new memory's own text rather than
/// trying to diff against the old content.
const REVERSAL_MARKERS: &[&str] = &[
    "instead of", "no longer", "replaces", "supersedes", "deprecated", "reversed", "changed our mind", "rather than",
];

fn has_reversal_language(memory: &Memory) -> bool {
    let text = format!("{} {}", memory.content, memory.reasoning).to_lowercase();
    REVERSAL_MARKERS.iter().any(|m| text.contains(m))
}

fn same_domain(a: &Memory, b: &Memory) -> bool {
    matches!((&a.domain, &b.domain), (Some(x), Some(y)) if x.eq_ignore_ascii_case(y))
}

fn same_feature(a: &Memory, b: &Memory) -> bool {
    matches!((&a.feature, &b.feature), (Some(x), Some(y)) if x.eq_ignore_ascii_case(y))
}

fn shares_related_file(a: &Memory, b: &Memory) -> bool {
    a.related_files.iter().any(|f| b.related_files.contains(f))
}

fn supersede(db: &ProjectDb, old_id: &MemoryId, new_id: &MemoryId, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    db.memories.update(old_id, |m| {
        // Active -> Superseded is always legal; swallow the (unreachable)
        // error rather than aborting the whole reconciliation pass.
        let _ = m.transition_status(Status::Superseded);
        m.superseded_by = Some(new_id.clone());
        m.updated_at = now;
    })?;
    Ok(())
}

fn resolve(db: &ProjectDb, old_id: &MemoryId, new_id: &MemoryId, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    db.memories.update(old_id, |m| {
        let _ = m.transition_status(Status::Superseded);
        m.resolved_by = Some(new_id.clone());
        m.updated_at = now;
    })?;
    Ok(())
}

fn link(db: &ProjectDb, a_id: &MemoryId, b_id: &MemoryId, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    db.memories.update(a_id, |m| {
        m.related_to.insert(b_id.clone());
        m.updated_at = now;
    })?;
    db.memories.update(b_id, |m| {
        m.related_to.insert(a_id.clone());
        m.updated_at = now;
    })?;
    Ok(())
}

/// Reconcile one newly-created memory against the existing corpus.
pub fn reconcile_one(db: &ProjectDb, new_memory: &Memory, now: DateTime<Utc>) -> Result<ReconcileOutcome, LifecycleError> {
    let mut outcome = ReconcileOutcome::default();

    let candidates: Vec<Memory> = db
        .memories
        .all()
        .into_iter()
        .filter(|o| o.id != new_memory.id && o.status == Status::Active)
        .filter(|o| same_domain(o, new_memory) || same_feature(o, new_memory) || shares_related_file(o, new_memory))
        .collect();

    // state-vs-state: latest wins within a domain.
    let mut supersede_targets: Vec<MemoryId> = Vec::new();
    if new_memory.context_type == ContextType::State {
        supersede_targets.extend(
            candidates
                .iter()
                .filter(|o| o.context_type == ContextType::State && same_domain(o, new_memory))
                .map(|o| o.id.clone()),
        );
    }

    // architecture/decision with explicit reversal language, same domain+feature.
    if matches!(new_memory.context_type, ContextType::Architecture | ContextType::Decision)
        && has_reversal_language(new_memory)
    {
        supersede_targets.extend(
            candidates
                .iter()
                .filter(|o| o.context_type == new_memory.context_type && same_domain(o, new_memory) && same_feature(o, new_memory))
                .map(|o| o.id.clone()),
        );
    }

    supersede_targets.sort();
    supersede_targets.dedup();

    // `supersedes`/`superseded_by` is a 1:1 inverse (spec §3 Data Model), so
    // a new memory can directly supersede at most one predecessor. When more
    // than one same-domain duplicate matches, chain the duplicates through
    // each other oldest-to-newest first, then have the newest of them
    // superseded by `new_memory`; every link stays 1:1.
    if !supersede_targets.is_empty() {
        let mut ordered: Vec<&Memory> =
            candidates.iter().filter(|o| supersede_targets.contains(&o.id)).collect();
        ordered.sort_by_key(|o| o.created_at);

        for pair in ordered.windows(2) {
            supersede(db, &pair[0].id, &pair[1].id, now)?;
            outcome.superseded += 1;
            db.memories.update(&pair[1].id, |m| {
                m.supersedes = Some(pair[0].id.clone());
                m.updated_at = now;
            })?;
        }

        let newest_old = ordered.last().expect("non-empty").id.clone();
        supersede(db, &newest_old, &new_memory.id, now)?;
        outcome.superseded += 1;
        db.memories.update(&new_memory.id, |m| {
            m.supersedes = Some(newest_old);
            m.updated_at = now;
        })?;
    }

    // resolution: memories explicitly named in `resolves`.
    for resolved_id in &new_memory.resolves {
        if db.memories.get(resolved_id).is_none() {
            return Err(LifecycleError::MissingReference(resolved_id.clone()));
        }
        resolve(db, resolved_id, &new_memory.id, now)?;
        outcome.resolved += 1;
    }

    // everything else that shares metadata but wasn't superseded/resolved
    // becomes a related link.
    let handled: std::collections::HashSet<&MemoryId> = supersede_targets
        .iter()
        .chain(new_memory.resolves.iter())
        .collect();
    for candidate in &candidates {
        if handled.contains(&candidate.id) {
            continue;
        }
        link(db, &new_memory.id, &candidate.id, now)?;
        outcome.linked += 1;
    }

    Ok(outcome)
}
