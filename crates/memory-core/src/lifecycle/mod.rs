//! Lifecycle Manager (spec §4.3). Invoked once per curator pass: reconciles
//! relationships between newly-created memories and the existing corpus,
//! applies implicit state transitions from session evidence, maintains the
//! personal primer, and emits a management log.
//!
//! Decay itself (spec §4.3 item 3) runs at session start rather than here;
//! see [`apply_decay`], called by the Engine before `get_context` reads a
//! project's memories.

mod reconcile;
mod transitions;

use std::time::Instant;
use thiserror::Error;

use crate::clock::Clock;
use crate::ids::{MemoryId, ProjectId, SessionId};
use crate::memory::{ManagementLog, Memory, RelationshipError, Status};
use crate::store::{ProjectDb, Store, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid status transition: {0}")]
    InvalidTransition(#[from] RelationshipError),
    #[error("referenced memory not found: {0}")]
    MissingReference(MemoryId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct LifecycleInput<'a> {
    pub new_memory_ids: &'a [MemoryId],
    pub session_summary: &'a str,
    pub project_snapshot: &'a str,
    pub session_number: u32,
    pub project_id: &'a ProjectId,
    pub session_id: &'a SessionId,
}

/// Runs one Lifecycle Manager pass and returns the management log it wrote.
///
/// `personal_enabled` mirrors `MEMORY_PERSONAL_ENABLED` (spec §6): when
/// false, step 4 (primer maintenance) is skipped entirely, leaving the
/// primer file untouched even if the curation pass produced personal-scope
/// memories.
pub fn run(
    store: &Store,
    db: &ProjectDb,
    clock: &dyn Clock,
    personal_enabled: bool,
    input: LifecycleInput<'_>,
) -> Result<ManagementLog, LifecycleError> {
    let started = Instant::now();
    let now = clock.now();

    let mut superseded = 0u32;
    let mut resolved = 0u32;
    let mut linked = 0u32;
    let mut files_touched = Vec::new();

    for new_id in input.new_memory_ids {
        let new_memory = db
            .memories
            .get(new_id)
            .ok_or_else(|| LifecycleError::MissingReference(new_id.clone()))?;
        files_touched.extend(new_memory.related_files.iter().cloned());

        let outcome = reconcile::reconcile_one(db, &new_memory, now)?;
        superseded += outcome.superseded;
        resolved += outcome.resolved;
        linked += outcome.linked;
    }

    let action_cleared = transitions::apply_implicit_transitions(
        db,
        input.session_summary,
        input.project_snapshot,
        input.session_number,
        now,
    )?;

    if personal_enabled {
        maintain_primer(store, db, input.new_memory_ids, now)?;
    }

    let log = ManagementLog {
        id: MemoryId::generate(),
        project_id: input.project_id.clone(),
        session_id: input.session_id.clone(),
        processed: input.new_memory_ids.len() as u32,
        superseded,
        resolved,
        action_cleared,
        linked,
        files_touched,
        success: true,
        duration_ms: started.elapsed().as_millis() as u64,
        created_at: now,
        notes: Vec::new(),
    };

    db.management_logs.append(log.clone())?;
    Ok(log)
}

/// Applies one decay tick to every memory in the project with `fade_rate >
/// 0`, archiving expired ephemeral memories (spec §4.3 item 3). Called at
/// session start, independent of a curator pass.
pub fn apply_decay(db: &ProjectDb, clock: &dyn Clock) -> Result<(), LifecycleError> {
    let now = clock.now();
    for memory in db.memories.all() {
        if memory.fade_rate <= 0.0 {
            continue;
        }
        db.memories.update(&memory.id, |m| {
            m.apply_decay_tick();
            if m.should_expire() && m.status == Status::Active {
                // Archiving only fails if the transition itself is invalid,
                // which can't happen for Active -> Archived.
                let _ = m.transition_status(Status::Archived);
            }
            m.updated_at = now;
        })?;
    }
    Ok(())
}

/// Resets decay state for every memory that was just surfaced (spec §4.3
/// item 3 "On surfacing: reset ... restore retrieval_weight").
pub fn record_surfacing(db: &ProjectDb, surfaced_ids: &[MemoryId], session_number: u32) -> Result<(), LifecycleError> {
    for id in surfaced_ids {
        db.memories.update(id, |m| {
            m.reset_decay_on_surface(session_number);
        })?;
    }
    Ok(())
}

const PERSONAL_PRIMER_HEADER: &str = "## Remembered";

fn maintain_primer(
    store: &Store,
    db: &ProjectDb,
    new_memory_ids: &[MemoryId],
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), LifecycleError> {
    let primer_worthy: Vec<Memory> = new_memory_ids
        .iter()
        .filter_map(|id| db.memories.get(id))
        .filter(|m| m.context_type == crate::memory::ContextType::Personal && m.scope == crate::memory::Scope::Global)
        .collect();

    if primer_worthy.is_empty() {
        return Ok(());
    }

    let current = store.primer();
    let mut markdown = current.markdown.clone();
    if !markdown.contains(PERSONAL_PRIMER_HEADER) {
        if !markdown.is_empty() {
            markdown.push_str("\n\n");
        }
        markdown.push_str(PERSONAL_PRIMER_HEADER);
        markdown.push('\n');
    }

    for memory in &primer_worthy {
        let bullet = format!("- {}", memory.content.trim());
        if !markdown.contains(&bullet) {
            markdown.push_str(&bullet);
            markdown.push('\n');
        }
    }

    store.set_primer(crate::memory::PersonalPrimer {
        markdown,
        updated_at: now,
    })?;
    Ok(())
}
