//! Implicit state transitions driven by session evidence (spec §4.3 item 2).

use chrono::{DateTime, Utc};

use super::LifecycleError;
use crate::ids::MemoryId;
use crate::memory::{ContextType, Memory, Status};
use crate::store::ProjectDb;

/// Verbs/phrases a curator's session summary or project snapshot uses to
/// describe finished work. Deliberately broad: this evidence signal is only
/// one of three the action-cleared sweep checks (spec §4.3 item 2), and a
/// narrow verb list misses ordinary phrasing like "ran the migration and
/// regenerated the embeddings".
const COMPLETION_VERBS: &[&str] = &[
    "implemented",
    "done",
    "finished",
    "completed",
    "shipped",
    "merged",
    "fixed",
    "resolved",
    "built",
    "landed",
    "addressed",
    "closed",
    "handled",
    "migrated",
    "migration",
    "regenerated",
    "updated",
    "applied",
    "patched",
    "deployed",
    "ran",
];

fn mentions_completion(evidence: &str) -> bool {
    COMPLETION_VERBS.iter().any(|v| evidence.contains(v))
}

fn mentions_subject(evidence: &str, domain: &Option<String>, feature: &Option<String>) -> bool {
    domain.as_deref().is_some_and(|d| evidence.contains(&d.to_lowercase()))
        || feature.as_deref().is_some_and(|f| evidence.contains(&f.to_lowercase()))
}

/// Whether `candidate` (a memory minted this session) counts as corroborating
/// evidence that `subject`'s outstanding work got done: a milestone record or
/// a solved problem/solution pair, in the same domain or feature.
fn corroborates(subject: &Memory, candidate: &Memory, session_number: u32) -> bool {
    if candidate.id == subject.id || candidate.session_created != session_number {
        return false;
    }
    let same_subject = matches!((&subject.domain, &candidate.domain), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
        || matches!((&subject.feature, &candidate.feature), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b));
    if !same_subject {
        return false;
    }
    candidate.context_type == ContextType::Milestone || candidate.problem_solution_pair
}

/// Scans session evidence for completion language, clears `awaiting_*`
/// flags and stale `blocked_by` references, and runs the action-cleared
/// sweep. Returns the number of memories whose `action_required` flag was
/// cleared.
pub fn apply_implicit_transitions(
    db: &ProjectDb,
    session_summary: &str,
    project_snapshot: &str,
    session_number: u32,
    now: DateTime<Utc>,
) -> Result<u32, LifecycleError> {
    let evidence = format!("{session_summary} {project_snapshot}").to_lowercase();
    let completion_seen = mentions_completion(&evidence);

    let all_memories = db.memories.all();
    let active_statuses: std::collections::HashMap<_, _> =
        all_memories.iter().map(|m| (m.id.clone(), m.status)).collect();
    let fresh_this_session: Vec<&Memory> =
        all_memories.iter().filter(|m| m.session_created == session_number).collect();

    let mut action_cleared = 0u32;

    for memory in &all_memories {
        if memory.status != Status::Active {
            continue;
        }

        let text_evidence = completion_seen && mentions_subject(&evidence, &memory.domain, &memory.feature);
        let corroborating_evidence =
            fresh_this_session.iter().any(|candidate| corroborates(memory, candidate, session_number));
        let evidence_seen = text_evidence || corroborating_evidence;

        let should_clear_awaiting_impl = memory.awaiting_implementation && evidence_seen;
        let should_clear_action = memory.action_required && evidence_seen;

        let stale_blockers: Vec<MemoryId> = memory
            .blocked_by
            .iter()
            .filter(|blocker_id| {
                matches!(active_statuses.get(*blocker_id), Some(Status::Superseded) | Some(Status::Archived))
            })
            .cloned()
            .collect();

        if !should_clear_awaiting_impl && !should_clear_action && stale_blockers.is_empty() {
            continue;
        }

        if should_clear_action {
            action_cleared += 1;
        }

        db.memories.update(&memory.id, |m| {
            if should_clear_awaiting_impl {
                m.awaiting_implementation = false;
                m.session_updated = session_number;
            }
            if should_clear_action {
                m.action_required = false;
            }
            m.blocked_by.retain(|b| !stale_blockers.contains(b));
            m.updated_at = now;
        })?;
    }

    Ok(action_cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ProjectId, SessionId};
    use crate::memory::{MemoryBuilder, Scope};
    use crate::store::Store;

    #[test]
    fn clears_action_required_on_plain_completion_language() {
        // spec §4.3 item 2's worked example: "Ran migration and regenerated
        // all embeddings." contains no past-tense "-ed" completion verb a
        // narrower list would catch, but it is still unambiguous evidence
        // the outstanding action got done.
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let db = store.open(&ProjectId::from("proj")).unwrap();

        let memory = MemoryBuilder::new(
            SessionId::from("s1"),
            crate::memory::ContextType::Debug,
            "embeddings go stale after schema changes",
            "need to fix stale embeddings after the migration",
            "noticed during review",
        )
        .project_id(ProjectId::from("proj"))
        .scope(Scope::Project)
        .action_required(true)
        .domain("embeddings")
        .build(1, Utc::now());
        let id = db.memories.insert(memory).unwrap();

        let cleared = apply_implicit_transitions(
            &db,
            "Ran migration and regenerated all embeddings.",
            "",
            2,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(cleared, 1);
        let updated = db.memories.get(&id).unwrap();
        assert!(!updated.action_required);
    }

    #[test]
    fn clears_action_required_on_matching_milestone() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let db = store.open(&ProjectId::from("proj")).unwrap();

        let memory = MemoryBuilder::new(
            SessionId::from("s1"),
            crate::memory::ContextType::Unresolved,
            "rate limiter needs tuning",
            "requests are getting throttled too aggressively",
            "reported by user",
        )
        .project_id(ProjectId::from("proj"))
        .scope(Scope::Project)
        .action_required(true)
        .domain("rate-limiter")
        .build(1, Utc::now());
        let id = db.memories.insert(memory).unwrap();

        let milestone = MemoryBuilder::new(
            SessionId::from("s2"),
            crate::memory::ContextType::Milestone,
            "rate limiter retuned",
            "shipped new backoff curve for the rate limiter",
            "closed out the tuning work",
        )
        .project_id(ProjectId::from("proj"))
        .scope(Scope::Project)
        .domain("rate-limiter")
        .build(2, Utc::now());
        db.memories.insert(milestone).unwrap();

        let cleared = apply_implicit_transitions(&db, "", "", 2, Utc::now()).unwrap();

        assert_eq!(cleared, 1);
        assert!(!db.memories.get(&id).unwrap().action_required);
    }
}
