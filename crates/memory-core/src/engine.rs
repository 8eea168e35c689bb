//! Engine — the orchestrator (spec §4.4). Wires Store, Embedder, Retrieval
//! Engine, and Lifecycle Manager behind the three public operations the
//! HTTP surface calls.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::agents::{AgentError, Curator, CuratorBrief};
use crate::clock::Clock;
use crate::embed::{Embedder, EmbedderError};
use crate::ids::{MemoryId, ProjectId, SessionId};
use crate::lifecycle::{self, LifecycleError, LifecycleInput};
use crate::memory::{Memory, ManagementLog, PersonalPrimer};
use crate::retrieval::{self, RetrievalConfig, RetrievalDiagnostics, RetrievalQuery};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Embedder(#[from] EmbedderError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredMemoryView {
    pub id: MemoryId,
    pub headline: String,
    pub content: String,
    pub context_type: crate::memory::ContextType,
    pub importance_score: f64,
}

#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct ContextPayload {
    pub primer: Option<String>,
    pub memories: Vec<StoredMemoryView>,
    pub formatted: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurationTrigger {
    PreCompact,
    SessionEnd,
    Manual,
}

pub struct Engine<E: Embedder> {
    store: Store,
    embedder: E,
    clock: Arc<dyn Clock>,
    config: RetrievalConfig,
    curation_locks: DashMap<ProjectId, Arc<AsyncMutex<()>>>,
    /// `MEMORY_PERSONAL_ENABLED` (spec §6): gates personal-primer
    /// maintenance in the Lifecycle Manager pass. Defaults to enabled.
    personal_enabled: bool,
}

impl<E: Embedder> Engine<E> {
    pub fn new(store: Store, embedder: E, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            embedder,
            clock,
            config: RetrievalConfig::default(),
            curation_locks: DashMap::new(),
            personal_enabled: true,
        }
    }

    pub fn with_personal_enabled(mut self, enabled: bool) -> Self {
        self.personal_enabled = enabled;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn curation_lock(&self, project_id: &ProjectId) -> Arc<AsyncMutex<()>> {
        self.curation_locks
            .entry(project_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// spec §4.4 `get_context`.
    pub async fn get_context(
        &self,
        session_id: &SessionId,
        project_id: &ProjectId,
        current_message: &str,
    ) -> Result<ContextPayload, EngineError> {
        let db = self.store.open(project_id)?;
        lifecycle::apply_decay(&db, self.clock.as_ref())?;

        let now = self.clock.now();
        let next_number = db.sessions.next_session_number(project_id);
        let (session_handle, created) = db
            .sessions
            .get_or_create(project_id, session_id, || next_number, now)?;

        let mut session = session_handle.lock().await;

        if created && session.is_brand_new() {
            let summary = db.summaries.latest().map(|s| s.summary);
            let snapshot = db.snapshots.latest().map(|s| s.snapshot);
            let primer = self.store.primer();
            let formatted = format_primer(&primer, summary.as_deref(), snapshot.as_deref(), now);
            return Ok(ContextPayload {
                primer: Some(formatted.clone()),
                memories: Vec::new(),
                formatted,
            });
        }

        let embedding = match self.embedder.embed(current_message).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("embedding failed, continuing without vector signal: {e}");
                None
            }
        };

        let mut candidates = db.memories.all();
        if !project_id.is_global() {
            let global_db = self.store.global()?;
            candidates.extend(global_db.memories.all());
        }

        let query = RetrievalQuery {
            project_id,
            message: current_message,
            query_embedding: embedding.as_deref(),
            already_injected: &session.already_injected,
        };

        let result = retrieval::select(&candidates, &query, &self.config);
        log_diagnostics(&result.diagnostics);

        let surfaced_ids: Vec<MemoryId> = result.selected.iter().map(|s| s.memory.id.clone()).collect();
        lifecycle::record_surfacing(&db, &surfaced_ids, session.session_number)?;
        if !project_id.is_global() {
            let global_surfaced: Vec<MemoryId> = result
                .selected
                .iter()
                .filter(|s| s.memory.scope == crate::memory::Scope::Global)
                .map(|s| s.memory.id.clone())
                .collect();
            if !global_surfaced.is_empty() {
                let global_db = self.store.global()?;
                lifecycle::record_surfacing(&global_db, &global_surfaced, session.session_number)?;
            }
        }

        session.already_injected.extend(retrieval::ids_to_inject(&result));
        db.sessions.persist_update(&session)?;

        let memories: Vec<StoredMemoryView> = result
            .selected
            .iter()
            .map(|s| StoredMemoryView {
                id: s.memory.id.clone(),
                headline: s.memory.headline.clone(),
                content: s.memory.content.clone(),
                context_type: s.memory.context_type,
                importance_score: s.importance_score,
            })
            .collect();

        let formatted = format_memories_block(&memories);

        Ok(ContextPayload {
            primer: None,
            memories,
            formatted,
        })
    }

    /// spec §4.4 `process_message`.
    pub async fn process_message(&self, session_id: &SessionId, project_id: &ProjectId) -> Result<u32, EngineError> {
        let db = self.store.open(project_id)?;
        let now = self.clock.now();
        let next_number = db.sessions.next_session_number(project_id);
        let (session_handle, _created) = db
            .sessions
            .get_or_create(project_id, session_id, || next_number, now)?;
        let mut session = session_handle.lock().await;
        session.message_count += 1;
        session.last_active = now;
        db.sessions.persist_update(&session)?;
        Ok(session.message_count)
    }

    /// spec §4.4 `trigger_curation`. Dispatches to the injected [`Curator`],
    /// persists the resulting memories, then runs the Lifecycle Manager. A
    /// management log is written regardless of outcome.
    pub async fn trigger_curation(
        &self,
        curator: &dyn Curator,
        session_id: &SessionId,
        project_id: &ProjectId,
        _trigger: CurationTrigger,
        transcript_excerpt: String,
    ) -> Result<ManagementLog, EngineError> {
        let lock = self.curation_lock(project_id);
        let _guard = lock.lock().await;

        let db = self.store.open(project_id)?;
        let now = self.clock.now();
        let next_number = db.sessions.next_session_number(project_id);
        let (session_handle, _created) = db
            .sessions
            .get_or_create(project_id, session_id, || next_number, now)?;
        let session_number = session_handle.lock().await.session_number;

        let brief = CuratorBrief {
            session_id: session_id.clone(),
            project_id: project_id.clone(),
            session_number,
            transcript_excerpt,
            existing_headlines: db.memories.all().into_iter().map(|m| m.headline).collect(),
        };

        let curation = match curator.curate(&brief).await {
            Ok(c) => c,
            Err(e) => {
                let log = ManagementLog {
                    id: MemoryId::generate(),
                    project_id: project_id.clone(),
                    session_id: session_id.clone(),
                    processed: 0,
                    superseded: 0,
                    resolved: 0,
                    action_cleared: 0,
                    linked: 0,
                    files_touched: Vec::new(),
                    success: false,
                    duration_ms: 0,
                    created_at: now,
                    notes: vec![format!("curator call failed: {e}")],
                };
                db.management_logs.append(log.clone())?;
                return Err(EngineError::Agent(e));
            }
        };

        let mut new_ids = Vec::new();
        for builder in curation.new_memories {
            let memory: Memory = builder.build(session_number, now);
            let id = db.memories.insert(memory)?;
            new_ids.push(id);
        }

        if !curation.session_summary.is_empty() {
            db.summaries.append(crate::memory::SessionSummary {
                id: MemoryId::generate(),
                project_id: project_id.clone(),
                session_id: session_id.clone(),
                session_number,
                summary: curation.session_summary.clone(),
                created_at: now,
            })?;
        }
        if let Some(snapshot) = &curation.project_snapshot {
            db.snapshots.append(crate::memory::ProjectSnapshot {
                id: MemoryId::generate(),
                project_id: project_id.clone(),
                snapshot: snapshot.clone(),
                created_at: now,
            })?;
        }

        let log = lifecycle::run(
            &self.store,
            &db,
            self.clock.as_ref(),
            self.personal_enabled,
            LifecycleInput {
                new_memory_ids: &new_ids,
                session_summary: &curation.session_summary,
                project_snapshot: curation.project_snapshot.as_deref().unwrap_or(""),
                session_number,
                project_id,
                session_id,
            },
        )?;
        Ok(log)
    }
}

fn log_diagnostics(d: &RetrievalDiagnostics) {
    tracing::debug!(
        candidates = d.candidate_count,
        passed_gate = d.passed_gate_count,
        trigger = d.trigger_fired,
        tags = d.tags_fired,
        domain = d.domain_fired,
        feature = d.feature_fired,
        content = d.content_fired,
        vector = d.vector_fired,
        global_selected = d.global_selected,
        project_selected = d.project_selected,
        related_backfilled = d.related_backfilled,
        "retrieval pass complete"
    );
}

fn format_memories_block(memories: &[StoredMemoryView]) -> String {
    if memories.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Relevant memory\n\n");
    for m in memories {
        out.push_str(&format!("- **{}** ({}): {}\n", m.headline, m.context_type.as_str(), m.content));
    }
    out
}

fn format_primer(
    primer: &PersonalPrimer,
    last_summary: Option<&str>,
    latest_snapshot: Option<&str>,
    now: chrono::DateTime<chrono::Utc>,
) -> String {
    let mut out = format!("## Session context\n\n_{}_\n\n", now.to_rfc3339());
    if !primer.markdown.is_empty() {
        out.push_str(&primer.markdown);
        out.push_str("\n\n");
    }
    if let Some(snapshot) = latest_snapshot {
        out.push_str("### Project snapshot\n\n");
        out.push_str(snapshot);
        out.push_str("\n\n");
    }
    if let Some(summary) = last_summary {
        out.push_str("### Last session\n\n");
        out.push_str(summary);
        out.push('\n');
    }
    out
}
