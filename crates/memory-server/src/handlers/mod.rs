//! HTTP surface (spec §6): five routes over the three Engine operations,
//! plus health and stats. Bodies match the hook contract field-for-field.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use memory_core::embed::Embedder;
use memory_core::engine::{CurationTrigger, Engine};
use memory_core::ids::{ProjectId, SessionId};
use serde::{Deserialize, Serialize};

use crate::curator::ExternalCommandCurator;
use crate::error::ApiError;

pub struct AppState {
    pub engine: Engine<Box<dyn Embedder>>,
    pub curator: ExternalCommandCurator,
    pub context_deadline: Duration,
    pub process_deadline: Duration,
    pub checkpoint_deadline: Duration,
}

pub type SharedState = Arc<AppState>;

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
    engine: &'static str,
}

pub async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        engine: "memory-core",
    })
}

#[derive(Deserialize)]
pub struct ContextRequest {
    session_id: String,
    project_id: String,
    current_message: String,
    #[serde(default)]
    #[allow(dead_code)]
    claude_session_id: Option<String>,
}

pub async fn context(
    State(state): State<SharedState>,
    Json(req): Json<ContextRequest>,
) -> Result<Json<memory_core::engine::ContextPayload>, ApiError> {
    if req.session_id.trim().is_empty() {
        return Err(ApiError::Validation("session_id must not be empty".into()));
    }
    if req.project_id.trim().is_empty() {
        return Err(ApiError::Validation("project_id must not be empty".into()));
    }

    let session_id = SessionId::new(req.session_id);
    let project_id = ProjectId::new(req.project_id);

    let payload = tokio::time::timeout(
        state.context_deadline,
        state.engine.get_context(&session_id, &project_id, &req.current_message),
    )
    .await
    .map_err(|_| ApiError::Timeout)??;

    Ok(Json(payload))
}

#[derive(Deserialize)]
pub struct ProcessRequest {
    session_id: String,
    project_id: String,
}

#[derive(Serialize)]
pub struct ProcessResponse {
    message_count: u32,
}

pub async fn process(
    State(state): State<SharedState>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    if req.session_id.trim().is_empty() || req.project_id.trim().is_empty() {
        return Err(ApiError::Validation("session_id and project_id are required".into()));
    }

    let session_id = SessionId::new(req.session_id);
    let project_id = ProjectId::new(req.project_id);

    let message_count = tokio::time::timeout(
        state.process_deadline,
        state.engine.process_message(&session_id, &project_id),
    )
    .await
    .map_err(|_| ApiError::Timeout)??;

    Ok(Json(ProcessResponse { message_count }))
}

#[derive(Deserialize)]
pub struct CheckpointRequest {
    session_id: String,
    project_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    claude_session_id: Option<String>,
    #[serde(default)]
    trigger: String,
    #[serde(default)]
    #[allow(dead_code)]
    cwd: Option<String>,
}

#[derive(Serialize)]
pub struct CheckpointResponse {
    accepted: bool,
}

fn parse_trigger(raw: &str) -> CurationTrigger {
    match raw {
        "pre_compact" | "precompact" => CurationTrigger::PreCompact,
        "session_end" | "sessionend" => CurationTrigger::SessionEnd,
        _ => CurationTrigger::Manual,
    }
}

/// Fires curation in the background and returns immediately (spec §6:
/// checkpoint is fire-and-forget from the caller's point of view, bounded
/// only by the curator's own hard timeout, not by the HTTP response).
pub async fn checkpoint(
    State(state): State<SharedState>,
    Json(req): Json<CheckpointRequest>,
) -> Result<(StatusCode, Json<CheckpointResponse>), ApiError> {
    if req.session_id.trim().is_empty() || req.project_id.trim().is_empty() {
        return Err(ApiError::Validation("session_id and project_id are required".into()));
    }

    let session_id = SessionId::new(req.session_id);
    let project_id = ProjectId::new(req.project_id);
    let trigger = parse_trigger(&req.trigger);
    let checkpoint_deadline = state.checkpoint_deadline;

    tokio::spawn(async move {
        let transcript_excerpt = String::new();
        let outcome = tokio::time::timeout(
            checkpoint_deadline,
            state
                .engine
                .trigger_curation(&state.curator, &session_id, &project_id, trigger, transcript_excerpt),
        )
        .await;

        match outcome {
            Ok(Ok(log)) => {
                tracing::info!(
                    project_id = project_id.as_str(),
                    session_id = session_id.as_str(),
                    processed = log.processed,
                    "checkpoint curation completed"
                );
            }
            Ok(Err(e)) => {
                tracing::error!(project_id = project_id.as_str(), "checkpoint curation failed: {e}");
            }
            Err(_) => {
                tracing::error!(
                    project_id = project_id.as_str(),
                    "checkpoint curation exceeded its deadline, abandoning"
                );
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(CheckpointResponse { accepted: true })))
}

#[derive(Deserialize)]
pub struct StatsQuery {
    project_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    total_memories: usize,
    total_sessions: usize,
    stale_memories: usize,
    latest_session: Option<DateTime<Utc>>,
}

pub async fn stats(
    State(state): State<SharedState>,
    Query(q): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    if q.project_id.trim().is_empty() {
        return Err(ApiError::Validation("project_id must not be empty".into()));
    }
    let project_id = ProjectId::new(q.project_id);
    let db = state.engine.store().open(&project_id)?;

    let memories = db.memories.all();
    let stale_memories = memories.iter().filter(|m| m.embedding_stale).count();
    let latest_session = db.summaries.latest().map(|s| s.created_at);

    Ok(Json(StatsResponse {
        total_memories: memories.len(),
        total_sessions: db.sessions.count(),
        stale_memories,
        latest_session,
    }))
}
