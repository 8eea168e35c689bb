//! Per-project collections with in-memory indexes (spec §4.1).
//!
//! Each collection keeps an [`arc_swap::ArcSwap`] snapshot so reads never
//! block on a writer (spec §5 "reads are lock-free over a consistent
//! snapshot"); writers take the collection's own `Mutex` so at most one
//! write is in flight per collection at a time (spec §5 "internal writes
//! hold a per-collection exclusive lock").

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::markdown;
use super::StoreError;
use crate::embed::cosine_similarity;
use crate::ids::{MemoryId, ProjectId};
use crate::memory::{ManagementLog, Memory, ProjectSnapshot, Session, SessionSummary};

fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir).map_err(StoreError::Io)
}

fn read_markdown_files(dir: &Path) -> Result<Vec<String>, StoreError> {
    ensure_dir(dir)?;
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(StoreError::Io)? {
        let entry = entry.map_err(StoreError::Io)?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            out.push(std::fs::read_to_string(&path).map_err(StoreError::Io)?);
        }
    }
    Ok(out)
}

// ============================================================================
// MEMORY COLLECTION
// ============================================================================

pub struct MemoryCollection {
    dir: PathBuf,
    items: ArcSwap<HashMap<MemoryId, Memory>>,
    write_lock: Mutex<()>,
}

impl MemoryCollection {
    pub fn open(dir: PathBuf) -> Result<Self, StoreError> {
        let mut map = HashMap::new();
        for text in read_markdown_files(&dir)? {
            let memory = markdown::memory_from_markdown(&text)?;
            map.insert(memory.id.clone(), memory);
        }
        Ok(Self {
            dir,
            items: ArcSwap::new(Arc::new(map)),
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, id: &MemoryId) -> PathBuf {
        self.dir.join(format!("{}.md", id.as_str()))
    }

    fn persist(&self, memory: &Memory) -> Result<(), StoreError> {
        let md = markdown::memory_to_markdown(memory)?;
        std::fs::write(self.path_for(&memory.id), md).map_err(StoreError::Io)
    }

    pub fn insert(&self, memory: Memory) -> Result<MemoryId, StoreError> {
        let _guard = self.write_lock.lock();
        self.persist(&memory)?;
        let mut next = (**self.items.load()).clone();
        let id = memory.id.clone();
        next.insert(id.clone(), memory);
        self.items.store(Arc::new(next));
        Ok(id)
    }

    /// Read-modify-write a single record under the collection's write lock.
    pub fn update<F>(&self, id: &MemoryId, patch: F) -> Result<Memory, StoreError>
    where
        F: FnOnce(&mut Memory),
    {
        let _guard = self.write_lock.lock();
        let mut next = (**self.items.load()).clone();
        let memory = next
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch(memory);
        let updated = memory.clone();
        self.persist(&updated)?;
        self.items.store(Arc::new(next));
        Ok(updated)
    }

    pub fn get(&self, id: &MemoryId) -> Option<Memory> {
        self.items.load().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Memory> {
        self.items.load().values().cloned().collect()
    }

    /// Cosine-similarity top-k search. `filter` is applied *before* top-k
    /// selection (spec §4.1). Returns `(record, similarity, stale)`; when
    /// `query_vec` is `None` (no query embedding), similarity is always 0.0
    /// (spec §4.2 "Missing query embedding ⇒ vector signal cannot fire").
    pub fn search(
        &self,
        query_vec: Option<&[f32]>,
        top_k: usize,
        filter: impl Fn(&Memory) -> bool,
    ) -> Vec<(Memory, f32, bool)> {
        let snapshot = self.items.load();
        let mut scored: Vec<(Memory, f32, bool)> = snapshot
            .values()
            .filter(|m| filter(m))
            .map(|m| {
                let sim = match (&m.embedding, query_vec) {
                    (Some(v), Some(q)) => cosine_similarity(v, q),
                    _ => 0.0,
                };
                (m.clone(), sim, m.embedding_stale)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

// ============================================================================
// SESSION COLLECTION
// ============================================================================

/// Sessions get one lock each (spec §5 "already_injected_ids mutations are
/// serialized per session"; "get_context calls are serialized" per
/// session), rather than the collection-wide lock the other collections
/// use, since sessions are mutated far more often than memories.
pub struct SessionCollection {
    dir: PathBuf,
    sessions: ArcSwap<HashMap<crate::ids::SessionId, Arc<tokio::sync::Mutex<Session>>>>,
    registry_lock: Mutex<()>,
}

impl SessionCollection {
    pub fn open(dir: PathBuf) -> Result<Self, StoreError> {
        let mut map = HashMap::new();
        for text in read_markdown_files(&dir)? {
            let session = markdown::session_from_markdown(&text)?;
            map.insert(session.session_id.clone(), Arc::new(tokio::sync::Mutex::new(session)));
        }
        Ok(Self {
            dir,
            sessions: ArcSwap::new(Arc::new(map)),
            registry_lock: Mutex::new(()),
        })
    }

    fn persist(&self, session: &Session) -> Result<(), StoreError> {
        let md = markdown::session_to_markdown(session)?;
        let path = self.dir.join(format!("{}.md", session.session_id.as_str()));
        std::fs::write(path, md).map_err(StoreError::Io)
    }

    /// Get the handle for a session, creating it (and persisting the new
    /// record) if it doesn't exist yet.
    pub fn get_or_create(
        &self,
        project_id: &ProjectId,
        session_id: &crate::ids::SessionId,
        next_session_number: impl FnOnce() -> u32,
        now: DateTime<Utc>,
    ) -> Result<(Arc<tokio::sync::Mutex<Session>>, bool), StoreError> {
        if let Some(existing) = self.sessions.load().get(session_id) {
            return Ok((existing.clone(), false));
        }
        let _guard = self.registry_lock.lock();
        if let Some(existing) = self.sessions.load().get(session_id) {
            return Ok((existing.clone(), false));
        }
        let session = Session::new(session_id.clone(), project_id.clone(), next_session_number(), now);
        self.persist(&session)?;
        let handle = Arc::new(tokio::sync::Mutex::new(session));
        let mut next = (**self.sessions.load()).clone();
        next.insert(session_id.clone(), handle.clone());
        self.sessions.store(Arc::new(next));
        Ok((handle, true))
    }

    pub fn get(&self, session_id: &crate::ids::SessionId) -> Option<Arc<tokio::sync::Mutex<Session>>> {
        self.sessions.load().get(session_id).cloned()
    }

    pub fn persist_update(&self, session: &Session) -> Result<(), StoreError> {
        self.persist(session)
    }

    pub fn count(&self) -> usize {
        self.sessions.load().len()
    }

    pub fn next_session_number(&self, project_id: &ProjectId) -> u32 {
        self.sessions
            .load()
            .values()
            .filter_map(|s| s.try_lock().ok())
            .filter(|s| &s.project_id == project_id)
            .map(|s| s.session_number)
            .max()
            .unwrap_or(0)
            + 1
    }
}

// ============================================================================
// APPEND-ONLY COLLECTIONS (summaries, snapshots, management logs)
// ============================================================================

/// Generic append-only, creation-time-ordered, latest-wins collection.
pub struct AppendCollection<T: Clone + Send + Sync + 'static> {
    dir: PathBuf,
    items: ArcSwap<Vec<T>>,
    write_lock: Mutex<()>,
    to_markdown: fn(&T) -> Result<String, StoreError>,
    from_markdown: fn(&str) -> Result<T, StoreError>,
    file_name: fn(&T) -> String,
    created_at: fn(&T) -> DateTime<Utc>,
}

impl<T: Clone + Send + Sync + 'static> AppendCollection<T> {
    pub fn open(
        dir: PathBuf,
        to_markdown: fn(&T) -> Result<String, StoreError>,
        from_markdown: fn(&str) -> Result<T, StoreError>,
        file_name: fn(&T) -> String,
        created_at: fn(&T) -> DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let mut items: Vec<T> = read_markdown_files(&dir)?
            .iter()
            .map(|text| from_markdown(text))
            .collect::<Result<_, _>>()?;
        items.sort_by_key(|t| created_at(t));
        Ok(Self {
            dir,
            items: ArcSwap::new(Arc::new(items)),
            write_lock: Mutex::new(()),
            to_markdown,
            from_markdown,
            file_name,
            created_at,
        })
    }

    pub fn append(&self, item: T) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.dir.join(format!("{}.md", (self.file_name)(&item)));
        let md = (self.to_markdown)(&item)?;
        std::fs::write(path, md).map_err(StoreError::Io)?;
        let mut next = (**self.items.load()).clone();
        next.push(item);
        next.sort_by_key(|t| (self.created_at)(t));
        self.items.store(Arc::new(next));
        Ok(())
    }

    pub fn all(&self) -> Vec<T> {
        (**self.items.load()).clone()
    }

    pub fn latest(&self) -> Option<T> {
        self.items.load().last().cloned()
    }
}

// ============================================================================
// PROJECT DB
// ============================================================================

pub struct ProjectDb {
    pub project_id: ProjectId,
    pub memories: MemoryCollection,
    pub sessions: SessionCollection,
    pub summaries: AppendCollection<SessionSummary>,
    pub snapshots: AppendCollection<ProjectSnapshot>,
    pub management_logs: AppendCollection<ManagementLog>,
}

impl ProjectDb {
    pub fn open(root: PathBuf, project_id: ProjectId) -> Result<Self, StoreError> {
        Ok(Self {
            memories: MemoryCollection::open(root.join("memories"))?,
            sessions: SessionCollection::open(root.join("sessions"))?,
            summaries: AppendCollection::open(
                root.join("summaries"),
                markdown::summary_to_markdown,
                markdown::summary_from_markdown,
                |s: &SessionSummary| s.id.to_string(),
                |s: &SessionSummary| s.created_at,
            )?,
            snapshots: AppendCollection::open(
                root.join("snapshots"),
                markdown::snapshot_to_markdown,
                markdown::snapshot_from_markdown,
                |s: &ProjectSnapshot| s.id.to_string(),
                |s: &ProjectSnapshot| s.created_at,
            )?,
            management_logs: AppendCollection::open(
                root.join("management-logs"),
                markdown::management_log_to_markdown,
                markdown::management_log_from_markdown,
                |l: &ManagementLog| l.id.to_string(),
                |l: &ManagementLog| l.created_at,
            )?,
            project_id,
        })
    }
}
