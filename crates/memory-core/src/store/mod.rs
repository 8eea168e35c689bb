//! Store — the persistence layer (spec §4.1, ~15% of the system).
//!
//! Content is laid out on disk as markdown files with YAML frontmatter
//! (spec §6), one directory per project plus a dedicated `global` project
//! for cross-project memories. [`Store`] is the top-level registry: it
//! opens (and caches) one [`ProjectDb`] per project, each holding its own
//! in-memory indexes over its collections.

pub mod markdown;
pub mod project_db;

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use project_db::ProjectDb;

use arc_swap::ArcSwap;
use parking_lot::Mutex as PlMutex;

use crate::ids::ProjectId;
use crate::memory::PersonalPrimer;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Top-level registry of per-project databases. Opening a project is
/// idempotent: concurrent callers asking for the same project id converge
/// on the same cached [`ProjectDb`] handle.
///
/// Also owns the singleton personal primer (scope = global, one per
/// installation, spec §4.3 item 4 "the only file the Lifecycle Manager may
/// *create*") since it doesn't belong to any one project's collections.
/// `MEMORY_STORAGE_MODE` (spec §6): `central` keeps every project under the
/// one root; `local` moves per-project state under `./.memory/` in the
/// current working directory while the `global` project stays central
/// regardless.
pub struct Store {
    /// Root for the `global` project (and, in `Central` mode, every other
    /// project too).
    central_root: PathBuf,
    /// Root non-global projects are opened under in `Local` mode. Equal to
    /// `central_root` in `Central` mode.
    project_root: PathBuf,
    projects: DashMap<ProjectId, Arc<ProjectDb>>,
    primer: ArcSwap<PersonalPrimer>,
    primer_write_lock: PlMutex<()>,
}

impl Store {
    /// A single root for both global and project state (`MEMORY_STORAGE_MODE
    /// = central`, and the shape every existing test in this crate assumes).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::with_roots(root.clone(), root)
    }

    /// Split roots: `central_root` holds the `global` project,
    /// `project_root` holds every other project (spec §6
    /// `MEMORY_STORAGE_MODE=local`).
    pub fn with_roots(central_root: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        let central_root = central_root.into();
        let project_root = project_root.into();
        let primer =
            Self::load_primer(&central_root).unwrap_or_else(|_| PersonalPrimer::empty(chrono::Utc::now()));
        Self {
            central_root,
            project_root,
            projects: DashMap::new(),
            primer: ArcSwap::new(Arc::new(primer)),
            primer_write_lock: PlMutex::new(()),
        }
    }

    fn project_dir(&self, project_id: &ProjectId) -> PathBuf {
        if project_id.is_global() {
            self.central_root.join(project_id.as_str())
        } else {
            self.project_root.join(project_id.as_str())
        }
    }

    /// Open (or return the cached handle for) a project's database.
    pub fn open(&self, project_id: &ProjectId) -> Result<Arc<ProjectDb>, StoreError> {
        if let Some(existing) = self.projects.get(project_id) {
            return Ok(existing.clone());
        }
        let db = Arc::new(ProjectDb::open(self.project_dir(project_id), project_id.clone())?);
        let entry = self
            .projects
            .entry(project_id.clone())
            .or_insert_with(|| db.clone());
        Ok(entry.clone())
    }

    /// Convenience accessor for the shared `global` project.
    pub fn global(&self) -> Result<Arc<ProjectDb>, StoreError> {
        self.open(&ProjectId::global())
    }

    /// The central root (holds the `global` project; in `Central` mode,
    /// every project).
    pub fn root(&self) -> &std::path::Path {
        &self.central_root
    }

    fn primer_path(root: &std::path::Path) -> PathBuf {
        root.join(ProjectId::global().as_str())
            .join("primer")
            .join("personal-primer.md")
    }

    fn load_primer(root: &std::path::Path) -> Result<PersonalPrimer, StoreError> {
        let path = Self::primer_path(root);
        match std::fs::read_to_string(&path) {
            Ok(text) => markdown::primer_from_markdown(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersonalPrimer::empty(chrono::Utc::now())),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    pub fn primer(&self) -> Arc<PersonalPrimer> {
        self.primer.load_full()
    }

    /// Overwrite the primer. Only the Lifecycle Manager's post-curation pass
    /// calls this (spec §4.3 item 4).
    pub fn set_primer(&self, primer: PersonalPrimer) -> Result<(), StoreError> {
        let _guard = self.primer_write_lock.lock();
        let path = Self::primer_path(&self.central_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        std::fs::write(&path, markdown::primer_to_markdown(&primer)).map_err(StoreError::Io)?;
        self.primer.store(Arc::new(primer));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::fixture::FixtureEmbedder;
    use crate::embed::Embedder;
    use crate::ids::SessionId;
    use crate::memory::{ContextType, MemoryBuilder};
    use chrono::Utc;

    #[tokio::test]
    async fn insert_then_reopen_round_trips_a_memory() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectId::from("acme-api");

        let embedder = FixtureEmbedder;
        let vector = embedder.embed("retrieval gate debugging").await.unwrap();

        {
            let store = Store::new(dir.path());
            let db = store.open(&project).unwrap();
            let mut m = MemoryBuilder::new(
                SessionId::from("s1"),
                ContextType::Debug,
                "gate bug",
                "retrieval gate debugging session",
                "tracked down a false negative",
            )
            .build(1, Utc::now());
            m.apply_embedding(vector, Utc::now()).unwrap();
            db.memories.insert(m).unwrap();
        }

        let store2 = Store::new(dir.path());
        let db2 = store2.open(&project).unwrap();
        assert_eq!(db2.memories.all().len(), 1);
    }

    #[test]
    fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let project = ProjectId::from("acme-api");
        let a = store.open(&project).unwrap();
        let b = store.open(&project).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
