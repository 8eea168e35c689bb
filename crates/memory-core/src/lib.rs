//! Core memory-continuity engine: ingestion, ranking, and lifecycle
//! management for persistent context carried between coding sessions.
//!
//! The crate is organized around the four pieces described by the system
//! design: [`store`] persists records as markdown with YAML frontmatter,
//! [`embed`] produces the fixed-width vectors retrieval compares against,
//! [`retrieval`] decides what surfaces for a given message, and
//! [`lifecycle`] keeps the corpus consistent after each curation pass.
//! [`engine`] wires these together behind the contract a host process
//! calls into.

pub mod agents;
pub mod clock;
pub mod embed;
pub mod engine;
pub mod ids;
pub mod lifecycle;
pub mod memory;
pub mod migration;
pub mod retrieval;
pub mod store;

/// Fixed width every stored and query embedding must have.
pub const EMBEDDING_DIMENSIONS: usize = 384;

pub mod prelude {
    pub use crate::agents::{AgentError, CurationResult, Curator, CuratorBrief, Manager, ManagementBrief, ManagementReport};
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::embed::{Embedder, EmbedderError};
    pub use crate::engine::{ContextPayload, CurationTrigger, Engine, EngineError, StoredMemoryView};
    pub use crate::ids::{MemoryId, ProjectId, SessionId};
    pub use crate::memory::{ContextType, Memory, MemoryBuilder, Scope, Status, TemporalClass};
    pub use crate::store::{ProjectDb, Store, StoreError};
    pub use crate::EMBEDDING_DIMENSIONS;
}
