//! Memory data model
//!
//! The central entity (spec §3) plus its companion append-only records
//! (`Session`, `SessionSummary`, `ProjectSnapshot`, `ManagementLog`,
//! `PersonalPrimer`).

mod defaults;
mod record;
mod session;

pub use defaults::{type_defaults, ContextTypeDefaults};
pub use record::{
    ContextType, Memory, MemoryBuilder, RelationshipError, Scope, Status, TemporalClass,
};
pub use session::{ManagementLog, PersonalPrimer, ProjectSnapshot, Session, SessionSummary};
