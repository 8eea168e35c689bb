//! Contracts for the two external LLM agents this crate never dispatches
//! itself (spec §1, §4.4, §6, §9): the *curator*, which turns a transcript
//! into new memories plus narrative artifacts, and the *manager*, which
//! receives a structured brief and reports back what it changed. This crate
//! defines the Rust-side shapes a host process fulfills; it never calls
//! either model.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ids::{MemoryId, ProjectId, SessionId};
use crate::memory::MemoryBuilder;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent call timed out")]
    Timeout,
    #[error("failed to parse agent report: {0}")]
    Parse(String),
    #[error("agent call failed: {0}")]
    AgentFailure(String),
}

/// What the host sends to the curator: conversation context plus enough of
/// the existing corpus to avoid duplicate extraction (spec §3/§6).
#[derive(Debug, Clone)]
pub struct CuratorBrief {
    pub session_id: SessionId,
    pub project_id: ProjectId,
    pub session_number: u32,
    pub transcript_excerpt: String,
    pub existing_headlines: Vec<String>,
}

/// What the curator hands back: new memories to persist (as builders,
/// since ids/timestamps/schema version are the core's to assign) plus the
/// narrative artifacts the Lifecycle Manager and primer consume (spec §3).
#[derive(Debug)]
pub struct CurationResult {
    pub new_memories: Vec<MemoryBuilder>,
    pub session_summary: String,
    pub project_snapshot: Option<String>,
}

/// What the host sends the management agent once curation has persisted:
/// the ids it just minted, the narrative artifacts, and enough of the
/// environment (paths, current date, the memory-management skill prompt) for
/// it to act inside a sandbox scoped to the memory root (spec §6, §9).
#[derive(Debug, Clone)]
pub struct ManagementBrief {
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub session_number: u32,
    pub new_memory_ids: Vec<MemoryId>,
    pub session_summary: String,
    pub project_snapshot: Option<String>,
    pub memory_root: PathBuf,
    pub current_date: DateTime<Utc>,
    pub skill_prompt: String,
}

/// Parsed form of the management agent's free-text report. The source
/// grammar is two fenced sections; anything outside them, or a line inside
/// `MANAGEMENT ACTIONS` this parser doesn't recognize, is non-fatal — it's
/// surfaced as a note on the resulting [`crate::memory::ManagementLog`]
/// rather than failing the whole pass (spec §9).
#[derive(Debug, Default)]
pub struct ManagementReport {
    pub actions: Vec<String>,
    pub summary: String,
    pub unrecognized: Vec<String>,
}

const ACTIONS_HEADER: &str = "=== MANAGEMENT ACTIONS ===";
const SUMMARY_HEADER: &str = "=== SUMMARY ===";

pub fn parse_management_report(raw: &str) -> ManagementReport {
    let mut report = ManagementReport::default();
    let mut section: Option<&str> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed == ACTIONS_HEADER {
            section = Some("actions");
            continue;
        }
        if trimmed == SUMMARY_HEADER {
            section = Some("summary");
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        match section {
            Some("actions") => report.actions.push(trimmed.to_string()),
            Some("summary") => {
                if !report.summary.is_empty() {
                    report.summary.push('\n');
                }
                report.summary.push_str(trimmed);
            }
            _ => report.unrecognized.push(trimmed.to_string()),
        }
    }

    report
}

/// Seam for dispatching to an external curator process. Implementations
/// live in the host (typically `memory-server`), not this crate.
#[async_trait]
pub trait Curator: Send + Sync {
    async fn curate(&self, brief: &CuratorBrief) -> Result<CurationResult, AgentError>;
}

/// Seam for dispatching to the external management agent. Out of scope for
/// this crate to wire up to a live process (spec §1), but the contract —
/// what it's handed and the report grammar it answers with — lives here so
/// a host can implement it. Returns the raw report text; callers parse it
/// with [`parse_management_report`].
#[async_trait]
pub trait Manager: Send + Sync {
    async fn manage(&self, brief: &ManagementBrief) -> Result<String, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_report() {
        let raw = "preamble noise\n=== MANAGEMENT ACTIONS ===\nsuperseded old-state-1\nlinked a b\n=== SUMMARY ===\nFixed the retrieval gate bug.\n";
        let report = parse_management_report(raw);
        assert_eq!(report.actions, vec!["superseded old-state-1", "linked a b"]);
        assert_eq!(report.summary, "Fixed the retrieval gate bug.");
        assert_eq!(report.unrecognized, vec!["preamble noise"]);
    }

    #[test]
    fn missing_sections_yields_everything_unrecognized() {
        let report = parse_management_report("just some free text");
        assert!(report.actions.is_empty());
        assert!(report.summary.is_empty());
        assert_eq!(report.unrecognized, vec!["just some free text"]);
    }
}
