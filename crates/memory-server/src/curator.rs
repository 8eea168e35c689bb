//! Default [`Curator`] implementation: shells out to an external command
//! (spec treats the curator as an opaque outbound dependency — this crate
//! only needs *a* way to reach it). Mirrors the teacher's stdio transport
//! pattern of writing a JSON request and reading a JSON response back.

use async_trait::async_trait;
use memory_core::agents::{AgentError, CurationResult, Curator, CuratorBrief};
use memory_core::memory::MemoryBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct ExternalCommandCurator {
    command: Option<String>,
    timeout: Duration,
    /// Whether `ANTHROPIC_API_KEY` is set (spec §6 "curator fallback"). The
    /// curator LLM agent itself is out of scope for this crate (spec §1);
    /// this only records that a host wiring this curator up to call the
    /// Anthropic API directly, instead of shelling out to
    /// `MEMORY_CURATOR_COMMAND`, has a credential available to do so.
    has_anthropic_fallback: bool,
}

impl ExternalCommandCurator {
    pub fn new(timeout: Duration, anthropic_api_key: Option<&str>) -> Self {
        Self {
            command: std::env::var("MEMORY_CURATOR_COMMAND").ok(),
            timeout,
            has_anthropic_fallback: anthropic_api_key.is_some(),
        }
    }

    pub fn has_anthropic_fallback(&self) -> bool {
        self.has_anthropic_fallback
    }
}

#[derive(Serialize)]
struct CuratorRequest<'a> {
    session_id: &'a str,
    project_id: &'a str,
    session_number: u32,
    transcript_excerpt: &'a str,
    existing_headlines: &'a [String],
}

#[derive(Deserialize)]
struct CuratorResponseMemory {
    headline: String,
    content: String,
    reasoning: String,
    context_type: String,
}

#[derive(Deserialize)]
struct CuratorResponse {
    #[serde(default)]
    memories: Vec<CuratorResponseMemory>,
    #[serde(default)]
    session_summary: String,
    #[serde(default)]
    project_snapshot: Option<String>,
}

#[async_trait]
impl Curator for ExternalCommandCurator {
    async fn curate(&self, brief: &CuratorBrief) -> Result<CurationResult, AgentError> {
        let Some(command) = &self.command else {
            // No curator configured: nothing new to persist, but the
            // transcript still becomes the session summary so downstream
            // lifecycle bookkeeping has something to reconcile against.
            return Ok(CurationResult {
                new_memories: Vec::new(),
                session_summary: brief.transcript_excerpt.clone(),
                project_snapshot: None,
            });
        };

        let request = CuratorRequest {
            session_id: brief.session_id.as_str(),
            project_id: brief.project_id.as_str(),
            session_number: brief.session_number,
            transcript_excerpt: &brief.transcript_excerpt,
            existing_headlines: &brief.existing_headlines,
        };
        let payload = serde_json::to_vec(&request).map_err(|e| AgentError::Parse(e.to_string()))?;

        let mut child = Command::new(command)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| AgentError::AgentFailure(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.map_err(|e| AgentError::AgentFailure(e.to_string()))?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentError::Timeout)?
            .map_err(|e| AgentError::AgentFailure(e.to_string()))?;

        if !output.status.success() {
            return Err(AgentError::AgentFailure(format!(
                "curator command exited with {}",
                output.status
            )));
        }

        let mut raw = String::new();
        std::io::Read::read_to_string(&mut &output.stdout[..], &mut raw)
            .map_err(|e| AgentError::Parse(e.to_string()))?;

        let parsed: CuratorResponse = serde_json::from_str(&raw).map_err(|e| AgentError::Parse(e.to_string()))?;

        let new_memories = parsed
            .memories
            .into_iter()
            .filter_map(|m| {
                let context_type = memory_core::memory::ContextType::parse_canonical(&m.context_type)?;
                Some(
                    MemoryBuilder::new(brief.session_id.clone(), context_type, m.headline, m.content, m.reasoning)
                        .project_id(brief.project_id.clone()),
                )
            })
            .collect();

        Ok(CurationResult {
            new_memories,
            session_summary: parsed.session_summary,
            project_snapshot: parsed.project_snapshot,
        })
    }
}
