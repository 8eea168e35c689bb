//! The `Memory` entity (spec §3) and its strict enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::ids::{MemoryId, ProjectId, SessionId};
use crate::EMBEDDING_DIMENSIONS;

use super::defaults::type_defaults;

// ============================================================================
// ENUMS
// ============================================================================

/// The closed sum type replacing the source corpus's 170+ free-form
/// `context_type` strings (spec §9 "Dynamic / stringly-typed enums").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Technical,
    Debug,
    Architecture,
    Decision,
    Personal,
    Philosophy,
    Workflow,
    Milestone,
    Breakthrough,
    Unresolved,
    State,
}

impl ContextType {
    pub const ALL: [ContextType; 11] = [
        ContextType::Technical,
        ContextType::Debug,
        ContextType::Architecture,
        ContextType::Decision,
        ContextType::Personal,
        ContextType::Philosophy,
        ContextType::Workflow,
        ContextType::Milestone,
        ContextType::Breakthrough,
        ContextType::Unresolved,
        ContextType::State,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Technical => "technical",
            ContextType::Debug => "debug",
            ContextType::Architecture => "architecture",
            ContextType::Decision => "decision",
            ContextType::Personal => "personal",
            ContextType::Philosophy => "philosophy",
            ContextType::Workflow => "workflow",
            ContextType::Milestone => "milestone",
            ContextType::Breakthrough => "breakthrough",
            ContextType::Unresolved => "unresolved",
            ContextType::State => "state",
        }
    }

    /// Strict parse of a canonical value. Unknown values are rejected here;
    /// lossy legacy mapping lives in [`crate::migration`].
    pub fn parse_canonical(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Keywords used by the importance-ranking context-type bonus
    /// (spec §4.2 "Context-type keyword table"). `None` for types with no
    /// listed keyword bonus (personal, milestone, unresolved, state).
    pub fn keyword_bonus_terms(&self) -> &'static [&'static str] {
        match self {
            ContextType::Debug => &["debug", "bug", "error", "fix", "issue", "problem", "broken"],
            ContextType::Decision => &["decide", "decision", "choose", "choice", "option", "should"],
            ContextType::Architecture => &["architect", "design", "structure", "pattern", "how"],
            ContextType::Breakthrough => &["insight", "realize", "understand", "discover", "why"],
            ContextType::Technical => &["implement", "code", "function", "method", "api"],
            ContextType::Workflow => &["process", "workflow", "step", "flow", "pipeline"],
            ContextType::Philosophy => &["philosophy", "principle", "belief", "approach", "think"],
            ContextType::Personal | ContextType::Milestone | ContextType::Unresolved | ContextType::State => {
                &[]
            }
        }
    }
}

/// Whether a memory is shared across all projects or belongs to one
/// (invariant 5: `scope = global` iff `project_id = "global"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Project,
}

/// Governs decay behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalClass {
    Eternal,
    LongTerm,
    MediumTerm,
    ShortTerm,
    Ephemeral,
}

/// Lifecycle state (spec §3, §4.3 state machine). Transitions are driven
/// exclusively by the Lifecycle Manager; see [`Status::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Pending,
    Superseded,
    Deprecated,
    Archived,
}

impl Status {
    /// `superseded` and `archived` are terminal; every other transition in
    /// spec §4.3's state machine is explicitly enumerated.
    pub fn can_transition_to(self, target: Status) -> bool {
        use Status::*;
        matches!(
            (self, target),
            (Active, Pending) | (Active, Superseded) | (Active, Deprecated) | (Active, Archived)
                | (Pending, Active) | (Pending, Superseded)
                | (Deprecated, Archived)
        )
    }

    /// A retrieval candidate must be active (invariant 4).
    pub fn is_retrievable(self) -> bool {
        matches!(self, Status::Active)
    }
}

#[derive(Debug, Error)]
pub enum RelationshipError {
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: Status, to: Status },
    #[error("embedding must have exactly {expected} dimensions, got {actual}")]
    WrongEmbeddingDimensions { expected: usize, actual: usize },
}

// ============================================================================
// MEMORY
// ============================================================================

/// The central entity (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    // Identity
    pub id: MemoryId,
    pub session_id: SessionId,
    pub project_id: ProjectId,

    // Content
    pub headline: String,
    pub content: String,
    pub reasoning: String,
    #[serde(default)]
    pub related_files: Vec<String>,

    // Scores
    pub importance_weight: f64,
    pub confidence_score: f64,

    // Classification
    pub context_type: ContextType,
    pub scope: Scope,
    pub temporal_class: TemporalClass,
    pub status: Status,

    // Retrieval signals
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    #[serde(default)]
    pub semantic_tags: Vec<String>,
    #[serde(default)]
    pub anti_triggers: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub question_types: Vec<String>,

    // Flags
    #[serde(default)]
    pub action_required: bool,
    #[serde(default)]
    pub problem_solution_pair: bool,
    #[serde(default)]
    pub awaiting_implementation: bool,
    #[serde(default)]
    pub awaiting_decision: bool,
    #[serde(default)]
    pub exclude_from_retrieval: bool,

    // Lifecycle counters
    pub session_created: u32,
    pub session_updated: u32,
    #[serde(default)]
    pub last_surfaced: Option<u32>,
    #[serde(default)]
    pub sessions_since_surfaced: u32,
    pub fade_rate: f64,
    pub retrieval_weight: f64,

    // Relationships
    #[serde(default)]
    pub supersedes: Option<MemoryId>,
    #[serde(default)]
    pub superseded_by: Option<MemoryId>,
    #[serde(default)]
    pub resolves: Vec<MemoryId>,
    #[serde(default)]
    pub resolved_by: Option<MemoryId>,
    #[serde(default)]
    pub related_to: BTreeSet<MemoryId>,
    #[serde(default)]
    pub blocks: Vec<MemoryId>,
    #[serde(default)]
    pub blocked_by: Vec<MemoryId>,

    // Vector
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding_stale: bool,

    // Bookkeeping
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Current schema version new records are written at; see [`crate::migration`].
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

impl Memory {
    /// Invariant 5: scope/project_id agreement.
    pub fn scope_matches_project(&self) -> bool {
        match self.scope {
            Scope::Global => self.project_id.is_global(),
            Scope::Project => !self.project_id.is_global(),
        }
    }

    /// Invariant 7.
    pub fn validate_embedding_dimensions(&self) -> Result<(), RelationshipError> {
        if let Some(v) = &self.embedding {
            if v.len() != EMBEDDING_DIMENSIONS {
                return Err(RelationshipError::WrongEmbeddingDimensions {
                    expected: EMBEDDING_DIMENSIONS,
                    actual: v.len(),
                });
            }
        }
        Ok(())
    }

    /// Apply a status transition, rejecting invalid ones (spec §4.3).
    pub fn transition_status(&mut self, target: Status) -> Result<(), RelationshipError> {
        if self.status == target {
            return Ok(());
        }
        if !self.status.can_transition_to(target) {
            return Err(RelationshipError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Mark content changed without a fresh embedding (staleness bit).
    pub fn mark_content_changed(&mut self, now: DateTime<Utc>) {
        self.embedding_stale = true;
        self.updated_at = now;
    }

    /// Re-embed: clears staleness and installs the new vector.
    pub fn apply_embedding(&mut self, vector: Vec<f32>, now: DateTime<Utc>) -> Result<(), RelationshipError> {
        if vector.len() != EMBEDDING_DIMENSIONS {
            return Err(RelationshipError::WrongEmbeddingDimensions {
                expected: EMBEDDING_DIMENSIONS,
                actual: vector.len(),
            });
        }
        self.embedding = Some(vector);
        self.embedding_stale = false;
        self.updated_at = now;
        Ok(())
    }

    /// Reset decay state on successful surfacing (spec §4.3 item 3, P7).
    pub fn reset_decay_on_surface(&mut self, session_number: u32) {
        self.sessions_since_surfaced = 0;
        self.retrieval_weight = self.temporal_class.initial_weight();
        self.last_surfaced = Some(session_number);
    }

    /// One decay tick, applied at session start for every memory with
    /// `fade_rate > 0` (spec §4.3 item 3).
    pub fn apply_decay_tick(&mut self) {
        if self.fade_rate > 0.0 {
            self.sessions_since_surfaced += 1;
            self.retrieval_weight = (self.retrieval_weight - self.fade_rate).max(0.1);
        }
    }

    /// Whether an ephemeral memory has outlived its patience (spec §4.3 item 3).
    pub fn should_expire(&self) -> bool {
        match self.temporal_class.expires_after_sessions() {
            Some(limit) => self.sessions_since_surfaced > limit,
            None => false,
        }
    }
}

/// Builder that applies spec §3 invariant 6 (type-specific defaults) when the
/// curator output omits a field. Mirrors how curator output is re-validated
/// at the core boundary (spec §6 "the core trusts the shape but re-applies
/// defaults and validates enums").
pub struct MemoryBuilder {
    id: MemoryId,
    session_id: SessionId,
    project_id: Option<ProjectId>,
    headline: String,
    content: String,
    reasoning: String,
    context_type: ContextType,
    importance_weight: f64,
    confidence_score: f64,
    scope: Option<Scope>,
    temporal_class: Option<TemporalClass>,
    fade_rate: Option<f64>,
    trigger_phrases: Vec<String>,
    semantic_tags: Vec<String>,
    anti_triggers: Vec<String>,
    domain: Option<String>,
    feature: Option<String>,
    question_types: Vec<String>,
    related_files: Vec<String>,
    action_required: bool,
    problem_solution_pair: bool,
    awaiting_implementation: bool,
    awaiting_decision: bool,
    resolves: Vec<MemoryId>,
}

impl MemoryBuilder {
    pub fn new(
        session_id: SessionId,
        context_type: ContextType,
        headline: impl Into<String>,
        content: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: MemoryId::generate(),
            session_id,
            project_id: None,
            headline: headline.into(),
            content: content.into(),
            reasoning: reasoning.into(),
            context_type,
            importance_weight: 0.5,
            confidence_score: 0.8,
            scope: None,
            temporal_class: None,
            fade_rate: None,
            trigger_phrases: Vec::new(),
            semantic_tags: Vec::new(),
            anti_triggers: Vec::new(),
            domain: None,
            feature: None,
            question_types: Vec::new(),
            related_files: Vec::new(),
            action_required: false,
            problem_solution_pair: false,
            awaiting_implementation: false,
            awaiting_decision: false,
            resolves: Vec::new(),
        }
    }

    pub fn project_id(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }
    pub fn temporal_class(mut self, tc: TemporalClass) -> Self {
        self.temporal_class = Some(tc);
        self
    }
    pub fn fade_rate(mut self, rate: f64) -> Self {
        self.fade_rate = Some(rate);
        self
    }
    pub fn importance_weight(mut self, w: f64) -> Self {
        self.importance_weight = w.clamp(0.0, 1.0);
        self
    }
    pub fn confidence_score(mut self, c: f64) -> Self {
        self.confidence_score = c.clamp(0.0, 1.0);
        self
    }
    pub fn trigger_phrases(mut self, v: Vec<String>) -> Self {
        self.trigger_phrases = v;
        self
    }
    pub fn semantic_tags(mut self, v: Vec<String>) -> Self {
        self.semantic_tags = v;
        self
    }
    pub fn anti_triggers(mut self, v: Vec<String>) -> Self {
        self.anti_triggers = v;
        self
    }
    pub fn domain(mut self, d: impl Into<String>) -> Self {
        self.domain = Some(d.into());
        self
    }
    pub fn feature(mut self, f: impl Into<String>) -> Self {
        self.feature = Some(f.into());
        self
    }
    pub fn question_types(mut self, v: Vec<String>) -> Self {
        self.question_types = v;
        self
    }
    pub fn related_files(mut self, v: Vec<String>) -> Self {
        self.related_files = v;
        self
    }
    pub fn action_required(mut self, v: bool) -> Self {
        self.action_required = v;
        self
    }
    pub fn problem_solution_pair(mut self, v: bool) -> Self {
        self.problem_solution_pair = v;
        self
    }
    pub fn awaiting_implementation(mut self, v: bool) -> Self {
        self.awaiting_implementation = v;
        self
    }
    pub fn awaiting_decision(mut self, v: bool) -> Self {
        self.awaiting_decision = v;
        self
    }
    pub fn resolves(mut self, ids: Vec<MemoryId>) -> Self {
        self.resolves = ids;
        self
    }

    pub fn build(self, session_number: u32, now: DateTime<Utc>) -> Memory {
        let defaults = type_defaults(self.context_type);
        let scope = self.scope.unwrap_or(defaults.scope);
        let temporal_class = self.temporal_class.unwrap_or(defaults.temporal_class);
        let fade_rate = self.fade_rate.unwrap_or(defaults.fade_rate);
        let project_id = match scope {
            Scope::Global => ProjectId::global(),
            Scope::Project => self.project_id.unwrap_or_else(ProjectId::global),
        };

        Memory {
            id: self.id,
            session_id: self.session_id,
            project_id,
            headline: self.headline,
            content: self.content,
            reasoning: self.reasoning,
            related_files: self.related_files,
            importance_weight: self.importance_weight,
            confidence_score: self.confidence_score,
            context_type: self.context_type,
            scope,
            temporal_class,
            status: Status::Active,
            trigger_phrases: self.trigger_phrases,
            semantic_tags: self.semantic_tags,
            anti_triggers: self.anti_triggers,
            domain: self.domain,
            feature: self.feature,
            question_types: self.question_types,
            action_required: self.action_required,
            problem_solution_pair: self.problem_solution_pair,
            awaiting_implementation: self.awaiting_implementation,
            awaiting_decision: self.awaiting_decision,
            exclude_from_retrieval: false,
            session_created: session_number,
            session_updated: session_number,
            last_surfaced: None,
            sessions_since_surfaced: 0,
            fade_rate,
            retrieval_weight: temporal_class.initial_weight(),
            supersedes: None,
            superseded_by: None,
            resolves: self.resolves,
            resolved_by: None,
            related_to: BTreeSet::new(),
            blocks: Vec::new(),
            blocked_by: Vec::new(),
            embedding: None,
            embedding_stale: true,
            schema_version: CURRENT_SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn builder_applies_type_defaults_when_omitted() {
        let m = MemoryBuilder::new(
            SessionId::from("s1"),
            ContextType::Architecture,
            "headline",
            "content",
            "reasoning",
        )
        .build(1, now());

        assert_eq!(m.temporal_class, TemporalClass::Eternal);
        assert_eq!(m.scope, Scope::Project);
        assert!(m.scope_matches_project() == false || m.project_id.is_global());
    }

    #[test]
    fn global_scope_forces_global_project_id() {
        let m = MemoryBuilder::new(
            SessionId::from("s1"),
            ContextType::Personal,
            "h",
            "c",
            "r",
        )
        .build(1, now());
        assert_eq!(m.scope, Scope::Global);
        assert!(m.project_id.is_global());
        assert!(m.scope_matches_project());
    }

    #[test]
    fn status_state_machine_rejects_resurrection() {
        let mut m = MemoryBuilder::new(SessionId::from("s1"), ContextType::State, "h", "c", "r")
            .build(1, now());
        m.transition_status(Status::Superseded).unwrap();
        let err = m.transition_status(Status::Active).unwrap_err();
        assert!(matches!(err, RelationshipError::InvalidTransition { .. }));
    }

    #[test]
    fn embedding_must_be_384_dimensions() {
        let mut m = MemoryBuilder::new(SessionId::from("s1"), ContextType::Technical, "h", "c", "r")
            .build(1, now());
        assert!(m.apply_embedding(vec![0.0; 10], now()).is_err());
        assert!(m.apply_embedding(vec![0.0; EMBEDDING_DIMENSIONS], now()).is_ok());
        assert!(!m.embedding_stale);
    }

    #[test]
    fn decay_floors_at_one_tenth_and_resets_on_surface() {
        let mut m = MemoryBuilder::new(SessionId::from("s1"), ContextType::State, "h", "c", "r")
            .fade_rate(0.9)
            .build(1, now());
        m.retrieval_weight = 0.5;
        m.apply_decay_tick();
        assert!(m.retrieval_weight >= 0.1);
        m.reset_decay_on_surface(5);
        assert_eq!(m.sessions_since_surfaced, 0);
        assert_eq!(m.last_surfaced, Some(5));
    }
}
