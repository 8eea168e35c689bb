//! Type-specific defaults (spec §3 invariant 6, §9 "Defaults are a constant
//! table, not scattered conditionals").

use super::record::{ContextType, Scope, TemporalClass};

/// Defaults applied when the curator omits `temporal_class`, `fade_rate`, or
/// `scope` for a given [`ContextType`].
#[derive(Debug, Clone, Copy)]
pub struct ContextTypeDefaults {
    pub temporal_class: TemporalClass,
    pub scope: Scope,
    pub fade_rate: f64,
}

/// The constant defaults table, keyed by context type.
pub fn type_defaults(context_type: ContextType) -> ContextTypeDefaults {
    use ContextType::*;
    use Scope::*;
    use TemporalClass::*;

    let (temporal_class, scope, fade_rate) = match context_type {
        Technical => (LongTerm, Project, 0.05),
        Debug => (ShortTerm, Project, 0.15),
        Architecture => (Eternal, Project, 0.02),
        Decision => (LongTerm, Project, 0.05),
        Personal => (Eternal, Global, 0.01),
        Philosophy => (Eternal, Global, 0.01),
        Workflow => (MediumTerm, Project, 0.08),
        Milestone => (LongTerm, Project, 0.03),
        Breakthrough => (LongTerm, Project, 0.03),
        Unresolved => (ShortTerm, Project, 0.2),
        State => (ShortTerm, Project, 0.25),
    };

    ContextTypeDefaults {
        temporal_class,
        scope,
        fade_rate,
    }
}

impl TemporalClass {
    /// Retrieval weight a memory is restored to on successful surfacing.
    ///
    /// Open question in spec §9: the source variously implies restoring to
    /// `initial_weight` or to `importance_weight`. We restore to a
    /// per-temporal-class constant (`initial_weight`) so the decay/restore
    /// cycle never depends on a curator-supplied judgement call that can
    /// itself drift over time. See DESIGN.md.
    pub fn initial_weight(self) -> f64 {
        match self {
            TemporalClass::Eternal => 1.0,
            TemporalClass::LongTerm => 0.9,
            TemporalClass::MediumTerm => 0.75,
            TemporalClass::ShortTerm => 0.6,
            TemporalClass::Ephemeral => 0.5,
        }
    }

    /// Number of surfacing-free sessions an ephemeral memory tolerates
    /// before the Lifecycle Manager archives it (spec §4.3 item 3). Only
    /// ephemeral memories expire this way; this was a per-record field in
    /// the legacy schema (`expires_after_sessions`, removed by migration,
    /// see §4.5) and is now a type-level constant.
    pub fn expires_after_sessions(self) -> Option<u32> {
        match self {
            TemporalClass::Ephemeral => Some(3),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_defaults_to_project_scope_and_fast_fade() {
        let d = type_defaults(ContextType::State);
        assert_eq!(d.scope, Scope::Project);
        assert!(d.fade_rate > 0.1);
    }

    #[test]
    fn personal_defaults_to_global_scope() {
        let d = type_defaults(ContextType::Personal);
        assert_eq!(d.scope, Scope::Global);
    }

    #[test]
    fn only_ephemeral_expires_by_session_count() {
        for tc in [
            TemporalClass::Eternal,
            TemporalClass::LongTerm,
            TemporalClass::MediumTerm,
            TemporalClass::ShortTerm,
        ] {
            assert_eq!(tc.expires_after_sessions(), None);
        }
        assert_eq!(TemporalClass::Ephemeral.expires_after_sessions(), Some(3));
    }
}
