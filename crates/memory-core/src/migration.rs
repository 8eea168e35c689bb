//! Migration (spec §4.5). Idempotent, safe to run repeatedly.
//!
//! Operates on raw YAML frontmatter rather than the typed [`Memory`]
//! struct: the whole point is to absorb the legacy schema's free-form
//! `context_type` strings and now-obsolete fields *before* anything tries
//! to deserialize a record into the strict, canonical-11 enum.

use std::collections::HashMap;

use serde_yaml::Value;

use crate::memory::{ContextType, CURRENT_SCHEMA_VERSION};

const OBSOLETE_FIELDS: &[&str] = &[
    "emotionalResonance",
    "knowledgeDomain",
    "component",
    "parentId",
    "childIds",
    "expiresAfterSessions",
    "temporalRelevance",
    "prerequisite",
    "followUp",
    "dependency",
];

/// Built-in legacy `context_type` -> canonical mapping. Not exhaustive over
/// every string the source corpus produced (spec §9 notes 170+ distinct
/// values accumulated over time); covers the common clusters, with
/// [`fuzzy_map_context_type`] catching the long tail and a `technical`
/// catch-all for anything it can't place.
fn builtin_context_type_table() -> HashMap<&'static str, ContextType> {
    use ContextType::*;
    HashMap::from([
        ("bug_fix", Debug),
        ("bugfix", Debug),
        ("error_fix", Debug),
        ("troubleshooting", Debug),
        ("design_decision", Decision),
        ("tech_decision", Decision),
        ("technical_decision", Decision),
        ("architecture_choice", Architecture),
        ("system_design", Architecture),
        ("design_pattern", Architecture),
        ("personal_info", Personal),
        ("user_preference", Personal),
        ("preference", Personal),
        ("relationship", Personal),
        ("life_philosophy", Philosophy),
        ("belief", Philosophy),
        ("values", Philosophy),
        ("dev_workflow", Workflow),
        ("process_note", Workflow),
        ("procedure", Workflow),
        ("milestone_reached", Milestone),
        ("achievement", Milestone),
        ("accomplishment", Milestone),
        ("eureka", Breakthrough),
        ("insight", Breakthrough),
        ("realization", Breakthrough),
        ("open_question", Unresolved),
        ("todo", Unresolved),
        ("open_item", Unresolved),
        ("current_state", State),
        ("status_update", State),
        ("project_status", State),
        ("implementation_detail", Technical),
        ("code_note", Technical),
        ("api_note", Technical),
    ])
}

/// Substring match against each type's retrieval keyword table (spec §4.2)
/// as a last resort before falling back to `technical`.
fn fuzzy_map_context_type(raw_lower: &str) -> ContextType {
    for ct in ContextType::ALL {
        if ct.keyword_bonus_terms().iter().any(|kw| raw_lower.contains(kw)) {
            return ct;
        }
    }
    ContextType::Technical
}

fn map_context_type(raw: &str, overlay: &HashMap<String, ContextType>) -> ContextType {
    if let Some(canonical) = ContextType::parse_canonical(raw) {
        return canonical;
    }
    let lower = raw.to_lowercase();
    if let Some(ct) = overlay.get(&lower) {
        return *ct;
    }
    if let Some(ct) = builtin_context_type_table().get(lower.as_str()) {
        return *ct;
    }
    fuzzy_map_context_type(&lower)
}

fn legacy_temporal_relevance_to_class(raw: &str) -> Option<&'static str> {
    match raw.to_lowercase().as_str() {
        "permanent" | "forever" | "eternal" => Some("eternal"),
        "long" | "long_term" | "long-term" => Some("long_term"),
        "medium" | "medium_term" | "medium-term" => Some("medium_term"),
        "short" | "short_term" | "short-term" => Some("short_term"),
        "temporary" | "ephemeral" | "volatile" => Some("ephemeral"),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct MigrationOutcome {
    pub schema_upgraded: bool,
    pub context_type_remapped: bool,
    pub temporal_relevance_mapped: bool,
    pub obsolete_fields_removed: Vec<String>,
    pub needs_reembed: bool,
}

fn key(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Migrate one record's raw frontmatter map in place. `overlay` is a
/// caller-supplied remap table that takes priority over the built-in one
/// (spec §4.5 "Custom remap tables overlay the built-in table").
pub fn migrate_value(value: &mut Value, overlay: &HashMap<String, ContextType>) -> MigrationOutcome {
    let mut outcome = MigrationOutcome::default();

    let Value::Mapping(map) = value else {
        return outcome;
    };

    let schema_version = map
        .get(&key("schemaVersion"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    if schema_version < CURRENT_SCHEMA_VERSION as u64 {
        outcome.schema_upgraded = true;

        if let Some(Value::String(raw)) = map.get(&key("contextType")).cloned() {
            let canonical = map_context_type(&raw, overlay);
            if canonical.as_str() != raw {
                outcome.context_type_remapped = true;
            }
            map.insert(key("contextType"), Value::String(canonical.as_str().to_string()));
        }

        let has_temporal_class = map.contains_key(&key("temporalClass"));
        if !has_temporal_class {
            if let Some(Value::String(raw)) = map.get(&key("temporalRelevance")).cloned() {
                if let Some(mapped) = legacy_temporal_relevance_to_class(&raw) {
                    map.insert(key("temporalClass"), Value::String(mapped.to_string()));
                    outcome.temporal_relevance_mapped = true;
                }
            }
        }

        for field in OBSOLETE_FIELDS {
            if map.remove(&key(field)).is_some() {
                outcome.obsolete_fields_removed.push((*field).to_string());
            }
        }

        map.insert(key("schemaVersion"), Value::Number(CURRENT_SCHEMA_VERSION.into()));
    }

    let embedding_len = map
        .get(&key("embedding"))
        .and_then(|v| v.as_sequence())
        .map(|seq| seq.len());
    outcome.needs_reembed = !matches!(embedding_len, Some(len) if len == crate::EMBEDDING_DIMENSIONS);

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, Value)]) -> Value {
        let mut map = serde_yaml::Mapping::new();
        for (k, v) in pairs {
            map.insert(Value::String((*k).to_string()), v.clone());
        }
        Value::Mapping(map)
    }

    #[test]
    fn remaps_legacy_context_type_and_drops_obsolete_fields() {
        let mut v = mapping(&[
            ("schemaVersion", Value::Number(1.into())),
            ("contextType", Value::String("bug_fix".into())),
            ("emotionalResonance", Value::Number(0.8.into())),
        ]);
        let outcome = migrate_value(&mut v, &HashMap::new());
        assert!(outcome.context_type_remapped);
        assert_eq!(outcome.obsolete_fields_removed, vec!["emotionalResonance"]);
        assert_eq!(
            v.get("contextType").and_then(|x| x.as_str()),
            Some("debug")
        );
    }

    #[test]
    fn already_current_schema_is_left_untouched() {
        let mut v = mapping(&[
            ("schemaVersion", Value::Number((CURRENT_SCHEMA_VERSION as u64).into())),
            ("contextType", Value::String("debug".into())),
        ]);
        let outcome = migrate_value(&mut v, &HashMap::new());
        assert!(!outcome.schema_upgraded);
        assert_eq!(v.get("contextType").and_then(|x| x.as_str()), Some("debug"));
    }

    #[test]
    fn overlay_takes_priority_over_builtin_table() {
        let mut overlay = HashMap::new();
        overlay.insert("bug_fix".to_string(), ContextType::Technical);
        let mut v = mapping(&[
            ("schemaVersion", Value::Number(1.into())),
            ("contextType", Value::String("bug_fix".into())),
        ]);
        migrate_value(&mut v, &overlay);
        assert_eq!(v.get("contextType").and_then(|x| x.as_str()), Some("technical"));
    }

    #[test]
    fn running_twice_is_idempotent() {
        let mut v = mapping(&[
            ("schemaVersion", Value::Number(1.into())),
            ("contextType", Value::String("eureka".into())),
            ("temporalRelevance", Value::String("permanent".into())),
        ]);
        migrate_value(&mut v, &HashMap::new());
        let first = v.clone();
        migrate_value(&mut v, &HashMap::new());
        assert_eq!(v, first);
    }
}
