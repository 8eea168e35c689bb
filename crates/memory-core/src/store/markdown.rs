//! Markdown + YAML frontmatter file format (spec §6 "Memory file format").
//!
//! Each record type gets a thin serialize/parse pair rather than one generic
//! function, because the spec pins down a different "human-readable body"
//! field per type (the memory's `content`, a session summary's `summary`
//! text, …) while everything else lives in the frontmatter.

use std::collections::HashMap;

use chrono::Utc;
use serde_yaml::Value;

use super::StoreError;
use crate::memory::{ManagementLog, Memory, PersonalPrimer, ProjectSnapshot, Session, SessionSummary};
use crate::migration;

fn split_frontmatter(text: &str) -> Result<(&str, &str), StoreError> {
    let text = text.trim_start_matches('\u{feff}');
    let rest = text
        .strip_prefix("---")
        .ok_or_else(|| StoreError::Schema("missing frontmatter opening delimiter".into()))?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest
        .find("\n---")
        .ok_or_else(|| StoreError::Schema("missing frontmatter closing delimiter".into()))?;
    let frontmatter = &rest[..end];
    let after = &rest[end + 4..];
    let body = after.strip_prefix('\n').unwrap_or(after);
    Ok((frontmatter, body))
}

fn remove_key(value: &mut Value, key: &str) -> Option<Value> {
    if let Value::Mapping(map) = value {
        map.remove(Value::String(key.to_string()))
    } else {
        None
    }
}

fn insert_key(value: &mut Value, key: &str, v: Value) {
    if let Value::Mapping(map) = value {
        map.insert(Value::String(key.to_string()), v);
    }
}

fn as_text(v: Option<Value>) -> String {
    match v {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

pub fn memory_to_markdown(m: &Memory) -> Result<String, StoreError> {
    let mut value = serde_yaml::to_value(m).map_err(|e| StoreError::Schema(e.to_string()))?;
    remove_key(&mut value, "content");
    let frontmatter = serde_yaml::to_string(&value).map_err(|e| StoreError::Schema(e.to_string()))?;
    Ok(format!("---\n{frontmatter}---\n\n{}\n", m.content))
}

/// Migrates (spec §4.5) a record's frontmatter before parsing it into the
/// strict, canonical-11 [`Memory`] struct, so files written under an older
/// schema version load instead of failing typed deserialization. No overlay
/// remap table is threaded through here: nothing in this crate's public
/// surface yet accepts one from a caller, so every load uses the built-in
/// table plus the fuzzy fallback. See DESIGN.md.
pub fn memory_from_markdown(text: &str) -> Result<Memory, StoreError> {
    let (fm, body) = split_frontmatter(text)?;
    let mut value: Value = serde_yaml::from_str(fm).map_err(|e| StoreError::Schema(e.to_string()))?;
    migration::migrate_value(&mut value, &HashMap::new());
    insert_key(&mut value, "content", Value::String(body.trim_end().to_string()));
    serde_yaml::from_value(value).map_err(|e| StoreError::Schema(e.to_string()))
}

pub fn session_to_markdown(s: &Session) -> Result<String, StoreError> {
    let frontmatter = serde_yaml::to_string(s).map_err(|e| StoreError::Schema(e.to_string()))?;
    Ok(format!("---\n{frontmatter}---\n"))
}

pub fn session_from_markdown(text: &str) -> Result<Session, StoreError> {
    let (fm, _body) = split_frontmatter(text)?;
    serde_yaml::from_str(fm).map_err(|e| StoreError::Schema(e.to_string()))
}

pub fn summary_to_markdown(s: &SessionSummary) -> Result<String, StoreError> {
    let mut value = serde_yaml::to_value(s).map_err(|e| StoreError::Schema(e.to_string()))?;
    remove_key(&mut value, "summary");
    let frontmatter = serde_yaml::to_string(&value).map_err(|e| StoreError::Schema(e.to_string()))?;
    Ok(format!("---\n{frontmatter}---\n\n{}\n", s.summary))
}

pub fn summary_from_markdown(text: &str) -> Result<SessionSummary, StoreError> {
    let (fm, body) = split_frontmatter(text)?;
    let mut value: Value = serde_yaml::from_str(fm).map_err(|e| StoreError::Schema(e.to_string()))?;
    insert_key(&mut value, "summary", Value::String(body.trim_end().to_string()));
    serde_yaml::from_value(value).map_err(|e| StoreError::Schema(e.to_string()))
}

pub fn snapshot_to_markdown(s: &ProjectSnapshot) -> Result<String, StoreError> {
    let mut value = serde_yaml::to_value(s).map_err(|e| StoreError::Schema(e.to_string()))?;
    remove_key(&mut value, "snapshot");
    let frontmatter = serde_yaml::to_string(&value).map_err(|e| StoreError::Schema(e.to_string()))?;
    Ok(format!("---\n{frontmatter}---\n\n{}\n", s.snapshot))
}

pub fn snapshot_from_markdown(text: &str) -> Result<ProjectSnapshot, StoreError> {
    let (fm, body) = split_frontmatter(text)?;
    let mut value: Value = serde_yaml::from_str(fm).map_err(|e| StoreError::Schema(e.to_string()))?;
    insert_key(&mut value, "snapshot", Value::String(body.trim_end().to_string()));
    serde_yaml::from_value(value).map_err(|e| StoreError::Schema(e.to_string()))
}

pub fn management_log_to_markdown(l: &ManagementLog) -> Result<String, StoreError> {
    let mut value = serde_yaml::to_value(l).map_err(|e| StoreError::Schema(e.to_string()))?;
    remove_key(&mut value, "notes");
    let frontmatter = serde_yaml::to_string(&value).map_err(|e| StoreError::Schema(e.to_string()))?;
    let body = l.notes.join("\n");
    Ok(format!("---\n{frontmatter}---\n\n{body}\n"))
}

pub fn management_log_from_markdown(text: &str) -> Result<ManagementLog, StoreError> {
    let (fm, body) = split_frontmatter(text)?;
    let mut value: Value = serde_yaml::from_str(fm).map_err(|e| StoreError::Schema(e.to_string()))?;
    let notes: Vec<Value> = body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| Value::String(l.to_string()))
        .collect();
    insert_key(&mut value, "notes", Value::Sequence(notes));
    serde_yaml::from_value(value).map_err(|e| StoreError::Schema(e.to_string()))
}

pub fn primer_to_markdown(p: &PersonalPrimer) -> String {
    format!("---\nupdatedAt: {}\n---\n\n{}\n", p.updated_at.to_rfc3339(), p.markdown)
}

pub fn primer_from_markdown(text: &str) -> Result<PersonalPrimer, StoreError> {
    if text.trim().is_empty() {
        return Ok(PersonalPrimer::empty(Utc::now()));
    }
    let (fm, body) = split_frontmatter(text)?;
    let value: Value = serde_yaml::from_str(fm).map_err(|e| StoreError::Schema(e.to_string()))?;
    let updated_at_str = as_text(value.get("updatedAt").cloned());
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Ok(PersonalPrimer {
        markdown: body.trim_end().to_string(),
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SessionId;
    use crate::memory::{ContextType, MemoryBuilder};

    #[test]
    fn memory_roundtrips_through_markdown() {
        let m = MemoryBuilder::new(SessionId::from("s1"), ContextType::Debug, "head", "the body content", "why")
            .build(1, Utc::now());
        let md = memory_to_markdown(&m).unwrap();
        assert!(md.contains("the body content"));
        assert!(!md.contains("content:"));
        let parsed = memory_from_markdown(&md).unwrap();
        assert_eq!(parsed.id, m.id);
        assert_eq!(parsed.content, m.content);
        assert_eq!(parsed.headline, m.headline);
    }

    #[test]
    fn primer_roundtrips() {
        let p = PersonalPrimer {
            markdown: "# About\nLikes Rust.".to_string(),
            updated_at: Utc::now(),
        };
        let md = primer_to_markdown(&p);
        let parsed = primer_from_markdown(&md).unwrap();
        assert_eq!(parsed.markdown, p.markdown);
    }
}
