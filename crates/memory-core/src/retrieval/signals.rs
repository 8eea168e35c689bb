//! Six boolean relevance signals (spec §4.2 "Signal extraction").

use std::collections::HashSet;

use super::tokens::significant_tokens;
use super::RetrievalConfig;
use crate::embed::cosine_similarity;
use crate::memory::Memory;

#[derive(Debug, Clone, Copy, Default)]
pub struct Signals {
    pub trigger: bool,
    pub trigger_strength: f64,
    pub tags: bool,
    pub tag_count: usize,
    pub domain: bool,
    pub feature: bool,
    pub content: bool,
    pub vector: bool,
}

impl Signals {
    pub fn signal_count(&self) -> u32 {
        [self.trigger, self.tags, self.domain, self.feature, self.content, self.vector]
            .iter()
            .filter(|s| **s)
            .count() as u32
    }
}

fn singular_plural_match(word: &str, tokens: &HashSet<String>) -> bool {
    if let Some(singular) = word.strip_suffix('s') {
        if tokens.contains(singular) {
            return true;
        }
    }
    tokens.contains(&format!("{word}s"))
}

/// `(exact matches + 0.8 * singular/plural matches) / |significant words|`.
fn phrase_score(phrase: &str, message_tokens: &HashSet<String>) -> f64 {
    let phrase_words: Vec<String> = significant_tokens(&phrase.to_lowercase()).into_iter().collect();
    if phrase_words.is_empty() {
        return 0.0;
    }
    let mut score = 0.0;
    for word in &phrase_words {
        if message_tokens.contains(word) {
            score += 1.0;
        } else if singular_plural_match(word, message_tokens) {
            score += 0.8;
        }
    }
    score / phrase_words.len() as f64
}

fn trigger_signal(memory: &Memory, message_tokens: &HashSet<String>) -> (bool, f64) {
    let mut max_score = 0.0_f64;
    for phrase in &memory.trigger_phrases {
        let score = phrase_score(phrase, message_tokens);
        if score > max_score {
            max_score = score;
        }
    }
    (max_score >= 0.5, max_score)
}

fn tags_signal(memory: &Memory, message_tokens: &HashSet<String>, message_lower: &str) -> (bool, usize) {
    let count = memory
        .semantic_tags
        .iter()
        .filter(|tag| {
            let tag_lower = tag.to_lowercase();
            message_tokens.contains(&tag_lower) || message_lower.contains(&tag_lower)
        })
        .count();
    let threshold = if memory.semantic_tags.len() <= 2 { 1 } else { 2 };
    (count >= threshold, count)
}

fn value_present(value: &Option<String>, message_tokens: &HashSet<String>, message_lower: &str) -> bool {
    match value {
        Some(v) => {
            let v_lower = v.to_lowercase();
            message_tokens.contains(&v_lower) || message_lower.contains(&v_lower)
        }
        None => false,
    }
}

fn content_signal(memory: &Memory, message_tokens: &HashSet<String>) -> bool {
    let prefix: String = memory.content.chars().take(200).collect();
    let content_tokens = significant_tokens(&prefix.to_lowercase());
    content_tokens.intersection(message_tokens).count() >= 3
}

fn vector_signal(memory: &Memory, query_embedding: Option<&[f32]>, threshold: f32) -> bool {
    match (&memory.embedding, query_embedding) {
        (Some(stored), Some(query)) => cosine_similarity(stored, query) >= threshold,
        _ => false,
    }
}

pub fn compute(
    memory: &Memory,
    message_lower: &str,
    message_tokens: &HashSet<String>,
    query_embedding: Option<&[f32]>,
    config: &RetrievalConfig,
) -> Signals {
    let (trigger, trigger_strength) = trigger_signal(memory, message_tokens);
    let (tags, tag_count) = tags_signal(memory, message_tokens, message_lower);
    let domain = value_present(&memory.domain, message_tokens, message_lower);
    let feature = value_present(&memory.feature, message_tokens, message_lower);
    let content = content_signal(memory, message_tokens);
    let vector = vector_signal(memory, query_embedding, config.vector_threshold);

    Signals {
        trigger,
        trigger_strength,
        tags,
        tag_count,
        domain,
        feature,
        content,
        vector,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_fires_on_singular_plural_variant() {
        let mut tokens = HashSet::new();
        tokens.insert("bugs".to_string());
        let score = phrase_score("bug", &tokens);
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn tags_with_few_total_tags_needs_only_one_hit() {
        use crate::ids::SessionId;
        use crate::memory::{ContextType, MemoryBuilder};
        let m = MemoryBuilder::new(SessionId::from("s1"), ContextType::Debug, "h", "c", "r")
            .semantic_tags(vec!["retrieval".to_string()])
            .build(1, chrono::Utc::now());
        let tokens = significant_tokens("notes about retrieval internals");
        let (fires, count) = tags_signal(&m, &tokens, "notes about retrieval internals");
        assert!(fires);
        assert_eq!(count, 1);
    }
}
