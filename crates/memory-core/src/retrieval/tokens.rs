//! Tokenization shared by signal extraction (spec §4.2 "significant tokens").

use std::collections::HashSet;

/// Small stopword list; big enough to keep trigger/tag/content matching
/// from firing on filler words without needing a dictionary dependency.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
    "one", "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now",
    "old", "see", "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she",
    "too", "use", "that", "this", "with", "have", "from", "they", "will", "would", "there",
    "their", "what", "about", "which", "when", "make", "like", "time", "just", "know",
    "into", "your", "some", "could", "them", "than", "then", "been", "were", "said",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lowercase, strip non-alphanumeric-dash characters, drop stopwords and
/// anything shorter than 3 characters (spec §4.2 "significant tokens").
pub fn significant_tokens(text_lowercase: &str) -> HashSet<String> {
    text_lowercase
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|w| w.trim_matches('-').to_string())
        .filter(|w| w.len() >= 3 && !is_stopword(w))
        .collect()
}
