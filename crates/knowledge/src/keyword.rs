//! Keyword relevance scoring.
//!
//! A chunk's score is the number of query-term occurrences in its text,
//! normalised by text length in hundreds of characters (minimum 1).

const STOPWORDS: &[&str] = &[
    "and", "for", "the", "with", "from", "into", "that", "this", "are", "its", "per",
];

/// Lowercased query terms of at least three characters, without stopwords
/// or duplicates, in first-appearance order.
pub fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric() && c != '\'') {
        let term = raw.trim_matches('\'').to_lowercase();
        if term.chars().count() < 3 && !is_short_acronym(raw) {
            continue;
        }
        if STOPWORDS.contains(&term.as_str()) || terms.contains(&term) {
            continue;
        }
        terms.push(term);
    }
    terms
}

/// Keeps terms like "IP" or "US" that are meaningful despite their length.
fn is_short_acronym(raw: &str) -> bool {
    raw.len() >= 2 && raw.chars().all(|c| c.is_ascii_uppercase())
}

/// Score `text` against pre-computed lowercase `terms`.
pub fn score(text: &str, terms: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let occurrences: usize = terms.iter().map(|t| lower.matches(t.as_str()).count()).sum();
    occurrences as f32 / (text.len() as f32 / 100.0).max(1.0)
}
