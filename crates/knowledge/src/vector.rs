//! Vector similarity and rank fusion.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Reciprocal Rank Fusion (RRF) for merging ranked id lists

use std::collections::HashMap;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]. Returns 0.0 if either vector is empty,
/// zero-length, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank `(id, embedding)` candidates by similarity to `query`, best first.
pub fn rank_by_similarity<'a>(
    candidates: impl IntoIterator<Item = (&'a str, &'a [f32])>,
    query: &[f32],
    min_score: f32,
) -> Vec<(&'a str, f32)> {
    let mut scored: Vec<(&str, f32)> = candidates
        .into_iter()
        .map(|(id, emb)| (id, cosine_similarity(emb, query)))
        .filter(|(_, sim)| *sim >= min_score)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Reciprocal Rank Fusion: merge two ranked id lists.
///
/// Each id's score is the sum of `1/(k + rank)` over the lists it appears
/// in (rank is 1-based). Ties keep the order of first appearance, keyword
/// list first.
pub fn reciprocal_rank_fusion(
    keyword: &[&str],
    vector: &[&str],
    k: u32,
    limit: usize,
) -> Vec<(String, f32)> {
    let k = k as f32;
    let mut scores: HashMap<&str, (f32, usize)> = HashMap::new();
    let mut seen = 0usize;

    for list in [keyword, vector] {
        for (rank, id) in list.iter().enumerate() {
            let rrf = 1.0 / (k + rank as f32 + 1.0);
            scores
                .entry(*id)
                .and_modify(|(score, _)| *score += rrf)
                .or_insert_with(|| {
                    seen += 1;
                    (rrf, seen)
                });
        }
    }

    let mut results: Vec<(&str, f32, usize)> =
        scores.into_iter().map(|(id, (s, order))| (id, s, order)).collect();
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.2.cmp(&b.2))
    });
    results.truncate(limit);
    results.into_iter().map(|(id, s, _)| (id.to_string(), s)).collect()
}
