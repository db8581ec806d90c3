//! Citation extraction.
//!
//! A fragment counts as cited when the generated text names its source id,
//! `SOURCE {i}` or `[{i}]` (1-based rank). When nothing is cited explicitly,
//! every retrieved fragment is attached since all of them grounded the prompt.

use tpforge_core::retrieval::RegulatoryFragment;

pub fn extract(content: &str, fragments: &[RegulatoryFragment]) -> Vec<String> {
    let explicit: Vec<&RegulatoryFragment> = fragments
        .iter()
        .enumerate()
        .filter(|(i, f)| is_referenced(content, i + 1, &f.source_id))
        .map(|(_, f)| f)
        .collect();

    let cited: Vec<&RegulatoryFragment> = if explicit.is_empty() {
        fragments.iter().collect()
    } else {
        explicit
    };

    let mut ids: Vec<String> = Vec::with_capacity(cited.len());
    for f in cited {
        if !ids.contains(&f.source_id) {
            ids.push(f.source_id.clone());
        }
    }
    ids
}

fn is_referenced(content: &str, rank: usize, source_id: &str) -> bool {
    (!source_id.is_empty() && content.contains(source_id))
        || mentions_number(content, &format!("SOURCE {rank}"))
        || content.contains(&format!("[{rank}]"))
}

/// `needle` followed by a non-digit, so `SOURCE 1` does not match `SOURCE 12`.
fn mentions_number(content: &str, needle: &str) -> bool {
    content.match_indices(needle).any(|(at, _)| {
        !content[at + needle.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}
