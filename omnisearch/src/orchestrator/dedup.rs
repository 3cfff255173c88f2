//! Result deduplication by normalised URL.
//!
//! One seen-set spans every source of a single fan-out. The first
//! occurrence of a URL in iteration order (source selection order, then
//! each source's own result order) is kept; later copies from any source
//! are dropped. Since selection is priority-sorted, the highest-priority
//! source reporting a URL wins.

use std::collections::HashSet;

use crate::types::{SourceResult, SourceResultMap};

use super::url_normalize::normalize_url;

/// Deduplicate across every source in the map, preserving source order.
///
/// A source whose results were all duplicates keeps an empty list.
pub fn deduplicate(map: SourceResultMap) -> SourceResultMap {
    let mut seen = HashSet::new();
    map.into_iter()
        .map(|(source_id, results)| {
            let kept = retain_unseen(results, &mut seen);
            (source_id, kept)
        })
        .collect()
}

/// Deduplicate a flat list, keeping first occurrences.
pub fn deduplicate_results(results: Vec<SourceResult>) -> Vec<SourceResult> {
    retain_unseen(results, &mut HashSet::new())
}

fn retain_unseen(results: Vec<SourceResult>, seen: &mut HashSet<String>) -> Vec<SourceResult> {
    results
        .into_iter()
        .filter(|r| seen.insert(normalize_url(&r.url)))
        .collect()
}
