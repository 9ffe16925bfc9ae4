//! Shared helpers: query tokenization, edit distance, and fuzzy scoring.

mod ttl_cache;

pub use ttl_cache::TtlCache;

use std::collections::BTreeSet;

/// Split a query into lowercased, trimmed, de-duplicated tokens of
/// length >= 2.
pub fn tokenize(query: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut tokens = Vec::new();
    for raw in query.split_whitespace() {
        let token = raw.trim().to_lowercase();
        if token.len() < 2 {
            continue;
        }
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }
    tokens
}

/// Standard Levenshtein edit distance (insert/delete/substitute cost 1).
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());

    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m]
}

/// Fuzzy-match score between two tokens, or `None` if they don't fuzzy
/// match:
///
/// - Equal tokens are not a fuzzy match (the caller handles exact hits).
/// - A substring match either direction scores 1.5.
/// - Otherwise both tokens must have length > 3 and
///   `edit_distance / max(len) < 0.30`; score = `1.0 - edit_distance / max(len)`.
pub fn fuzzy_score(a: &str, b: &str) -> Option<f64> {
    if a == b {
        return None;
    }
    if a.contains(b) || b.contains(a) {
        return Some(1.5);
    }
    if a.len() <= 3 || b.len() <= 3 {
        return None;
    }
    let max_len = a.len().max(b.len()) as f64;
    let dist = edit_distance(a, b) as f64;
    let ratio = dist / max_len;
    if ratio < 0.30 {
        Some(1.0 - ratio)
    } else {
        None
    }
}
