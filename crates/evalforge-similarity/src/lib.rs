//! Cosine-similarity matching for suggestion deduplication.
//!
//! In-memory comparison over embedding vectors. The candidate set for one
//! batch is at most a few thousand suggestions, so an O(n) scan per new
//! pattern is the right tool; the batch variant pre-normalizes candidates
//! once and reduces each comparison to a dot product.

/// Cosine similarity of two vectors: `dot(a,b) / (||a|| * ||b||)`.
///
/// Returns 0.0 if either vector has zero magnitude. Inputs of different
/// lengths compare over the shorter prefix, which only happens when mixing
/// embedding model revisions; callers should not rely on it.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    // Norm accumulators cover only the zipped prefix; tails of a longer
    // vector contribute nothing to dot and would skew the denominator.
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Normalize a vector to unit length. A zero vector is returned unchanged.
#[must_use]
pub fn normalize(embedding: &[f32]) -> Vec<f32> {
    let norm: f64 = embedding
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 {
        return embedding.to_vec();
    }
    embedding.iter().map(|x| (f64::from(*x) / norm) as f32).collect()
}

/// A match above the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: String,
    pub score: f64,
}

/// Find the best candidate with `score >= threshold`.
///
/// Ties are broken first-seen: a later candidate must strictly beat the
/// current best to replace it.
#[must_use]
pub fn find_best_match(
    new_embedding: &[f32],
    candidates: &[(String, Vec<f32>)],
    threshold: f64,
) -> Option<Match> {
    let mut best: Option<Match> = None;
    let mut best_score = 0.0f64;
    for (id, embedding) in candidates {
        let score = cosine_similarity(new_embedding, embedding);
        if score >= threshold && score > best_score {
            best_score = score;
            best = Some(Match {
                id: id.clone(),
                score,
            });
        }
    }
    best
}

/// All candidates above the threshold, sorted by score descending.
///
/// Debugging aid for understanding why a pattern merged where it did.
#[must_use]
pub fn find_all_matches(
    new_embedding: &[f32],
    candidates: &[(String, Vec<f32>)],
    threshold: f64,
) -> Vec<Match> {
    let mut matches: Vec<Match> = candidates
        .iter()
        .filter_map(|(id, embedding)| {
            let score = cosine_similarity(new_embedding, embedding);
            (score >= threshold).then(|| Match {
                id: id.clone(),
                score,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches
}

/// Score one query against many candidates at once.
///
/// Pre-normalizes every row so each comparison is a single dot product.
/// Returns one score per candidate row, in order.
#[must_use]
pub fn batch_cosine_similarity(query: &[f32], candidates: &[Vec<f32>]) -> Vec<f64> {
    let normalized_query = normalize(query);
    if normalized_query.iter().all(|x| *x == 0.0) {
        return vec![0.0; candidates.len()];
    }
    candidates
        .iter()
        .map(|row| {
            let normalized_row = normalize(row);
            normalized_row
                .iter()
                .zip(normalized_query.iter())
                .map(|(x, y)| f64::from(*x) * f64::from(*y))
                .sum()
        })
        .collect()
}
