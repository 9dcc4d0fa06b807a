use std::collections::HashSet;

/// Finds pairs of texts that are near-duplicates of each other.
pub trait SimilarityIndex: Send + Sync {
    /// Returns `(left, right, similarity)` with `left < right` for every pair
    /// whose similarity is strictly above `threshold`, ordered by `left` then
    /// `right`.
    fn similar_pairs(&self, texts: &[&str], threshold: f64) -> Vec<(usize, usize, f64)>;
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard similarity of the lower-cased whitespace-separated word sets.
/// Empty texts are never similar to anything.
pub fn jaccard(left: &str, right: &str) -> f64 {
    set_jaccard(&word_set(left), &word_set(right))
}

fn set_jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(right).count();
    let union = left.len() + right.len() - intersection;
    intersection as f64 / union as f64
}

/// Compares every pair. Quadratic, fine for a few thousand examples.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairwiseJaccard;

impl SimilarityIndex for PairwiseJaccard {
    fn similar_pairs(&self, texts: &[&str], threshold: f64) -> Vec<(usize, usize, f64)> {
        let sets: Vec<_> = texts.iter().map(|text| word_set(text)).collect();
        let mut pairs = Vec::new();
        for left in 0..sets.len() {
            for right in left + 1..sets.len() {
                let similarity = set_jaccard(&sets[left], &sets[right]);
                if similarity > threshold {
                    pairs.push((left, right, similarity));
                }
            }
        }
        pairs
    }
}
