use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Debug;

use super::RetrievalResult;

/// Puts one source's scores on a scale comparable with other sources.
pub trait ScoreNormalizer: Debug + Send + Sync {
    fn normalize(&self, results: &mut [RetrievalResult]);
}

/// Divides by the source's best score so its top hit scores 1.0. Lists whose
/// best score is not positive are left as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxScoreNormalizer;

impl ScoreNormalizer for MaxScoreNormalizer {
    fn normalize(&self, results: &mut [RetrievalResult]) {
        let best = results
            .iter()
            .map(|r| r.score)
            .fold(f32::NEG_INFINITY, f32::max);
        if best > 0.0 && best.is_finite() {
            for r in results {
                r.score /= best;
            }
        }
    }
}

/// Normalize each source, keep the best hit per file, order and truncate.
///
/// Ties on score go to the shorter path, then the lexicographically smaller.
#[must_use]
pub fn merge(
    sources: Vec<Vec<RetrievalResult>>,
    normalizer: &dyn ScoreNormalizer,
    n_final: usize,
) -> Vec<RetrievalResult> {
    let mut best: HashMap<String, RetrievalResult> = HashMap::new();
    for mut source in sources {
        normalizer.normalize(&mut source);
        for result in source {
            match best.get(&result.filepath) {
                Some(kept) if kept.score >= result.score => {}
                _ => {
                    best.insert(result.filepath.clone(), result);
                }
            }
        }
    }

    let mut merged: Vec<RetrievalResult> = best.into_values().collect();
    merged.sort_by(rank);
    merged.truncate(n_final);
    merged
}

fn rank(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.filepath.len().cmp(&b.filepath.len()))
        .then_with(|| a.filepath.cmp(&b.filepath))
}
