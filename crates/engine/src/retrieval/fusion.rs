//! Score normalization and weighted fusion
//!
//! Dense and sparse scores live on different scales, so each candidate set
//! is normalized independently before the weighted sum. Fusion is keyed by
//! point identity; a candidate missing from one side contributes 0.0 for
//! that side.

use super::Normalization;
use crate::store::{ChunkPayload, ScoredPoint};
use std::collections::HashMap;
use uuid::Uuid;

/// A candidate after fusion, ordered best-first
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub id: Uuid,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Normalize a score list in place according to the configured mode.
///
/// Min-max maps a flat set to 1.0 when the shared value is nonzero (a
/// single strong candidate should not be erased) and to 0.0 otherwise.
/// Z-score maps a zero-variance set to 0.0.
pub fn normalize_scores(scores: &mut [f32], mode: Normalization) {
    if scores.is_empty() {
        return;
    }

    match mode {
        Normalization::None => {}
        Normalization::MinMax => {
            let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if (max - min).abs() < f32::EPSILON {
                let flat = if max.abs() < f32::EPSILON { 0.0 } else { 1.0 };
                scores.iter_mut().for_each(|s| *s = flat);
            } else {
                let range = max - min;
                scores.iter_mut().for_each(|s| *s = (*s - min) / range);
            }
        }
        Normalization::ZScore => {
            let n = scores.len() as f32;
            let mean = scores.iter().sum::<f32>() / n;
            let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
            let std = variance.sqrt();
            if std < f32::EPSILON {
                scores.iter_mut().for_each(|s| *s = 0.0);
            } else {
                scores.iter_mut().for_each(|s| *s = (*s - mean) / std);
            }
        }
    }
}

/// Fuse two normalized candidate sets by weighted sum.
///
/// The output is sorted by fused score descending, with `chunk_id`
/// ascending as the tie-break so equal scores order deterministically.
pub fn fuse(
    dense: Vec<ScoredPoint>,
    sparse: Vec<ScoredPoint>,
    dense_weight: f32,
    sparse_weight: f32,
    normalization: Normalization,
) -> Vec<FusedCandidate> {
    let mut dense_scores: Vec<f32> = dense.iter().map(|p| p.score).collect();
    let mut sparse_scores: Vec<f32> = sparse.iter().map(|p| p.score).collect();
    normalize_scores(&mut dense_scores, normalization);
    normalize_scores(&mut sparse_scores, normalization);

    let mut fused: HashMap<Uuid, FusedCandidate> = HashMap::new();

    for (point, score) in dense.into_iter().zip(dense_scores) {
        fused.insert(
            point.id,
            FusedCandidate {
                id: point.id,
                score: dense_weight * score,
                payload: point.payload,
            },
        );
    }

    for (point, score) in sparse.into_iter().zip(sparse_scores) {
        match fused.get_mut(&point.id) {
            Some(candidate) => candidate.score += sparse_weight * score,
            None => {
                fused.insert(
                    point.id,
                    FusedCandidate {
                        id: point.id,
                        score: sparse_weight * score,
                        payload: point.payload,
                    },
                );
            }
        }
    }

    let mut candidates: Vec<FusedCandidate> = fused.into_values().collect();
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.payload.chunk_id.cmp(&b.payload.chunk_id))
    });

    candidates
}
