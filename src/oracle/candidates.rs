use super::Oracle;
use crate::batcher::{dedupe_preserve, run_batched};
use crate::error::Result;
use crate::types::{CandidateLine, Position, RankedMove};
use std::collections::HashMap;

/// The move actually played first, then the oracle's choices, without repeats.
pub fn candidate_moves(actual: &str, top: &[RankedMove]) -> Vec<String> {
    dedupe_preserve(
        std::iter::once(actual.to_string())
            .chain(top.iter().map(|m| m.mv.clone()))
            .filter(|m| !m.is_empty()),
    )
}

/// Tags each candidate with `actual` and/or its oracle rank (`engine#1`, ...).
pub fn candidate_labels(actual: &str, top: &[RankedMove]) -> HashMap<String, Vec<String>> {
    let mut labels: HashMap<String, Vec<String>> = candidate_moves(actual, top)
        .into_iter()
        .map(|m| (m, Vec::new()))
        .collect();
    if let Some(tags) = labels.get_mut(actual) {
        tags.push("actual".to_string());
    }
    for (rank, m) in top.iter().enumerate() {
        if let Some(tags) = labels.get_mut(&m.mv) {
            tags.push(format!("engine#{}", rank + 1));
        }
    }
    labels
}

/// Analyses candidate moves of one position, `batch_size` moves per oracle
/// call and at most `concurrency` calls in flight. Repeated moves are
/// collapsed before batching.
pub async fn analyse_candidates(
    oracle: &dyn Oracle,
    position: &Position,
    moves: &[String],
    depth: u32,
    eval_depth: u32,
    pv_length: u32,
    batch_size: usize,
    concurrency: usize,
) -> Result<HashMap<String, CandidateLine>> {
    let moves = dedupe_preserve(moves.iter().cloned());
    run_batched(&moves, batch_size, concurrency, |batch| async move {
        oracle
            .evaluate_batch(position, &batch, depth, eval_depth, pv_length)
            .await
    })
    .await
}
