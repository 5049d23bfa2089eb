use crate::batcher::{dedupe_preserve, merge_answers, partition};
use crate::concurrent::{map_bounded, LogProgress};
use crate::config::RhythmConfig;
use crate::error::Result;
use crate::oracle::Oracle;
use crate::types::{best_pv, best_score, Position, RankedMove, Score};
use log::debug;
use std::collections::HashMap;

/// Depths 1, 2, 4, 8, ... not above `max_depth`.
pub fn depth_schedule(max_depth: u32) -> Vec<u32> {
    let mut depths = Vec::new();
    let mut d: u32 = 1;
    while d <= max_depth {
        depths.push(d);
        match d.checked_mul(2) {
            Some(next) => d = next,
            None => break,
        }
    }
    if depths.is_empty() {
        depths.push(max_depth.max(1));
    }
    depths
}

/// Best score per depth for every analysed position, plus the best PV found
/// at the deepest depth.
#[derive(Clone, Debug, Default)]
pub struct DepthAnalysis {
    pub depths: Vec<u32>,
    pub series: HashMap<String, Vec<Score>>,
    pub best_pv: HashMap<String, Vec<String>>,
}

impl DepthAnalysis {
    pub fn depth_max(&self) -> u32 {
        self.depths.iter().copied().max().unwrap_or(1)
    }

    pub fn scores(&self, key: &str) -> &[Score] {
        self.series.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cps(&self, key: &str) -> Vec<i32> {
        self.scores(key).iter().map(|s| s.to_cp()).collect()
    }

    /// Score at the deepest depth.
    pub fn deepest(&self, key: &str) -> Score {
        self.scores(key).last().copied().unwrap_or_default()
    }
}

/// Runs every depth of the schedule over all positions. Each (depth, batch)
/// pair is one oracle call, and at most `config.concurrency` calls are in
/// flight across all depths.
pub async fn evaluate_depths(
    oracle: &dyn Oracle,
    positions: &[Position],
    config: &RhythmConfig,
) -> Result<DepthAnalysis> {
    let depths = depth_schedule(config.depth);
    let unique = dedupe_preserve(positions.iter().cloned());
    let batches = partition(&unique, config.batch_size);
    let units: Vec<(u32, usize)> = depths
        .iter()
        .flat_map(|&depth| (0..batches.len()).map(move |batch| (depth, batch)))
        .collect();
    debug!(
        "evaluating {} positions at depths {:?} in {} calls",
        unique.len(),
        depths,
        units.len()
    );

    let mut progress = LogProgress::new(format!(
        "multi-depth analysis ({} positions)",
        unique.len()
    ));
    let answers = map_bounded(units, config.concurrency, &mut progress, |(depth, batch)| {
        let batch = &batches[batch];
        async move {
            oracle
                .evaluate_positions(batch, depth, config.width(), config.pv_plies)
                .await
        }
    })
    .await?;

    let mut grouped: HashMap<u32, Vec<HashMap<String, Vec<RankedMove>>>> = HashMap::new();
    for ((depth, _), answer) in answers {
        grouped.entry(depth).or_default().push(answer);
    }
    let by_depth = grouped
        .into_iter()
        .map(|(depth, answers)| Ok((depth, merge_answers(answers)?)))
        .collect::<Result<HashMap<_, _>>>()?;

    let mut analysis = DepthAnalysis {
        depths,
        ..DepthAnalysis::default()
    };
    let depth_max = analysis.depth_max();

    for position in &unique {
        let key = position.key();
        let scores = analysis
            .depths
            .iter()
            .map(|d| {
                by_depth
                    .get(d)
                    .and_then(|answers| answers.get(key))
                    .map(|moves| best_score(moves))
                    .unwrap_or_default()
            })
            .collect();
        let pv = by_depth
            .get(&depth_max)
            .and_then(|answers| answers.get(key))
            .map(|moves| best_pv(moves))
            .unwrap_or_default();

        analysis.series.insert(key.to_string(), scores);
        analysis.best_pv.insert(key.to_string(), pv);
    }

    Ok(analysis)
}
