use crate::batcher::dedupe_preserve;
use crate::config::RhythmConfig;
use crate::error::Result;
use crate::oracle::{analyse_positions, Oracle};
use crate::types::{Position, RankedMove};
use log::debug;
use serde::Serialize;
use shakmaty::Color;
use std::collections::HashMap;

/// Moves a side can make along the best line before it faces a forced position.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ForcedDistance {
    pub white: usize,
    pub black: usize,
}

impl ForcedDistance {
    pub const fn for_side(&self, side: Color) -> usize {
        match side {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }
}

/// A position is forced when its best move beats the second best by more than
/// `threshold_cp`. Mate against no mate always clears the threshold.
pub fn is_forced(moves: &[RankedMove], threshold_cp: i32) -> bool {
    match moves {
        [best, second, ..] => {
            let gap = i64::from(best.score.to_cp()) - i64::from(second.score.to_cp());
            gap.abs() > i64::from(threshold_cp)
        }
        _ => false,
    }
}

/// Walks a replayed PV (start position first) and counts `side`'s moves until
/// `side` is to move in a forced position. Returns `cap` if the budget runs
/// out or the line ends first.
pub fn walk_to_forced<F>(line: &[Position], side: Color, cap: usize, forced: F) -> usize
where
    F: Fn(&Position) -> bool,
{
    let mut consumed = 0;
    for position in line.iter().filter(|p| p.turn() == side) {
        if consumed >= cap {
            break;
        }
        if forced(position) {
            return consumed;
        }
        consumed += 1;
    }
    cap
}

/// Forced distance for both sides from every root.
///
/// Each root's PV is replayed for at most `2 * forced_cap` plies. Every
/// distinct position met on any line is classified once, through one batched
/// oracle pass at `depth` with two ranked moves.
pub async fn forced_distances(
    oracle: &dyn Oracle,
    roots: &[Position],
    best_pv: &HashMap<String, Vec<String>>,
    depth: u32,
    config: &RhythmConfig,
) -> Result<HashMap<String, ForcedDistance>> {
    let cap = config.forced_cap;
    let lines: Vec<Vec<Position>> = roots
        .iter()
        .map(|root| {
            let pv = best_pv.get(root.key()).map(Vec::as_slice).unwrap_or(&[]);
            root.replay_pv(pv, cap.saturating_mul(2))
        })
        .collect();

    let visited = dedupe_preserve(lines.iter().flatten().cloned());
    debug!(
        "classifying {} distinct PV positions from {} roots",
        visited.len(),
        roots.len()
    );
    let answers = analyse_positions(
        oracle,
        &visited,
        depth,
        2,
        1,
        config.batch_size,
        config.concurrency,
    )
    .await?;

    let forced: HashMap<&str, bool> = visited
        .iter()
        .map(|p| {
            let forced = answers
                .get(p.key())
                .is_some_and(|moves| is_forced(moves, config.forced_threshold_cp));
            (p.key(), forced)
        })
        .collect();
    let check = |p: &Position| forced.get(p.key()).copied().unwrap_or(false);

    Ok(roots
        .iter()
        .zip(&lines)
        .map(|(root, line)| {
            let distance = ForcedDistance {
                white: walk_to_forced(line, Color::White, cap, check),
                black: walk_to_forced(line, Color::Black, cap, check),
            };
            (root.key().to_string(), distance)
        })
        .collect())
}
