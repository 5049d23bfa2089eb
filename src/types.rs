mod position;
mod score;

pub use position::{Position, STARTPOS};
pub use score::Score;

use serde::{Deserialize, Serialize};

/// One line of an oracle answer. Lists of these keep the oracle's own order,
/// best first for the side to move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedMove {
    pub mv: String,
    pub score: Score,
    pub pv: Vec<String>,
}

/// Per-candidate result of a restricted-root oracle call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateLine {
    pub root_score: Score,
    pub pv: Vec<String>,
    /// Start position, then the position after each PV ply, each with its own score.
    pub positions: Vec<(String, Score)>,
}

/// Score of the top ranked move, `Score::DRAW` when the oracle returned nothing.
pub fn best_score(moves: &[RankedMove]) -> Score {
    moves.first().map(|m| m.score).unwrap_or_default()
}

pub fn best_pv(moves: &[RankedMove]) -> Vec<String> {
    moves
        .first()
        .map(|m| m.pv.iter().filter(|u| !u.is_empty()).cloned().collect())
        .unwrap_or_default()
}
