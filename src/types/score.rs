use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine score, always from White's point of view.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Score {
    #[serde(rename = "cp")]
    Centipawn(i32),
    Mate(i32),
}

impl Score {
    pub const DRAW: Score = Score::Centipawn(0);

    /// Stand-in magnitude for a forced mate when scores are compared as integers.
    pub const MATE_CP: i32 = 100_000;

    /// Collapses the score to one comparable integer. Mates keep their sign
    /// and saturate to `MATE_CP`; `Mate(0)` (mated on the board) counts as `+MATE_CP`.
    pub const fn to_cp(self) -> i32 {
        match self {
            Score::Centipawn(cp) => cp,
            Score::Mate(m) if m < 0 => -Self::MATE_CP,
            Score::Mate(_) => Self::MATE_CP,
        }
    }

    pub const fn from_cp(cp: i32) -> Score {
        if cp >= Self::MATE_CP {
            Score::Mate(1)
        } else if cp <= -Self::MATE_CP {
            Score::Mate(-1)
        } else {
            Score::Centipawn(cp)
        }
    }

    pub fn to_pawns(self) -> f64 {
        f64::from(self.to_cp()) / 100.0
    }

    pub const fn is_mate(self) -> bool {
        matches!(self, Score::Mate(_))
    }

    /// Flips the point of view.
    pub const fn negate(self) -> Score {
        match self {
            Score::Centipawn(cp) => Score::Centipawn(-cp),
            Score::Mate(m) => Score::Mate(-m),
        }
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::DRAW
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Centipawn(cp) => write!(f, "{:+.2}", f64::from(*cp) / 100.0),
            Score::Mate(m) => write!(f, "M{:+}", m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Score;

    #[test]
    fn test_round_trip_keeps_kind() {
        for score in [
            Score::Mate(1),
            Score::Mate(-1),
            Score::Centipawn(-500),
            Score::Centipawn(0),
            Score::Centipawn(500),
        ] {
            let back = Score::from_cp(score.to_cp());
            assert_eq!(back.is_mate(), score.is_mate());
            assert_eq!(back, score);
        }
    }

    #[test]
    fn test_mate_sentinel() {
        assert_eq!(Score::Mate(3).to_cp(), Score::MATE_CP);
        assert_eq!(Score::Mate(-7).to_cp(), -Score::MATE_CP);
        assert_eq!(Score::Mate(0).to_cp(), Score::MATE_CP);
    }

    #[test]
    fn test_display() {
        assert_eq!(Score::Centipawn(123).to_string(), "+1.23");
        assert_eq!(Score::Centipawn(-50).to_string(), "-0.50");
        assert_eq!(Score::Mate(-2).to_string(), "M-2");
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&Score::Centipawn(-12)).unwrap();
        assert_eq!(json, r#"{"type":"cp","value":-12}"#);
        let back: Score = serde_json::from_str(r#"{"type":"mate","value":2}"#).unwrap();
        assert_eq!(back, Score::Mate(2));
    }
}
