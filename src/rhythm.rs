//! Per-ply rhythm series of a whole game.
//!
//! Perplexity and forced distance carry the side to move in their sign: White
//! to move plots above zero, Black to move below. Evaluation is always
//! White-positive. Black's clock is mirrored below zero as well.

mod pipeline;

pub use pipeline::build_rhythm;

use crate::analysis::{perplexity_segments, DepthAnalysis, ForcedDistance};
use crate::config::RhythmConfig;
use crate::error::{Error, Result};
use crate::game::{ClockSeries, TimeControl};
use crate::types::Position;
use serde::Serialize;
use shakmaty::Color;
use std::collections::HashMap;

/// Aligned output arrays, one entry per ply index `0..=plies`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RhythmSeries {
    pub ply: Vec<usize>,
    pub eval_pawns: Vec<f64>,
    pub perplexity_signed: Vec<i32>,
    pub forced_dist_signed: Vec<i32>,
    pub time_white_sec: Vec<Option<f64>>,
    pub time_black_sec_signed: Vec<Option<f64>>,
}

impl RhythmSeries {
    pub fn len(&self) -> usize {
        self.ply.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ply.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimeControlMeta {
    pub raw: String,
    pub base_seconds: Option<u32>,
    pub increment_seconds: Option<u32>,
    pub has_clocks: bool,
}

impl TimeControlMeta {
    pub fn new(raw: &str, tc: Option<TimeControl>, clocks: &ClockSeries) -> Self {
        Self {
            raw: raw.to_string(),
            base_seconds: tc.map(|tc| tc.base_seconds),
            increment_seconds: tc.map(|tc| tc.increment_seconds),
            has_clocks: clocks.has_clocks(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RhythmMeta {
    pub nplies: usize,
    pub depths: Vec<u32>,
    pub depth_max: u32,
    pub width: u32,
    pub pv_plies: u32,
    pub time_control: TimeControlMeta,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RhythmDebug {
    pub side_to_move: Vec<&'static str>,
    pub dist_white: Vec<usize>,
    pub dist_black: Vec<usize>,
}

/// Everything a display layer needs for one game.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RhythmReport {
    pub title: String,
    pub meta: RhythmMeta,
    pub series: RhythmSeries,
    pub debug: RhythmDebug,
}

pub fn side_name(side: Color) -> &'static str {
    match side {
        Color::White => "WHITE",
        Color::Black => "BLACK",
    }
}

fn signed(magnitude: usize, turn: Color) -> i32 {
    let m = i32::try_from(magnitude).unwrap_or(i32::MAX);
    match turn {
        Color::White => m,
        Color::Black => -m,
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::Misaligned {
            what,
            expected,
            actual,
        })
    }
}

/// Builds the aligned series for `positions` (one per ply index). Empty clock
/// vectors mean the game has no clock data.
pub fn assemble(
    positions: &[Position],
    analysis: &DepthAnalysis,
    forced: &HashMap<String, ForcedDistance>,
    clocks: &ClockSeries,
    config: &RhythmConfig,
) -> Result<RhythmSeries> {
    let len = positions.len();
    let white_clock = if clocks.white.is_empty() {
        vec![None; len]
    } else {
        check_len("white clock", len, clocks.white.len())?;
        clocks.white.clone()
    };
    let black_clock = if clocks.black.is_empty() {
        vec![None; len]
    } else {
        check_len("black clock", len, clocks.black.len())?;
        clocks.black.clone()
    };

    let clip = config.eval_clip();
    let mut series = RhythmSeries {
        ply: (0..len).collect(),
        eval_pawns: Vec::with_capacity(len),
        perplexity_signed: Vec::with_capacity(len),
        forced_dist_signed: Vec::with_capacity(len),
        time_white_sec: white_clock,
        time_black_sec_signed: black_clock.into_iter().map(|t| t.map(|t| -t)).collect(),
    };

    for position in positions {
        let key = position.key();
        let turn = position.turn();

        series
            .eval_pawns
            .push(analysis.deepest(key).to_pawns().clamp(-clip, clip));

        let perplexity = perplexity_segments(&analysis.cps(key)).min(config.display_cap);
        series.perplexity_signed.push(signed(perplexity, turn));

        let distance = forced
            .get(key)
            .map_or(config.forced_cap, |d| d.for_side(turn))
            .min(config.forced_cap);
        series.forced_dist_signed.push(signed(distance, turn));
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Score;

    fn game_positions() -> Vec<Position> {
        Position::starting_position().replay_pv(&["d2d4", "g8f6", "c2c4"], 3)
    }

    #[test]
    fn test_signs_follow_side_to_move() {
        let positions = game_positions();
        let mut analysis = DepthAnalysis {
            depths: vec![1, 2, 4],
            ..DepthAnalysis::default()
        };
        let mut forced = HashMap::new();
        for (i, p) in positions.iter().enumerate() {
            let flip = if i % 2 == 0 { 30 } else { -30 };
            analysis.series.insert(
                p.key().to_string(),
                vec![
                    Score::Centipawn(flip),
                    Score::Centipawn(-flip),
                    Score::Centipawn(900),
                ],
            );
            forced.insert(p.key().to_string(), ForcedDistance { white: 2, black: 3 });
        }

        let series = assemble(
            &positions,
            &analysis,
            &forced,
            &ClockSeries::default(),
            &RhythmConfig::default(),
        )
        .unwrap();

        assert_eq!(series.len(), 4);
        assert_eq!(series.ply, vec![0, 1, 2, 3]);
        for (i, p) in series.perplexity_signed.iter().enumerate() {
            if i % 2 == 0 {
                assert!(*p > 0, "ply {i}: {p}");
            } else {
                assert!(*p <= 0, "ply {i}: {p}");
            }
        }
        assert_eq!(series.forced_dist_signed, vec![2, -3, 2, -3]);
        assert_eq!(series.eval_pawns, vec![6.0; 4]);
        assert_eq!(series.time_white_sec, vec![None; 4]);
        assert_eq!(series.time_black_sec_signed.len(), 4);
    }

    #[test]
    fn test_eval_clip_and_caps() {
        let positions = game_positions();
        let mut analysis = DepthAnalysis {
            depths: vec![1, 2, 4, 8, 16, 32, 64, 128],
            ..DepthAnalysis::default()
        };
        let zigzag: Vec<Score> = (0..8)
            .map(|i| Score::Centipawn(if i % 2 == 0 { 50 } else { -50 }))
            .collect();
        analysis.series.insert(positions[0].key().to_string(), zigzag);
        analysis.series.insert(
            positions[1].key().to_string(),
            vec![Score::Mate(-2); 8],
        );

        let config = RhythmConfig::default();
        let series = assemble(&positions, &analysis, &HashMap::new(), &ClockSeries::default(), &config)
            .unwrap();

        assert_eq!(series.perplexity_signed[0], 6);
        assert_eq!(series.eval_pawns[0], -0.5);
        assert_eq!(series.eval_pawns[1], -6.0);
        assert_eq!(series.perplexity_signed[2], 1);
        assert_eq!(series.forced_dist_signed, vec![6, -6, 6, -6]);
    }

    #[test]
    fn test_clocks_mirror_black() {
        let positions = game_positions();
        let clocks = ClockSeries {
            white: vec![Some(180.0), Some(178.0), None, Some(170.5)],
            black: vec![Some(180.0), None, Some(175.0), None],
        };
        let series = assemble(
            &positions,
            &DepthAnalysis::default(),
            &HashMap::new(),
            &clocks,
            &RhythmConfig::default(),
        )
        .unwrap();
        assert_eq!(series.time_white_sec, clocks.white);
        assert_eq!(
            series.time_black_sec_signed,
            vec![Some(-180.0), None, Some(-175.0), None]
        );

        let short = ClockSeries {
            white: vec![Some(1.0)],
            black: Vec::new(),
        };
        assert!(matches!(
            assemble(&positions, &DepthAnalysis::default(), &HashMap::new(), &short, &RhythmConfig::default()),
            Err(Error::Misaligned { expected: 4, actual: 1, .. })
        ));
    }

    #[test]
    fn test_json_schema() {
        let series = RhythmSeries {
            ply: vec![0],
            eval_pawns: vec![0.3],
            perplexity_signed: vec![1],
            forced_dist_signed: vec![6],
            time_white_sec: vec![None],
            time_black_sec_signed: vec![Some(-60.0)],
        };
        let json = serde_json::to_value(&series).unwrap();
        for field in [
            "ply",
            "eval_pawns",
            "perplexity_signed",
            "forced_dist_signed",
            "time_white_sec",
            "time_black_sec_signed",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(json["time_white_sec"][0].is_null());
    }
}
