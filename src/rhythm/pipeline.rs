use super::{assemble, side_name, RhythmDebug, RhythmMeta, RhythmReport, TimeControlMeta};
use crate::analysis::{evaluate_depths, forced_distances};
use crate::config::RhythmConfig;
use crate::error::Result;
use crate::game::Game;
use crate::oracle::Oracle;
use log::info;
use shakmaty::Color;
use std::time::Instant;

/// Runs the whole analysis for one game: the multi-depth pass over every
/// position, forced distances along the deepest PVs, then the series.
pub async fn build_rhythm(
    oracle: &dyn Oracle,
    game: &Game,
    title: &str,
    config: &RhythmConfig,
) -> Result<RhythmReport> {
    let started = Instant::now();
    let positions = game.positions();

    let analysis = evaluate_depths(oracle, positions, config).await?;
    let depth_max = analysis.depth_max();
    info!(
        "depth pass done: {} positions at {:?} in {:.1}s",
        positions.len(),
        analysis.depths,
        started.elapsed().as_secs_f64()
    );

    let forced = forced_distances(oracle, positions, &analysis.best_pv, depth_max, config).await?;
    info!(
        "forced distances done in {:.1}s",
        started.elapsed().as_secs_f64()
    );

    let clocks = game.clock_series();
    let series = assemble(positions, &analysis, &forced, &clocks, config)?;

    let mut debug = RhythmDebug::default();
    for position in positions {
        let distance = forced.get(position.key()).copied().unwrap_or_default();
        debug.side_to_move.push(side_name(position.turn()));
        debug.dist_white.push(distance.for_side(Color::White));
        debug.dist_black.push(distance.for_side(Color::Black));
    }

    Ok(RhythmReport {
        title: title.to_string(),
        meta: RhythmMeta {
            nplies: game.plies(),
            depth_max,
            depths: analysis.depths,
            width: config.width(),
            pv_plies: config.pv_plies,
            time_control: TimeControlMeta::new(game.time_control_raw(), game.time_control(), &clocks),
        },
        series,
        debug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::fake::{ranked, ScriptedOracle};
    use crate::types::{Position, Score};

    #[tokio::test]
    async fn test_build_rhythm() {
        let game = Game::from_uci(Position::starting_position(), &["e2e4", "e7e5"]).unwrap();
        let positions = game.positions();
        let mut oracle = ScriptedOracle::default();
        oracle.answer(
            positions[0].key(),
            vec![
                ranked("e2e4", Score::Centipawn(40), &["e2e4", "e7e5"]),
                ranked("a2a3", Score::Centipawn(-200), &["a2a3"]),
            ],
        );

        let config = RhythmConfig {
            depth: 2,
            ..RhythmConfig::default()
        };
        let report = build_rhythm(&oracle, &game, "test", &config).await.unwrap();

        assert_eq!(report.meta.nplies, 2);
        assert_eq!(report.meta.depths, vec![1, 2]);
        assert_eq!(report.series.len(), 3);
        assert_eq!(report.series.eval_pawns[0], 0.4);
        assert_eq!(report.series.forced_dist_signed[0], 0);
        assert_eq!(report.debug.side_to_move, vec!["WHITE", "BLACK", "WHITE"]);
        assert_eq!(report.debug.dist_white[0], 0);
        assert!(!report.meta.time_control.has_clocks);
    }

    #[tokio::test]
    async fn test_oracle_failure_is_fatal() {
        let game = Game::from_uci(Position::starting_position(), &["d2d4"]).unwrap();
        let mut oracle = ScriptedOracle::default();
        oracle.fail_on = Some(game.positions()[1].key().to_string());
        assert!(build_rhythm(&oracle, &game, "t", &RhythmConfig::default())
            .await
            .is_err());
    }
}
