//! Explains one played move.
//!
//! The oracle supplies the candidate lines (the played move plus its own top
//! moves, each followed by its PV); the text generator then writes a summary
//! for every position along every line, an overall verdict per line and a
//! comparison of each line against the others. A generation failure is kept
//! in that entry's `Outcome` and never blanks the rest of the report.

mod prompts;

use crate::concurrent::{LogProgress, Outcome};
use crate::config::RhythmConfig;
use crate::error::{Error, Result};
use crate::generate::{
    extract_json_object, generate_all, generate_with_retry, GenerateRequest, TextGenerator,
};
use crate::oracle::candidates::{analyse_candidates, candidate_labels, candidate_moves};
use crate::oracle::Oracle;
use crate::types::{best_score, CandidateLine, Position, RankedMove, Score};
use log::{info, warn};
use prompts::{CandidateSummary, OtherLine, PositionContext, StepSummary};
use serde::Serialize;
use shakmaty::Color;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeReport {
    /// Plies into the line; 1 is the position after the candidate move.
    pub idx: usize,
    pub label: String,
    pub fen: String,
    pub side_to_move: &'static str,
    pub eval: Score,
    pub move_san: String,
    pub summary: Outcome<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineReport {
    pub move_uci: String,
    pub move_san: String,
    pub labels: Vec<String>,
    pub root_eval: Score,
    pub pv_uci: Vec<String>,
    pub pv_san: Vec<String>,
    pub nodes: Vec<NodeReport>,
    pub overall: Outcome<String>,
    pub compare: Outcome<String>,
}

impl LineReport {
    fn tag(&self) -> String {
        if self.labels.is_empty() {
            "candidate".to_string()
        } else {
            self.labels.join(", ")
        }
    }
}

/// The generator's choice of best move, or the oracle's when the reply is
/// unusable (`error` then says why).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnginePick {
    pub move_uci: String,
    pub move_san: String,
    pub reason: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StartingReport {
    pub fen: String,
    pub side_to_move: &'static str,
    pub eval: Score,
    pub engine_preferred: EnginePick,
    pub summary: Outcome<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExplainReport {
    pub actual_uci: String,
    pub starting: StartingReport,
    pub lines: Vec<LineReport>,
}

fn side_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

fn request(config: &RhythmConfig, prompt: String, temperature: f32, max_tokens: u32) -> GenerateRequest {
    GenerateRequest {
        prompt,
        model: config.model.clone(),
        temperature,
        max_tokens: Some(max_tokens),
    }
}

fn text_of(outcome: &Outcome<String>) -> &str {
    outcome.value.as_deref().unwrap_or("")
}

fn line_report(position: &Position, move_uci: &str, labels: Vec<String>, line: &CandidateLine) -> LineReport {
    let pv_san = position.pv_san(&line.pv);
    let evals: HashMap<&str, Score> = line
        .positions
        .iter()
        .map(|(key, score)| (key.as_str(), *score))
        .collect();

    let mut report = LineReport {
        move_uci: move_uci.to_string(),
        move_san: position.san_of(move_uci).unwrap_or_default(),
        labels,
        root_eval: line.root_score,
        pv_uci: line.pv.clone(),
        pv_san: pv_san.clone(),
        nodes: Vec::new(),
        overall: Outcome::default(),
        compare: Outcome::default(),
    };
    let tag = report.tag();

    report.nodes = position
        .replay_pv(&line.pv, line.pv.len())
        .iter()
        .enumerate()
        .skip(1)
        .map(|(idx, p)| {
            let move_san = pv_san.get(idx - 1).cloned().unwrap_or_default();
            let label = if idx == 1 {
                format!("{tag}: {move_san}")
            } else {
                format!("engine choice: {move_san}")
            };
            NodeReport {
                idx,
                label,
                fen: p.key().to_string(),
                side_to_move: side_name(p.turn()),
                eval: evals.get(p.key()).copied().unwrap_or_default(),
                move_san,
                summary: Outcome::default(),
            }
        })
        .collect();
    report
}

async fn engine_pick(
    generator: &dyn TextGenerator,
    position: &Position,
    lines: &[LineReport],
    top: &[RankedMove],
    config: &RhythmConfig,
) -> EnginePick {
    let candidates: Vec<CandidateSummary<'_>> = lines
        .iter()
        .map(|l| CandidateSummary {
            move_uci: &l.move_uci,
            move_san: &l.move_san,
            root_eval: l.root_eval,
        })
        .collect();
    let prompt = prompts::engine_choice(position.key(), side_name(position.turn()), &candidates);

    let mut reason = None;
    let chosen = match generate_with_retry(generator, &request(config, prompt, 0.2, 250), &config.retry).await {
        Ok(text) => match extract_json_object(&text) {
            Some(reply) => {
                reason = reply["short_reason"].as_str().map(|s| s.trim().to_string());
                reply["engine_move_uci"]
                    .as_str()
                    .map(str::trim)
                    .filter(|uci| position.play_uci(uci).is_some())
                    .map(str::to_string)
                    .ok_or_else(|| "reply names no legal move".to_string())
            }
            None => Err("reply holds no JSON object".to_string()),
        },
        Err(e) => Err(e.to_string()),
    };

    let (move_uci, error) = match chosen {
        Ok(uci) => (uci, None),
        Err(e) => {
            let fallback = top.first().map(|m| m.mv.clone()).unwrap_or_default();
            warn!("engine pick falls back to {fallback}: {e}");
            (fallback, Some(e))
        }
    };
    EnginePick {
        move_san: position.san_of(&move_uci).unwrap_or_default(),
        move_uci,
        reason,
        error,
    }
}

/// Builds the explanation of `actual_uci` played from `position`.
pub async fn explain_move(
    oracle: &dyn Oracle,
    generator: &dyn TextGenerator,
    position: &Position,
    actual_uci: &str,
    config: &RhythmConfig,
) -> Result<ExplainReport> {
    if position.play_uci(actual_uci).is_none() {
        return Err(Error::InvalidGame(format!(
            "{actual_uci} is not legal in {}",
            position.key()
        )));
    }
    let start = Instant::now();

    let top = oracle
        .evaluate(position, config.depth, config.candidates.max(1), config.pv_plies)
        .await?;
    let moves = candidate_moves(actual_uci, &top);
    let mut labels = candidate_labels(actual_uci, &top);
    let analysed = analyse_candidates(
        oracle,
        position,
        &moves,
        config.depth,
        config.eval_depth,
        config.pv_plies,
        config.batch_size,
        config.concurrency,
    )
    .await?;
    let mut lines: Vec<LineReport> = moves
        .iter()
        .filter_map(|mv| {
            let line = analysed.get(mv)?;
            Some(line_report(position, mv, labels.remove(mv).unwrap_or_default(), line))
        })
        .collect();
    info!("{} candidate lines for {actual_uci}", lines.len());

    let side = side_name(position.turn());
    let eval = best_score(&top);
    let engine_preferred = engine_pick(generator, position, &lines, &top, config).await;

    let prompt = prompts::position_summary(&PositionContext {
        label: "start",
        fen: position.key(),
        side_to_move: side,
        eval,
        move_san: "",
        context_san: &[],
    });
    let summary = match generate_with_retry(generator, &request(config, prompt, 0.25, 450), &config.retry).await {
        Ok(text) => Outcome::ok(text.trim().to_string()),
        Err(e) => Outcome::failed(e),
    };

    let mut requests = HashMap::new();
    for (li, line) in lines.iter().enumerate() {
        for (ni, node) in line.nodes.iter().enumerate() {
            let context = &line.pv_san[..node.idx.min(line.pv_san.len())];
            let prompt = prompts::position_summary(&PositionContext {
                label: &node.label,
                fen: &node.fen,
                side_to_move: node.side_to_move,
                eval: node.eval,
                move_san: &node.move_san,
                context_san: context,
            });
            requests.insert((li, ni), request(config, prompt, 0.25, 350));
        }
    }
    let mut summaries = generate_all(
        generator,
        &requests,
        config.llm_concurrency,
        &config.retry,
        &mut LogProgress::new("position summaries"),
    )
    .await;
    for (li, line) in lines.iter_mut().enumerate() {
        for (ni, node) in line.nodes.iter_mut().enumerate() {
            node.summary = summaries.remove(&(li, ni)).unwrap_or_default();
        }
    }

    let requests: HashMap<usize, GenerateRequest> = lines
        .iter()
        .enumerate()
        .map(|(li, line)| {
            let steps: Vec<StepSummary<'_>> = line
                .nodes
                .iter()
                .map(|n| StepSummary {
                    label: &n.label,
                    move_san: &n.move_san,
                    summary: text_of(&n.summary),
                })
                .collect();
            let prompt = prompts::line_overall(
                position.key(),
                side,
                &line.move_san,
                line.root_eval,
                &line.pv_san,
                &steps,
            );
            (li, request(config, prompt, 0.25, 500))
        })
        .collect();
    let mut overall = generate_all(
        generator,
        &requests,
        config.llm_concurrency,
        &config.retry,
        &mut LogProgress::new("line verdicts"),
    )
    .await;
    for (li, line) in lines.iter_mut().enumerate() {
        line.overall = overall.remove(&li).unwrap_or_default();
    }

    let tags: Vec<String> = lines.iter().map(LineReport::tag).collect();
    let requests: HashMap<usize, GenerateRequest> = lines
        .iter()
        .enumerate()
        .map(|(li, line)| {
            let others: Vec<OtherLine<'_>> = lines
                .iter()
                .enumerate()
                .filter(|(oi, _)| *oi != li)
                .map(|(oi, other)| OtherLine {
                    label: &tags[oi],
                    move_san: &other.move_san,
                    overall: text_of(&other.overall),
                })
                .collect();
            let prompt =
                prompts::line_compare(&tags[li], &line.move_san, text_of(&line.overall), &others);
            (li, request(config, prompt, 0.25, 450))
        })
        .collect();
    let mut compare = generate_all(
        generator,
        &requests,
        config.llm_concurrency,
        &config.retry,
        &mut LogProgress::new("line comparisons"),
    )
    .await;
    for (li, line) in lines.iter_mut().enumerate() {
        line.compare = compare.remove(&li).unwrap_or_default();
    }

    info!(
        "explained {actual_uci} in {:.1}s",
        start.elapsed().as_secs_f64()
    );
    Ok(ExplainReport {
        actual_uci: actual_uci.to_string(),
        starting: StartingReport {
            fen: position.key().to_string(),
            side_to_move: side,
            eval,
            engine_preferred,
            summary,
        },
        lines,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::generate::fake::ScriptedGenerator;
    use crate::oracle::fake::{ranked, ScriptedOracle};
    use crate::retry::RetryPolicy;

    pub(crate) fn opening_oracle() -> ScriptedOracle {
        let start = Position::starting_position();
        let after_e4 = start.play_uci("e2e4").unwrap();
        let mut oracle = ScriptedOracle::default();
        oracle.answer(
            start.key(),
            vec![
                ranked("d2d4", Score::Centipawn(30), &["d2d4"]),
                ranked("e2e4", Score::Centipawn(25), &["e2e4"]),
            ],
        );
        oracle.answer(
            after_e4.key(),
            vec![ranked("e7e5", Score::Centipawn(20), &["e7e5", "g1f3"])],
        );
        oracle
    }

    pub(crate) fn quick_config() -> RhythmConfig {
        RhythmConfig {
            pv_plies: 3,
            retry: RetryPolicy {
                max_retries: 1,
                base_delay_ms: 1,
                jitter_ms: 0,
            },
            ..RhythmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_explain_keeps_failed_summaries() {
        let oracle = opening_oracle();
        let generator = ScriptedGenerator {
            fail_on: Some("Position label: engine choice: Nf3".to_string()),
            ..ScriptedGenerator::default()
        };
        let start = Position::starting_position();

        let report = explain_move(&oracle, &generator, &start, "e2e4", &quick_config())
            .await
            .unwrap();

        assert_eq!(report.lines.len(), 2);
        let played = &report.lines[0];
        assert_eq!(played.move_uci, "e2e4");
        assert_eq!(played.labels, vec!["actual", "engine#2"]);
        assert_eq!(played.pv_san, vec!["e4", "e5", "Nf3"]);
        assert_eq!(played.root_eval, Score::Centipawn(20));
        assert_eq!(played.nodes.len(), 3);
        assert_eq!(played.nodes[0].label, "actual, engine#2: e4");
        assert_eq!(played.nodes[0].side_to_move, "black");
        assert!(played.nodes[1].summary.is_ok());
        assert!(played.nodes[2].summary.value.is_none());
        assert!(played.nodes[2].summary.error.is_some());
        assert!(played.overall.is_ok());
        assert!(played.compare.is_ok());

        let best = &report.lines[1];
        assert_eq!(best.labels, vec!["engine#1"]);
        assert_eq!(best.nodes.len(), 1);

        let pick = &report.starting.engine_preferred;
        assert_eq!(pick.move_uci, "d2d4");
        assert_eq!(pick.move_san, "d4");
        assert_eq!(pick.reason.as_deref(), Some("takes the centre"));
        assert!(pick.error.is_none());
        assert_eq!(report.starting.side_to_move, "white");
        assert!(report.starting.summary.is_ok());

        // pick, start, 4 nodes, 2 verdicts, 2 comparisons
        assert_eq!(generator.prompts.borrow().len(), 10);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["lines"][0]["nodes"][2]["summary"]["value"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_pick_falls_back_to_oracle_best() {
        let oracle = opening_oracle();
        let generator = ScriptedGenerator {
            fail_on: Some("Return ONLY JSON".to_string()),
            ..ScriptedGenerator::default()
        };
        let start = Position::starting_position();

        let report = explain_move(&oracle, &generator, &start, "e2e4", &quick_config())
            .await
            .unwrap();
        let pick = &report.starting.engine_preferred;
        assert_eq!(pick.move_uci, "d2d4");
        assert!(pick.reason.is_none());
        assert!(pick.error.is_some());
    }

    #[tokio::test]
    async fn test_illegal_played_move() {
        let oracle = opening_oracle();
        let generator = ScriptedGenerator::default();
        let start = Position::starting_position();
        assert!(explain_move(&oracle, &generator, &start, "e2e5", &quick_config())
            .await
            .is_err());
        assert!(generator.prompts.borrow().is_empty());
    }
}
