//! Position-evaluation oracle seam.
//!
//! The oracle is whatever runs the search (a local UCI engine, a remote
//! worker pool, a scripted fake). All scores it hands back are from White's
//! point of view and each ranked list keeps the oracle's own order.

pub mod candidates;
pub mod uci;

use crate::batcher::run_batched;
use crate::error::Result;
use crate::types::{best_pv, best_score, CandidateLine, Position, RankedMove};
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait(?Send)]
pub trait Oracle {
    /// Top `width` moves of `position`, best first, each with a PV of at most
    /// `pv_length` plies.
    async fn evaluate(
        &self,
        position: &Position,
        depth: u32,
        width: u32,
        pv_length: u32,
    ) -> Result<Vec<RankedMove>>;

    /// One remote call covering several positions, keyed by position key.
    async fn evaluate_positions(
        &self,
        positions: &[Position],
        depth: u32,
        width: u32,
        pv_length: u32,
    ) -> Result<HashMap<String, Vec<RankedMove>>> {
        let mut out = HashMap::with_capacity(positions.len());
        for position in positions {
            let moves = self.evaluate(position, depth, width, pv_length).await?;
            out.insert(position.key().to_string(), moves);
        }
        Ok(out)
    }

    /// Searches each candidate move of `position` on its own and scores every
    /// position along its PV at `eval_depth`. Candidates that do not parse or
    /// are illegal are left out of the answer.
    async fn evaluate_batch(
        &self,
        position: &Position,
        moves: &[String],
        depth: u32,
        eval_depth: u32,
        pv_length: u32,
    ) -> Result<HashMap<String, CandidateLine>> {
        let mut out = HashMap::with_capacity(moves.len());
        for mv in moves {
            let Some(child) = position.play_uci(mv) else {
                continue;
            };
            let reply = self
                .evaluate(&child, depth, 1, pv_length.saturating_sub(1))
                .await?;

            let mut pv = vec![mv.clone()];
            pv.extend(best_pv(&reply));
            pv.truncate(pv_length.max(1) as usize);

            let mut positions = Vec::with_capacity(pv.len() + 1);
            for p in position.replay_pv(&pv, pv.len()) {
                let score = best_score(&self.evaluate(&p, eval_depth, 1, 1).await?);
                positions.push((p.key().to_string(), score));
            }

            out.insert(
                mv.clone(),
                CandidateLine {
                    root_score: best_score(&reply),
                    pv,
                    positions,
                },
            );
        }
        Ok(out)
    }
}

/// Evaluates `positions` in groups of `batch_size`, one oracle call per group,
/// with at most `concurrency` calls in flight.
pub async fn analyse_positions(
    oracle: &dyn Oracle,
    positions: &[Position],
    depth: u32,
    width: u32,
    pv_length: u32,
    batch_size: usize,
    concurrency: usize,
) -> Result<HashMap<String, Vec<RankedMove>>> {
    run_batched(positions, batch_size, concurrency, |batch| async move {
        oracle
            .evaluate_positions(&batch, depth, width, pv_length)
            .await
    })
    .await
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::error::Error;
    use crate::types::Score;
    use std::cell::RefCell;

    /// Scripted oracle: answers by position key (and optionally depth), and
    /// records every call it receives.
    #[derive(Default)]
    pub struct ScriptedOracle {
        by_key: HashMap<String, Vec<RankedMove>>,
        by_depth: HashMap<(String, u32), Vec<RankedMove>>,
        pub fail_on: Option<String>,
        pub calls: RefCell<Vec<(String, u32, u32)>>,
        pub batch_calls: RefCell<usize>,
    }

    pub fn ranked(mv: &str, score: Score, pv: &[&str]) -> RankedMove {
        RankedMove {
            mv: mv.to_string(),
            score,
            pv: pv.iter().map(|s| s.to_string()).collect(),
        }
    }

    impl ScriptedOracle {
        pub fn answer(&mut self, key: &str, moves: Vec<RankedMove>) {
            self.by_key.insert(key.to_string(), moves);
        }

        pub fn answer_at(&mut self, key: &str, depth: u32, moves: Vec<RankedMove>) {
            self.by_depth.insert((key.to_string(), depth), moves);
        }
    }

    #[async_trait(?Send)]
    impl Oracle for ScriptedOracle {
        async fn evaluate(
            &self,
            position: &Position,
            depth: u32,
            width: u32,
            _pv_length: u32,
        ) -> Result<Vec<RankedMove>> {
            let key = position.key().to_string();
            self.calls.borrow_mut().push((key.clone(), depth, width));
            if self.fail_on.as_deref() == Some(key.as_str()) {
                return Err(Error::Fatal(format!("no answer for {key}")));
            }
            let moves = self
                .by_depth
                .get(&(key.clone(), depth))
                .or_else(|| self.by_key.get(&key))
                .cloned()
                .unwrap_or_default();
            Ok(moves.into_iter().take(width.max(1) as usize).collect())
        }

        async fn evaluate_positions(
            &self,
            positions: &[Position],
            depth: u32,
            width: u32,
            pv_length: u32,
        ) -> Result<HashMap<String, Vec<RankedMove>>> {
            *self.batch_calls.borrow_mut() += 1;
            let mut out = HashMap::new();
            for p in positions {
                out.insert(
                    p.key().to_string(),
                    self.evaluate(p, depth, width, pv_length).await?,
                );
            }
            Ok(out)
        }
    }
}
