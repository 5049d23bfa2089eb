use super::Oracle;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::{CandidateLine, Position, RankedMove, Score};
use async_trait::async_trait;
use log::debug;
use shakmaty::Color;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Oracle backed by a UCI engine executable. Each call (or batch) runs in a
/// fresh engine process, which is killed if the call is cancelled.
pub struct UciEngine {
    path: PathBuf,
    retry: RetryPolicy,
    threads: Option<u32>,
    hash_mb: Option<u32>,
}

impl UciEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry: RetryPolicy::default(),
            threads: None,
            hash_mb: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = Some(threads.max(1));
        self
    }

    pub fn with_hash(mut self, hash_mb: u32) -> Self {
        self.hash_mb = Some(hash_mb.max(1));
        self
    }

    async fn session(&self) -> Result<Session> {
        let mut session = Session::start(&self.path).await?;
        if let Some(threads) = self.threads {
            session.set_option("Threads", threads).await?;
        }
        if let Some(hash) = self.hash_mb {
            session.set_option("Hash", hash).await?;
        }
        Ok(session)
    }

    async fn evaluate_all(
        &self,
        positions: &[Position],
        depth: u32,
        width: u32,
        pv_length: u32,
    ) -> Result<HashMap<String, Vec<RankedMove>>> {
        let mut session = self.session().await?;
        session.set_option("MultiPV", width.max(1)).await?;

        let mut out = HashMap::with_capacity(positions.len());
        for position in positions {
            let infos = session.search(position, depth, &[]).await?;
            out.insert(
                position.key().to_string(),
                to_ranked(infos, position.turn(), pv_length),
            );
        }
        session.quit().await;
        Ok(out)
    }

    async fn analyse_candidates(
        &self,
        position: &Position,
        moves: &[String],
        depth: u32,
        eval_depth: u32,
        pv_length: u32,
    ) -> Result<HashMap<String, CandidateLine>> {
        let mut session = self.session().await?;
        session.set_option("MultiPV", 1).await?;

        let mut out = HashMap::with_capacity(moves.len());
        for mv in moves {
            if position.play_uci(mv).is_none() {
                debug!("skipping candidate {mv}: not legal in {position}");
                continue;
            }

            let root = session.search(position, depth, std::slice::from_ref(mv)).await?;
            let Some(best) = root.into_iter().next() else {
                continue;
            };
            let mut pv = if best.pv.is_empty() {
                vec![mv.clone()]
            } else {
                best.pv
            };
            pv.truncate(pv_length.max(1) as usize);

            let mut positions = Vec::with_capacity(pv.len() + 1);
            for p in position.replay_pv(&pv, pv.len()) {
                let score = session
                    .search(&p, eval_depth, &[])
                    .await?
                    .first()
                    .map(|info| white_pov(info.score, p.turn()))
                    .unwrap_or_default();
                positions.push((p.key().to_string(), score));
            }

            out.insert(
                mv.clone(),
                CandidateLine {
                    root_score: white_pov(best.score, position.turn()),
                    pv,
                    positions,
                },
            );
        }
        session.quit().await;
        Ok(out)
    }
}

#[async_trait(?Send)]
impl Oracle for UciEngine {
    async fn evaluate(
        &self,
        position: &Position,
        depth: u32,
        width: u32,
        pv_length: u32,
    ) -> Result<Vec<RankedMove>> {
        let positions = std::slice::from_ref(position);
        let mut out = self
            .retry
            .run("uci evaluate", || {
                self.evaluate_all(positions, depth, width, pv_length)
            })
            .await?;
        Ok(out.remove(position.key()).unwrap_or_default())
    }

    async fn evaluate_positions(
        &self,
        positions: &[Position],
        depth: u32,
        width: u32,
        pv_length: u32,
    ) -> Result<HashMap<String, Vec<RankedMove>>> {
        self.retry
            .run("uci evaluate batch", || {
                self.evaluate_all(positions, depth, width, pv_length)
            })
            .await
    }

    async fn evaluate_batch(
        &self,
        position: &Position,
        moves: &[String],
        depth: u32,
        eval_depth: u32,
        pv_length: u32,
    ) -> Result<HashMap<String, CandidateLine>> {
        self.retry
            .run("uci candidates", || {
                self.analyse_candidates(position, moves, depth, eval_depth, pv_length)
            })
            .await
    }
}

/// One parsed `info` line; the score is from the side to move.
#[derive(Clone, Debug, PartialEq)]
pub struct InfoLine {
    pub depth: u32,
    pub multipv: u32,
    pub score: Score,
    pub pv: Vec<String>,
}

/// Parses an engine `info` line. Lines without a score or a PV, bound-only
/// scores and `info string` chatter are skipped.
pub fn parse_info(line: &str) -> Option<InfoLine> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "info" {
        return None;
    }

    let mut depth = 0;
    let mut multipv = 1;
    let mut score = None;
    let mut pv = Vec::new();

    while let Some(token) = tokens.next() {
        match token {
            "string" => return None,
            "depth" => depth = tokens.next()?.parse().ok()?,
            "multipv" => multipv = tokens.next()?.parse().ok()?,
            "score" => {
                score = match tokens.next()? {
                    "cp" => Some(Score::Centipawn(tokens.next()?.parse().ok()?)),
                    "mate" => Some(Score::Mate(tokens.next()?.parse().ok()?)),
                    _ => return None,
                }
            }
            "lowerbound" | "upperbound" => return None,
            "pv" => {
                pv.extend(tokens.by_ref().map(str::to_string));
                break;
            }
            _ => (),
        }
    }

    if pv.is_empty() {
        return None;
    }
    Some(InfoLine {
        depth,
        multipv,
        score: score?,
        pv,
    })
}

fn white_pov(score: Score, turn: Color) -> Score {
    match turn {
        Color::White => score,
        Color::Black => score.negate(),
    }
}

/// Orders lines by the engine's multipv rank and normalizes their scores.
fn to_ranked(infos: Vec<InfoLine>, turn: Color, pv_length: u32) -> Vec<RankedMove> {
    infos
        .into_iter()
        .map(|info| {
            let mut pv = info.pv;
            pv.truncate(pv_length.max(1) as usize);
            RankedMove {
                mv: pv[0].clone(),
                score: white_pov(info.score, turn),
                pv,
            }
        })
        .collect()
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

fn transient(e: std::io::Error) -> Error {
    Error::Transient(format!("engine i/o: {e}"))
}

impl Session {
    async fn start(path: &Path) -> Result<Self> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transient(format!("spawn {}: {e}", path.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Fatal("engine stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Fatal("engine stdout not captured".into()))?;

        let mut session = Session {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        };
        session.send("uci").await?;
        session.wait_for("uciok").await?;
        Ok(session)
    }

    async fn send(&mut self, cmd: &str) -> Result<()> {
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(transient)?;
        self.stdin.flush().await.map_err(transient)
    }

    async fn next_line(&mut self) -> Result<String> {
        self.lines
            .next_line()
            .await
            .map_err(transient)?
            .ok_or_else(|| Error::Transient("engine closed its output".into()))
    }

    async fn wait_for(&mut self, token: &str) -> Result<()> {
        loop {
            if self.next_line().await?.trim() == token {
                return Ok(());
            }
        }
    }

    async fn set_option(&mut self, name: &str, value: u32) -> Result<()> {
        self.send(&format!("setoption name {name} value {value}"))
            .await?;
        self.send("isready").await?;
        self.wait_for("readyok").await
    }

    /// Runs `go depth` and returns the final line per multipv rank.
    async fn search(
        &mut self,
        position: &Position,
        depth: u32,
        searchmoves: &[String],
    ) -> Result<Vec<InfoLine>> {
        self.send(&format!("position fen {}", position.key()))
            .await?;
        let mut go = format!("go depth {}", depth.max(1));
        if !searchmoves.is_empty() {
            go.push_str(" searchmoves ");
            go.push_str(&searchmoves.join(" "));
        }
        self.send(&go).await?;

        let mut latest: BTreeMap<u32, InfoLine> = BTreeMap::new();
        loop {
            let line = self.next_line().await?;
            if line.starts_with("bestmove") {
                break;
            }
            if let Some(info) = parse_info(&line) {
                latest.insert(info.multipv, info);
            }
        }
        Ok(latest.into_values().collect())
    }

    async fn quit(mut self) {
        if self.send("quit").await.is_ok() {
            let _ = self.child.wait().await;
        }
    }
}
