use crate::error::{Error, Result};
use shakmaty::{
    fen::Fen, san::{San, SanPlus}, uci::UciMove, CastlingMode, Chess, Color, EnPassantMode, Move,
    Position as _,
};
use std::fmt;
use std::hash::{Hash, Hasher};

pub const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Immutable board snapshot keyed by its FEN.
#[derive(Clone)]
pub struct Position {
    key: String,
    pos: Chess,
}

impl Position {
    pub fn new(fen: &str) -> Result<Self> {
        let fen: Fen = fen
            .trim()
            .parse()
            .map_err(|e| Error::InvalidFen(format!("{fen}: {e}")))?;
        let pos: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| Error::InvalidFen(e.to_string()))?;
        Ok(Self::from_chess(pos))
    }

    pub fn starting_position() -> Self {
        Self::from_chess(Chess::default())
    }

    pub fn from_chess(pos: Chess) -> Self {
        let key = Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string();
        Self { key, pos }
    }

    /// Canonical identity, usable as a map key across requests to the oracle.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn turn(&self) -> Color {
        self.pos.turn()
    }

    pub fn chess(&self) -> &Chess {
        &self.pos
    }

    pub fn fullmoves(&self) -> u32 {
        self.pos.fullmoves().get()
    }

    pub fn to_uci(&self, mv: &Move) -> String {
        mv.to_uci(CastlingMode::Standard).to_string()
    }

    /// Plays a move given in UCI notation. `None` when the text does not parse
    /// or the move is illegal here.
    pub fn play_uci(&self, uci: &str) -> Option<Position> {
        let uci: UciMove = uci.trim().parse().ok()?;
        let mv = uci.to_move(&self.pos).ok()?;
        Some(self.play(&mv))
    }

    /// Resolves a SAN token (check and mate suffixes allowed) to a legal move.
    pub fn parse_san(&self, san: &str) -> Option<Move> {
        let san: SanPlus = san.parse().ok()?;
        san.san.to_move(&self.pos).ok()
    }

    /// SAN of a UCI move, `None` when it is not legal here.
    pub fn san_of(&self, uci: &str) -> Option<String> {
        let uci: UciMove = uci.trim().parse().ok()?;
        let mv = uci.to_move(&self.pos).ok()?;
        Some(San::from_move(&self.pos, &mv).to_string())
    }

    /// SAN of each PV move, stopping at the first one that is not legal.
    pub fn pv_san<S: AsRef<str>>(&self, pv: &[S]) -> Vec<String> {
        let line = self.replay_pv(pv, pv.len());
        line.iter()
            .zip(pv)
            .filter_map(|(p, uci)| p.san_of(uci.as_ref()))
            .collect()
    }

    pub fn play(&self, mv: &Move) -> Position {
        let mut next = self.pos.clone();
        next.play_unchecked(mv);
        Position::from_chess(next)
    }

    /// Replays up to `max_plies` moves of a PV, returning the start position
    /// followed by the position after each ply. Stops at the first move that
    /// fails to parse or is illegal.
    pub fn replay_pv<S: AsRef<str>>(&self, pv: &[S], max_plies: usize) -> Vec<Position> {
        let mut out = vec![self.clone()];
        let mut cur = self.clone();
        for uci in pv.iter().take(max_plies) {
            match cur.play_uci(uci.as_ref()) {
                Some(next) => {
                    out.push(next.clone());
                    cur = next;
                }
                None => break,
            }
        }
        out
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Position {}

impl Hash for Position {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Position").field(&self.key).finish()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
