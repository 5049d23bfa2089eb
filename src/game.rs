//! Game records: the positions before each ply and the clocks after each ply.

use crate::error::{Error, Result};
use crate::types::Position;
use serde::Serialize;
use shakmaty::Color;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeControl {
    pub base_seconds: u32,
    pub increment_seconds: u32,
}

impl TimeControl {
    /// Parses `"300+5"` or `"600"`. Unlimited (`"-"`), unknown (`"?"`) and
    /// other forms such as `"40/7200"` give `None`.
    pub fn parse(raw: &str) -> Option<TimeControl> {
        let raw = raw.trim();
        if matches!(raw, "" | "-" | "?" | "0") {
            return None;
        }
        let (base, inc) = match raw.split_once('+') {
            Some((base, inc)) => (base.trim(), inc.trim()),
            None => (raw, "0"),
        };
        Some(TimeControl {
            base_seconds: base.parse().ok()?,
            increment_seconds: inc.parse().ok()?,
        })
    }
}

/// Remaining clock time per ply. Index 0 holds the starting time (when the
/// time control is known); index `i` holds the mover's clock after ply `i`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ClockSeries {
    pub white: Vec<Option<f64>>,
    pub black: Vec<Option<f64>>,
}

impl ClockSeries {
    pub fn has_clocks(&self) -> bool {
        self.white.iter().skip(1).any(Option::is_some)
            || self.black.iter().skip(1).any(Option::is_some)
    }
}

#[derive(Clone, Debug)]
pub struct Game {
    headers: Vec<(String, String)>,
    positions: Vec<Position>,
    moves: Vec<String>,
    clocks: Vec<Option<f64>>,
}

impl Game {
    /// Builds a game from a start position and UCI moves, as given to a
    /// `position ... moves ...` command.
    pub fn from_uci<S: AsRef<str>>(start: Position, moves: &[S]) -> Result<Self> {
        let mut game = Game::empty(start);
        for (ply, uci) in moves.iter().enumerate() {
            let uci = uci.as_ref();
            let next = game
                .last()
                .play_uci(uci)
                .ok_or_else(|| Error::InvalidGame(format!("illegal move {uci} at ply {}", ply + 1)))?;
            game.push(uci.to_string(), next, None);
        }
        Ok(game)
    }

    /// Parses the first game of a PGN text: tag pairs, SAN movetext and
    /// `[%clk ...]` comments. Variations, NAGs and move numbers are skipped.
    pub fn from_pgn(pgn: &str) -> Result<Self> {
        let mut headers = Vec::new();
        let mut movetext = String::new();
        for line in pgn.lines() {
            let line = line.trim();
            if line.starts_with('[') && movetext.trim().is_empty() {
                if let Some(tag) = parse_tag(line) {
                    headers.push(tag);
                }
            } else if !line.starts_with('%') {
                movetext.push_str(line);
                movetext.push('\n');
            }
        }

        let start = match header(&headers, "FEN") {
            Some(fen) => Position::new(fen)?,
            None => Position::starting_position(),
        };
        let mut game = Game::empty(start);
        game.headers = headers;

        for token in tokenize(&movetext) {
            match token {
                Token::Comment(text) => {
                    if let (Some(clock), Some(last)) = (parse_clock(&text), game.clocks.last_mut()) {
                        *last = Some(clock);
                    }
                }
                Token::Word(word) => {
                    let Some(san) = san_token(&word) else {
                        continue;
                    };
                    let current = game.last().clone();
                    let mv = current.parse_san(&san).ok_or_else(|| {
                        Error::InvalidGame(format!(
                            "bad move {san} at ply {}",
                            game.moves.len() + 1
                        ))
                    })?;
                    let uci = current.to_uci(&mv);
                    game.push(uci, current.play(&mv), None);
                }
                Token::End => break,
            }
        }

        Ok(game)
    }

    fn empty(start: Position) -> Self {
        Game {
            headers: Vec::new(),
            positions: vec![start],
            moves: Vec::new(),
            clocks: Vec::new(),
        }
    }

    fn push(&mut self, uci: String, next: Position, clock: Option<f64>) {
        self.moves.push(uci);
        self.positions.push(next);
        self.clocks.push(clock);
    }

    fn last(&self) -> &Position {
        // never empty: the start position is always present
        &self.positions[self.positions.len() - 1]
    }

    pub fn plies(&self) -> usize {
        self.moves.len()
    }

    /// Position before each ply, then the final position (`plies + 1` entries).
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }

    pub fn time_control_raw(&self) -> &str {
        self.header("TimeControl").unwrap_or("").trim()
    }

    pub fn time_control(&self) -> Option<TimeControl> {
        TimeControl::parse(self.time_control_raw())
    }

    pub fn clock_series(&self) -> ClockSeries {
        let len = self.plies() + 1;
        let mut series = ClockSeries {
            white: vec![None; len],
            black: vec![None; len],
        };
        if let Some(tc) = self.time_control() {
            series.white[0] = Some(f64::from(tc.base_seconds));
            series.black[0] = Some(f64::from(tc.base_seconds));
        }
        for (i, clock) in self.clocks.iter().enumerate() {
            match self.positions[i].turn() {
                Color::White => series.white[i + 1] = *clock,
                Color::Black => series.black[i + 1] = *clock,
            }
        }
        series
    }
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn parse_tag(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let (name, rest) = inner.split_once(char::is_whitespace)?;
    let value = rest.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some((name.to_string(), value.replace("\\\"", "\"")))
}

enum Token {
    Word(String),
    Comment(String),
    End,
}

fn tokenize(movetext: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = movetext.chars();

    fn flush(word: &mut String, tokens: &mut Vec<Token>) {
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(word)));
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                flush(&mut word, &mut tokens);
                let text: String = chars.by_ref().take_while(|&c| c != '}').collect();
                tokens.push(Token::Comment(text));
            }
            ';' => {
                flush(&mut word, &mut tokens);
                let text: String = chars.by_ref().take_while(|&c| c != '\n').collect();
                tokens.push(Token::Comment(text));
            }
            '(' => {
                flush(&mut word, &mut tokens);
                let mut depth = 1;
                while let Some(c) = chars.next() {
                    match c {
                        '{' => {
                            chars.by_ref().find(|&c| c == '}');
                        }
                        ';' => {
                            chars.by_ref().find(|&c| c == '\n');
                        }
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => (),
                    }
                }
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);

    for token in tokens.iter_mut() {
        if let Token::Word(w) = token {
            if matches!(w.as_str(), "1-0" | "0-1" | "1/2-1/2" | "*") {
                *token = Token::End;
            }
        }
    }
    tokens
}

/// Strips move numbers and annotation glyphs; `None` for tokens that are not
/// moves. Castling written with zeros becomes `O-O` / `O-O-O`.
fn san_token(word: &str) -> Option<String> {
    if word.starts_with('$') {
        return None;
    }
    let san = match word.rfind('.') {
        Some(dot) => &word[dot + 1..],
        None => word,
    };
    let san = san.trim_end_matches(['!', '?']);
    if san.is_empty() || san.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if san.starts_with("0-0") {
        return Some(san.replace('0', "O"));
    }
    Some(san.to_string())
}

/// Reads `[%clk H:MM:SS]` or `[%clk M:SS]` (fractional seconds allowed).
pub fn parse_clock(comment: &str) -> Option<f64> {
    let start = comment.find("[%clk")? + "[%clk".len();
    let rest = &comment[start..];
    let value = rest[..rest.find(']')?].trim();

    let parts: Vec<&str> = value.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let h: f64 = h.parse::<u32>().ok()?.into();
    let m: f64 = m.parse::<u32>().ok()?.into();
    let s: f64 = s.parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}
