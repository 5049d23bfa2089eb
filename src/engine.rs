mod about;

use crate::config::RhythmConfig;
use crate::error::{Error, Result};
use crate::explain::explain_move;
use crate::game::Game;
use crate::generate::TextGenerator;
use crate::oracle::Oracle;
use crate::rhythm::build_rhythm;
use crate::types::Position;
use log::{error, info, warn};
use shakmaty::Color;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// What the command loop does after a command.
#[derive(Debug, PartialEq)]
pub enum Response {
    Silent,
    Print(String),
    Quit,
}

/// Line-oriented front end: load a game, tune the options, ask for its rhythm.
pub struct Engine<O: Oracle> {
    oracle: O,
    config: RhythmConfig,
    game: Option<Game>,
    generator: Option<Box<dyn TextGenerator>>,
}

impl<O: Oracle> Engine<O> {
    pub fn new(oracle: O, config: RhythmConfig) -> Self {
        Engine {
            oracle,
            config,
            game: None,
            generator: None,
        }
    }

    /// Enables the `explain` command.
    pub fn with_generator(mut self, generator: impl TextGenerator + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn config(&self) -> &RhythmConfig {
        &self.config
    }

    pub fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    pub async fn run(&mut self) -> Result<()> {
        self.print_about();

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        for line in stdin.lock().lines() {
            let cmd = line?;
            match self.handle(cmd.trim_end()).await {
                Ok(Response::Silent) => (),
                Ok(Response::Print(text)) => {
                    writeln!(stdout, "{text}")?;
                    stdout.flush()?;
                }
                Ok(Response::Quit) => break,
                Err(e) => error!("{cmd}: {e}"),
            }
        }
        Ok(())
    }

    pub async fn handle(&mut self, cmd: &str) -> Result<Response> {
        let cmd = cmd.trim();
        let mut tokens = cmd.split_whitespace();
        let Some(head) = tokens.next() else {
            return Ok(Response::Silent);
        };

        match head {
            "quit" => Ok(Response::Quit),
            "isready" => Ok(Response::Print("readyok".to_string())),
            "position" => {
                self.game = Some(parse_position(cmd)?);
                Ok(Response::Silent)
            }
            "pgn" => {
                let path = cmd[head.len()..].trim();
                if path.is_empty() {
                    return Err(Error::InvalidGame("pgn needs a file path".into()));
                }
                self.game = Some(load_pgn(Path::new(path))?);
                Ok(Response::Silent)
            }
            "setoption" => {
                let (name, value) = parse_setoption(cmd)?;
                self.config.set_option(&name, &value)?;
                info!("{name} = {value}");
                Ok(Response::Silent)
            }
            "config" => Ok(Response::Print(serde_json::to_string_pretty(&self.config)?)),
            "rhythm" => {
                let game = self
                    .game
                    .as_ref()
                    .ok_or_else(|| Error::InvalidGame("no game loaded".into()))?;
                let title = match cmd[head.len()..].trim() {
                    "" => default_title(game),
                    title => title.to_string(),
                };
                let report = build_rhythm(&self.oracle, game, &title, &self.config).await?;
                Ok(Response::Print(serde_json::to_string(&report)?))
            }
            "explain" => {
                let game = self
                    .game
                    .as_ref()
                    .ok_or_else(|| Error::InvalidGame("no game loaded".into()))?;
                let generator = self
                    .generator
                    .as_deref()
                    .ok_or_else(|| Error::Fatal("no text generator configured".into()))?;
                let ply = parse_explain(cmd, game)?;
                let report = explain_move(
                    &self.oracle,
                    generator,
                    &game.positions()[ply],
                    &game.moves()[ply],
                    &self.config,
                )
                .await?;
                Ok(Response::Print(serde_json::to_string(&report)?))
            }
            _ => {
                warn!("unknown command: {cmd}");
                Ok(Response::Silent)
            }
        }
    }
}

/// `position startpos|fen <fen> [moves <uci>...]`
fn parse_position(cmd: &str) -> Result<Game> {
    enum Options {
        Nothing,
        Fen,
        Moves,
    }
    let mut fen_string = String::new();
    let mut moves: Vec<&str> = Vec::new();
    let mut startpos = false;
    let mut option = Options::Nothing;
    for token in cmd.split_whitespace() {
        match token {
            "position" => (),
            "startpos" => startpos = true,
            "fen" => option = Options::Fen,
            "moves" => option = Options::Moves,
            _ => match option {
                Options::Nothing => (),
                Options::Fen => {
                    fen_string.push_str(token);
                    fen_string.push(' ');
                }
                Options::Moves => moves.push(token),
            },
        }
    }

    let start = if startpos {
        Position::starting_position()
    } else if fen_string.is_empty() {
        return Err(Error::InvalidFen("expected startpos or fen".into()));
    } else {
        Position::new(fen_string.trim_end())?
    };
    Game::from_uci(start, &moves[..])
}

/// `setoption name <name...> value <value...>`
fn parse_setoption(cmd: &str) -> Result<(String, String)> {
    let invalid = |reason: &str| Error::InvalidOption {
        name: cmd.to_string(),
        reason: reason.to_string(),
    };
    let rest = cmd
        .split_once(" name ")
        .map(|(_, rest)| rest)
        .ok_or_else(|| invalid("missing name"))?;
    let (name, value) = rest
        .split_once(" value ")
        .ok_or_else(|| invalid("missing value"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

/// `explain <move number> <white|black>`: index of that ply in `game`.
fn parse_explain(cmd: &str, game: &Game) -> Result<usize> {
    let usage = || Error::InvalidGame("usage: explain <move number> <white|black>".into());
    let mut tokens = cmd.split_whitespace().skip(1);
    let number: u32 = tokens
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(usage)?;
    let name = tokens.next().map(str::to_ascii_lowercase).ok_or_else(usage)?;
    let side = match name.as_str() {
        "white" | "w" => Color::White,
        "black" | "b" => Color::Black,
        _ => return Err(usage()),
    };
    game.positions()[..game.plies()]
        .iter()
        .position(|p| p.fullmoves() == number && p.turn() == side)
        .ok_or_else(|| Error::InvalidGame(format!("no move {number} for {name} in this game")))
}

fn load_pgn(path: &Path) -> Result<Game> {
    let text = std::fs::read_to_string(path)?;
    let game = Game::from_pgn(&text)?;
    info!("loaded {} plies from {}", game.plies(), path.display());
    Ok(game)
}

fn default_title(game: &Game) -> String {
    match (game.header("White"), game.header("Black")) {
        (Some(white), Some(black)) => format!("{white} vs {black}"),
        _ => "game".to_string(),
    }
}
