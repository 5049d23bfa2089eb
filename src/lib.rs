pub mod analysis;
pub mod batcher;
pub mod concurrent;
pub mod config;
pub mod engine;
pub mod error;
pub mod explain;
pub mod game;
pub mod generate;
pub mod oracle;
pub mod retry;
pub mod rhythm;
pub mod types;

pub use config::RhythmConfig;
pub use error::{Error, Result};
pub use rhythm::{build_rhythm, RhythmReport, RhythmSeries};
