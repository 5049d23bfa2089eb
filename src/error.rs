//! Error types for rhythm analysis.
//!
//! Remote failures are split into transient ones, which the retry loop may
//! repeat, and everything else, which surfaces at once.

/// Crate-wide error
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Rate limit, server error, timeout or a broken engine pipe
    #[error("transient oracle failure: {0}")]
    Transient(String),

    /// Remote failure that retrying cannot fix
    #[error("oracle failure: {0}")]
    Fatal(String),

    /// Retry budget spent on a transient failure
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    #[error("invalid game record: {0}")]
    InvalidGame(String),

    /// Two batches answered for the same key
    #[error("duplicate key across batches: {0}")]
    DuplicateKey(String),

    /// Per-ply inputs of different lengths
    #[error("misaligned series: {what} has {actual} entries, expected {expected}")]
    Misaligned {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
