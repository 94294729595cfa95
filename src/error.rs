use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;


/// Fatal errors. Any of these aborts the current operation before further output is written.
#[derive(Debug, Error)]
pub enum CoocError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("required input does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    /// Binary co-occurrence file whose length is not a whole number of records.
    #[error("{path} is {len} bytes, which is not a multiple of the 16 byte record size")]
    TruncatedBinary {
        path: PathBuf,
        len: u64,
    },

    #[error("no vocabulary entry for id {0}")]
    UnknownId(i32),

    #[error("inference service: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, CoocError>;

impl CoocError {
    pub fn io(path: &Path, source: io::Error) -> CoocError {
        CoocError::Io { path: path.to_owned(), source }
    }
}

/// Problems with a single input line. These are logged and the line is skipped.
#[derive(Debug, Error, PartialEq)]
pub enum LineError {
    #[error("expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },

    #[error("bad number {0:?}")]
    BadNumber(String),

    #[error("bad candidate {0:?}, expected token:score")]
    BadCandidate(String),

    #[error("record before any ### marker line")]
    NoMarker,

    #[error("word position {position} outside a line of {len} words")]
    BadPosition { position: usize, len: usize },

    #[error("line has {words} words but {weights} weights")]
    LengthMismatch { words: usize, weights: usize },

    #[error("no candidates left")]
    NoCandidates,

    #[error("empty word")]
    EmptyWord,
}

/// Require an input file to exist before any work starts.
pub fn require_input(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CoocError::MissingInput(path.to_owned()))
    }
}
