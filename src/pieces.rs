use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use fnv::FnvHashMap;
use log::{info, warn};

use crate::error::{require_input, CoocError, LineError, Result};


/// The tokenizer boundary: a word's ordered sub-word pieces.
///
/// Implementations must be pure. They are shared read-only between threads.
pub trait PieceSplitter: Sync {
    fn pieces(&self, word: &str) -> Vec<String>;
}

impl<F> PieceSplitter for F
where
    F: Fn(&str) -> Vec<String> + Sync,
{
    fn pieces(&self, word: &str) -> Vec<String> {
        self(word)
    }
}

/// Word -> pieces lookup loaded from a `word\tpiece1\tpiece2...` file.
///
/// Words missing from the table are their own single piece.
#[derive(Debug, Clone, Default)]
pub struct PieceTable {
    pieces: FnvHashMap<Box<str>, Vec<String>>,
}

impl PieceTable {
    pub fn new() -> PieceTable {
        PieceTable::default()
    }

    pub fn insert<S: Into<String>>(&mut self, word: &str, pieces: Vec<S>) {
        self.pieces.insert(Box::from(word), pieces.into_iter().map(Into::into).collect());
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn from_reader<R: BufRead>(reader: R, source: &Path) -> Result<PieceTable> {
        let mut table = PieceTable::new();
        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| CoocError::io(source, e))?;
            let mut parts = line.trim_end().split('\t');
            let word = parts.next().unwrap_or("");
            if word.is_empty() {
                if !line.trim().is_empty() {
                    warn!("{}:{}: {}: {:?}", source.display(), line_idx + 1, LineError::EmptyWord, line);
                }
                continue;
            }
            let pieces: Vec<String> = parts.filter(|p| !p.is_empty()).map(String::from).collect();
            if pieces.is_empty() {
                table.insert(word, vec![word]);
            } else {
                table.insert(word, pieces);
            }
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<PieceTable> {
        require_input(path)?;
        let file = File::open(path).map_err(|e| CoocError::io(path, e))?;
        let table = PieceTable::from_reader(BufReader::new(file), path)?;
        info!("Reading word pieces from {} and size: {}", path.display(), table.len());
        Ok(table)
    }
}

impl PieceSplitter for PieceTable {
    fn pieces(&self, word: &str) -> Vec<String> {
        match self.pieces.get(word) {
            Some(pieces) => pieces.clone(),
            None => vec![word.to_owned()],
        }
    }
}
