use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;
use log::{info, warn};
use rayon::prelude::*;

use crate::error::{require_input, CoocError, Result};
use crate::pieces::PieceSplitter;
use crate::table::{parse_text_record, CooccurrenceTable};
use crate::vocab::Vocab;


/// Averaged word pairs below this are dropped.
pub const WORD_PAIR_EPSILON: f64 = 1e-8;
/// Candidate word pairs counted fewer times than this are ignored.
pub const MIN_PAIR_COUNT: f64 = 1.0;
const PROGRESS_EVERY: usize = 1_000_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStats {
    pub candidates: usize,
    pub rare: usize,
    pub malformed: usize,
    pub below_threshold: usize,
    pub added_back: usize,
}

/// Vocabulary words that split into more than one piece.
pub fn multi_piece_words<S: PieceSplitter>(vocab: &Vocab, splitter: &S) -> FnvHashSet<Box<str>> {
    let words = vocab.words().collect_vec();
    words
        .par_iter()
        .filter(|word| splitter.pieces(word).len() > 1)
        .map(|word| Box::from(*word))
        .collect()
}

/// Lifts sub-word pair weights to word pair weights.
pub struct BpeAggregator<'a, S: PieceSplitter> {
    splitter: &'a S,
    scale: f64,
    cache: FnvHashMap<Box<str>, Vec<String>>,
}

impl<'a, S: PieceSplitter> BpeAggregator<'a, S> {
    pub fn new(splitter: &'a S, scale: f64) -> Result<BpeAggregator<'a, S>> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(CoocError::Config(format!("co-occurrence scale must be positive, got {}", scale)));
        }
        Ok(BpeAggregator { splitter, scale, cache: FnvHashMap::default() })
    }

    fn pieces(&mut self, word: &str) -> Vec<String> {
        if let Some(pieces) = self.cache.get(word) {
            return pieces.clone();
        }
        let pieces = self.splitter.pieces(word);
        self.cache.insert(Box::from(word), pieces.clone());
        pieces
    }

    /// Average sub-word weight over the cross product of both words' pieces, scaled when either
    /// word has several pieces. `None` when the average is negligible.
    pub fn word_pair_value(&mut self, target: &str, context: &str, sub: &CooccurrenceTable) -> Option<f64> {
        let target_pieces = self.pieces(target);
        let context_pieces = self.pieces(context);
        let pair_count = target_pieces.len() * context_pieces.len();
        if pair_count == 0 {
            return None;
        }
        let sum: f64 = target_pieces
            .iter()
            .cartesian_product(context_pieces.iter())
            .map(|(t, c)| sub.get(t, c).unwrap_or(0.0))
            .sum();
        let avg = sum / pair_count as f64;
        if avg < WORD_PAIR_EPSILON {
            return None;
        }
        if target_pieces.len() > 1 || context_pieces.len() > 1 {
            Some(avg * self.scale)
        } else {
            Some(avg)
        }
    }

    /// Run over a `word1\tword2\tcount` candidate stream, then add back pure sub-word pairs.
    pub fn aggregate_from_reader<R: BufRead>(
        &mut self,
        vocab: &Vocab,
        pair_counts: R,
        source: &Path,
        sub: &CooccurrenceTable,
    ) -> Result<(CooccurrenceTable, AggregateStats)> {
        let multi = multi_piece_words(vocab, self.splitter);
        info!("multi piece words: {}", multi.len());

        let mut stats = AggregateStats::default();
        let mut words = CooccurrenceTable::new();
        for (line_idx, line) in pair_counts.lines().enumerate() {
            if (line_idx + 1) % PROGRESS_EVERY == 0 {
                info!("processing {} pair count lines...", line_idx + 1);
            }
            let line = line.map_err(|e| CoocError::io(source, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let (target, context, count) = match parse_text_record(&line) {
                Ok(record) => record,
                Err(err) => {
                    stats.malformed += 1;
                    warn!("{}:{}: {}: {:?}", source.display(), line_idx + 1, err, line);
                    continue;
                }
            };
            stats.candidates += 1;
            if count < MIN_PAIR_COUNT {
                stats.rare += 1;
                continue;
            }
            match self.word_pair_value(target, context, sub) {
                Some(value) => {
                    words.insert((Box::from(target), Box::from(context)), value);
                },
                None => stats.below_threshold += 1,
            }
        }

        for (target, context, value) in sub.iter() {
            if multi.contains(target) && multi.contains(context) && !words.contains(target, context) {
                words.insert((Box::from(target), Box::from(context)), value);
                stats.added_back += 1;
            }
        }
        info!("add addition count {}.", stats.added_back);
        Ok((words, stats))
    }

    pub fn aggregate(
        &mut self,
        vocab: &Vocab,
        pair_count_path: &Path,
        sub: &CooccurrenceTable,
    ) -> Result<(CooccurrenceTable, AggregateStats)> {
        require_input(pair_count_path)?;
        let file = File::open(pair_count_path).map_err(|e| CoocError::io(pair_count_path, e))?;
        self.aggregate_from_reader(vocab, BufReader::new(file), pair_count_path, sub)
    }
}
