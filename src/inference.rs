//! Boundary to the model inference service, and the driver that turns its output into dump
//! files.
use std::io::Write;
use std::path::Path;

use log::{info, warn};

use crate::attention::{write_san_batch, AttentionMatrix, BatchItem, Span, WeightExtractor};
use crate::config::PipelineConfig;
use crate::dump::{marker_line, mlm_line};
use crate::error::{CoocError, Result};
use crate::output::write_atomic;
use crate::pieces::PieceSplitter;
use crate::reweight::Candidate;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    MlmPredictions,
    AttentionWeights,
}

/// What the service returns for one batch, one entry per line.
#[derive(Debug, Clone)]
pub enum Signal {
    /// Per line, per piece position: ranked candidates, best first, special tokens removed.
    Predictions(Vec<Vec<Vec<Candidate>>>),
    /// Per line: every head of every layer. They are summed before extraction.
    Attention(Vec<Vec<AttentionMatrix>>),
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Predictions(_) => SignalKind::MlmPredictions,
            Signal::Attention(_) => SignalKind::AttentionWeights,
        }
    }

    fn len(&self) -> usize {
        match self {
            Signal::Predictions(lines) => lines.len(),
            Signal::Attention(lines) => lines.len(),
        }
    }
}

/// A source line split into words and sub-word pieces.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedLine {
    pub text: String,
    pub words: Vec<String>,
    pub pieces: Vec<String>,
    /// Inclusive piece span of each word.
    pub offsets: Vec<Span>,
}

impl TokenizedLine {
    pub fn new<S: PieceSplitter + ?Sized>(text: &str, splitter: &S) -> TokenizedLine {
        let words: Vec<String> = text.split_whitespace().map(String::from).collect();
        let mut pieces = Vec::new();
        let mut offsets = Vec::with_capacity(words.len());
        for word in words.iter() {
            let mut word_pieces = splitter.pieces(word);
            if word_pieces.is_empty() {
                word_pieces.push(word.clone());
            }
            let start = pieces.len();
            pieces.extend(word_pieces);
            offsets.push((start, pieces.len() - 1));
        }
        TokenizedLine { text: text.trim().to_owned(), words, pieces, offsets }
    }
}

pub trait InferenceService {
    fn kind(&self) -> SignalKind;
    fn infer(&self, batch: &[TokenizedLine]) -> Result<Signal>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DumpWriteStats {
    pub lines: usize,
    pub skipped: usize,
    pub batches: usize,
}

/// Runs a service over text lines in batches and writes the matching dump format.
pub struct SignalDumper<'a, M: InferenceService, S: PieceSplitter> {
    service: &'a M,
    splitter: &'a S,
    extractor: WeightExtractor,
    window_size: usize,
    batch_size: usize,
    max_pieces: usize,
}

impl<'a, M: InferenceService, S: PieceSplitter> SignalDumper<'a, M, S> {
    pub fn new(service: &'a M, splitter: &'a S, config: &PipelineConfig) -> Result<SignalDumper<'a, M, S>> {
        Ok(SignalDumper {
            service,
            splitter,
            extractor: WeightExtractor::new(config.workers)?,
            window_size: config.window_size,
            batch_size: config.batch_size,
            max_pieces: config.max_pieces,
        })
    }

    pub fn dump_to_file<I>(&self, lines: I, path: &Path) -> Result<DumpWriteStats>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        write_atomic(path, |writer| self.dump(lines, writer, path))
    }

    /// `dest` is only used in diagnostics.
    pub fn dump<I, W>(&self, lines: I, writer: &mut W, dest: &Path) -> Result<DumpWriteStats>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        W: Write,
    {
        let timer = howlong::ProcessCPUTimer::new();
        let mut stats = DumpWriteStats::default();
        let mut batch = Vec::with_capacity(self.batch_size);
        for (line_idx, text) in lines.into_iter().enumerate() {
            let text = text.as_ref();
            if text.trim().is_empty() {
                continue;
            }
            let tokenized = TokenizedLine::new(text, self.splitter);
            if tokenized.pieces.len() > self.max_pieces {
                warn!(
                    "line {} has {} pieces, over the maximum of {}; skipping {:?}",
                    line_idx + 1, tokenized.pieces.len(), self.max_pieces, text
                );
                stats.skipped += 1;
                continue;
            }
            batch.push(tokenized);
            if batch.len() == self.batch_size {
                self.flush_batch(&batch, writer, dest)?;
                stats.lines += batch.len();
                stats.batches += 1;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.flush_batch(&batch, writer, dest)?;
            stats.lines += batch.len();
            stats.batches += 1;
        }
        info!("{} writing {} batch dump data to {}.", timer.elapsed(), stats.batches, dest.display());
        Ok(stats)
    }

    fn flush_batch<W: Write>(&self, batch: &[TokenizedLine], writer: &mut W, dest: &Path) -> Result<()> {
        let signal = self.service.infer(batch)?;
        if signal.kind() != self.service.kind() {
            return Err(CoocError::Inference(format!(
                "service declared {:?} but returned {:?}", self.service.kind(), signal.kind()
            )));
        }
        if signal.len() != batch.len() {
            return Err(CoocError::Inference(format!(
                "batch of {} lines produced {} results", batch.len(), signal.len()
            )));
        }
        match signal {
            Signal::Predictions(lines) => {
                for (line, predictions) in batch.iter().zip(lines.iter()) {
                    if predictions.len() != line.pieces.len() {
                        return Err(CoocError::Inference(format!(
                            "{} pieces but {} prediction rows for {:?}", line.pieces.len(), predictions.len(), line.text
                        )));
                    }
                    self.write_mlm_line(line, predictions, writer).map_err(|e| CoocError::io(dest, e))?;
                }
                Ok(())
            },
            Signal::Attention(lines) => {
                let items = batch
                    .iter()
                    .zip(lines.iter())
                    .map(|(line, matrices)| {
                        BatchItem::new(line.text.clone(), line.offsets.clone(), AttentionMatrix::sum_of(matrices)?)
                    })
                    .collect::<Result<Vec<BatchItem>>>()?;
                let weights = self.extractor.extract(&items)?;
                write_san_batch(writer, &items, &weights).map_err(|e| CoocError::io(dest, e))
            },
        }
    }

    fn write_mlm_line<W: Write>(&self, line: &TokenizedLine, predictions: &[Vec<Candidate>], writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "{}", marker_line(&line.text))?;
        for (piece, candidates) in line.pieces.iter().zip(predictions.iter()) {
            let top = &candidates[..candidates.len().min(self.window_size + 1)];
            writeln!(writer, "{}", mlm_line(piece, top))?;
        }
        Ok(())
    }
}
