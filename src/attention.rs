//! Word-by-word attention weights from sub-word attention matrices.
use std::io::{self, ErrorKind, Write};

use crossbeam_channel::unbounded;
use fnv::FnvHashMap;
use log::debug;

use crate::dump::{marker_line, san_line};
use crate::error::{CoocError, Result};
use crate::parallel::partition;


/// Square, row-major matrix of attention weights between sub-word positions.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionMatrix {
    dim: usize,
    data: Vec<f64>,
}

impl AttentionMatrix {
    pub fn new(dim: usize, data: Vec<f64>) -> Result<AttentionMatrix> {
        if data.len() != dim * dim {
            return Err(CoocError::Inference(format!(
                "attention matrix of dimension {} needs {} values, got {}", dim, dim * dim, data.len()
            )));
        }
        Ok(AttentionMatrix { dim, data })
    }

    pub fn zeros(dim: usize) -> AttentionMatrix {
        AttentionMatrix { dim, data: vec![0.0; dim * dim] }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<AttentionMatrix> {
        let dim = rows.len();
        let data: Vec<f64> = rows.iter().flat_map(|row| row.iter().copied()).collect();
        AttentionMatrix::new(dim, data)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.dim + col]
    }

    /// Element-wise sum, used to collapse heads and layers into one matrix.
    pub fn sum_of(matrices: &[AttentionMatrix]) -> Result<AttentionMatrix> {
        let first = matrices
            .first()
            .ok_or_else(|| CoocError::Inference("no attention matrices to sum".into()))?;
        let mut acc = AttentionMatrix::zeros(first.dim);
        for matrix in matrices {
            if matrix.dim != acc.dim {
                return Err(CoocError::Inference(format!(
                    "cannot sum attention matrices of dimension {} and {}", acc.dim, matrix.dim
                )));
            }
            for (a, b) in acc.data.iter_mut().zip(matrix.data.iter()) {
                *a += *b;
            }
        }
        Ok(acc)
    }
}

/// Inclusive range of sub-word positions belonging to one word.
pub type Span = (usize, usize);

/// Mean of the block covering `rows` x `cols`.
pub fn span_mean(matrix: &AttentionMatrix, rows: Span, cols: Span) -> f64 {
    let (start_i, end_i) = rows;
    let (start_j, end_j) = cols;
    let mut sum = 0.0;
    for row in start_i..=end_i {
        for col in start_j..=end_j {
            sum += matrix.get(row, col);
        }
    }
    sum / ((end_i - start_i + 1) * (end_j - start_j + 1)) as f64
}

/// One line of a batch: its text, each word's piece span and the collapsed attention matrix.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub text: String,
    pub offsets: Vec<Span>,
    pub weights: AttentionMatrix,
}

impl BatchItem {
    pub fn new(text: String, offsets: Vec<Span>, weights: AttentionMatrix) -> Result<BatchItem> {
        let item = BatchItem { text, offsets, weights };
        item.validate()?;
        Ok(item)
    }

    pub fn num_words(&self) -> usize {
        self.offsets.len()
    }

    fn validate(&self) -> Result<()> {
        let words = self.text.split_whitespace().count();
        if words != self.offsets.len() {
            return Err(CoocError::Inference(format!(
                "{:?} has {} words but {} offsets", self.text, words, self.offsets.len()
            )));
        }
        for &(start, end) in self.offsets.iter() {
            if start > end || end >= self.weights.dim() {
                return Err(CoocError::Inference(format!(
                    "span ({}, {}) outside attention matrix of dimension {}", start, end, self.weights.dim()
                )));
            }
        }
        Ok(())
    }
}

/// (line in batch, word i, word j)
pub type WeightKey = (usize, usize, usize);
pub type WordWeights = FnvHashMap<WeightKey, f64>;

#[derive(Debug, Clone, Copy)]
struct SpanTask {
    item: usize,
    i: usize,
    j: usize,
}

/// Fixed-size worker pool computing every word pair's mean attention.
pub struct WeightExtractor {
    workers: usize,
}

impl WeightExtractor {
    pub fn new(workers: usize) -> Result<WeightExtractor> {
        if workers == 0 {
            return Err(CoocError::Config("need at least one worker".into()));
        }
        Ok(WeightExtractor { workers })
    }

    /// Returns once every task of the batch has finished.
    pub fn extract(&self, batch: &[BatchItem]) -> Result<WordWeights> {
        for item in batch {
            item.validate()?;
        }
        let mut tasks = Vec::new();
        for (item_idx, item) in batch.iter().enumerate() {
            let n = item.num_words();
            for i in 0..n {
                for j in 0..n {
                    tasks.push(SpanTask { item: item_idx, i, j });
                }
            }
        }
        debug!("{} span tasks over {} workers", tasks.len(), self.workers);

        crossbeam::scope(|scope| {
            let (snd, rcv) = unbounded();
            for task_slice in partition(&tasks, self.workers) {
                let snd = snd.clone();
                scope.spawn(move |_| {
                    let results: Vec<(WeightKey, f64)> = task_slice
                        .iter()
                        .map(|task| {
                            let item = &batch[task.item];
                            let weight = span_mean(&item.weights, item.offsets[task.i], item.offsets[task.j]);
                            ((task.item, task.i, task.j), weight)
                        })
                        .collect();
                    // The receiver outlives every worker
                    let _ = snd.send(results);
                });
            }
            drop(snd);
            rcv.iter().flatten().collect::<WordWeights>()
        }).map_err(|_| CoocError::Inference("attention worker panicked".into()))
    }
}

/// Write a finished batch in the SAN dump format.
pub fn write_san_batch<W: Write>(writer: &mut W, batch: &[BatchItem], weights: &WordWeights) -> io::Result<()> {
    for (item_idx, item) in batch.iter().enumerate() {
        writeln!(writer, "{}", marker_line(&item.text))?;
        let n = item.num_words();
        for i in 0..n {
            let row = (0..n)
                .map(|j| {
                    weights.get(&(item_idx, i, j)).copied().ok_or_else(|| {
                        io::Error::new(ErrorKind::InvalidData, format!("no weight for ({}, {}, {})", item_idx, i, j))
                    })
                })
                .collect::<io::Result<Vec<f64>>>()?;
            writeln!(writer, "{}", san_line(i, &row))?;
        }
    }
    Ok(())
}
