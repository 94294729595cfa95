//! Model signal dumps.
//!
//! Both formats start every source line with a `###<text>` marker line. The MLM format then
//! has one `<target> <tok>:<score> ...` line per target piece, best candidate first. The SAN
//! format has one `<i>###<j>:<weight> ...` line per word `i`, listing every word `j` of the
//! line.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;
use log::{debug, info, warn};
use simple_error::SimpleError;

use crate::error::{require_input, CoocError, LineError, Result};
use crate::reweight::{contributions, Candidate, Reweighting};
use crate::table::CooccurrenceTable;


pub const MARKER: &str = "###";
const PROGRESS_EVERY: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    /// Masked language model predictions per sub-word position.
    Mlm,
    /// Word-by-word self attention weights.
    San,
}

impl FromStr for DumpFormat {
    type Err = SimpleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "mlm" {
            Ok(DumpFormat::Mlm)
        } else if s == "san" {
            Ok(DumpFormat::San)
        } else {
            Err(SimpleError::new("Must be mlm or san"))
        }
    }
}

/// One target with its weighted contexts.
pub type Contributions = (String, Vec<(String, f64)>);

fn parse_candidate(item: &str) -> std::result::Result<(&str, f64), LineError> {
    let (token, score) = item
        .rsplit_once(':')
        .ok_or_else(|| LineError::BadCandidate(item.to_owned()))?;
    if token.is_empty() {
        return Err(LineError::BadCandidate(item.to_owned()));
    }
    let value = score
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| LineError::BadNumber(score.to_owned()))?;
    Ok((token, value))
}

/// Parse an MLM record line: `<target> <tok>:<score> ...`.
pub fn parse_mlm_record(
    line: &str,
    window_size: usize,
    reweighting: Reweighting,
) -> std::result::Result<Contributions, LineError> {
    let parts = line.split_whitespace().collect_vec();
    if parts.len() < 2 {
        return Err(LineError::FieldCount { expected: 2, got: parts.len() });
    }
    let target = parts[0];
    let candidates = parts[1..]
        .iter()
        .map(|item| parse_candidate(item).map(|(token, score)| Candidate::new(token, score)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let contribs = contributions(target, candidates, window_size + 1, reweighting)?;
    Ok((target.to_owned(), contribs))
}

/// Parse a SAN record line `<i>###<j>:<weight> ...` against the words of its marker line.
///
/// Candidates come from positions within `window_size` of `i` (excluding `i`), ranked by
/// weight.
pub fn parse_san_record(
    line_words: &[&str],
    line: &str,
    window_size: usize,
    reweighting: Reweighting,
) -> std::result::Result<Contributions, LineError> {
    let (position, weights) = line
        .trim()
        .split_once(MARKER)
        .ok_or(LineError::FieldCount { expected: 2, got: 1 })?;
    let position = position
        .trim()
        .parse::<usize>()
        .map_err(|_| LineError::BadNumber(position.to_owned()))?;
    let entries = weights.split_whitespace().collect_vec();
    let sen_len = entries.len();
    if sen_len != line_words.len() {
        return Err(LineError::LengthMismatch { words: line_words.len(), weights: sen_len });
    }
    if position >= sen_len {
        return Err(LineError::BadPosition { position, len: sen_len });
    }
    let target = line_words[position];

    let left = position.saturating_sub(window_size);
    let right = (position + window_size + 1).min(sen_len);
    let mut candidates = Vec::with_capacity(right - left);
    for (offset, entry) in entries[left..right].iter().enumerate() {
        if left + offset == position {
            continue;
        }
        let (index, weight) = parse_candidate(entry)?;
        let index = index.parse::<usize>().map_err(|_| LineError::BadNumber(index.to_owned()))?;
        let word = line_words
            .get(index)
            .ok_or(LineError::BadPosition { position: index, len: sen_len })?;
        candidates.push(Candidate::new(*word, weight));
    }
    // Stable, so equal weights keep positional order
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let contribs = contributions(target, candidates, window_size + 1, reweighting)?;
    Ok((target.to_owned(), contribs))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DumpStats {
    /// Marker lines, i.e. source text lines.
    pub lines: usize,
    pub records: usize,
    pub skipped: usize,
    pub contributions: usize,
}

fn log_skip(source: &Path, line_num: usize, err: &LineError, line: &str) {
    match err {
        LineError::NoCandidates => debug!("{}:{}: {}: {:?}", source.display(), line_num, err, line),
        _ => warn!("{}:{}: {}: {:?}", source.display(), line_num, err, line),
    }
}

/// Accumulate every record of one dump stream into `table`.
pub fn count_dump_from_reader<R: BufRead>(
    reader: R,
    source: &Path,
    format: DumpFormat,
    window_size: usize,
    reweighting: Reweighting,
    table: &mut CooccurrenceTable,
) -> Result<DumpStats> {
    let timer = howlong::ProcessCPUTimer::new();
    let mut stats = DumpStats::default();
    let mut marker_text: Option<String> = None;
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CoocError::io(source, e))?;
        if let Some(text) = line.strip_prefix(MARKER) {
            stats.lines += 1;
            marker_text = Some(text.to_owned());
            if stats.lines % PROGRESS_EVERY == 0 {
                info!("{} processing {} line text.", timer.elapsed(), stats.lines);
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        stats.records += 1;
        let parsed = match format {
            DumpFormat::Mlm => parse_mlm_record(&line, window_size, reweighting),
            DumpFormat::San => match marker_text.as_deref() {
                Some(text) => {
                    let words = text.split_whitespace().collect_vec();
                    parse_san_record(&words, &line, window_size, reweighting)
                },
                None => Err(LineError::NoMarker),
            },
        };
        match parsed {
            Ok((target, contribs)) => {
                for (context, weight) in contribs.iter() {
                    table.add(&target, context, *weight);
                }
                stats.contributions += contribs.len();
            },
            Err(err) => {
                stats.skipped += 1;
                log_skip(source, line_idx + 1, &err, &line);
            }
        }
    }
    Ok(stats)
}

/// Build one shard's table from one dump file.
pub fn count_dump(
    path: &Path,
    format: DumpFormat,
    window_size: usize,
    reweighting: Reweighting,
) -> Result<(CooccurrenceTable, DumpStats)> {
    require_input(path)?;
    let file = File::open(path).map_err(|e| CoocError::io(path, e))?;
    let mut table = CooccurrenceTable::new();
    let stats = count_dump_from_reader(BufReader::new(file), path, format, window_size, reweighting, &mut table)?;
    info!(
        "{}: {} lines, {} records, {} skipped, {} pairs",
        path.display(), stats.lines, stats.records, stats.skipped, table.len()
    );
    Ok((table, stats))
}

pub fn marker_line(text: &str) -> String {
    format!("{}{}", MARKER, text.trim())
}

pub fn mlm_line(target: &str, candidates: &[Candidate]) -> String {
    let mut out = String::from(target);
    for candidate in candidates {
        out.push(' ');
        out.push_str(&format!("{}:{}", candidate.token, candidate.score));
    }
    out
}

pub fn san_line(position: usize, weights: &[f64]) -> String {
    let entries = weights.iter().enumerate().map(|(j, w)| format!("{}:{}", j, w)).join(" ");
    format!("{}{}{}", position, MARKER, entries)
}
