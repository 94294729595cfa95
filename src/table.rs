use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use fnv::FnvHashMap;
use itertools::Itertools;
use log::{info, warn};

use crate::error::{require_input, CoocError, LineError, Result};
use crate::output::write_atomic;


/// Contributions at or below this are not added onto an existing entry.
pub const ACCUMULATE_EPSILON: f64 = 1e-9;

pub type WordPair = (Box<str>, Box<str>);


/// (target, context) -> accumulated weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CooccurrenceTable {
    acc: FnvHashMap<WordPair, f64>,
}

fn key(target: &str, context: &str) -> WordPair {
    (Box::from(target), Box::from(context))
}

impl CooccurrenceTable {
    pub fn new() -> CooccurrenceTable {
        CooccurrenceTable { acc: FnvHashMap::default() }
    }

    /// Insert-or-add a single contribution.
    ///
    /// A pair seen for the first time stores `weight` as is. Later contributions only count
    /// when they exceed `ACCUMULATE_EPSILON`.
    pub fn add(&mut self, target: &str, context: &str, weight: f64) {
        // XXX: Allocates a key even when the pair already exists. Switch to raw_entry API when
        // supported.
        match self.acc.get_mut(&key(target, context)) {
            Some(existing) => {
                if weight > ACCUMULATE_EPSILON {
                    *existing += weight;
                }
            },
            None => {
                self.acc.insert(key(target, context), weight);
            }
        }
    }

    /// Plain sum, used when folding one shard's finished table into another.
    pub fn add_total(&mut self, pair: WordPair, value: f64) {
        *self.acc.entry(pair).or_insert(0.0) += value;
    }

    pub fn merge(&mut self, other: CooccurrenceTable) {
        for (pair, value) in other.acc.into_iter() {
            self.add_total(pair, value);
        }
    }

    /// Merge the smaller table into the larger one.
    pub fn merged(left: CooccurrenceTable, right: CooccurrenceTable) -> CooccurrenceTable {
        let (mut acc, rest) = if left.len() < right.len() {
            (right, left)
        } else {
            (left, right)
        };
        acc.merge(rest);
        acc
    }

    pub fn insert(&mut self, pair: WordPair, value: f64) -> Option<f64> {
        self.acc.insert(pair, value)
    }

    pub fn get(&self, target: &str, context: &str) -> Option<f64> {
        self.acc.get(&key(target, context)).copied()
    }

    pub fn contains(&self, target: &str, context: &str) -> bool {
        self.acc.contains_key(&key(target, context))
    }

    pub fn len(&self) -> usize {
        self.acc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acc.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.acc.iter().map(|((t, c), v)| (&**t, &**c, *v))
    }

    /// Entries ordered by (target, context), so output files are reproducible.
    pub fn sorted(&self) -> Vec<(&str, &str, f64)> {
        self.iter().sorted_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1))).collect_vec()
    }

    pub fn write_text_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for (target, context, value) in self.sorted() {
            writeln!(writer, "{}\t{}\t{:.8}", target, context, value)?;
        }
        Ok(())
    }

    pub fn write_text(&self, path: &Path) -> Result<()> {
        info!("Writing {} pairs to {}", self.len(), path.display());
        write_atomic(path, |writer| self.write_text_to(writer).map_err(|e| CoocError::io(path, e)))
    }

    /// Sums every record of a `token1\ttoken2\tvalue` text table into this table.
    pub fn extend_from_reader<R: BufRead>(&mut self, reader: R, source: &Path) -> Result<usize> {
        let mut read = 0;
        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| CoocError::io(source, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_text_record(&line) {
                Ok((target, context, value)) => {
                    self.add_total(key(target, context), value);
                    read += 1;
                },
                Err(err) => warn!("{}:{}: {}: {:?}", source.display(), line_idx + 1, err, line),
            }
        }
        Ok(read)
    }

    pub fn read_text(path: &Path) -> Result<CooccurrenceTable> {
        require_input(path)?;
        let file = File::open(path).map_err(|e| CoocError::io(path, e))?;
        let mut table = CooccurrenceTable::new();
        table.extend_from_reader(BufReader::new(file), path)?;
        Ok(table)
    }
}

/// Parse `token1\ttoken2\tvalue`. Extra middle fields are tolerated, the value is the last.
pub fn parse_text_record(line: &str) -> std::result::Result<(&str, &str, f64), LineError> {
    let parts = line.trim_end_matches(|c: char| c == '\n' || c == '\r').split('\t').collect_vec();
    if parts.len() < 3 {
        return Err(LineError::FieldCount { expected: 3, got: parts.len() });
    }
    let raw = parts[parts.len() - 1].trim();
    let value = raw.parse::<f64>().map_err(|_| LineError::BadNumber(raw.to_owned()))?;
    Ok((parts[0], parts[1], value))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_contribution_is_stored_verbatim() {
        let mut table = CooccurrenceTable::new();
        table.add("a", "b", 1e-12);
        assert_eq!(table.get("a", "b"), Some(1e-12));
    }

    #[test]
    fn sub_threshold_additions_are_dropped() {
        let mut table = CooccurrenceTable::new();
        table.add("a", "b", 0.5);
        table.add("a", "b", ACCUMULATE_EPSILON);
        table.add("a", "b", 1e-10);
        assert_eq!(table.get("a", "b"), Some(0.5));
        table.add("a", "b", 0.25);
        assert_eq!(table.get("a", "b"), Some(0.75));
    }

    #[test]
    fn direction_matters() {
        let mut table = CooccurrenceTable::new();
        table.add("a", "b", 1.0);
        table.add("b", "a", 2.0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a", "b"), Some(1.0));
        assert_eq!(table.get("b", "a"), Some(2.0));
    }

    #[test]
    fn merge_sums_shared_pairs() {
        let mut left = CooccurrenceTable::new();
        left.add("a", "b", 1.0);
        let mut right = CooccurrenceTable::new();
        right.add("a", "b", 1.0);
        right.add("c", "d", 0.5);
        let merged = CooccurrenceTable::merged(left, right);
        assert_eq!(merged.get("a", "b"), Some(2.0));
        assert_eq!(merged.get("c", "d"), Some(0.5));
    }

    #[test]
    fn text_round_trip_uses_eight_decimals() {
        let mut table = CooccurrenceTable::new();
        table.add("the", "cat", 1.0);
        table.add("cat", "dog", 1.0 / 3.0);
        let mut buf = Vec::new();
        table.write_text_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "cat\tdog\t0.33333333\nthe\tcat\t1.00000000\n");

        let mut reread = CooccurrenceTable::new();
        let read = reread.extend_from_reader(text.as_bytes(), Path::new("t")).unwrap();
        assert_eq!(read, 2);
        assert_eq!(reread.get("cat", "dog"), Some(0.33333333));
    }

    #[test]
    fn malformed_text_lines_are_skipped() {
        let text = "a\tb\t1.5\nbroken line\nc\td\tnope\n\ne\tf\t2\n";
        let mut table = CooccurrenceTable::new();
        let read = table.extend_from_reader(text.as_bytes(), Path::new("t")).unwrap();
        assert_eq!(read, 2);
        assert_eq!(table.get("a", "b"), Some(1.5));
        assert_eq!(table.get("e", "f"), Some(2.0));
    }
}
