use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use log::{info, warn};

use crate::codec::{read_bin, CoocRecord};
use crate::error::{require_input, CoocError, Result};
use crate::output::write_atomic;
use crate::table::parse_text_record;
use crate::vocab::Vocab;


#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConvertStats {
    pub written: u64,
    pub out_of_vocab: u64,
    pub malformed: u64,
}

/// Text table to binary records. Pairs with a word outside the vocabulary are left out.
pub fn txt_to_bin_from_reader<R: BufRead, W: Write>(
    vocab: &Vocab,
    reader: R,
    source: &Path,
    writer: &mut W,
    dest: &Path,
) -> Result<ConvertStats> {
    let mut stats = ConvertStats::default();
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CoocError::io(source, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let (target, context, value) = match parse_text_record(&line) {
            Ok(record) => record,
            Err(err) => {
                stats.malformed += 1;
                warn!("{}:{}: {}: {:?}", source.display(), line_idx + 1, err, line);
                continue;
            }
        };
        match (vocab.get(target), vocab.get(context)) {
            (Some(target), Some(context)) => {
                CoocRecord::new(target, context, value)
                    .write_to(writer)
                    .map_err(|e| CoocError::io(dest, e))?;
                stats.written += 1;
            },
            _ => stats.out_of_vocab += 1,
        }
    }
    Ok(stats)
}

pub fn txt_to_bin(vocab: &Vocab, coo_path: &Path, out_path: &Path) -> Result<ConvertStats> {
    require_input(coo_path)?;
    let input = File::open(coo_path).map_err(|e| CoocError::io(coo_path, e))?;
    let stats = write_atomic(out_path, |writer| {
        txt_to_bin_from_reader(vocab, BufReader::new(input), coo_path, writer, out_path)
    })?;
    info!(
        "finish converting txt to bin: {} records, {} out of vocabulary, {} malformed",
        stats.written, stats.out_of_vocab, stats.malformed
    );
    Ok(stats)
}

fn lookup<'a>(words: &[Option<&'a str>], id: i32) -> Result<&'a str> {
    usize::try_from(id)
        .ok()
        .and_then(|idx| words.get(idx).copied().flatten())
        .ok_or(CoocError::UnknownId(id))
}

/// Binary records back to `word1\tword2\tvalue` text. Every id must resolve.
pub fn records_to_text<W: Write>(vocab: &Vocab, records: &[CoocRecord], writer: &mut W, dest: &Path) -> Result<u64> {
    let words = vocab.words_by_id();
    for record in records {
        let target = lookup(&words, record.target)?;
        let context = lookup(&words, record.context)?;
        writeln!(writer, "{}\t{}\t{:.8}", target, context, record.value).map_err(|e| CoocError::io(dest, e))?;
    }
    Ok(records.len() as u64)
}

pub fn bin_to_txt(vocab: &Vocab, bin_path: &Path, out_path: &Path) -> Result<u64> {
    let records = read_bin(bin_path)?;
    let written = write_atomic(out_path, |writer| records_to_text(vocab, &records, writer, out_path))?;
    info!("finish converting bin to text: {} records", written);
    Ok(written)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordReader;

    fn vocab() -> Vocab {
        Vocab::from_reader("the 10\ncat 7\ndog 5\n".as_bytes(), Path::new("v")).unwrap()
    }

    #[test]
    fn text_to_records_skips_unknown_words() {
        let text = "the\tcat\t1.5\ncat\tzebra\t2.0\nbad\ncat\tdog\t0.25\n";
        let mut out = Vec::new();
        let stats = txt_to_bin_from_reader(&vocab(), text.as_bytes(), Path::new("t"), &mut out, Path::new("o")).unwrap();
        assert_eq!(stats, ConvertStats { written: 2, out_of_vocab: 1, malformed: 1 });
        let records: Vec<CoocRecord> = RecordReader::new(out.as_slice()).collect::<std::io::Result<_>>().unwrap();
        assert_eq!(records, vec![CoocRecord::new(1, 2, 1.5), CoocRecord::new(2, 3, 0.25)]);
    }

    #[test]
    fn records_to_text_resolves_ids() {
        let mut out = Vec::new();
        records_to_text(&vocab(), &[CoocRecord::new(3, 4, 0.5)], &mut out, Path::new("o")).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "dog\t[UNK]\t0.50000000\n");
    }

    #[test]
    fn unknown_ids_are_fatal() {
        let mut out = Vec::new();
        for id in [0, 5, -1].iter() {
            let err = records_to_text(&vocab(), &[CoocRecord::new(1, *id, 0.5)], &mut out, Path::new("o")).unwrap_err();
            assert!(matches!(err, CoocError::UnknownId(bad) if bad == *id));
        }
    }
}
