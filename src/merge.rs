use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::info;

use crate::error::{require_input, CoocError, Result};
use crate::table::CooccurrenceTable;


/// Shard files of a directory, sorted by name. Hidden files, subdirectories and `exclude`
/// are left out.
pub fn shard_paths(dir: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    require_input(dir)?;
    let exclude = exclude.and_then(|path| path.canonicalize().ok());
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| CoocError::io(dir, e))? {
        let entry = entry.map_err(|e| CoocError::io(dir, e))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_file() {
            continue;
        }
        if exclude.is_some() && path.canonicalize().ok() == exclude {
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

/// Stream one shard's records onto `merged`.
fn fold_shard(merged: &mut CooccurrenceTable, path: &Path) -> Result<usize> {
    info!("Merge coo path: {}", path.display());
    let file = File::open(path).map_err(|e| CoocError::io(path, e))?;
    merged.extend_from_reader(BufReader::new(file), path)
}

/// Sum every shard into one table.
///
/// Shards are streamed one at a time in the given order onto a single accumulator, so only the
/// merged table is held in memory and the same inputs always give the same sums. Any
/// unreadable shard fails the whole merge.
pub fn merge_shards(paths: &[PathBuf]) -> Result<CooccurrenceTable> {
    for path in paths {
        require_input(path)?;
    }
    let timer = howlong::ProcessCPUTimer::new();
    let mut merged = CooccurrenceTable::new();
    let mut records = 0;
    for path in paths {
        records += fold_shard(&mut merged, path)?;
    }
    info!("Read {} records from {} shards {}", records, paths.len(), timer.elapsed());
    Ok(merged)
}

/// Merge every shard in `dir` and write the result to `out_path`.
pub fn merge_shard_dir(dir: &Path, out_path: &Path) -> Result<CooccurrenceTable> {
    let paths = shard_paths(dir, Some(out_path))?;
    info!("Merging {} shards: {}", paths.len(), paths.iter().map(|p| p.display()).join(", "));
    let merged = merge_shards(&paths)?;
    info!("final cooccurrence save path: {}", out_path.display());
    info!("final cooccurrence size: {}", merged.len());
    merged.write_text(out_path)?;
    Ok(merged)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str, f64)]) -> CooccurrenceTable {
        let mut table = CooccurrenceTable::new();
        for (t, c, v) in entries {
            table.add_total((Box::from(*t), Box::from(*c)), *v);
        }
        table
    }

    fn close(a: &CooccurrenceTable, b: &CooccurrenceTable) -> bool {
        a.len() == b.len() && a.iter().all(|(t, c, v)| b.get(t, c).map_or(false, |w| (v - w).abs() < 1e-9))
    }

    #[test]
    fn merging_is_associative_and_commutative() {
        let a = table(&[("a", "b", 0.1), ("x", "y", 2.0)]);
        let b = table(&[("a", "b", 0.2), ("b", "a", 1.0)]);
        let c = table(&[("a", "b", 0.3), ("x", "y", 0.5), ("q", "r", 7.0)]);

        let left = CooccurrenceTable::merged(CooccurrenceTable::merged(a.clone(), b.clone()), c.clone());
        let right = CooccurrenceTable::merged(a.clone(), CooccurrenceTable::merged(b.clone(), c.clone()));
        let swapped = CooccurrenceTable::merged(c, CooccurrenceTable::merged(b, a));
        assert!(close(&left, &right));
        assert!(close(&left, &swapped));
        assert!((left.get("a", "b").unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(left.get("b", "a"), Some(1.0));
        assert_eq!(left.len(), 4);
    }

    #[test]
    fn shards_stream_onto_one_table_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.coo");
        let b = dir.path().join("b.coo");
        fs::write(&a, "x\ty\t0.1\nq\tr\t1\n").unwrap();
        fs::write(&b, "x\ty\t0.2\nbroken\nx\ty\t1e-12\n").unwrap();
        let forward = merge_shards(&[a.clone(), b.clone()]).unwrap();
        let backward = merge_shards(&[b.clone(), a.clone()]).unwrap();
        assert!(close(&forward, &backward));
        assert_eq!(forward.len(), 2);
        assert!((forward.get("x", "y").unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(forward.get("q", "r"), Some(1.0));
        assert!(merge_shards(&[a, dir.path().join("missing.coo")]).is_err());
    }

    #[test]
    fn shard_listing_skips_output_and_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.coo"), "a\tb\t1\n").unwrap();
        fs::write(dir.path().join("a.coo"), "a\tb\t1\n").unwrap();
        fs::write(dir.path().join(".partial"), "a\tb\t1\n").unwrap();
        fs::write(dir.path().join("merged.coo"), "a\tb\t100\n").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let out = dir.path().join("merged.coo");
        let paths = shard_paths(dir.path(), Some(out.as_path())).unwrap();
        assert_eq!(paths, vec![dir.path().join("a.coo"), dir.path().join("b.coo")]);
    }
}
