use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{CoocError, Result};


/// Write `path` through a temporary file in the same directory, renamed into place only once
/// `write` has succeeded. On failure nothing appears at `path`.
pub fn write_atomic<T, F>(path: &Path, write: F) -> Result<T>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<T>,
{
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(parent).map_err(|e| CoocError::io(path, e))?;
    let value = {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let value = write(&mut writer)?;
        writer.flush().map_err(|e| CoocError::io(path, e))?;
        value
    };
    temp.persist(path).map_err(|e| CoocError::io(path, e.error))?;
    Ok(value)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn failed_writes_leave_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let res: Result<()> = write_atomic(&path, |w| {
            w.write_all(b"partial").map_err(|e| CoocError::io(&path, e))?;
            Err(CoocError::Config("boom".into()))
        });
        assert!(res.is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        write_atomic(&path, |w| w.write_all(b"done").map_err(|e| CoocError::io(&path, e))).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "done");
    }
}
