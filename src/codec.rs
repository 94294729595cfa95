//! Fixed-width binary co-occurrence records.
//!
//! Layout of one record, 16 bytes, no padding, all fields little-endian:
//!
//! | offset | width | field                       |
//! |--------|-------|-----------------------------|
//! | 0      | 4     | target word id (`i32`)      |
//! | 4      | 4     | context word id (`i32`)     |
//! | 8      | 8     | accumulated weight (`f64`)  |
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;

use memmap::Mmap;

use crate::error::{require_input, CoocError, Result};
use crate::output::write_atomic;


pub const RECORD_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoocRecord {
    pub target: i32,
    pub context: i32,
    pub value: f64,
}

impl CoocRecord {
    pub fn new(target: i32, context: i32, value: f64) -> CoocRecord {
        CoocRecord { target, context, value }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.target.to_le_bytes());
        buf[4..8].copy_from_slice(&self.context.to_le_bytes());
        buf[8..16].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> CoocRecord {
        let mut target = [0u8; 4];
        let mut context = [0u8; 4];
        let mut value = [0u8; 8];
        target.copy_from_slice(&buf[0..4]);
        context.copy_from_slice(&buf[4..8]);
        value.copy_from_slice(&buf[8..16]);
        CoocRecord {
            target: i32::from_le_bytes(target),
            context: i32::from_le_bytes(context),
            value: f64::from_le_bytes(value),
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}

/// Streams records back to back until end of stream.
///
/// A stream that ends part way through a record yields one `UnexpectedEof` error and then
/// stops.
pub struct RecordReader<R: Read> {
    reader: R,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> RecordReader<R> {
        RecordReader { reader, done: false }
    }

    fn read_record(&mut self) -> io::Result<Option<CoocRecord>> {
        let mut buf = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        match filled {
            0 => Ok(None),
            RECORD_SIZE => Ok(Some(CoocRecord::from_bytes(&buf))),
            partial => Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("stream ended {} bytes into a {} byte record", partial, RECORD_SIZE),
            )),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = io::Result<CoocRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

pub fn write_records<'a, W, I>(writer: &mut W, records: I) -> io::Result<u64>
where
    W: Write,
    I: IntoIterator<Item = &'a CoocRecord>,
{
    let mut written = 0;
    for record in records {
        record.write_to(writer)?;
        written += 1;
    }
    Ok(written)
}

pub fn write_bin(path: &Path, records: &[CoocRecord]) -> Result<u64> {
    write_atomic(path, |writer| write_records(writer, records).map_err(|e| CoocError::io(path, e)))
}

pub(crate) fn mmap_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path).map_err(|e| CoocError::io(path, e))?;
    let len = file.metadata().map_err(|e| CoocError::io(path, e))?.len();
    if len == 0 {
        // Zero length maps are rejected on some platforms
        return Ok(None);
    }
    // Safety: the file is only read, and callers do not hold the map across writes to it
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| CoocError::io(path, e))?;
    Ok(Some(mmap))
}

/// Decode a whole binary file. The length is checked before anything is decoded.
pub fn read_bin(path: &Path) -> Result<Vec<CoocRecord>> {
    require_input(path)?;
    let mmap = match mmap_file(path)? {
        Some(mmap) => mmap,
        None => return Ok(Vec::new()),
    };
    decode_all(&mmap).ok_or_else(|| CoocError::TruncatedBinary {
        path: path.to_owned(),
        len: mmap.len() as u64,
    })
}

/// `None` when `bytes` is not a whole number of records.
pub fn decode_all(bytes: &[u8]) -> Option<Vec<CoocRecord>> {
    if bytes.len() % RECORD_SIZE != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(RECORD_SIZE)
            .map(|chunk| {
                let mut buf = [0u8; RECORD_SIZE];
                buf.copy_from_slice(chunk);
                CoocRecord::from_bytes(&buf)
            })
            .collect(),
    )
}
