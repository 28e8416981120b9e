//! Position-tracking sequential writer for index files
//!
//! All multi-byte fields are big endian. Padding writes zeros; block
//! alignment pads to the next `BLOCK_SIZE` boundary.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::index::types::BLOCK_SIZE;

/// Sequential writer that tracks the absolute file position
pub struct IndexOutput<W: Write> {
    out: W,
    position: u64,
}

impl IndexOutput<BufWriter<File>> {
    /// Create the index file and a buffered writer over it.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::with_capacity(BLOCK_SIZE, file)))
    }

    /// Flush buffers and sync the file to disk.
    pub fn finish(self) -> io::Result<()> {
        let file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

impl<W: Write> IndexOutput<W> {
    pub fn new(out: W) -> Self {
        Self { out, position: 0 }
    }

    /// Absolute position of the next byte written.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.write_all(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    pub fn write_i16(&mut self, v: i16) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    /// Length-prefixed UTF-8 string: u16 byte length, then the bytes.
    pub fn write_utf(&mut self, s: &str) -> io::Result<()> {
        self.write_u16(s.len() as u16)?;
        self.write_all(s.as_bytes())
    }

    /// u16 length prefix followed by the raw bytes.
    pub fn write_with_short_length(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_u16(bytes.len() as u16)?;
        self.write_all(bytes)
    }

    /// Write `n` zero bytes.
    pub fn pad(&mut self, n: usize) -> io::Result<()> {
        const ZEROS: [u8; 256] = [0; 256];
        let mut remaining = n;
        while remaining > 0 {
            let chunk = remaining.min(ZEROS.len());
            self.write_all(&ZEROS[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Zero-pad to the next block boundary, if not already on one.
    pub fn align_to_block(&mut self) -> io::Result<()> {
        let misalignment = (self.position % BLOCK_SIZE as u64) as usize;
        if misalignment != 0 {
            self.pad(BLOCK_SIZE - misalignment)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_tracking() {
        let mut out = IndexOutput::new(Vec::new());
        out.write_i32(7).unwrap();
        assert_eq!(out.position(), 4);
        out.write_u16(1).unwrap();
        out.write_u64(2).unwrap();
        assert_eq!(out.position(), 14);
    }

    #[test]
    fn test_big_endian_fields() {
        let mut out = IndexOutput::new(Vec::new());
        out.write_i32(1).unwrap();
        out.write_u16(0x0203).unwrap();
        let bytes = out.into_inner();
        assert_eq!(bytes, vec![0, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn test_write_utf() {
        let mut out = IndexOutput::new(Vec::new());
        out.write_utf("aa").unwrap();
        let bytes = out.into_inner();
        assert_eq!(bytes, vec![0, 2, b'a', b'a']);
    }

    #[test]
    fn test_align_to_block() {
        let mut out = IndexOutput::new(Vec::new());
        out.write_all(&[1, 2, 3]).unwrap();
        out.align_to_block().unwrap();
        assert_eq!(out.position(), BLOCK_SIZE as u64);

        // already aligned, no padding added
        out.align_to_block().unwrap();
        assert_eq!(out.position(), BLOCK_SIZE as u64);

        let bytes = out.into_inner();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        assert!(bytes[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pad_large() {
        let mut out = IndexOutput::new(Vec::new());
        out.pad(1000).unwrap();
        assert_eq!(out.position(), 1000);
        assert!(out.into_inner().iter().all(|&b| b == 0));
    }
}
