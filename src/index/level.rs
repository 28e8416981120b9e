//! One level of the block cascade
//!
//! A level appends terms to its in-process block, flushes the block when
//! the next term does not fit, and hands the flushed block's last term
//! back to the caller for promotion into the parent level.

use std::io::{self, Write};

use crate::index::block::{DataTerm, IndexTerm, MutableDataBlock, PointerTerm, TermBlock};
use crate::index::output::IndexOutput;
use crate::index::token_tree::TokenTreeBuilder;
use crate::index::types::{Mode, TermSize, SUPER_BLOCK_SIZE};

/// Writer for a single level of the index tree
pub(crate) struct MutableLevel<B: TermBlock> {
    /// File position of every flushed block, in write order.
    block_offsets: Vec<u64>,
    in_process_block: B,
    /// Most recently accepted term, as a pointer into the current block.
    last_term: Option<PointerTerm>,
}

impl<B: TermBlock> MutableLevel<B> {
    pub fn new(block: B) -> Self {
        Self {
            block_offsets: Vec::new(),
            in_process_block: block,
            last_term: None,
        }
    }

    /// Append a term. If the in-process block had to be flushed first, the
    /// previous last term is returned for promotion into the parent level.
    pub fn add<W: Write>(
        &mut self,
        term: B::Term,
        out: &mut IndexOutput<W>,
    ) -> io::Result<Option<PointerTerm>> {
        let mut to_promote = None;

        if !self.in_process_block.has_space_for(&term) {
            self.flush(out)?;
            to_promote = self.last_term.take();
        }

        let term_bytes = term.term().clone();
        self.in_process_block.add(term);

        self.last_term = Some(PointerTerm::new(term_bytes, self.block_offsets.len() as u32));
        Ok(to_promote)
    }

    /// Flush the in-process block, recording its file position.
    pub fn flush<W: Write>(&mut self, out: &mut IndexOutput<W>) -> io::Result<()> {
        self.block_offsets.push(out.position());
        self.in_process_block.flush_and_clear(out)
    }

    pub fn final_flush<W: Write>(&mut self, out: &mut IndexOutput<W>) -> io::Result<()> {
        self.flush(out)
    }

    /// Emit this level's metadata record: block count, then each offset.
    pub fn flush_metadata<W: Write>(&self, out: &mut IndexOutput<W>) -> io::Result<()> {
        write_offset_list(out, &self.block_offsets)
    }

    #[cfg(test)]
    pub fn block_offsets(&self) -> &[u64] {
        &self.block_offsets
    }
}

fn write_offset_list<W: Write>(out: &mut IndexOutput<W>, offsets: &[u64]) -> io::Result<()> {
    out.write_i32(offsets.len() as i32)?;
    for offset in offsets {
        out.write_u64(*offset)?;
    }
    Ok(())
}

/// Data level that also maintains super blocks (SPARSE builds)
///
/// After every `SUPER_BLOCK_SIZE` data blocks a combined token tree over
/// those blocks' tokens is written, block-aligned, and its file position
/// recorded in a separate offset list.
pub(crate) struct DataBuilderLevel {
    level: MutableLevel<MutableDataBlock>,
    super_block_offsets: Vec<u64>,
    /// Data blocks written since the current super block was started.
    data_blocks_cnt: usize,
    super_block_tree: TokenTreeBuilder,
}

impl DataBuilderLevel {
    pub fn new(block: MutableDataBlock) -> Self {
        Self {
            level: MutableLevel::new(block),
            super_block_offsets: Vec::new(),
            data_blocks_cnt: 0,
            super_block_tree: TokenTreeBuilder::new(),
        }
    }

    pub fn add<W: Write>(
        &mut self,
        term: DataTerm,
        out: &mut IndexOutput<W>,
    ) -> io::Result<Option<PointerTerm>> {
        // a term that closes a block belongs to the next super block, so
        // its tokens are merged only after any pending super-block flush
        let keys = term.keys.clone();

        let ptr = self.level.add(term, out)?;
        if ptr.is_some() {
            self.data_blocks_cnt += 1;
            self.flush_super_block(out, false)?;
        }

        self.super_block_tree.add_all(&keys);
        Ok(ptr)
    }

    fn flush_super_block<W: Write>(
        &mut self,
        out: &mut IndexOutput<W>,
        force: bool,
    ) -> io::Result<()> {
        if self.data_blocks_cnt == SUPER_BLOCK_SIZE || (force && !self.super_block_tree.is_empty())
        {
            self.super_block_offsets.push(out.position());
            self.super_block_tree.write(out)?;
            out.align_to_block()?;

            self.data_blocks_cnt = 0;
            self.super_block_tree = TokenTreeBuilder::new();
        }
        Ok(())
    }

    pub fn final_flush<W: Write>(&mut self, out: &mut IndexOutput<W>) -> io::Result<()> {
        self.level.flush(out)?;
        self.flush_super_block(out, true)
    }

    pub fn flush_metadata<W: Write>(&self, out: &mut IndexOutput<W>) -> io::Result<()> {
        self.level.flush_metadata(out)?;
        write_offset_list(out, &self.super_block_offsets)
    }
}

/// The level-0 writer: plain for ORIGINAL/SUFFIX, super-block-capable for
/// SPARSE.
pub(crate) enum DataLevel {
    Flat(MutableLevel<MutableDataBlock>),
    Sparse(DataBuilderLevel),
}

impl DataLevel {
    pub fn new(mode: Mode, term_size: TermSize) -> Self {
        let block = MutableDataBlock::new(mode, term_size);
        match mode {
            Mode::Sparse => DataLevel::Sparse(DataBuilderLevel::new(block)),
            _ => DataLevel::Flat(MutableLevel::new(block)),
        }
    }

    pub fn add<W: Write>(
        &mut self,
        term: DataTerm,
        out: &mut IndexOutput<W>,
    ) -> io::Result<Option<PointerTerm>> {
        match self {
            DataLevel::Flat(level) => level.add(term, out),
            DataLevel::Sparse(level) => level.add(term, out),
        }
    }

    pub fn final_flush<W: Write>(&mut self, out: &mut IndexOutput<W>) -> io::Result<()> {
        match self {
            DataLevel::Flat(level) => level.final_flush(out),
            DataLevel::Sparse(level) => level.final_flush(out),
        }
    }

    pub fn flush_metadata<W: Write>(&self, out: &mut IndexOutput<W>) -> io::Result<()> {
        match self {
            DataLevel::Flat(level) => level.flush_metadata(out),
            DataLevel::Sparse(level) => level.flush_metadata(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::block::MutableBlock;
    use crate::index::types::BLOCK_SIZE;
    use bytes::Bytes;

    fn long_term(v: i64) -> Bytes {
        Bytes::copy_from_slice(&v.to_be_bytes())
    }

    #[test]
    fn test_no_promotion_within_first_block() {
        let mut level = MutableLevel::new(MutableBlock::new(TermSize::Long));
        let mut out = IndexOutput::new(Vec::new());

        for i in 0..10 {
            let promoted = level.add(PointerTerm::new(long_term(i), i as u32), &mut out).unwrap();
            assert!(promoted.is_none());
        }
        assert!(level.block_offsets().is_empty());
    }

    #[test]
    fn test_promotion_carries_last_term_of_flushed_block() {
        let mut level = MutableLevel::new(MutableBlock::new(TermSize::Long));
        let mut out = IndexOutput::new(Vec::new());

        // 14 bytes per pointer term
        let per_block = (BLOCK_SIZE as i64 - 4) / 14;

        let mut promoted = None;
        let mut i = 0;
        while promoted.is_none() {
            promoted = level.add(PointerTerm::new(long_term(i), 0), &mut out).unwrap();
            i += 1;
        }

        let ptr = promoted.unwrap();
        assert_eq!(ptr.term.as_ref(), (per_block - 1).to_be_bytes());
        assert_eq!(ptr.block_index, 0);
        assert_eq!(level.block_offsets(), &[0]);
    }

    #[test]
    fn test_block_offsets_are_aligned() {
        let mut level = MutableLevel::new(MutableBlock::new(TermSize::Long));
        let mut out = IndexOutput::new(Vec::new());

        for i in 0..1000 {
            level.add(PointerTerm::new(long_term(i), 0), &mut out).unwrap();
        }
        level.final_flush(&mut out).unwrap();

        assert!(!level.block_offsets().is_empty());
        for offset in level.block_offsets() {
            assert_eq!(offset % BLOCK_SIZE as u64, 0);
        }
    }

    #[test]
    fn test_flush_metadata_layout() {
        let mut level = MutableLevel::new(MutableBlock::new(TermSize::Long));
        let mut out = IndexOutput::new(Vec::new());

        level.add(PointerTerm::new(long_term(1), 0), &mut out).unwrap();
        level.final_flush(&mut out).unwrap();

        let meta_start = out.position() as usize;
        level.flush_metadata(&mut out).unwrap();
        let bytes = out.into_inner();

        let meta = &bytes[meta_start..];
        assert_eq!(i32::from_be_bytes(meta[0..4].try_into().unwrap()), 1);
        assert_eq!(u64::from_be_bytes(meta[4..12].try_into().unwrap()), 0);
    }
}
