//! Fixed-size block encoders for the term cascade
//!
//! Every block is a 4 KiB region: a 4-byte term count, a 2-byte offset per
//! term pointing into the payload, the payload, zero padding. Data blocks
//! append posting bodies behind the padded base block.

use std::io::{self, Write};

use bytes::{BufMut, Bytes};

use crate::index::output::IndexOutput;
use crate::index::token_tree::TokenTreeBuilder;
use crate::index::types::{Mode, TermSize, BLOCK_SIZE};

/// Largest token count a SPARSE posting list may have to be inlined.
const MAX_INLINE_TOKENS: u64 = 5;

/// A term held in memory between `add` and the owning block's flush
pub(crate) trait IndexTerm {
    fn term(&self) -> &Bytes;

    /// Bytes this term occupies in the block payload.
    fn serialized_size(&self, term_size: TermSize) -> usize;
}

/// Separator promoted into a pointer-level block
#[derive(Clone, Debug)]
pub(crate) struct PointerTerm {
    pub term: Bytes,
    /// Ordinal of the child block within its level.
    pub block_index: u32,
}

impl PointerTerm {
    pub fn new(term: Bytes, block_index: u32) -> Self {
        Self { term, block_index }
    }
}

impl IndexTerm for PointerTerm {
    fn term(&self) -> &Bytes {
        &self.term
    }

    fn serialized_size(&self, term_size: TermSize) -> usize {
        term_payload_size(&self.term, term_size) + 4
    }
}

/// A term and its postings, bound for the data level
#[derive(Clone, Debug)]
pub(crate) struct DataTerm {
    pub term: Bytes,
    pub keys: TokenTreeBuilder,
}

impl DataTerm {
    pub fn new(term: Bytes, keys: TokenTreeBuilder) -> Self {
        Self { term, keys }
    }
}

impl IndexTerm for DataTerm {
    fn term(&self) -> &Bytes {
        &self.term
    }

    fn serialized_size(&self, term_size: TermSize) -> usize {
        term_payload_size(&self.term, term_size)
    }
}

fn term_payload_size(term: &Bytes, term_size: TermSize) -> usize {
    let prefix = if term_size.is_constant() { 0 } else { 2 };
    prefix + term.len()
}

/// One kind of in-process block; the level writer is generic over this seam.
pub(crate) trait TermBlock {
    type Term: IndexTerm;

    fn has_space_for(&self, term: &Self::Term) -> bool;
    fn add(&mut self, term: Self::Term);
    fn flush_and_clear<W: Write>(&mut self, out: &mut IndexOutput<W>) -> io::Result<()>;
}

/// In-process block of pointer terms
pub(crate) struct MutableBlock {
    buffer: Vec<u8>,
    offsets: Vec<u16>,
    term_size: TermSize,
}

impl MutableBlock {
    pub fn new(term_size: TermSize) -> Self {
        Self {
            buffer: Vec::with_capacity(BLOCK_SIZE),
            offsets: Vec::new(),
            term_size,
        }
    }

    /// Block size if one more term of `serialized` payload bytes is added,
    /// counting its offset-table entry.
    fn size_after(&self, serialized: usize) -> usize {
        4 + 2 * (self.offsets.len() + 1) + self.buffer.len() + serialized
    }

    /// Record the offset of the next term.
    fn begin_term(&mut self) {
        self.offsets.push(self.buffer.len() as u16);
    }

    /// Serialize term bytes; variable-width terms carry a u16 length prefix.
    fn put_term(&mut self, term: &Bytes) {
        if !self.term_size.is_constant() {
            self.buffer.put_u16(term.len() as u16);
        }
        self.buffer.put_slice(term);
    }

    /// Write count, offset table and payload, pad to the block boundary,
    /// and reset for the next block.
    fn flush_base<W: Write>(&mut self, out: &mut IndexOutput<W>) -> io::Result<()> {
        out.write_i32(self.offsets.len() as i32)?;
        for offset in &self.offsets {
            out.write_u16(*offset)?;
        }
        out.write_all(&self.buffer)?;

        out.align_to_block()?;

        self.offsets.clear();
        self.buffer.clear();
        Ok(())
    }
}

impl TermBlock for MutableBlock {
    type Term = PointerTerm;

    fn has_space_for(&self, term: &PointerTerm) -> bool {
        self.size_after(term.serialized_size(self.term_size)) < BLOCK_SIZE
    }

    fn add(&mut self, term: PointerTerm) {
        self.begin_term();
        self.put_term(&term.term);
        self.buffer.put_u32(term.block_index);
    }

    fn flush_and_clear<W: Write>(&mut self, out: &mut IndexOutput<W>) -> io::Result<()> {
        self.flush_base(out)
    }
}

/// In-process data block: terms plus inline or referenced posting bodies
pub(crate) struct MutableDataBlock {
    base: MutableBlock,
    mode: Mode,
    /// Running byte offset into the overflow region behind the block.
    offset: u32,
    sparse_value_terms: u32,
    containers: Vec<TokenTreeBuilder>,
    combined_index: TokenTreeBuilder,
}

impl MutableDataBlock {
    pub fn new(mode: Mode, term_size: TermSize) -> Self {
        Self {
            base: MutableBlock::new(term_size),
            mode,
            offset: 0,
            sparse_value_terms: 0,
            containers: Vec::new(),
            combined_index: TokenTreeBuilder::new(),
        }
    }

    /// Bytes the posting reference occupies in the payload: an inline
    /// count-plus-tokens run, or a 1-byte tag and 4-byte overflow offset.
    fn ptr_length(keys: &TokenTreeBuilder) -> usize {
        if keys.token_count() > MAX_INLINE_TOKENS {
            5
        } else {
            1 + 8 * keys.token_count() as usize
        }
    }

    fn write_inline_term(&mut self, term: &Bytes, keys: &TokenTreeBuilder) {
        self.base.put_term(term);
        self.base.buffer.put_u8(keys.token_count() as u8);
        for (token, _) in keys.iter() {
            self.base.buffer.put_i64(*token);
        }
    }

    fn write_overflow_term(&mut self, term: &Bytes, offset: u32) {
        self.base.put_term(term);
        self.base.buffer.put_u8(0x0);
        self.base.buffer.put_u32(offset);
    }
}

impl TermBlock for MutableDataBlock {
    type Term = DataTerm;

    fn has_space_for(&self, term: &DataTerm) -> bool {
        let serialized = term.serialized_size(self.base.term_size) + Self::ptr_length(&term.keys);
        self.base.size_after(serialized) < BLOCK_SIZE
    }

    fn add(&mut self, term: DataTerm) {
        self.base.begin_term();

        let DataTerm { term, keys } = term;

        if self.mode == Mode::Sparse {
            self.combined_index.add_all(&keys);
        }

        if self.mode == Mode::Sparse && keys.token_count() <= MAX_INLINE_TOKENS {
            self.write_inline_term(&term, &keys);
            self.sparse_value_terms += 1;
        } else {
            self.write_overflow_term(&term, self.offset);
            self.offset += keys.serialized_size() as u32;
            self.containers.push(keys);
        }
    }

    fn flush_and_clear<W: Write>(&mut self, out: &mut IndexOutput<W>) -> io::Result<()> {
        self.base.flush_base(out)?;

        // overflow-region start, or -1 when every term in the block inlined
        out.write_i32(if self.sparse_value_terms == 0 {
            -1
        } else {
            self.offset as i32
        })?;

        for tokens in &self.containers {
            tokens.write(out)?;
        }

        if self.sparse_value_terms > 0 {
            self.combined_index.write(out)?;
        }

        out.align_to_block()?;

        self.containers.clear();
        self.combined_index = TokenTreeBuilder::new();
        self.offset = 0;
        self.sparse_value_terms = 0;
        Ok(())
    }
}
