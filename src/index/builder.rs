//! The on-disk index builder
//!
//! Accumulates `(term, key, position)` triples during a flush or
//! compaction and, on `finish`, writes a single immutable index file:
//! header block, block-aligned data level, pointer levels, and a footer
//! whose trailing 8 bytes locate the levels metadata.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

use bytes::Bytes;
use tracing::error;

use crate::error::{Result, StrataError};
use crate::index::block::{DataTerm, MutableBlock};
use crate::index::comparator::ValueType;
use crate::index::level::{DataLevel, MutableLevel};
use crate::index::output::IndexOutput;
use crate::index::sa::{SuffixArrayBuilder, TermIterator};
use crate::index::token_tree::TokenTreeBuilder;
use crate::index::types::{DecoratedKey, Descriptor, KeyPosition, Mode, TermSize, MAX_TERM_SIZE};

// per-insert heap estimates for the chosen containers: a fresh term costs
// a HashMap entry (Bytes handle + inline tree struct) plus the tree's
// first node allocation; every insert costs amortized BTreeMap/BTreeSet
// node shares plus the 8-byte token
const NEW_TERM_OVERHEAD: u64 = 48 + 48;
const PER_INSERT_OVERHEAD: u64 = 40 + 40 + 8;

/// Single-use builder for one on-disk index file
///
/// Created with immutable comparators and mode, mutated by repeated
/// [`add`](Self::add), consumed by one call to [`finish`](Self::finish).
pub struct OnDiskIndexBuilder {
    key_comparator: ValueType,
    term_comparator: ValueType,
    term_size: TermSize,
    mode: Mode,

    terms: HashMap<Bytes, TokenTreeBuilder>,

    min_key: Option<Bytes>,
    max_key: Option<Bytes>,
    estimated_bytes: u64,
}

impl OnDiskIndexBuilder {
    pub fn new(key_comparator: ValueType, term_comparator: ValueType, mode: Mode) -> Self {
        Self {
            key_comparator,
            term_comparator,
            term_size: TermSize::size_of(&term_comparator),
            mode,
            terms: HashMap::new(),
            min_key: None,
            max_key: None,
            estimated_bytes: 0,
        }
    }

    /// Record one `(term, key, position)` triple.
    ///
    /// Over-long terms are logged and dropped; `add` never fails.
    pub fn add(&mut self, term: Bytes, key: &DecoratedKey, key_position: KeyPosition) -> &mut Self {
        if term.len() >= MAX_TERM_SIZE {
            error!(
                "Rejecting value (value size {}, maximum size {} bytes).",
                term.len(),
                i16::MAX
            );
            return self;
        }

        let term_len = term.len() as u64;
        let tokens = match self.terms.entry(term) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.estimated_bytes += NEW_TERM_OVERHEAD + term_len;
                entry.insert(TokenTreeBuilder::new())
            }
        };

        tokens.add(key.token, key_position);

        // key range covered by this index, by actual key values
        match &self.min_key {
            Some(min) if self.key_comparator.compare(min, &key.key) != Ordering::Greater => {}
            _ => self.min_key = Some(key.key.clone()),
        }
        match &self.max_key {
            Some(max) if self.key_comparator.compare(max, &key.key) != Ordering::Less => {}
            _ => self.max_key = Some(key.key.clone()),
        }

        self.estimated_bytes += PER_INSERT_OVERHEAD;
        self
    }

    /// Advisory heap estimate consumed by the upstream flush policy.
    pub fn estimated_memory_use(&self) -> u64 {
        self.estimated_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Build the index file.
    ///
    /// Returns `Ok(false)` without touching the filesystem when no terms
    /// were accepted. I/O failures are wrapped with the target path.
    pub fn finish(mut self, path: &Path) -> Result<bool> {
        if self.terms.is_empty() {
            return Ok(false);
        }

        // suffix expansion applies to text terms only; any other
        // comparator keeps its terms in original form even under SUFFIX
        let mut sa = SuffixArrayBuilder::new(self.term_comparator, self.mode);
        for (term, tokens) in self.terms.drain() {
            sa.add(term, tokens);
        }

        self.write_index(path, sa.finish())
            .map_err(|source| StrataError::IndexWrite {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(true)
    }

    fn write_index(&self, path: &Path, terms: TermIterator) -> io::Result<()> {
        let descriptor = Descriptor::current();
        let mut out = IndexOutput::create(path)?;

        out.write_utf(&descriptor.version)?;
        out.write_i16(self.term_size.size())?;

        // min/max term bound the initial scan range of search expressions
        out.write_with_short_length(&terms.min_term().cloned().unwrap_or_default())?;
        out.write_with_short_length(&terms.max_term().cloned().unwrap_or_default())?;

        // min/max key support searches spanning multiple index files
        out.write_with_short_length(&self.min_key.clone().unwrap_or_default())?;
        out.write_with_short_length(&self.max_key.clone().unwrap_or_default())?;

        out.write_utf(self.mode.as_str())?;
        out.align_to_block()?;

        let mut data_level = DataLevel::new(self.mode, self.term_size);
        let mut levels: Vec<MutableLevel<MutableBlock>> = Vec::new();

        for (term, keys) in terms {
            self.add_term(&mut levels, &mut data_level, DataTerm::new(term, keys), &mut out)?;
        }

        data_level.final_flush(&mut out)?;
        for level in levels.iter_mut() {
            level.flush(&mut out)?;
        }

        let level_index_position = out.position();

        out.write_i32(levels.len() as i32)?;
        for level in levels.iter().rev() {
            level.flush_metadata(&mut out)?;
        }
        data_level.flush_metadata(&mut out)?;

        out.write_u64(level_index_position)?;

        out.finish()
    }

    /// Append one data term and run the promotion cascade: each flushed
    /// block hands its last term to the parent level, growing the levels
    /// list when a new height is reached.
    fn add_term<W: Write>(
        &self,
        levels: &mut Vec<MutableLevel<MutableBlock>>,
        data_level: &mut DataLevel,
        term: DataTerm,
        out: &mut IndexOutput<W>,
    ) -> io::Result<()> {
        let mut ptr = match data_level.add(term, out)? {
            Some(ptr) => ptr,
            None => return Ok(()),
        };

        let mut level_idx = 0;
        loop {
            let level = self.index_level(levels, level_idx);
            level_idx += 1;

            match level.add(ptr, out)? {
                Some(promoted) => ptr = promoted,
                None => break,
            }
        }
        Ok(())
    }

    fn index_level<'a>(
        &self,
        levels: &'a mut Vec<MutableLevel<MutableBlock>>,
        idx: usize,
    ) -> &'a mut MutableLevel<MutableBlock> {
        while levels.len() <= idx {
            levels.push(MutableLevel::new(MutableBlock::new(self.term_size)));
        }
        &mut levels[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn long_bytes(v: i64) -> Bytes {
        Bytes::copy_from_slice(&v.to_be_bytes())
    }

    fn key(token: i64) -> DecoratedKey {
        DecoratedKey::new(token, long_bytes(token))
    }

    #[test]
    fn test_empty_build_returns_false() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SI_empty.db");

        let builder =
            OnDiskIndexBuilder::new(ValueType::Int64, ValueType::Int64, Mode::Original);
        assert!(builder.is_empty());
        assert!(!builder.finish(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_oversized_term_is_dropped() {
        let mut builder =
            OnDiskIndexBuilder::new(ValueType::Int64, ValueType::Blob, Mode::Original);

        let oversized = Bytes::from(vec![0u8; MAX_TERM_SIZE]);
        builder.add(oversized, &key(1), 0);
        assert!(builder.is_empty());
        assert_eq!(builder.estimated_memory_use(), 0);

        let largest_accepted = Bytes::from(vec![0u8; MAX_TERM_SIZE - 1]);
        builder.add(largest_accepted, &key(1), 0);
        assert!(!builder.is_empty());
    }

    #[test]
    fn test_terms_are_deduplicated() {
        let mut builder =
            OnDiskIndexBuilder::new(ValueType::Int64, ValueType::Int64, Mode::Original);

        builder.add(long_bytes(1), &key(10), 0);
        builder.add(long_bytes(1), &key(20), 16);
        builder.add(long_bytes(2), &key(30), 32);

        assert_eq!(builder.terms.len(), 2);
        assert_eq!(builder.terms.get(&long_bytes(1)).unwrap().token_count(), 2);
    }

    #[test]
    fn test_memory_estimate_grows() {
        let mut builder =
            OnDiskIndexBuilder::new(ValueType::Int64, ValueType::Int64, Mode::Original);

        builder.add(long_bytes(1), &key(1), 0);
        let after_first = builder.estimated_memory_use();
        assert!(after_first > 0);

        builder.add(long_bytes(1), &key(2), 16);
        let after_second = builder.estimated_memory_use();
        // existing term: only the per-insert delta applies
        assert_eq!(after_second - after_first, PER_INSERT_OVERHEAD);
    }

    #[test]
    fn test_key_range_tracking() {
        let mut builder =
            OnDiskIndexBuilder::new(ValueType::Int64, ValueType::Int64, Mode::Original);

        builder.add(long_bytes(1), &key(5), 0);
        builder.add(long_bytes(2), &key(-3), 16);
        builder.add(long_bytes(3), &key(9), 32);

        assert_eq!(builder.min_key.as_ref().unwrap().as_ref(), (-3i64).to_be_bytes());
        assert_eq!(builder.max_key.as_ref().unwrap().as_ref(), 9i64.to_be_bytes());
    }

    #[test]
    fn test_add_chains() {
        let mut builder =
            OnDiskIndexBuilder::new(ValueType::Int64, ValueType::Int64, Mode::Original);
        builder.add(long_bytes(1), &key(1), 0).add(long_bytes(2), &key(2), 16);
        assert_eq!(builder.terms.len(), 2);
    }

    #[test]
    fn test_finish_writes_block_aligned_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SI_small.db");

        let mut builder =
            OnDiskIndexBuilder::new(ValueType::Int64, ValueType::Int64, Mode::Original);
        builder.add(long_bytes(1), &key(1), 0);
        builder.add(long_bytes(2), &key(2), 16);

        assert!(builder.finish(&path).unwrap());

        let len = std::fs::metadata(&path).unwrap().len();
        // header block + one data block region + footer
        assert!(len > 2 * crate::index::types::BLOCK_SIZE as u64);
    }
}
