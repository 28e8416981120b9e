//! Ordering transform between the accumulator and the block writer
//!
//! Accumulated terms arrive unordered; this stage imposes the sole total
//! order consumed downstream. In `SUFFIX` mode over a text comparator each
//! term is expanded into its suffixes, with postings of terms sharing a
//! suffix merged into one tree.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::index::comparator::ValueType;
use crate::index::token_tree::TokenTreeBuilder;
use crate::index::types::Mode;

/// Collects `(term, postings)` pairs and orders them for the writer
pub struct SuffixArrayBuilder {
    comparator: ValueType,
    mode: Mode,
    terms: Vec<(Bytes, TokenTreeBuilder)>,
}

impl SuffixArrayBuilder {
    pub fn new(comparator: ValueType, mode: Mode) -> Self {
        Self {
            comparator,
            mode,
            terms: Vec::new(),
        }
    }

    pub fn add(&mut self, term: Bytes, tokens: TokenTreeBuilder) {
        self.terms.push((term, tokens));
    }

    /// Order the collected terms and hand them off as an iterator.
    pub fn finish(self) -> TermIterator {
        let comparator = self.comparator;
        let entries = if self.mode == Mode::Suffix && comparator.is_text() {
            // text comparators order bytewise, so a BTreeMap keyed on the
            // raw bytes yields comparator order for free
            let mut expanded: BTreeMap<Bytes, TokenTreeBuilder> = BTreeMap::new();
            for (term, tokens) in &self.terms {
                for suffix in suffixes(term) {
                    expanded.entry(suffix).or_default().add_all(tokens);
                }
            }
            expanded.into_iter().collect()
        } else {
            let mut sorted = self.terms;
            sorted.sort_by(|a, b| comparator.compare(&a.0, &b.0));
            sorted
        };

        TermIterator::new(entries)
    }
}

/// All suffixes of a term, longest first
///
/// Valid UTF-8 splits at character boundaries; anything else splits at
/// byte boundaries.
fn suffixes(term: &Bytes) -> Vec<Bytes> {
    match std::str::from_utf8(term) {
        Ok(s) => s.char_indices().map(|(i, _)| term.slice(i..)).collect(),
        Err(_) => (0..term.len()).map(|i| term.slice(i..)).collect(),
    }
}

/// Ordered stream of `(term, postings)` pairs feeding the data level
pub struct TermIterator {
    entries: std::vec::IntoIter<(Bytes, TokenTreeBuilder)>,
    min_term: Option<Bytes>,
    max_term: Option<Bytes>,
}

impl TermIterator {
    fn new(entries: Vec<(Bytes, TokenTreeBuilder)>) -> Self {
        let min_term = entries.first().map(|(term, _)| term.clone());
        let max_term = entries.last().map(|(term, _)| term.clone());
        Self {
            entries: entries.into_iter(),
            min_term,
            max_term,
        }
    }

    /// Smallest emitted term.
    pub fn min_term(&self) -> Option<&Bytes> {
        self.min_term.as_ref()
    }

    /// Largest emitted term.
    pub fn max_term(&self) -> Option<&Bytes> {
        self.max_term.as_ref()
    }
}

impl Iterator for TermIterator {
    type Item = (Bytes, TokenTreeBuilder);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}
