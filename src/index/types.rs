//! Core types and constants for the on-disk index format

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StrataError;
use crate::index::comparator::ValueType;

/// Fixed size of every on-disk block; all index structures align to it.
pub const BLOCK_SIZE: usize = 4096;

/// Terms at or above this size are rejected by the accumulator.
pub const MAX_TERM_SIZE: usize = 1024;

/// Number of consecutive data blocks covered by one super block.
pub const SUPER_BLOCK_SIZE: usize = 64;

/// 64-bit signed hash of the partition key; the ordering axis of postings.
pub type Token = i64;

/// Byte offset of a key within its storage table.
pub type KeyPosition = u64;

/// Build mode of the index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Text terms are expanded into their suffixes
    Suffix,
    /// Terms are indexed as given
    Original,
    /// Small posting lists are inlined and combined indexes are emitted
    Sparse,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Suffix => "SUFFIX",
            Mode::Original => "ORIGINAL",
            Mode::Sparse => "SPARSE",
        }
    }
}

impl FromStr for Mode {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SUFFIX" => Ok(Mode::Suffix),
            "ORIGINAL" => Ok(Mode::Original),
            "SPARSE" => Ok(Mode::Sparse),
            _ => Err(StrataError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized width discipline of indexed terms
///
/// Fixed-width terms omit the 2-byte length prefix at every serialization
/// site; the discipline is persisted in the file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TermSize {
    Int,
    Long,
    Uuid,
    Variable,
}

impl TermSize {
    /// On-disk code and fixed width in bytes; -1 for variable-width terms.
    pub fn size(&self) -> i16 {
        match self {
            TermSize::Int => 4,
            TermSize::Long => 8,
            TermSize::Uuid => 16,
            TermSize::Variable => -1,
        }
    }

    pub fn is_constant(&self) -> bool {
        *self != TermSize::Variable
    }

    /// Decode a persisted size code. Panics on an unrecognized code; a
    /// correct header can never contain one.
    pub fn of(size: i16) -> TermSize {
        match size {
            -1 => TermSize::Variable,
            4 => TermSize::Int,
            8 => TermSize::Long,
            16 => TermSize::Uuid,
            _ => panic!("unknown term size code: {}", size),
        }
    }

    /// Classify a term comparator into its size discipline.
    pub fn size_of(comparator: &ValueType) -> TermSize {
        match comparator {
            ValueType::Int32 | ValueType::Float => TermSize::Int,
            ValueType::Int64 | ValueType::Double | ValueType::Timestamp | ValueType::Date => {
                TermSize::Long
            }
            ValueType::TimeUuid | ValueType::Uuid => TermSize::Uuid,
            _ => TermSize::Variable,
        }
    }
}

/// On-disk format descriptor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub version: String,
}

impl Descriptor {
    pub const CURRENT_VERSION: &'static str = "aa";

    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn current() -> Self {
        Self::new(Self::CURRENT_VERSION)
    }

    /// File name under which the storage-table registry tracks an index
    /// component.
    pub fn component_filename(index_name: &str) -> String {
        format!("SI_{}.db", index_name)
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::current()
    }
}

/// A partition key paired with its token
///
/// Tokenization happens upstream; the builder only consumes the pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoratedKey {
    pub token: Token,
    pub key: Bytes,
}

impl DecoratedKey {
    pub fn new(token: Token, key: Bytes) -> Self {
        Self { token, key }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        for mode in [Mode::Suffix, Mode::Original, Mode::Sparse] {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
        assert_eq!("sparse".parse::<Mode>().unwrap(), Mode::Sparse);
        assert!("FUZZY".parse::<Mode>().is_err());
    }

    #[test]
    fn test_term_size_codes() {
        assert_eq!(TermSize::Int.size(), 4);
        assert_eq!(TermSize::Long.size(), 8);
        assert_eq!(TermSize::Uuid.size(), 16);
        assert_eq!(TermSize::Variable.size(), -1);

        for ts in [TermSize::Int, TermSize::Long, TermSize::Uuid, TermSize::Variable] {
            assert_eq!(TermSize::of(ts.size()), ts);
        }
    }

    #[test]
    #[should_panic(expected = "unknown term size code")]
    fn test_term_size_unknown_code() {
        TermSize::of(7);
    }

    #[test]
    fn test_term_size_classification() {
        assert_eq!(TermSize::size_of(&ValueType::Int32), TermSize::Int);
        assert_eq!(TermSize::size_of(&ValueType::Float), TermSize::Int);
        assert_eq!(TermSize::size_of(&ValueType::Int64), TermSize::Long);
        assert_eq!(TermSize::size_of(&ValueType::Double), TermSize::Long);
        assert_eq!(TermSize::size_of(&ValueType::Timestamp), TermSize::Long);
        assert_eq!(TermSize::size_of(&ValueType::Date), TermSize::Long);
        assert_eq!(TermSize::size_of(&ValueType::Uuid), TermSize::Uuid);
        assert_eq!(TermSize::size_of(&ValueType::TimeUuid), TermSize::Uuid);
        assert_eq!(TermSize::size_of(&ValueType::Utf8), TermSize::Variable);
        assert_eq!(TermSize::size_of(&ValueType::Ascii), TermSize::Variable);
        assert_eq!(TermSize::size_of(&ValueType::Blob), TermSize::Variable);
    }

    #[test]
    fn test_component_filename() {
        assert_eq!(Descriptor::component_filename("age"), "SI_age.db");
    }
}
