//! Per-term postings container
//!
//! Maps partition-key tokens to the file positions of the keys that
//! produced them. Iteration is in ascending token order, which is the
//! order the on-disk body is written in.
//!
//! Body format (all fields big endian):
//! - u32 entry count
//! - per entry: i64 token, u32 position count, u64 positions

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use crate::index::output::IndexOutput;
use crate::index::types::{KeyPosition, Token};

/// Builder for one term's token tree
#[derive(Clone, Debug, Default)]
pub struct TokenTreeBuilder {
    tokens: BTreeMap<Token, BTreeSet<KeyPosition>>,
}

impl TokenTreeBuilder {
    pub fn new() -> Self {
        Self {
            tokens: BTreeMap::new(),
        }
    }

    /// Record one key position under a token.
    pub fn add(&mut self, token: Token, position: KeyPosition) {
        self.tokens.entry(token).or_default().insert(position);
    }

    /// Merge in every entry of another tree.
    pub fn add_all(&mut self, other: &TokenTreeBuilder) {
        for (token, positions) in &other.tokens {
            let entry = self.tokens.entry(*token).or_default();
            entry.extend(positions.iter().copied());
        }
    }

    /// The token to positions mapping, ascending by token.
    pub fn tokens(&self) -> &BTreeMap<Token, BTreeSet<KeyPosition>> {
        &self.tokens
    }

    /// Number of distinct tokens.
    pub fn token_count(&self) -> u64 {
        self.tokens.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate entries in ascending token order.
    pub fn iter(&self) -> impl Iterator<Item = (&Token, &BTreeSet<KeyPosition>)> {
        self.tokens.iter()
    }

    /// Size in bytes of the finalized body.
    pub fn serialized_size(&self) -> usize {
        4 + self
            .tokens
            .values()
            .map(|positions| 8 + 4 + 8 * positions.len())
            .sum::<usize>()
    }

    /// Write the finalized body.
    pub fn write<W: Write>(&self, out: &mut IndexOutput<W>) -> io::Result<()> {
        out.write_u32(self.tokens.len() as u32)?;
        for (token, positions) in &self.tokens {
            out.write_i64(*token)?;
            out.write_u32(positions.len() as u32)?;
            for position in positions {
                out.write_u64(*position)?;
            }
        }
        Ok(())
    }

    /// Read one body back, returning the tree and the bytes consumed.
    pub fn decode(input: &[u8]) -> io::Result<(TokenTreeBuilder, usize)> {
        let mut pos = 0;
        let count = read_u32(input, &mut pos)?;

        let mut tree = TokenTreeBuilder::new();
        for _ in 0..count {
            let token = read_i64(input, &mut pos)?;
            let positions = read_u32(input, &mut pos)?;
            for _ in 0..positions {
                let position = read_u64(input, &mut pos)?;
                tree.add(token, position);
            }
        }

        Ok((tree, pos))
    }
}

fn read_bytes<'a>(input: &'a [u8], pos: &mut usize, len: usize) -> io::Result<&'a [u8]> {
    if *pos + len > input.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Unexpected end of token tree body",
        ));
    }
    let slice = &input[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

fn read_u32(input: &[u8], pos: &mut usize) -> io::Result<u32> {
    let bytes = read_bytes(input, pos, 4)?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_i64(input: &[u8], pos: &mut usize) -> io::Result<i64> {
    let bytes = read_bytes(input, pos, 8)?;
    Ok(i64::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_u64(input: &[u8], pos: &mut usize) -> io::Result<u64> {
    let bytes = read_bytes(input, pos, 8)?;
    Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
}
