//! Comparators over serialized column values
//!
//! The builder never interprets values beyond ordering them; this closed
//! set covers the column types a secondary index can be declared on.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Column value type providing the total order over serialized bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Int32,
    Float,
    Int64,
    Double,
    Timestamp,
    Date,
    TimeUuid,
    Uuid,
    Utf8,
    Ascii,
    Blob,
}

impl ValueType {
    /// Compare two serialized values of this type.
    ///
    /// Fixed-width values that do not match their declared width fall back
    /// to lexicographic order; widths are validated upstream.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            ValueType::Int32 => compare_fixed(a, b, |v: [u8; 4]| i32::from_be_bytes(v)),
            ValueType::Float => match (to_array::<4>(a), to_array::<4>(b)) {
                (Some(x), Some(y)) => f32::from_be_bytes(x).total_cmp(&f32::from_be_bytes(y)),
                _ => a.cmp(b),
            },
            ValueType::Int64 | ValueType::Timestamp | ValueType::Date => {
                compare_fixed(a, b, |v: [u8; 8]| i64::from_be_bytes(v))
            }
            ValueType::Double => match (to_array::<8>(a), to_array::<8>(b)) {
                (Some(x), Some(y)) => f64::from_be_bytes(x).total_cmp(&f64::from_be_bytes(y)),
                _ => a.cmp(b),
            },
            ValueType::TimeUuid
            | ValueType::Uuid
            | ValueType::Utf8
            | ValueType::Ascii
            | ValueType::Blob => a.cmp(b),
        }
    }

    /// Whether values of this type are text; only text terms are eligible
    /// for suffix expansion.
    pub fn is_text(&self) -> bool {
        matches!(self, ValueType::Utf8 | ValueType::Ascii)
    }
}

fn to_array<const N: usize>(v: &[u8]) -> Option<[u8; N]> {
    v.try_into().ok()
}

fn compare_fixed<const N: usize, T: Ord>(a: &[u8], b: &[u8], decode: fn([u8; N]) -> T) -> Ordering {
    match (to_array::<N>(a), to_array::<N>(b)) {
        (Some(x), Some(y)) => decode(x).cmp(&decode(y)),
        _ => a.cmp(b),
    }
}
