pub mod error;
pub mod index;

pub use error::{Result, StrataError};
pub use index::{
    DecoratedKey, Descriptor, Mode, OnDiskIndexBuilder, TermSize, TokenTreeBuilder, ValueType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
