//! # Delve Store
//!
//! Persistent chunk and block storage for Delve worlds.
//!
//! This crate provides:
//! - Fixed-size little-endian records for chunks, blocks and game maps
//! - Whole-chunk block arrays addressed by `calc_index`
//! - [`ChunkStore`], an embedded ACID key-value store with one write
//!   transaction per logical put
//! - Per-chunk leases that serialize block-array read-modify-write
//! - [`BulkWriter`], a fork/join writer for mass population
//!
//! ## Tables
//!
//! | Table    | Key       | Value                              |
//! |----------|-----------|------------------------------------|
//! | `chunks` | `u64` ID  | 352-byte chunk record              |
//! | `blocks` | `u64` ID  | `L³` 12-byte block records         |
//! | `maps`   | `u32` ID  | 48-byte game map record            |
//! | `meta`   | name      | format record                      |
//!
//! Any change to a record size or field offset is a breaking format change
//! and must bump [`delve_common::FormatVersion::STORE`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod block;
pub mod bulk;
pub mod chunk;
pub mod error;
pub mod map;
pub mod properties;
pub mod store;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::block::*;
    pub use crate::bulk::*;
    pub use crate::chunk::*;
    pub use crate::error::*;
    pub use crate::map::*;
    pub use crate::properties::*;
    pub use crate::store::*;
}

pub use prelude::*;
