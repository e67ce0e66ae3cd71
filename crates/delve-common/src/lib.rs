//! # Delve Common
//!
//! Shared value types for the Delve voxel store.
//!
//! This crate provides:
//! - Points, regions and the block-array address translation
//! - Octant splitting and neighbor directions
//! - ID types (ChunkId, MapId, MaterialId, ObjectId) and the ID source capability
//! - Format version and magic bytes for the on-disk layout
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;
