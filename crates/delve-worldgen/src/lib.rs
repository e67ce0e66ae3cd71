//! # Delve Worldgen
//!
//! Builds a world's octree of chunks into a [`delve_store::ChunkStore`].
//!
//! This crate provides:
//! - TOML world configuration with height-band percentages
//! - A material catalog mapping IDs to categories and physical classes
//! - Material sources: synthesized strata or an explicit voxel array
//! - The octree builder, which writes leaves through the bulk layer
//! - The neighbor linkage pass run at the end of every generation
//! - A survey that re-checks the stored tree's shape
//!
//! ## Tree shape
//!
//! The root covers the whole world. Every interior chunk has exactly eight
//! children tiling its octants in z, y, x order. Every leaf is a cube of
//! the configured leaf size and owns one block array.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod material;
pub mod neighbors;
pub mod octree;
pub mod source;
pub mod survey;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::material::*;
    pub use crate::neighbors::*;
    pub use crate::octree::*;
    pub use crate::source::*;
    pub use crate::survey::*;
}

pub use prelude::*;
