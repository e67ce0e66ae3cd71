//! Error types for world generation.

use std::path::PathBuf;

use delve_common::{ChunkId, MaterialId};
use delve_store::StoreError;
use thiserror::Error;

use crate::material::Category;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A world dimension or the leaf size is not a power of two
    #[error("{field} must be a non-zero power of two, got {value}")]
    NotPowerOfTwo {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: u32,
    },

    /// The leaf size does not divide a world dimension
    #[error("leaf size {leaf_size} does not divide {field} {value}")]
    LeafSizeMismatch {
        /// Offending dimension
        field: &'static str,
        /// Dimension value
        value: u32,
        /// Configured leaf size
        leaf_size: u32,
    },

    /// A dimension exceeds the addressable range
    #[error("{field} {value} exceeds the largest supported edge")]
    TooLarge {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: u32,
    },

    /// Octant splits need equal extents on every axis
    #[error("world must be a cube, got {0:?}")]
    NotCubic([u32; 3]),

    /// Strata percentages add up to more than the whole depth
    #[error("strata percentages sum to {0}%, at most 100% allowed")]
    StrataOverflow(u32),

    /// Two catalog entries share an ID
    #[error("duplicate material id {0:?}")]
    DuplicateMaterial(MaterialId),

    /// File could not be read or written
    #[error("config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File contents are not valid TOML for this type
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// Value could not be serialized
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// World generation errors.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Store failure; the run is aborted
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The catalog has no material for this category
    #[error("no material in category {0:?}")]
    UnknownCategory(Category),

    /// A stored octree breaks the shape rules
    #[error("invalid octree at chunk {chunk}: {reason}")]
    InvalidTree {
        /// Offending chunk
        chunk: ChunkId,
        /// What is wrong
        reason: String,
    },

    /// A voxel refers to a material the catalog does not know
    #[error("unknown material id {0:?}")]
    UnknownMaterial(MaterialId),

    /// A voxel layer's rows differ in shape from the first layer
    #[error("voxel layer {0} differs in shape from layer 0")]
    RaggedLayer(usize),

    /// The material source does not cover the world
    #[error("material source is {source_size:?}, world is {world_size:?}")]
    SourceMismatch {
        /// Source extent (x, y, z)
        source_size: [u32; 3],
        /// World extent (x, y, z)
        world_size: [u32; 3],
    },
}

/// Result type for generation.
pub type GenerationResult<T> = Result<T, GenerationError>;
