//! Game map descriptor.

use bytemuck::{Pod, Zeroable};
use delve_common::{ChunkId, MapId, Region};

use crate::error::{StoreError, StoreResult};

/// Size of one encoded map descriptor in bytes.
pub const MAP_RECORD_SIZE: usize = 48;

/// Root-level descriptor of one generated world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameMap {
    /// Map ID
    pub id: MapId,
    /// Extent along x
    pub width: u32,
    /// Extent along y
    pub height: u32,
    /// Extent along z
    pub depth: u32,
    /// Edge length of leaf chunks
    pub leaf_size: u32,
    /// Root chunk of the octree
    pub root: ChunkId,
    /// Chunks created by generation
    pub chunk_count: u64,
    /// Blocks created by generation
    pub block_count: u64,
}

impl GameMap {
    /// Creates a descriptor with no root and zeroed counters.
    #[must_use]
    pub const fn new(id: MapId, width: u32, height: u32, depth: u32, leaf_size: u32) -> Self {
        Self {
            id,
            width,
            height,
            depth,
            leaf_size,
            root: ChunkId::NULL,
            chunk_count: 0,
            block_count: 0,
        }
    }

    /// Returns the region covered by the whole world.
    #[must_use]
    pub fn region(&self) -> Region {
        Region::with_size(
            self.id,
            [0, 0, 0],
            [self.width as i32, self.height as i32, self.depth as i32],
        )
    }

    /// Returns the number of leaf chunks a complete octree has.
    #[must_use]
    pub fn leaf_count(&self) -> u64 {
        let l = u64::from(self.leaf_size);
        (u64::from(self.width) / l) * (u64::from(self.height) / l) * (u64::from(self.depth) / l)
    }

    /// Returns the number of blocks in the world.
    #[must_use]
    pub fn volume(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.depth)
    }

    pub(crate) fn to_bytes(self) -> [u8; MAP_RECORD_SIZE] {
        let record = MapRecord {
            id: self.id.raw().to_le_bytes(),
            width: self.width.to_le_bytes(),
            height: self.height.to_le_bytes(),
            depth: self.depth.to_le_bytes(),
            leaf_size: self.leaf_size.to_le_bytes(),
            reserved: [0; 4],
            root: self.root.raw().to_le_bytes(),
            chunk_count: self.chunk_count.to_le_bytes(),
            block_count: self.block_count.to_le_bytes(),
        };
        let mut bytes = [0u8; MAP_RECORD_SIZE];
        bytes.copy_from_slice(bytemuck::bytes_of(&record));
        bytes
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let record: MapRecord = bytemuck::try_pod_read_unaligned(bytes).map_err(|_| {
            StoreError::corrupt(
                "map record",
                format!("expected {MAP_RECORD_SIZE} bytes, found {}", bytes.len()),
            )
        })?;
        Ok(Self {
            id: MapId::new(u32::from_le_bytes(record.id)),
            width: u32::from_le_bytes(record.width),
            height: u32::from_le_bytes(record.height),
            depth: u32::from_le_bytes(record.depth),
            leaf_size: u32::from_le_bytes(record.leaf_size),
            root: ChunkId::from_raw(u64::from_le_bytes(record.root)),
            chunk_count: u64::from_le_bytes(record.chunk_count),
            block_count: u64::from_le_bytes(record.block_count),
        })
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct MapRecord {
    id: [u8; 4],
    width: [u8; 4],
    height: [u8; 4],
    depth: [u8; 4],
    leaf_size: [u8; 4],
    reserved: [u8; 4],
    root: [u8; 8],
    chunk_count: [u8; 8],
    block_count: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<MapRecord>() == MAP_RECORD_SIZE);
