//! Chunk metadata and its fixed-size record.
//!
//! Byte layout of a chunk record (little-endian, 352 bytes):
//!
//! | Offset | Size | Field                                        |
//! |--------|------|----------------------------------------------|
//! | 0      | 8    | chunk ID                                     |
//! | 8      | 8    | parent ID (0 = none)                         |
//! | 16     | 4    | flags (bit 0 root, bit 1 has children)       |
//! | 20     | 4    | map ID                                       |
//! | 24     | 24   | region: start x/y/z, end x/y/z as i32        |
//! | 48     | 48   | neighbors top/bottom/north/south/east/west   |
//! | 96     | 256  | 8 children, each region (24) + ID (8)        |
//!
//! Leaf records carry an all-zero child table so every record has the same
//! size.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use delve_common::{ChunkId, Direction, MapId, Point, Region};

use crate::error::{StoreError, StoreResult};

/// Size of one encoded chunk in bytes.
pub const CHUNK_RECORD_SIZE: usize = 352;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ChunkFlags: u32 {
        const ROOT = 1 << 0;
        const HAS_CHILDREN = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RegionRecord {
    start: [[u8; 4]; 3],
    end: [[u8; 4]; 3],
}

impl RegionRecord {
    fn encode(region: &Region) -> Self {
        let pack = |p: Point| p.xyz().map(i32::to_le_bytes);
        Self {
            start: pack(region.start()),
            end: pack(region.end()),
        }
    }

    fn decode(&self, map: MapId) -> StoreResult<Region> {
        let [sx, sy, sz] = self.start.map(i32::from_le_bytes);
        let [ex, ey, ez] = self.end.map(i32::from_le_bytes);
        if ex < sx || ey < sy || ez < sz {
            return Err(StoreError::corrupt(
                "chunk record",
                format!("inverted region {sx}/{sy}/{sz}..{ex}/{ey}/{ez}"),
            ));
        }
        Ok(Region::new(
            Point::new(map, sx, sy, sz),
            Point::new(map, ex, ey, ez),
        ))
    }
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct ChildRecord {
    region: RegionRecord,
    id: [u8; 8],
}

/// Encoded chunk as stored in the `chunks` table.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ChunkRecord {
    id: [u8; 8],
    parent: [u8; 8],
    flags: [u8; 4],
    map: [u8; 4],
    region: RegionRecord,
    neighbors: [[u8; 8]; 6],
    children: [ChildRecord; 8],
}

const _: () = assert!(std::mem::size_of::<ChunkRecord>() == CHUNK_RECORD_SIZE);

/// One entry of a parent's child table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildLink {
    /// Octant covered by the child
    pub region: Region,
    /// Child chunk ID
    pub id: ChunkId,
}

/// Decoded view of an octree node.
///
/// Parent, child and neighbor fields are lookup keys into the store, never
/// owning references; a `Chunk` is discarded after use and re-fetched by ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk ID
    pub id: ChunkId,
    /// Spatial extent
    pub region: Region,
    /// Parent chunk, `None` for the root
    pub parent: Option<ChunkId>,
    /// Whether this chunk is the root of its tree
    pub root: bool,
    /// Same-level neighbors indexed by [`Direction::index`]
    pub neighbors: [Option<ChunkId>; 6],
    /// Octant children in canonical order, `None` for leaves
    pub children: Option<[ChildLink; 8]>,
}

impl Chunk {
    /// Creates an unlinked chunk with no children.
    #[must_use]
    pub fn new(id: ChunkId, region: Region) -> Self {
        Self {
            id,
            region,
            parent: None,
            root: false,
            neighbors: [None; 6],
            children: None,
        }
    }

    /// Checks whether this chunk is a leaf (no children).
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Returns the neighbor in `direction`.
    #[must_use]
    pub const fn neighbor(&self, direction: Direction) -> Option<ChunkId> {
        self.neighbors[direction.index()]
    }

    /// Sets the neighbor in `direction`.
    pub fn set_neighbor(&mut self, direction: Direction, id: Option<ChunkId>) {
        self.neighbors[direction.index()] = id;
    }

    /// Returns the child covering octant `index`.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<ChildLink> {
        self.children.map(|c| c[index])
    }

    /// Returns the child whose region contains `point`.
    #[must_use]
    pub fn child_containing(&self, point: Point) -> Option<ChildLink> {
        if !self.region.contains(point) {
            return None;
        }
        self.child(self.region.octant_of(point))
    }

    /// Encodes into the fixed-size record.
    #[must_use]
    pub fn encode(&self) -> ChunkRecord {
        let mut flags = ChunkFlags::empty();
        flags.set(ChunkFlags::ROOT, self.root);
        flags.set(ChunkFlags::HAS_CHILDREN, self.children.is_some());

        let mut record = ChunkRecord::zeroed();
        record.id = self.id.raw().to_le_bytes();
        record.parent = ChunkId::to_slot(self.parent).to_le_bytes();
        record.flags = flags.bits().to_le_bytes();
        record.map = self.region.map().raw().to_le_bytes();
        record.region = RegionRecord::encode(&self.region);
        record.neighbors = self.neighbors.map(|n| ChunkId::to_slot(n).to_le_bytes());
        if let Some(children) = &self.children {
            for (slot, child) in record.children.iter_mut().zip(children) {
                slot.region = RegionRecord::encode(&child.region);
                slot.id = child.id.raw().to_le_bytes();
            }
        }
        record
    }

    /// Encodes into bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CHUNK_RECORD_SIZE] {
        let mut bytes = [0u8; CHUNK_RECORD_SIZE];
        bytes.copy_from_slice(bytemuck::bytes_of(&self.encode()));
        bytes
    }

    /// Decodes a record.
    pub fn decode(record: &ChunkRecord) -> StoreResult<Self> {
        let flags = ChunkFlags::from_bits_retain(u32::from_le_bytes(record.flags));
        let map = MapId::new(u32::from_le_bytes(record.map));
        let region = record.region.decode(map)?;

        let children = if flags.contains(ChunkFlags::HAS_CHILDREN) {
            let mut links = Vec::with_capacity(8);
            for slot in &record.children {
                links.push(ChildLink {
                    region: slot.region.decode(map)?,
                    id: ChunkId::from_raw(u64::from_le_bytes(slot.id)),
                });
            }
            let links: [ChildLink; 8] = links
                .try_into()
                .map_err(|_| StoreError::corrupt("chunk record", "child table size"))?;
            Some(links)
        } else {
            None
        };

        Ok(Self {
            id: ChunkId::from_raw(u64::from_le_bytes(record.id)),
            region,
            parent: ChunkId::from_slot(u64::from_le_bytes(record.parent)),
            root: flags.contains(ChunkFlags::ROOT),
            neighbors: record
                .neighbors
                .map(|n| ChunkId::from_slot(u64::from_le_bytes(n))),
            children,
        })
    }

    /// Decodes from stored bytes.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let record: &ChunkRecord = bytemuck::try_from_bytes(bytes).map_err(|_| {
            StoreError::corrupt(
                "chunk record",
                format!("expected {CHUNK_RECORD_SIZE} bytes, found {}", bytes.len()),
            )
        })?;
        Self::decode(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: MapId = MapId::new(2);

    fn interior() -> Chunk {
        let region = Region::cube(MAP, [0, 0, 0], 16);
        let mut chunk = Chunk::new(ChunkId::from_raw(1), region);
        chunk.root = true;
        let octants = region.octants();
        chunk.children = Some(std::array::from_fn(|i| ChildLink {
            region: octants[i],
            id: ChunkId::from_raw(2 + i as u64),
        }));
        chunk
    }

    #[test]
    fn test_record_size() {
        assert_eq!(std::mem::size_of::<ChunkRecord>(), CHUNK_RECORD_SIZE);
        assert_eq!(interior().to_bytes().len(), CHUNK_RECORD_SIZE);
        let leaf = Chunk::new(ChunkId::from_raw(3), Region::cube(MAP, [0, 0, 0], 8));
        assert_eq!(leaf.to_bytes().len(), CHUNK_RECORD_SIZE);
    }

    #[test]
    fn test_interior_round_trip() {
        let chunk = interior();
        let decoded = Chunk::from_bytes(&chunk.to_bytes()).expect("decode");
        assert_eq!(decoded, chunk);
        assert!(!decoded.is_leaf());
        assert_eq!(decoded.child(7).map(|c| c.id.raw()), Some(9));
    }

    #[test]
    fn test_leaf_round_trip_with_neighbors() {
        let mut chunk = Chunk::new(ChunkId::from_raw(u64::MAX), Region::cube(MAP, [-8, 8, 24], 8));
        chunk.parent = Some(ChunkId::from_raw(1));
        chunk.set_neighbor(Direction::East, Some(ChunkId::from_raw(77)));
        chunk.set_neighbor(Direction::Top, Some(ChunkId::from_raw(78)));

        let decoded = Chunk::from_bytes(&chunk.to_bytes()).expect("decode");
        assert_eq!(decoded, chunk);
        assert!(decoded.is_leaf());
        assert_eq!(decoded.neighbor(Direction::East), Some(ChunkId::from_raw(77)));
        assert_eq!(decoded.neighbor(Direction::West), None);
    }

    #[test]
    fn test_degenerate_region_round_trip() {
        let point = Point::new(MAP, 5, 5, 5);
        let chunk = Chunk::new(ChunkId::NULL, Region::new(point, point));
        let decoded = Chunk::from_bytes(&chunk.to_bytes()).expect("decode");
        assert_eq!(decoded, chunk);
        assert_eq!(decoded.region.volume(), 0);
    }

    #[test]
    fn test_fixed_offsets() {
        let mut chunk = interior();
        chunk.parent = Some(ChunkId::from_raw(0x0102));
        chunk.set_neighbor(Direction::West, Some(ChunkId::from_raw(0xAB)));
        let bytes = chunk.to_bytes();
        assert_eq!(&bytes[0..8], &1u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &0x0102u64.to_le_bytes());
        assert_eq!(&bytes[16..20], &3u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &2u32.to_le_bytes());
        assert_eq!(&bytes[36..40], &16i32.to_le_bytes());
        assert_eq!(&bytes[88..96], &0xABu64.to_le_bytes());
        // last child: region end then id
        assert_eq!(&bytes[344..352], &9u64.to_le_bytes());
    }

    #[test]
    fn test_wrong_length_is_corrupt() {
        let err = Chunk::from_bytes(&[0u8; 12]).expect_err("too short");
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_inverted_region_is_corrupt() {
        let mut bytes = interior().to_bytes();
        // end.x below start.x
        bytes[36..40].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(Chunk::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_child_containing() {
        let chunk = interior();
        let child = chunk
            .child_containing(Point::new(MAP, 9, 1, 12))
            .expect("inside");
        assert_eq!(child.region.start().xyz(), [8, 0, 8]);
        assert!(chunk.child_containing(Point::new(MAP, 16, 0, 0)).is_none());
    }
}
