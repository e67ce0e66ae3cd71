//! Block records and whole-chunk block arrays.
//!
//! Byte layout of one block record (little-endian):
//!
//! | Offset | Size | Field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 2    | material ID + 1 (0 = uninitialized)    |
//! | 2      | 2    | object ID (0 = none)                   |
//! | 4      | 4    | property bits                          |
//! | 8      | 2    | temperature (signed)                   |
//! | 10     | 2    | light level                            |
//!
//! All fields are byte arrays, so the record has alignment 1 and a block
//! array can be viewed in place as `&[BlockRecord]` regardless of how the
//! storage engine aligns its values.

use bytemuck::{Pod, Zeroable};
use delve_common::{ChunkId, MaterialId, ObjectId, Point, Region};

use crate::error::{StoreError, StoreResult};
use crate::properties::BlockProperties;

/// Size of one encoded block in bytes.
pub const BLOCK_RECORD_SIZE: usize = 12;

/// Encoded block as stored inside a block array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BlockRecord {
    material: [u8; 2],
    object: [u8; 2],
    properties: [u8; 4],
    temperature: [u8; 2],
    light: [u8; 2],
}

const _: () = assert!(std::mem::size_of::<BlockRecord>() == BLOCK_RECORD_SIZE);

impl BlockRecord {
    /// Returns the material, or `None` for an uninitialized record.
    #[must_use]
    pub fn material(&self) -> Option<MaterialId> {
        match u16::from_le_bytes(self.material) {
            0 => None,
            biased => Some(MaterialId::new(biased - 1)),
        }
    }

    /// Sets the material.
    pub fn set_material(&mut self, material: Option<MaterialId>) {
        let biased = material.map_or(0, |m| m.raw() + 1);
        self.material = biased.to_le_bytes();
    }

    /// Returns the render object, if any.
    #[must_use]
    pub fn object(&self) -> Option<ObjectId> {
        ObjectId::new(u16::from_le_bytes(self.object))
    }

    /// Sets the render object.
    pub fn set_object(&mut self, object: Option<ObjectId>) {
        self.object = object.map_or(0, ObjectId::raw).to_le_bytes();
    }

    /// Returns the property bits, unknown bits included.
    #[must_use]
    pub fn properties(&self) -> BlockProperties {
        BlockProperties::from_bits_retain(u32::from_le_bytes(self.properties))
    }

    /// Replaces the property bits.
    pub fn set_properties(&mut self, properties: BlockProperties) {
        self.properties = properties.bits().to_le_bytes();
    }

    /// Returns the temperature.
    #[must_use]
    pub fn temperature(&self) -> i16 {
        i16::from_le_bytes(self.temperature)
    }

    /// Sets the temperature.
    pub fn set_temperature(&mut self, temperature: i16) {
        self.temperature = temperature.to_le_bytes();
    }

    /// Returns the light level.
    #[must_use]
    pub fn light(&self) -> u16 {
        u16::from_le_bytes(self.light)
    }

    /// Sets the light level.
    pub fn set_light(&mut self, light: u16) {
        self.light = light.to_le_bytes();
    }

    /// Checks whether a material has been assigned.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.material().is_some()
    }
}

/// Decoded view of a single block.
///
/// `chunk` and `position` are not part of the record; they are implied by
/// which block array the record lives in and at which offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Leaf chunk owning this block
    pub chunk: ChunkId,
    /// World position of the block
    pub position: Point,
    /// Material, `None` until initialized
    pub material: Option<MaterialId>,
    /// Render object, `None` if nothing is placed
    pub object: Option<ObjectId>,
    /// Status bits
    pub properties: BlockProperties,
    /// Ephemeral temperature
    pub temperature: i16,
    /// Ephemeral light level
    pub light: u16,
}

impl Block {
    /// Creates an uninitialized block.
    #[must_use]
    pub fn new(chunk: ChunkId, position: Point) -> Self {
        Self::from_record(chunk, position, &BlockRecord::zeroed())
    }

    /// Decodes a block from its record.
    #[must_use]
    pub fn from_record(chunk: ChunkId, position: Point, record: &BlockRecord) -> Self {
        Self {
            chunk,
            position,
            material: record.material(),
            object: record.object(),
            properties: record.properties(),
            temperature: record.temperature(),
            light: record.light(),
        }
    }

    /// Encodes the stored fields.
    #[must_use]
    pub fn record(&self) -> BlockRecord {
        let mut record = BlockRecord::zeroed();
        record.set_material(self.material);
        record.set_object(self.object);
        record.set_properties(self.properties);
        record.set_temperature(self.temperature);
        record.set_light(self.light);
        record
    }

    /// Returns the unit region occupied by this block.
    #[must_use]
    pub fn region(&self) -> Region {
        Region::unit(self.position)
    }
}

/// All block records of one leaf chunk, laid out by [`Region::index_of`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockArray {
    region: Region,
    bytes: Vec<u8>,
}

impl BlockArray {
    /// Creates an all-zero (uninitialized) array covering `region`.
    #[must_use]
    pub fn zeroed(region: Region) -> Self {
        Self {
            region,
            bytes: vec![0; region.volume() * BLOCK_RECORD_SIZE],
        }
    }

    /// Wraps stored bytes, checking their length against `region`.
    pub fn from_bytes(region: Region, bytes: Vec<u8>) -> StoreResult<Self> {
        let expected = region.volume() * BLOCK_RECORD_SIZE;
        if bytes.len() != expected {
            return Err(StoreError::corrupt(
                "block array",
                format!("expected {expected} bytes for {region}, found {}", bytes.len()),
            ));
        }
        Ok(Self { region, bytes })
    }

    /// Returns the covered region.
    #[must_use]
    pub const fn region(&self) -> Region {
        self.region
    }

    /// Returns the number of block records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len() / BLOCK_RECORD_SIZE
    }

    /// Checks whether the array holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Views all records.
    #[must_use]
    pub fn records(&self) -> &[BlockRecord] {
        bytemuck::cast_slice(&self.bytes)
    }

    /// Views all records mutably.
    pub fn records_mut(&mut self) -> &mut [BlockRecord] {
        bytemuck::cast_slice_mut(&mut self.bytes)
    }

    /// Returns the record at `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position` is outside the array's region.
    #[must_use]
    pub fn record(&self, position: Point) -> &BlockRecord {
        let index = self.region.index_of(position);
        &self.records()[index]
    }

    /// Returns the record at `position` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `position` is outside the array's region.
    pub fn record_mut(&mut self, position: Point) -> &mut BlockRecord {
        let index = self.region.index_of(position);
        &mut self.records_mut()[index]
    }

    /// Decodes the block at `position`.
    #[must_use]
    pub fn block(&self, chunk: ChunkId, position: Point) -> Block {
        Block::from_record(chunk, position, self.record(position))
    }

    /// Writes `block` at its position.
    ///
    /// # Panics
    ///
    /// Panics if the block's position is outside the array's region.
    pub fn set_block(&mut self, block: &Block) {
        *self.record_mut(block.position) = block.record();
    }

    /// Decodes every block in array order.
    pub fn blocks(&self, chunk: ChunkId) -> impl Iterator<Item = Block> + '_ {
        self.records()
            .iter()
            .enumerate()
            .map(move |(i, record)| Block::from_record(chunk, self.region.point_at(i), record))
    }
}

/// Decodes the single record at `index` from a raw stored block array.
pub(crate) fn record_at(bytes: &[u8], index: usize) -> BlockRecord {
    let offset = index * BLOCK_RECORD_SIZE;
    bytemuck::pod_read_unaligned(&bytes[offset..offset + BLOCK_RECORD_SIZE])
}
