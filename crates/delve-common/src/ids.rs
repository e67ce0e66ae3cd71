//! Identifier types for chunks, maps, materials and render objects.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier of a chunk within a store.
///
/// The raw value 0 is reserved as "no chunk" so that parent and neighbor
/// slots in fixed-size records can encode absence without a separate flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Null/absent chunk ID.
    pub const NULL: Self = Self(0);

    /// Creates a chunk ID from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Checks if this is a valid (non-null) chunk ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Decodes a raw slot value, mapping 0 to `None`.
    #[must_use]
    pub const fn from_slot(value: u64) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Encodes an optional ID into a raw slot value (0 = absent).
    #[must_use]
    pub fn to_slot(id: Option<Self>) -> u64 {
        id.map_or(0, Self::raw)
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a game map (one world per map).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MapId(u32);

impl MapId {
    /// Creates a map ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference into the external material catalog.
///
/// Stored biased by one so that an all-zero block record reads back as
/// "uninitialized", which limits the usable range to `0..=MaterialId::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialId(u16);

impl MaterialId {
    /// Largest material ID that can be stored.
    pub const MAX: Self = Self(u16::MAX - 1);

    /// Creates a material ID.
    ///
    /// # Panics
    ///
    /// Panics if `id` is `u16::MAX`, which has no stored representation.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        assert!(id != u16::MAX, "material id out of range");
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// Render object attached to a block. Raw value 0 means "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(u16);

impl ObjectId {
    /// Creates an object ID, returning `None` for the reserved value 0.
    #[must_use]
    pub const fn new(id: u16) -> Option<Self> {
        if id == 0 {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// Capability producing unique chunk identifiers.
///
/// Implementations must never hand out the same value twice within one
/// store's lifetime and must never produce 0.
pub trait IdSource: Send + Sync {
    /// Returns the next unused identifier.
    fn next_id(&self) -> ChunkId;

    /// Reserves `count` consecutive identifiers in one call.
    fn reserve(&self, count: u64) -> Range<u64>;
}

/// Monotonic in-process ID source backed by an atomic counter.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a source whose first identifier is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a source whose first identifier is `first`.
    ///
    /// # Panics
    ///
    /// Panics if `first` is 0.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        assert!(first != 0, "chunk id 0 is reserved");
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> ChunkId {
        ChunkId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn reserve(&self, count: u64) -> Range<u64> {
        let start = self.next.fetch_add(count, Ordering::Relaxed);
        start..start + count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_slots() {
        assert_eq!(ChunkId::from_slot(0), None);
        assert_eq!(ChunkId::from_slot(7), Some(ChunkId::from_raw(7)));
        assert_eq!(ChunkId::to_slot(None), 0);
        assert_eq!(ChunkId::to_slot(Some(ChunkId::from_raw(9))), 9);
        assert!(!ChunkId::NULL.is_valid());
    }

    #[test]
    fn test_sequential_ids_are_unique() {
        let ids = SequentialIds::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);

        let batch = ids.reserve(10);
        assert_eq!(batch, 3..13);
        assert_eq!(ids.next_id().raw(), 13);
    }

    #[test]
    fn test_object_id_zero_is_none() {
        assert!(ObjectId::new(0).is_none());
        assert_eq!(ObjectId::new(4).map(ObjectId::raw), Some(4));
    }

    #[test]
    #[should_panic(expected = "material id out of range")]
    fn test_material_id_rejects_sentinel() {
        let _ = MaterialId::new(u16::MAX);
    }
}
