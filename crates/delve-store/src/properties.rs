//! Block status bit-field.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Status properties of a block, stored as a 32-bit field.
    ///
    /// A fully initialized block has exactly one of `FILLED`, `EMPTY` and
    /// `LIQUID` set. Bits outside the named flags are preserved on round-trip
    /// so derived-state passes can use them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct BlockProperties: u32 {
        /// Solid material occupies the block
        const FILLED = 1 << 0;
        /// Gas or nothing occupies the block
        const EMPTY = 1 << 1;
        /// Liquid occupies the block
        const LIQUID = 1 << 2;
        /// Block has been dug out
        const MINED = 1 << 3;
        /// Block has a natural floor below it
        const NATURAL_FLOOR = 1 << 4;
        /// Block has a natural roof above it
        const NATURAL_ROOF = 1 << 5;
        /// Block has been discovered
        const DISCOVERED = 1 << 6;
        /// Block is currently visible
        const VISIBLE = 1 << 7;
        /// Block is hidden from view
        const HIDDEN = 1 << 8;

        /// The mutually exclusive occupancy bits
        const OCCUPANCY = Self::FILLED.bits() | Self::EMPTY.bits() | Self::LIQUID.bits();
    }
}

impl BlockProperties {
    /// Returns `self` with `flag` set or cleared.
    #[must_use]
    pub fn with(self, flag: Self, value: bool) -> Self {
        let mut out = self;
        out.set(flag, value);
        out
    }

    /// Replaces the occupancy bits with `occupancy`.
    ///
    /// # Panics
    ///
    /// Panics unless `occupancy` is exactly one of `FILLED`, `EMPTY`, `LIQUID`.
    #[must_use]
    pub fn with_occupancy(self, occupancy: Self) -> Self {
        assert!(
            occupancy == Self::FILLED || occupancy == Self::EMPTY || occupancy == Self::LIQUID,
            "occupancy must be a single flag, got {occupancy:?}"
        );
        (self - Self::OCCUPANCY) | occupancy
    }

    /// Checks that exactly one occupancy bit is set.
    #[must_use]
    pub fn has_valid_occupancy(self) -> bool {
        (self & Self::OCCUPANCY).bits().count_ones() == 1
    }
}
