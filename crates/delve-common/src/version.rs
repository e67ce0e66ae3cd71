//! Version types for on-disk format compatibility.

use serde::{Deserialize, Serialize};

/// On-disk format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatVersion {
    /// Major version (breaking layout changes)
    pub major: u16,
    /// Minor version (backwards-compatible additions)
    pub minor: u16,
}

impl FormatVersion {
    /// Creates a new format version.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Current chunk/block store layout.
    pub const STORE: Self = Self::new(1, 0);

    /// Checks if this version can read data written by `data_version`.
    #[must_use]
    pub const fn can_read(&self, data_version: &Self) -> bool {
        self.major == data_version.major && self.minor >= data_version.minor
    }

    /// Packs the version into a single integer (major in the high half).
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        ((self.major as u32) << 16) | self.minor as u32
    }

    /// Unpacks a version produced by [`FormatVersion::to_u32`].
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        Self::new((value >> 16) as u16, (value & 0xFFFF) as u16)
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Magic bytes for file format identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicBytes(pub [u8; 4]);

impl MagicBytes {
    /// Delve chunk store magic bytes.
    pub const STORE: Self = Self(*b"DLVS");
}
