//! World generation configuration.
//!
//! Loaded from and saved to TOML. Every field has a default, so a partial
//! file only overrides what it names.

use std::fs;
use std::path::Path;

use delve_common::MapId;
use delve_store::{BulkConfig, GameMap, StoreConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// Largest world edge that keeps every coordinate inside `i32`.
pub const MAX_EDGE: u32 = 1 << 30;

/// Height-band percentages of total depth, from the top down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Open air above the ground
    pub ground: u32,
    /// Soil layer
    pub soil: u32,
    /// Sedimentary stone layer
    pub sedimentary: u32,
    /// Intrusive igneous stone layer
    pub igneous: u32,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            ground: 10,
            soil: 20,
            sedimentary: 30,
            igneous: 20,
        }
    }
}

impl StrataConfig {
    /// Returns the sum of all configured percentages.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.ground + self.soil + self.sedimentary + self.igneous
    }

    /// Computes the band boundaries for a world of `depth` blocks.
    #[must_use]
    pub fn thresholds(&self, depth: u32) -> StrataThresholds {
        let share = |pct: u32| (u64::from(depth) * u64::from(pct) / 100) as i32;
        let ground = share(self.ground);
        let soil = ground + share(self.soil);
        let sedimentary = soil + share(self.sedimentary);
        let igneous = sedimentary + share(self.igneous);
        StrataThresholds {
            ground,
            soil,
            sedimentary,
            igneous,
        }
    }
}

/// Depth boundaries of the strata bands.
///
/// Each threshold is the last depth of its band: a block belongs to the
/// first band whose threshold is at least its z. Everything past `igneous`
/// is magma.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrataThresholds {
    /// End of the air band
    pub ground: i32,
    /// End of the soil band
    pub soil: i32,
    /// End of the sedimentary band
    pub sedimentary: i32,
    /// End of the igneous band
    pub igneous: i32,
}

/// Stratification band of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stratum {
    /// Above ground
    Air,
    /// Topsoil
    Soil,
    /// Sedimentary stone
    Sedimentary,
    /// Intrusive igneous stone
    Igneous,
    /// Deepest band
    Magma,
}

impl Stratum {
    /// All strata from the top down.
    pub const ALL: [Self; 5] = [
        Self::Air,
        Self::Soil,
        Self::Sedimentary,
        Self::Igneous,
        Self::Magma,
    ];

    /// Returns the position of this stratum in [`Stratum::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl StrataThresholds {
    /// Returns the band containing depth `z`.
    #[must_use]
    pub const fn stratum(&self, z: i32) -> Stratum {
        if z <= self.ground {
            Stratum::Air
        } else if z <= self.soil {
            Stratum::Soil
        } else if z <= self.sedimentary {
            Stratum::Sedimentary
        } else if z <= self.igneous {
            Stratum::Igneous
        } else {
            Stratum::Magma
        }
    }
}

/// World generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Map the world is generated into
    pub map_id: MapId,
    /// Extent along x
    pub width: u32,
    /// Extent along y
    pub height: u32,
    /// Extent along z (depth)
    pub depth: u32,
    /// Edge length of leaf chunks
    pub leaf_size: u32,
    /// Seed for per-column material choice
    pub seed: u64,
    /// Leaves buffered before a bulk write
    pub flush_leaves: usize,
    /// Height bands
    pub strata: StrataConfig,
    /// Bulk writer settings
    pub bulk: BulkConfig,
    /// Store settings
    pub store: StoreConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map_id: MapId::new(1),
            width: 64,
            height: 64,
            depth: 64,
            leaf_size: 8,
            seed: 12345,
            flush_leaves: 256,
            strata: StrataConfig::default(),
            bulk: BulkConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Creates a cubic world configuration with default everything else.
    #[must_use]
    pub fn cube(map_id: MapId, edge: u32, leaf_size: u32) -> Self {
        Self {
            map_id,
            width: edge,
            height: edge,
            depth: edge,
            leaf_size,
            ..Self::default()
        }
    }

    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file
    /// is an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("World config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded world config from {}", path.display());
        Ok(config)
    }

    /// Saves configuration to `path` as pretty TOML.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(io_err)?;

        info!("Saved world config to {}", path.display());
        Ok(())
    }

    /// Checks that the dimensions describe a buildable octree.
    ///
    /// Every octant split halves all three axes, so the world must be a
    /// cube whose edge is a power-of-two multiple of the leaf size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dims = [
            ("width", self.width),
            ("height", self.height),
            ("depth", self.depth),
            ("leaf_size", self.leaf_size),
        ];
        for (field, value) in dims {
            if !value.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo { field, value });
            }
            if value > MAX_EDGE {
                return Err(ConfigError::TooLarge { field, value });
            }
        }
        for (field, value) in dims.into_iter().take(3) {
            if value % self.leaf_size != 0 {
                return Err(ConfigError::LeafSizeMismatch {
                    field,
                    value,
                    leaf_size: self.leaf_size,
                });
            }
        }
        if self.width != self.height || self.width != self.depth {
            return Err(ConfigError::NotCubic(self.world_size()));
        }
        let total = self.strata.total();
        if total > 100 {
            return Err(ConfigError::StrataOverflow(total));
        }
        Ok(())
    }

    /// Returns the world extent as (x, y, z).
    #[must_use]
    pub const fn world_size(&self) -> [u32; 3] {
        [self.width, self.height, self.depth]
    }

    /// Returns an empty map descriptor for this world.
    #[must_use]
    pub const fn game_map(&self) -> GameMap {
        GameMap::new(self.map_id, self.width, self.height, self.depth, self.leaf_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    proptest! {
        #[test]
        fn prop_strata_deepen_with_z(
            ground in 0u32..=25, soil in 0u32..=25, sedimentary in 0u32..=25, igneous in 0u32..=25,
            depth in 1u32..2048,
        ) {
            let strata = StrataConfig { ground, soil, sedimentary, igneous };
            let t = strata.thresholds(depth);
            prop_assert!(t.ground <= t.soil && t.soil <= t.sedimentary && t.sedimentary <= t.igneous);
            prop_assert!(t.igneous <= depth as i32);

            let mut last = Stratum::Air.index();
            for z in 0..depth as i32 {
                let band = t.stratum(z).index();
                prop_assert!(band >= last);
                last = band;
            }
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = WorldConfig::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.bulk.chunk_threshold, 8192);
        assert_eq!(config.bulk.block_threshold, 1024);
    }

    #[test]
    fn test_thresholds_from_percentages() {
        let strata = StrataConfig::default();
        let t = strata.thresholds(100);
        assert_eq!((t.ground, t.soil, t.sedimentary, t.igneous), (10, 30, 60, 80));

        assert_eq!(t.stratum(5), Stratum::Air);
        assert_eq!(t.stratum(20), Stratum::Soil);
        assert_eq!(t.stratum(45), Stratum::Sedimentary);
        assert_eq!(t.stratum(70), Stratum::Igneous);
        assert_eq!(t.stratum(95), Stratum::Magma);
    }

    #[test]
    fn test_band_edges_belong_to_upper_band() {
        let t = StrataConfig::default().thresholds(100);
        assert_eq!(t.stratum(10), Stratum::Air);
        assert_eq!(t.stratum(11), Stratum::Soil);
        assert_eq!(t.stratum(30), Stratum::Soil);
        assert_eq!(t.stratum(31), Stratum::Sedimentary);
        assert_eq!(t.stratum(60), Stratum::Sedimentary);
        assert_eq!(t.stratum(80), Stratum::Igneous);
        assert_eq!(t.stratum(81), Stratum::Magma);
    }

    #[test]
    fn test_validate_rejects_bad_dimensions() {
        let mut config = WorldConfig::cube(MapId::new(1), 48, 8);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPowerOfTwo { field: "width", value: 48 })
        ));

        config = WorldConfig::cube(MapId::new(1), 8, 16);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LeafSizeMismatch { .. })
        ));

        config = WorldConfig::cube(MapId::new(1), 32, 8);
        config.height = 16;
        assert!(matches!(config.validate(), Err(ConfigError::NotCubic(_))));

        config = WorldConfig::cube(MapId::new(1), 0, 8);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_strata_overflow() {
        let mut config = WorldConfig::default();
        config.strata.igneous = 50;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StrataOverflow(110))
        ));
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("world.toml");

        let mut config = WorldConfig::cube(MapId::new(7), 128, 16);
        config.seed = 99;
        config.strata.soil = 25;
        config.bulk.workers = 2;
        config.save_to(&path).expect("Failed to save config");

        let loaded = WorldConfig::load_from(&path).expect("Failed to load config");
        assert_eq!(loaded.map_id, MapId::new(7));
        assert_eq!(loaded.world_size(), [128, 128, 128]);
        assert_eq!(loaded.leaf_size, 16);
        assert_eq!(loaded.seed, 99);
        assert_eq!(loaded.strata.soil, 25);
        assert_eq!(loaded.bulk.workers, 2);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = WorldConfig::load_from("/nonexistent/path/world.toml").expect("defaults");
        assert_eq!(config.width, 64);
    }

    #[test]
    fn test_config_partial_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("world.toml");
        fs::write(&path, "width = 16\n\n[strata]\nground = 5\n").expect("write");

        let config = WorldConfig::load_from(&path).expect("load");
        assert_eq!(config.width, 16);
        assert_eq!(config.height, 64);
        assert_eq!(config.strata.ground, 5);
        assert_eq!(config.strata.soil, 20);
    }

    #[test]
    fn test_config_malformed_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("world.toml");
        fs::write(&path, "width = \"wide\"").expect("write");

        assert!(matches!(
            WorldConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
