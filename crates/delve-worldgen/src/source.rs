//! Per-voxel material sources.
//!
//! The octree builder asks a [`MaterialSource`] for every block of every
//! leaf. Two sources are provided: height-banded strata synthesized from
//! the config, and an explicit voxel array decoded elsewhere.

use std::collections::HashMap;

use delve_common::{calc_index, MaterialId, Point};
use delve_store::BlockProperties;

use crate::config::{StrataThresholds, Stratum, WorldConfig};
use crate::error::{GenerationError, GenerationResult};
use crate::material::{MaterialCatalog, MaterialClass};

/// Material and status bits for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Block material
    pub material: MaterialId,
    /// Occupancy and terrain bits
    pub properties: BlockProperties,
}

/// Supplies the initial contents of each block.
pub trait MaterialSource: Send + Sync {
    /// Returns the (x, y, z) extent this source covers, if bounded.
    fn extent(&self) -> Option<[u32; 3]> {
        None
    }

    /// Returns the contents of the block at `point`.
    fn sample(&self, point: Point) -> Sample;
}

/// Height-banded stratification.
///
/// The band is chosen by depth alone; within a band every column draws one
/// material from the band's catalog entries, seeded by the world seed and
/// the column coordinates, so regeneration is deterministic.
#[derive(Debug, Clone)]
pub struct StrataSource {
    thresholds: StrataThresholds,
    bands: [Vec<(MaterialId, MaterialClass)>; 5],
    seed: u64,
}

impl StrataSource {
    /// Resolves every band's materials from `catalog`.
    pub fn new(config: &WorldConfig, catalog: &MaterialCatalog) -> GenerationResult<Self> {
        let mut bands: [Vec<(MaterialId, MaterialClass)>; 5] = Default::default();
        for stratum in Stratum::ALL {
            let category = stratum.into();
            let band: Vec<_> = catalog
                .in_category(category)
                .map(|m| (m.id, m.class))
                .collect();
            if band.is_empty() {
                return Err(GenerationError::UnknownCategory(category));
            }
            bands[stratum.index()] = band;
        }
        Ok(Self {
            thresholds: config.strata.thresholds(config.depth),
            bands,
            seed: config.seed,
        })
    }

    fn column_seed(&self, x: i32, y: i32, stratum: Stratum) -> u64 {
        let mut h = self.seed ^ 0x9E37_79B9_7F4A_7C15;
        for v in [x as u32 as u64, y as u32 as u64, stratum.index() as u64] {
            h = (h ^ v).wrapping_mul(0x0100_0000_01B3);
            h ^= h >> 29;
        }
        h
    }
}

impl MaterialSource for StrataSource {
    fn sample(&self, point: Point) -> Sample {
        let stratum = self.thresholds.stratum(point.z);
        let band = &self.bands[stratum.index()];
        let (material, class) = if band.len() == 1 {
            band[0]
        } else {
            let mut rng = fastrand::Rng::with_seed(self.column_seed(point.x, point.y, stratum));
            band[rng.usize(..band.len())]
        };

        let air = stratum == Stratum::Air;
        let properties = BlockProperties::empty()
            .with(BlockProperties::MINED, air)
            .with(BlockProperties::NATURAL_FLOOR | BlockProperties::NATURAL_ROOF, !air)
            .with_occupancy(class.occupancy());
        Sample {
            material,
            properties,
        }
    }
}

/// Explicit per-voxel materials, as decoded from image layers.
#[derive(Debug, Clone)]
pub struct VoxelArraySource {
    size: [u32; 3],
    voxels: Vec<(MaterialId, MaterialClass)>,
}

impl VoxelArraySource {
    /// Builds a source from layers indexed `[z][y][x]`.
    ///
    /// Every layer must have the same rows and every row the same length;
    /// every material must be in `catalog`.
    pub fn from_layers(layers: &[Vec<Vec<MaterialId>>], catalog: &MaterialCatalog) -> GenerationResult<Self> {
        let depth = layers.len();
        let height = layers.first().map_or(0, Vec::len);
        let width = layers
            .first()
            .and_then(|layer| layer.first())
            .map_or(0, Vec::len);
        let size = [width as u32, height as u32, depth as u32];

        let mut classes = HashMap::new();
        let mut voxels = Vec::with_capacity(width * height * depth);
        for (z, layer) in layers.iter().enumerate() {
            if layer.len() != height || layer.iter().any(|row| row.len() != width) {
                return Err(GenerationError::RaggedLayer(z));
            }
            for &id in layer.iter().flatten() {
                let class = match classes.get(&id) {
                    Some(&class) => class,
                    None => {
                        let class = catalog
                            .get(id)
                            .ok_or(GenerationError::UnknownMaterial(id))?
                            .class;
                        classes.insert(id, class);
                        class
                    },
                };
                voxels.push((id, class));
            }
        }
        Ok(Self { size, voxels })
    }
}

impl MaterialSource for VoxelArraySource {
    fn extent(&self) -> Option<[u32; 3]> {
        Some(self.size)
    }

    fn sample(&self, point: Point) -> Sample {
        let size = self.size.map(|s| s as i32);
        let (material, class) = self.voxels[calc_index(size, [0, 0, 0], point.xyz())];
        Sample {
            material,
            properties: class.occupancy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_common::MapId;

    const MAP: MapId = MapId::new(1);

    fn strata(depth: u32) -> StrataSource {
        let mut config = WorldConfig::cube(MAP, depth, 4);
        config.depth = depth;
        StrataSource::new(&config, &MaterialCatalog::standard()).expect("strata")
    }

    fn category_at(source: &StrataSource, z: i32) -> crate::material::Category {
        let sample = source.sample(Point::new(MAP, 3, 7, z));
        MaterialCatalog::standard()
            .get(sample.material)
            .expect("known material")
            .category
    }

    #[test]
    fn test_height_banding() {
        use crate::material::Category;
        let source = strata(100);

        let air = source.sample(Point::new(MAP, 0, 0, 5));
        assert!(air.properties.contains(BlockProperties::EMPTY | BlockProperties::MINED));
        assert!(!air.properties.contains(BlockProperties::NATURAL_FLOOR));
        assert_eq!(category_at(&source, 5), Category::Atmosphere);

        let soil = source.sample(Point::new(MAP, 0, 0, 20));
        assert!(soil.properties.contains(
            BlockProperties::FILLED | BlockProperties::NATURAL_FLOOR | BlockProperties::NATURAL_ROOF
        ));
        assert!(!soil.properties.contains(BlockProperties::MINED));
        assert_eq!(category_at(&source, 20), Category::Soil);

        assert_eq!(category_at(&source, 45), Category::Sedimentary);
        assert_eq!(category_at(&source, 70), Category::IgneousIntrusive);
        assert_eq!(category_at(&source, 95), Category::Magma);
    }

    #[test]
    fn test_ground_level_block_is_mined_air() {
        use crate::material::Category;
        let source = strata(100);

        let edge = source.sample(Point::new(MAP, 3, 4, 10));
        assert_eq!(category_at(&source, 10), Category::Atmosphere);
        assert!(edge.properties.contains(BlockProperties::EMPTY | BlockProperties::MINED));

        let below = source.sample(Point::new(MAP, 3, 4, 11));
        assert_eq!(category_at(&source, 11), Category::Soil);
        assert!(below.properties.contains(BlockProperties::NATURAL_FLOOR));
        assert_eq!(category_at(&source, 80), Category::IgneousIntrusive);
        assert_eq!(category_at(&source, 81), Category::Magma);
    }

    #[test]
    fn test_column_choice_is_deterministic() {
        let a = strata(64);
        let b = strata(64);
        for x in 0..16 {
            let p = Point::new(MAP, x, 2 * x, 40);
            assert_eq!(a.sample(p), b.sample(p));
            // same column, same band, same material
            assert_eq!(a.sample(p).material, a.sample(p.offset([0, 0, 1])).material);
        }
    }

    #[test]
    fn test_missing_category_fails() {
        let catalog = MaterialCatalog::from_materials(vec![crate::material::Material::new(
            0,
            "air",
            crate::material::Category::Atmosphere,
            MaterialClass::Gas,
        )])
        .expect("catalog");
        let err = StrataSource::new(&WorldConfig::default(), &catalog).expect_err("no soil");
        assert!(matches!(err, GenerationError::UnknownCategory(_)));
    }

    #[test]
    fn test_voxel_array_indexing() {
        let catalog = MaterialCatalog::standard();
        let air = MaterialId::new(0);
        let water = MaterialId::new(11);
        let granite = MaterialId::new(7);
        // 2 layers of 1 row of 2 voxels
        let layers = vec![vec![vec![air, water]], vec![vec![granite, granite]]];
        let source = VoxelArraySource::from_layers(&layers, &catalog).expect("source");
        assert_eq!(source.extent(), Some([2, 1, 2]));

        let s = source.sample(Point::new(MAP, 1, 0, 0));
        assert_eq!(s.material, water);
        assert_eq!(s.properties, BlockProperties::LIQUID);
        let s = source.sample(Point::new(MAP, 0, 0, 0));
        assert_eq!(s.properties, BlockProperties::EMPTY);
        let s = source.sample(Point::new(MAP, 0, 0, 1));
        assert_eq!(s.material, granite);
        assert_eq!(s.properties, BlockProperties::FILLED);
    }

    #[test]
    fn test_voxel_array_rejects_ragged_layers() {
        let catalog = MaterialCatalog::standard();
        let m = MaterialId::new(1);
        let layers = vec![vec![vec![m, m]], vec![vec![m]]];
        assert!(matches!(
            VoxelArraySource::from_layers(&layers, &catalog),
            Err(GenerationError::RaggedLayer(1))
        ));
    }

    #[test]
    fn test_voxel_array_rejects_unknown_material() {
        let catalog = MaterialCatalog::standard();
        let layers = vec![vec![vec![MaterialId::new(900)]]];
        assert!(matches!(
            VoxelArraySource::from_layers(&layers, &catalog),
            Err(GenerationError::UnknownMaterial(_))
        ));
    }
}
