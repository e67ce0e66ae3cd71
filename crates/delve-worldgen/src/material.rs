//! Material catalog.
//!
//! Maps material IDs to a name, a geological category and a physical
//! class. The stratification source picks materials by category; the
//! class decides a block's occupancy bits.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use delve_common::MaterialId;
use delve_store::BlockProperties;
use serde::{Deserialize, Serialize};

use crate::config::Stratum;
use crate::error::ConfigError;

/// Physical state of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialClass {
    /// Air and other gases
    Gas,
    /// Water, lava
    Liquid,
    /// Everything that holds its shape
    Solid,
}

impl MaterialClass {
    /// Returns the occupancy flag for a block of this class.
    #[must_use]
    pub const fn occupancy(self) -> BlockProperties {
        match self {
            Self::Gas => BlockProperties::EMPTY,
            Self::Liquid => BlockProperties::LIQUID,
            Self::Solid => BlockProperties::FILLED,
        }
    }
}

/// Geological grouping used by stratification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Fills the air band
    Atmosphere,
    /// Topsoil
    Soil,
    /// Sedimentary stone
    Sedimentary,
    /// Intrusive igneous stone
    IgneousIntrusive,
    /// Deepest band
    Magma,
    /// Not used by stratification
    #[serde(other)]
    Other,
}

impl From<Stratum> for Category {
    fn from(stratum: Stratum) -> Self {
        match stratum {
            Stratum::Air => Self::Atmosphere,
            Stratum::Soil => Self::Soil,
            Stratum::Sedimentary => Self::Sedimentary,
            Stratum::Igneous => Self::IgneousIntrusive,
            Stratum::Magma => Self::Magma,
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    /// Stored material ID
    pub id: MaterialId,
    /// Display name
    pub name: String,
    /// Geological category
    pub category: Category,
    /// Physical class
    pub class: MaterialClass,
}

impl Material {
    /// Creates a catalog entry.
    #[must_use]
    pub fn new(id: u16, name: &str, category: Category, class: MaterialClass) -> Self {
        Self {
            id: MaterialId::new(id),
            name: name.to_owned(),
            category,
            class,
        }
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    materials: Vec<Material>,
}

/// Lookup table of known materials.
#[derive(Debug, Clone, Default)]
pub struct MaterialCatalog {
    materials: Vec<Material>,
    by_id: HashMap<MaterialId, usize>,
}

impl MaterialCatalog {
    /// Builds a catalog, rejecting duplicate IDs.
    pub fn from_materials(materials: Vec<Material>) -> Result<Self, ConfigError> {
        let mut by_id = HashMap::with_capacity(materials.len());
        for (index, material) in materials.iter().enumerate() {
            if by_id.insert(material.id, index).is_some() {
                return Err(ConfigError::DuplicateMaterial(material.id));
            }
        }
        Ok(Self { materials, by_id })
    }

    /// Built-in catalog covering every stratification category.
    #[must_use]
    pub fn standard() -> Self {
        use Category::{Atmosphere, IgneousIntrusive, Magma, Other, Sedimentary, Soil};
        use MaterialClass::{Gas, Liquid, Solid};

        let materials = vec![
            Material::new(0, "air", Atmosphere, Gas),
            Material::new(1, "loam", Soil, Solid),
            Material::new(2, "clay", Soil, Solid),
            Material::new(3, "silt", Soil, Solid),
            Material::new(4, "sandstone", Sedimentary, Solid),
            Material::new(5, "limestone", Sedimentary, Solid),
            Material::new(6, "shale", Sedimentary, Solid),
            Material::new(7, "granite", IgneousIntrusive, Solid),
            Material::new(8, "diorite", IgneousIntrusive, Solid),
            Material::new(9, "gabbro", IgneousIntrusive, Solid),
            Material::new(10, "magma stone", Magma, Solid),
            Material::new(11, "water", Other, Liquid),
        ];
        let by_id = materials
            .iter()
            .enumerate()
            .map(|(index, m)| (m.id, index))
            .collect();
        Self { materials, by_id }
    }

    /// Parses a catalog from `[[materials]]` TOML entries.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: CatalogFile = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Self::from_materials(file.materials)
    }

    /// Loads a catalog file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Looks up a material by ID.
    #[must_use]
    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.by_id.get(&id).map(|&index| &self.materials[index])
    }

    /// Returns all materials of a category, in catalog order.
    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &Material> + '_ {
        self.materials.iter().filter(move |m| m.category == category)
    }

    /// Returns the number of materials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Checks whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_covers_every_stratum() {
        let catalog = MaterialCatalog::standard();
        for stratum in Stratum::ALL {
            assert!(
                catalog.in_category(stratum.into()).next().is_some(),
                "no material for {stratum:?}"
            );
        }
    }

    #[test]
    fn test_class_occupancy() {
        assert_eq!(MaterialClass::Gas.occupancy(), BlockProperties::EMPTY);
        assert_eq!(MaterialClass::Liquid.occupancy(), BlockProperties::LIQUID);
        assert_eq!(MaterialClass::Solid.occupancy(), BlockProperties::FILLED);
    }

    #[test]
    fn test_lookup() {
        let catalog = MaterialCatalog::standard();
        let granite = catalog.get(MaterialId::new(7)).expect("granite");
        assert_eq!(granite.name, "granite");
        assert_eq!(granite.category, Category::IgneousIntrusive);
        assert_eq!(catalog.get(granite.id), Some(granite));
        assert!(catalog.get(MaterialId::new(500)).is_none());
    }

    #[test]
    fn test_parse_toml() {
        let contents = r#"
            [[materials]]
            id = 0
            name = "vacuum"
            category = "atmosphere"
            class = "gas"

            [[materials]]
            id = 3
            name = "basalt"
            category = "igneous_extrusive"
            class = "solid"
        "#;
        let catalog = MaterialCatalog::from_toml_str(contents, Path::new("inline")).expect("parse");
        assert_eq!(catalog.len(), 2);
        let basalt = catalog.get(MaterialId::new(3)).expect("basalt");
        assert_eq!(basalt.category, Category::Other);
        assert_eq!(basalt.class, MaterialClass::Solid);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = MaterialCatalog::from_materials(vec![
            Material::new(1, "a", Category::Soil, MaterialClass::Solid),
            Material::new(1, "b", Category::Soil, MaterialClass::Solid),
        ])
        .expect_err("duplicate");
        assert!(matches!(err, ConfigError::DuplicateMaterial(_)));
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(matches!(
            MaterialCatalog::load_from("/nonexistent/materials.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
