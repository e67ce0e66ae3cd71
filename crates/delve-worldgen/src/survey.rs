//! Octree shape verification.

use delve_common::{ChunkId, MapId};
use delve_store::{Chunk, ChunkStore, StoreReader};

use crate::error::{GenerationError, GenerationResult};

/// Counts gathered while walking a stored octree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Survey {
    /// All chunks reachable from the root
    pub chunks: u64,
    /// Leaf chunks
    pub leaves: u64,
    /// Blocks held by leaves
    pub blocks: u64,
    /// Deepest leaf level (root is 0)
    pub depth: u32,
}

/// Walks the octree of `map` and checks its shape.
///
/// The root must be flagged as root, have no parent and cover the world.
/// Every interior chunk must have children tiling its octants in order,
/// each pointing back to it. Every leaf must be a cube of the leaf size
/// with a block array whose populated blocks have exactly one occupancy
/// flag.
pub fn survey(store: &ChunkStore, map: MapId) -> GenerationResult<Survey> {
    let reader = store.reader()?;
    let map = reader.get_map(map)?;
    let leaf_size = map.leaf_size as i32;

    let root = reader.get_chunk(map.root)?;
    if !root.root || root.parent.is_some() || root.region != map.region() {
        return Err(invalid(root.id, "root does not describe the world"));
    }

    let mut survey = Survey::default();
    let mut stack = vec![(map.root, None, 0u32)];
    while let Some((id, parent, depth)) = stack.pop() {
        let chunk = reader.get_chunk(id)?;
        survey.chunks += 1;
        if chunk.parent != parent {
            return Err(invalid(id, format!("parent {:?}, expected {parent:?}", chunk.parent)));
        }
        if chunk.root != parent.is_none() {
            return Err(invalid(id, "root flag on a non-root chunk"));
        }

        match chunk.children {
            None => check_leaf(&reader, &chunk, leaf_size, &mut survey, depth)?,
            Some(children) => {
                if chunk.region.is_cube_of(leaf_size) {
                    return Err(invalid(id, "leaf-sized chunk has children"));
                }
                let octants = chunk.region.octants();
                for (link, octant) in children.iter().zip(octants) {
                    if link.region != octant {
                        return Err(invalid(
                            id,
                            format!("child {} covers {}, expected {octant}", link.id, link.region),
                        ));
                    }
                    stack.push((link.id, Some(id), depth + 1));
                }
            },
        }
    }
    Ok(survey)
}

fn check_leaf(
    reader: &StoreReader<'_>,
    chunk: &Chunk,
    leaf_size: i32,
    survey: &mut Survey,
    depth: u32,
) -> GenerationResult<()> {
    let region = chunk.region;
    if !region.is_cube_of(leaf_size) {
        return Err(invalid(chunk.id, format!("leaf {region} is not a cube of {leaf_size}")));
    }
    if !reader.has_block_array(chunk.id)? {
        return Err(invalid(chunk.id, "leaf has no block array"));
    }
    let array = reader.block_array(chunk)?;
    // reserved but unpopulated records carry no flags yet
    let bad = array
        .records()
        .iter()
        .position(|r| r.is_initialized() && !r.properties().has_valid_occupancy());
    if let Some(index) = bad {
        let point = region.point_at(index).xyz();
        let flags = array.records()[index].properties();
        return Err(invalid(chunk.id, format!("block {point:?} has occupancy {flags:?}")));
    }
    survey.leaves += 1;
    survey.blocks += region.volume() as u64;
    survey.depth = survey.depth.max(depth);
    Ok(())
}

fn invalid(chunk: ChunkId, reason: impl Into<String>) -> GenerationError {
    GenerationError::InvalidTree {
        chunk,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::material::MaterialCatalog;
    use crate::octree::OctreeBuilder;
    use crate::source::StrataSource;
    use delve_common::{Point, Region, SequentialIds};
    use delve_store::{BlockProperties, BulkConfig, BulkWriter, ChildLink, GameMap};
    use tempfile::TempDir;

    const MAP: MapId = MapId::new(5);

    fn open() -> (TempDir, ChunkStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = ChunkStore::open(dir.path().join("survey.redb")).expect("open store");
        (dir, store)
    }

    /// Writes a 16/8 tree by hand and returns the root.
    fn two_level(store: &ChunkStore) -> Chunk {
        let world = Region::cube(MAP, [0, 0, 0], 16);
        let mut root = Chunk::new(ChunkId::from_raw(1), world);
        root.root = true;
        let octants = world.octants();
        let links: [ChildLink; 8] = std::array::from_fn(|i| ChildLink {
            region: octants[i],
            id: ChunkId::from_raw(i as u64 + 2),
        });
        for link in links {
            let mut leaf = Chunk::new(link.id, link.region);
            leaf.parent = Some(root.id);
            store.put_chunk(&leaf).expect("leaf");
        }
        root.children = Some(links);
        store.put_chunk(&root).expect("root");

        let mut map = GameMap::new(MAP, 16, 16, 16, 8);
        map.root = root.id;
        store.put_map(&map).expect("map");
        root
    }

    #[test]
    fn test_survey_counts() {
        let (_dir, store) = open();
        two_level(&store);
        let found = survey(&store, MAP).expect("survey");
        assert_eq!(
            found,
            Survey {
                chunks: 9,
                leaves: 8,
                blocks: 4096,
                depth: 1,
            }
        );
    }

    #[test]
    fn test_survey_detects_wrong_tiling() {
        let (_dir, store) = open();
        let mut root = two_level(&store);
        if let Some(children) = root.children.as_mut() {
            children.swap(0, 1);
        }
        store.put_chunk(&root).expect("root");
        assert!(matches!(
            survey(&store, MAP),
            Err(GenerationError::InvalidTree { .. })
        ));
    }

    #[test]
    fn test_survey_detects_bad_parent() {
        let (_dir, store) = open();
        two_level(&store);
        let mut leaf = store.get_chunk(ChunkId::from_raw(5)).expect("leaf");
        leaf.parent = Some(ChunkId::from_raw(42));
        store.put_chunk(&leaf).expect("leaf");
        let err = survey(&store, MAP).expect_err("bad parent");
        assert!(matches!(err, GenerationError::InvalidTree { chunk, .. } if chunk.raw() == 5));
    }

    #[test]
    fn test_survey_missing_map() {
        let (_dir, store) = open();
        assert!(matches!(
            survey(&store, MAP),
            Err(GenerationError::Store(e)) if e.is_not_found()
        ));
    }

    fn generated(store: &ChunkStore) -> GameMap {
        let bulk = BulkWriter::new(BulkConfig::default()).expect("pool");
        let config = WorldConfig::cube(MAP, 16, 8);
        let source = StrataSource::new(&config, &MaterialCatalog::standard()).expect("source");
        let ids = SequentialIds::new();
        OctreeBuilder::new(store, &bulk, &ids, &source, &config)
            .generate()
            .expect("generate")
    }

    #[test]
    fn test_generated_blocks_have_one_occupancy() {
        let (_dir, store) = open();
        let map = generated(&store);
        let found = survey(&store, MAP).expect("survey");
        assert_eq!(found.leaves, map.leaf_count());
        assert_eq!(found.blocks, map.volume());

        let reader = store.reader().expect("reader");
        reader
            .for_each_chunk(|chunk| {
                if chunk.is_leaf() {
                    let array = reader.block_array(&chunk)?;
                    for record in array.records() {
                        assert!(record.is_initialized());
                        assert!(record.properties().has_valid_occupancy());
                    }
                }
                Ok(())
            })
            .expect("scan");
    }

    #[test]
    fn test_survey_detects_mixed_occupancy() {
        let (_dir, store) = open();
        let map = generated(&store);
        let root = store.get_chunk(map.root).expect("root");
        let point = Point::new(MAP, 9, 1, 12);
        let leaf = store
            .get_chunk(root.child_containing(point).expect("leaf").id)
            .expect("chunk");

        let mut block = store.get_block(&leaf, point).expect("block");
        block.properties |= BlockProperties::EMPTY | BlockProperties::FILLED;
        store.put_block(&leaf, &block).expect("put block");

        let err = survey(&store, MAP).expect_err("mixed occupancy");
        assert!(matches!(err, GenerationError::InvalidTree { chunk, .. } if chunk == leaf.id));
    }
}
