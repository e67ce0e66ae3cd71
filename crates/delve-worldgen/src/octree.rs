//! Octree construction.
//!
//! The builder bisects the world region recursively. Every chunk takes its
//! ID before its children do, so the whole-world chunk is the root and holds
//! the first ID handed out. Leaves receive a fully populated block array
//! from the material source and are buffered, then written through the bulk
//! layer. Interior chunks are written once their child tables are complete.
//!
//! The recursion depth is `log2(world edge / leaf edge)`.

use std::time::Instant;

use delve_common::{ChunkId, IdSource, Region};
use delve_store::{BlockArray, BulkWriter, ChildLink, Chunk, ChunkStore, GameMap};
use tracing::{debug, error, info};

use crate::config::WorldConfig;
use crate::error::{GenerationError, GenerationResult};
use crate::neighbors::link_neighbors;
use crate::source::MaterialSource;

/// Counters and buffers threaded through one build.
#[derive(Default)]
struct BuildState {
    leaves: Vec<(Chunk, BlockArray)>,
    interiors: Vec<Chunk>,
    chunks: u64,
    blocks: u64,
}

/// Builds and stores the octree of one world.
pub struct OctreeBuilder<'a> {
    store: &'a ChunkStore,
    bulk: &'a BulkWriter,
    ids: &'a dyn IdSource,
    source: &'a dyn MaterialSource,
    config: &'a WorldConfig,
}

impl<'a> OctreeBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(
        store: &'a ChunkStore,
        bulk: &'a BulkWriter,
        ids: &'a dyn IdSource,
        source: &'a dyn MaterialSource,
        config: &'a WorldConfig,
    ) -> Self {
        Self {
            store,
            bulk,
            ids,
            source,
            config,
        }
    }

    /// Generates the world, links neighbors and stores the map descriptor.
    ///
    /// Aborts on the first error; nothing is rolled back, but the map
    /// descriptor is only written once every chunk is in place.
    pub fn generate(&self) -> GenerationResult<GameMap> {
        let map_id = self.config.map_id;
        match self.run() {
            Ok(map) => Ok(map),
            Err(err) => {
                error!("Generation of map {map_id} failed: {err}");
                Err(err)
            },
        }
    }

    fn run(&self) -> GenerationResult<GameMap> {
        self.config.validate()?;
        let world_size = self.config.world_size();
        if let Some(source_size) = self.source.extent() {
            if source_size != world_size {
                return Err(GenerationError::SourceMismatch {
                    source_size,
                    world_size,
                });
            }
        }

        let started = Instant::now();
        let mut map = self.config.game_map();
        info!(
            "Generating map {} ({}x{}x{}, {} leaves of {})",
            map.id,
            map.width,
            map.height,
            map.depth,
            map.leaf_count(),
            map.leaf_size
        );

        let mut state = BuildState::default();
        map.root = self.build(map.region(), None, &mut state)?;
        self.flush_leaves(&mut state)?;
        self.bulk.put_chunks(self.store, &state.interiors)?;

        map.chunk_count = state.chunks;
        map.block_count = state.blocks;
        self.store.put_map(&map)?;

        let linked = link_neighbors(self.store, &map, self.bulk)?;
        info!(
            "Generated map {}: {} chunks, {} blocks, {} neighbor links in {:?}",
            map.id,
            map.chunk_count,
            map.block_count,
            linked,
            started.elapsed()
        );
        Ok(map)
    }

    fn build(
        &self,
        region: Region,
        parent: Option<ChunkId>,
        state: &mut BuildState,
    ) -> GenerationResult<ChunkId> {
        let id = self.ids.next_id();
        let mut chunk = Chunk::new(id, region);
        chunk.parent = parent;
        chunk.root = parent.is_none();

        if region.is_cube_of(self.config.leaf_size as i32) {
            let blocks = self.fill(region);
            state.chunks += 1;
            state.blocks += blocks.len() as u64;
            state.leaves.push((chunk, blocks));
            if state.leaves.len() >= self.config.flush_leaves.max(1) {
                self.flush_leaves(state)?;
            }
            return Ok(id);
        }

        let octants = region.octants();
        let mut children = [ChildLink {
            region,
            id: ChunkId::NULL,
        }; 8];
        for (slot, octant) in children.iter_mut().zip(octants) {
            *slot = ChildLink {
                region: octant,
                id: self.build(octant, Some(id), state)?,
            };
        }
        chunk.children = Some(children);
        state.chunks += 1;
        state.interiors.push(chunk);
        Ok(id)
    }

    fn fill(&self, region: Region) -> BlockArray {
        let mut blocks = BlockArray::zeroed(region);
        for (index, record) in blocks.records_mut().iter_mut().enumerate() {
            let sample = self.source.sample(region.point_at(index));
            record.set_material(Some(sample.material));
            record.set_properties(sample.properties);
        }
        blocks
    }

    fn flush_leaves(&self, state: &mut BuildState) -> GenerationResult<()> {
        if state.leaves.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        self.bulk.put_leaves(self.store, &state.leaves)?;
        debug!(
            "Flushed {} leaves in {:?}",
            state.leaves.len(),
            started.elapsed()
        );
        state.leaves.clear();
        Ok(())
    }
}
