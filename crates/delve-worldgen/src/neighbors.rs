//! Same-level neighbor linkage.
//!
//! For every chunk of a map and each of the six directions, the adjacent
//! region of equal size is looked up by descending from the root. A chunk
//! that exactly covers that region becomes the neighbor; a region outside
//! the world or finer than the tree leaves the slot empty.

use std::collections::HashMap;
use std::time::Instant;

use delve_common::{ChunkId, Direction, Region};
use delve_store::{BulkWriter, ChildLink, Chunk, ChunkStore, GameMap};
use rayon::prelude::*;
use tracing::info;

use crate::error::GenerationResult;

/// Child tables of interior chunks, keyed by parent ID.
type ChildTables = HashMap<ChunkId, [ChildLink; 8]>;

/// Resolves and stores neighbor links for every chunk of `map`.
///
/// Only records whose links changed are rewritten. Returns the number of
/// non-empty links in the rewritten records.
pub fn link_neighbors(store: &ChunkStore, map: &GameMap, bulk: &BulkWriter) -> GenerationResult<u64> {
    let started = Instant::now();
    let mut chunks = Vec::new();
    store.for_each_chunk(|chunk| {
        if chunk.region.map() == map.id {
            chunks.push(chunk);
        }
        Ok(())
    })?;

    let tables: ChildTables = chunks
        .iter()
        .filter_map(|chunk| chunk.children.map(|children| (chunk.id, children)))
        .collect();
    let world = map.region();

    let changed: Vec<Chunk> = chunks
        .into_par_iter()
        .filter_map(|mut chunk| {
            let mut neighbors = [None; 6];
            for direction in Direction::ALL {
                let target = chunk.region.adjacent(direction);
                neighbors[direction.index()] = resolve(&tables, world, map.root, target);
            }
            if neighbors == chunk.neighbors {
                return None;
            }
            chunk.neighbors = neighbors;
            Some(chunk)
        })
        .collect();

    bulk.put_chunks(store, &changed)?;

    let linked = count_links(&changed);
    info!(
        "Linked neighbors of map {}: {} chunks rewritten, {} links in {:?}",
        map.id,
        changed.len(),
        linked,
        started.elapsed()
    );
    Ok(linked)
}

/// Finds the chunk covering exactly `target`, descending from `root`.
fn resolve(tables: &ChildTables, world: Region, root: ChunkId, target: Region) -> Option<ChunkId> {
    if !world.encloses(&target) {
        return None;
    }
    let mut region = world;
    let mut id = root;
    loop {
        if region == target {
            return Some(id);
        }
        let children = tables.get(&id)?;
        let link = children[region.octant_of(target.start())];
        if !link.region.encloses(&target) {
            return None;
        }
        region = link.region;
        id = link.id;
    }
}

fn count_links(chunks: &[Chunk]) -> u64 {
    chunks
        .iter()
        .map(|chunk| chunk.neighbors.iter().flatten().count() as u64)
        .sum()
}
