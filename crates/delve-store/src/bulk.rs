//! Fork/join bulk writes.
//!
//! A bulk call splits its input in half recursively until a half weighs less
//! than the configured threshold, then writes that slice in one write
//! transaction. Halves run on a dedicated worker pool and are always joined
//! before the parent returns, so no work outlives the call.
//!
//! Block-level bulk input is a [`ChunkGroups`], which holds at most one
//! entry per chunk. Two leaf batches therefore never touch the same block
//! array.

use std::collections::btree_map::{self, BTreeMap};
use std::time::Instant;

use delve_common::ChunkId;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::{Block, BlockArray};
use crate::chunk::Chunk;
use crate::error::StoreResult;
use crate::store::ChunkStore;

/// Bulk writer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Chunks per write transaction before splitting
    pub chunk_threshold: usize,
    /// Blocks per write transaction before splitting
    pub block_threshold: usize,
    /// Worker threads (0 = one per core)
    pub workers: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: 8192,
            block_threshold: 1024,
            workers: 0,
        }
    }
}

/// Per-chunk payloads, one entry per chunk ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGroups<T> {
    groups: BTreeMap<ChunkId, (Chunk, T)>,
}

impl<T> Default for ChunkGroups<T> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

impl<T> ChunkGroups<T> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload for `chunk`, returning the previous one.
    pub fn insert(&mut self, chunk: Chunk, payload: T) -> Option<T> {
        self.groups
            .insert(chunk.id, (chunk, payload))
            .map(|(_, old)| old)
    }

    /// Returns the payload for `chunk`, inserting a default one first.
    pub fn entry(&mut self, chunk: &Chunk) -> &mut T
    where
        T: Default,
    {
        &mut self
            .groups
            .entry(chunk.id)
            .or_insert_with(|| (chunk.clone(), T::default()))
            .1
    }

    /// Returns the number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Checks whether no chunk is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterates in chunk ID order.
    pub fn iter(&self) -> impl Iterator<Item = (&Chunk, &T)> + '_ {
        self.groups.values().map(|(chunk, payload)| (chunk, payload))
    }

    fn entries(&self) -> Vec<(&Chunk, &T)> {
        self.iter().collect()
    }
}

impl ChunkGroups<Vec<Block>> {
    /// Adds a block to its chunk's group.
    ///
    /// # Panics
    ///
    /// Panics if the block belongs to another chunk.
    pub fn push_block(&mut self, chunk: &Chunk, block: Block) {
        assert_eq!(block.chunk, chunk.id, "block belongs to another chunk");
        self.entry(chunk).push(block);
    }

    /// Returns the total number of blocks across all groups.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.groups.values().map(|(_, blocks)| blocks.len()).sum()
    }
}

impl FromIterator<Chunk> for ChunkGroups<()> {
    fn from_iter<I: IntoIterator<Item = Chunk>>(iter: I) -> Self {
        let mut groups = Self::new();
        for chunk in iter {
            groups.insert(chunk, ());
        }
        groups
    }
}

impl<T> IntoIterator for ChunkGroups<T> {
    type Item = (Chunk, T);
    type IntoIter = btree_map::IntoValues<ChunkId, (Chunk, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_values()
    }
}

/// Runs `leaf` over slices of `items` no heavier than `threshold`.
///
/// Both halves of a split are joined before returning; the first error
/// (left half first) is reported after the join.
pub fn fork_join<T, W, L>(items: &[T], threshold: usize, weight: &W, leaf: &L) -> StoreResult<()>
where
    T: Sync,
    W: Fn(&T) -> usize + Sync,
    L: Fn(&[T]) -> StoreResult<()> + Sync,
{
    if items.is_empty() {
        return Ok(());
    }
    let total: usize = items.iter().map(weight).sum();
    if items.len() == 1 || total < threshold.max(1) {
        return leaf(items);
    }
    let (left, right) = items.split_at(items.len() / 2);
    let (a, b) = rayon::join(
        || fork_join(left, threshold, weight, leaf),
        || fork_join(right, threshold, weight, leaf),
    );
    a.and(b)
}

/// Parallel batched writer over a [`ChunkStore`].
pub struct BulkWriter {
    pool: ThreadPool,
    config: BulkConfig,
}

impl std::fmt::Debug for BulkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkWriter")
            .field("workers", &self.pool.current_num_threads())
            .field("config", &self.config)
            .finish()
    }
}

impl BulkWriter {
    /// Starts the worker pool.
    pub fn new(config: BulkConfig) -> StoreResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("delve-bulk-{i}"))
            .build()?;
        Ok(Self { pool, config })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Writes chunk records, reserving block arrays for new leaves.
    pub fn put_chunks(&self, store: &ChunkStore, chunks: &[Chunk]) -> StoreResult<()> {
        self.pool.install(|| {
            fork_join(chunks, self.config.chunk_threshold, &|_| 1, &|batch: &[Chunk]| {
                let started = Instant::now();
                store.write(|w| batch.iter().try_for_each(|chunk| w.put_chunk(chunk)))?;
                debug!("Wrote {} chunks in {:?}", batch.len(), started.elapsed());
                Ok(())
            })
        })
    }

    /// Writes leaf chunks together with their block arrays.
    pub fn put_leaves(&self, store: &ChunkStore, leaves: &[(Chunk, BlockArray)]) -> StoreResult<()> {
        self.pool.install(|| {
            fork_join(
                leaves,
                self.config.chunk_threshold,
                &|_| 1,
                &|batch: &[(Chunk, BlockArray)]| {
                    let started = Instant::now();
                    store.write(|w| {
                        batch
                            .iter()
                            .try_for_each(|(chunk, blocks)| w.put_leaf(chunk, blocks))
                    })?;
                    debug!("Wrote {} leaves in {:?}", batch.len(), started.elapsed());
                    Ok(())
                },
            )
        })
    }

    /// Patches grouped blocks into their chunks' arrays.
    ///
    /// Each leaf batch leases its chunks, then reads, patches and writes
    /// every array of the batch in one transaction.
    pub fn put_blocks(&self, store: &ChunkStore, groups: &ChunkGroups<Vec<Block>>) -> StoreResult<()> {
        self.update_groups(store, groups, |_, blocks, array| {
            for block in blocks {
                array.set_block(block);
            }
        })
    }

    /// Applies `f` to the block array of every chunk in `groups`.
    pub fn update_block_arrays<F>(&self, store: &ChunkStore, groups: &ChunkGroups<()>, f: F) -> StoreResult<()>
    where
        F: Fn(&Chunk, &mut BlockArray) + Sync,
    {
        self.update_groups(store, groups, |chunk, (), array| f(chunk, array))
    }

    fn update_groups<T, F>(&self, store: &ChunkStore, groups: &ChunkGroups<T>, f: F) -> StoreResult<()>
    where
        T: GroupWeight + Sync,
        F: Fn(&Chunk, &T, &mut BlockArray) + Sync,
    {
        let entries = groups.entries();
        self.pool.install(|| {
            fork_join(
                &entries,
                self.config.block_threshold,
                &|(chunk, payload)| payload.weight(chunk),
                &|batch: &[(&Chunk, &T)]| {
                    let started = Instant::now();
                    let ids: Vec<ChunkId> = batch.iter().map(|(chunk, _)| chunk.id).collect();
                    let _lease = store.lease_many(&ids);
                    store.write(|w| {
                        for &(chunk, payload) in batch {
                            let mut array = w.block_array(chunk)?;
                            f(chunk, payload, &mut array);
                            w.put_block_array(chunk.id, &array)?;
                        }
                        Ok(())
                    })?;
                    debug!("Updated {} block arrays in {:?}", batch.len(), started.elapsed());
                    Ok(())
                },
            )
        })
    }
}

/// Weight of one chunk group when splitting block work.
trait GroupWeight {
    fn weight(&self, chunk: &Chunk) -> usize;
}

impl GroupWeight for Vec<Block> {
    fn weight(&self, _chunk: &Chunk) -> usize {
        self.len()
    }
}

impl GroupWeight for () {
    fn weight(&self, chunk: &Chunk) -> usize {
        chunk.region.volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::properties::BlockProperties;
    use delve_common::{MapId, MaterialId, Region};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const MAP: MapId = MapId::new(3);

    fn open() -> (TempDir, ChunkStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = ChunkStore::open(dir.path().join("bulk.redb")).expect("open store");
        (dir, store)
    }

    fn writer(chunk_threshold: usize, block_threshold: usize) -> BulkWriter {
        BulkWriter::new(BulkConfig {
            chunk_threshold,
            block_threshold,
            workers: 4,
        })
        .expect("pool")
    }

    fn leaves(count: u64) -> Vec<Chunk> {
        (1..=count)
            .map(|id| Chunk::new(ChunkId::from_raw(id), Region::cube(MAP, [id as i32 * 2, 0, 0], 2)))
            .collect()
    }

    #[test]
    fn test_fork_join_visits_every_item_once() {
        let items: Vec<usize> = (0..1000).collect();
        let visited = AtomicUsize::new(0);
        let batches = AtomicUsize::new(0);
        fork_join(&items, 64, &|_| 1, &|batch: &[usize]| {
            assert!(batch.len() < 64);
            visited.fetch_add(batch.iter().sum(), Ordering::Relaxed);
            batches.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .expect("run");
        assert_eq!(visited.into_inner(), items.iter().sum());
        assert!(batches.into_inner() >= 1000 / 64);
    }

    #[test]
    fn test_fork_join_below_threshold_is_one_batch() {
        let items = [1, 2, 3];
        let batches = AtomicUsize::new(0);
        fork_join(&items, 8192, &|_| 1, &|_: &[i32]| {
            batches.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .expect("run");
        assert_eq!(batches.into_inner(), 1);
    }

    #[test]
    fn test_fork_join_empty_input() {
        let items: [u8; 0] = [];
        fork_join(&items, 1, &|_| 1, &|_: &[u8]| panic!("no batch expected")).expect("run");
    }

    #[test]
    fn test_fork_join_joins_siblings_before_error() {
        let items: Vec<usize> = (0..100).collect();
        let visited = AtomicUsize::new(0);
        let result = fork_join(&items, 10, &|_| 1, &|batch: &[usize]| {
            visited.fetch_add(batch.len(), Ordering::Relaxed);
            if batch.contains(&0) {
                return Err(StoreError::ChunkNotFound(ChunkId::from_raw(0)));
            }
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::ChunkNotFound(_))));
        assert_eq!(visited.into_inner(), 100);
    }

    #[test]
    fn test_put_chunks_splits_and_persists() {
        let (_dir, store) = open();
        let chunks = leaves(50);
        writer(8, 1024).put_chunks(&store, &chunks).expect("bulk put");

        let reader = store.reader().expect("reader");
        assert_eq!(reader.chunk_count().expect("count"), 50);
        assert_eq!(reader.block_array_count().expect("count"), 50);
        assert_eq!(reader.get_chunk(ChunkId::from_raw(17)).expect("get"), chunks[16]);
    }

    #[test]
    fn test_put_leaves_writes_arrays() {
        let (_dir, store) = open();
        let input: Vec<(Chunk, BlockArray)> = leaves(6)
            .into_iter()
            .map(|chunk| {
                let mut array = BlockArray::zeroed(chunk.region);
                for record in array.records_mut() {
                    record.set_material(Some(MaterialId::new(4)));
                }
                (chunk, array)
            })
            .collect();
        writer(2, 1024).put_leaves(&store, &input).expect("bulk put");

        for (chunk, _) in &input {
            let block = store.get_block(chunk, chunk.region.start()).expect("block");
            assert_eq!(block.material, Some(MaterialId::new(4)));
        }
    }

    #[test]
    fn test_put_blocks_grouped_by_chunk() {
        let (_dir, store) = open();
        let chunks = leaves(8);
        let bulk = writer(8192, 4);
        bulk.put_chunks(&store, &chunks).expect("chunks");

        let mut groups = ChunkGroups::new();
        for chunk in &chunks {
            for position in chunk.region.points() {
                let mut block = Block::new(chunk.id, position);
                block.material = Some(MaterialId::new(chunk.id.raw() as u16));
                block.properties = BlockProperties::FILLED;
                groups.push_block(chunk, block);
            }
        }
        assert_eq!(groups.len(), 8);
        assert_eq!(groups.block_count(), 64);
        bulk.put_blocks(&store, &groups).expect("blocks");

        for chunk in &chunks {
            store
                .with_block_read_buffer(chunk, |array| {
                    assert!(array
                        .records()
                        .iter()
                        .all(|r| r.material() == Some(MaterialId::new(chunk.id.raw() as u16))));
                })
                .expect("read");
        }
    }

    #[test]
    fn test_update_block_arrays() {
        let (_dir, store) = open();
        let chunks = leaves(5);
        let bulk = writer(8192, 8);
        bulk.put_chunks(&store, &chunks).expect("chunks");

        let groups: ChunkGroups<()> = chunks.iter().cloned().collect();
        bulk.update_block_arrays(&store, &groups, |_, array| {
            for record in array.records_mut() {
                record.set_properties(record.properties() | BlockProperties::VISIBLE);
            }
        })
        .expect("update");

        let block = store
            .get_block(&chunks[3], chunks[3].region.start())
            .expect("block");
        assert!(block.properties.contains(BlockProperties::VISIBLE));
    }

    #[test]
    fn test_put_blocks_missing_array_fails() {
        let (_dir, store) = open();
        let chunk = leaves(1).remove(0);
        let mut groups = ChunkGroups::new();
        groups.push_block(&chunk, Block::new(chunk.id, chunk.region.start()));
        let err = writer(8192, 1024)
            .put_blocks(&store, &groups)
            .expect_err("no array");
        assert!(matches!(err, StoreError::BlocksNotFound(_)));
    }

    #[test]
    fn test_groups_keep_one_entry_per_chunk() {
        let chunk = leaves(1).remove(0);
        let mut groups = ChunkGroups::new();
        assert!(groups.insert(chunk.clone(), 1).is_none());
        assert_eq!(groups.insert(chunk, 2), Some(1));
        assert_eq!(groups.len(), 1);
        let (_, payload) = groups.into_iter().next().expect("entry");
        assert_eq!(payload, 2);
    }

    #[test]
    #[should_panic(expected = "another chunk")]
    fn test_push_block_rejects_foreign_block() {
        let chunks = leaves(2);
        let mut groups = ChunkGroups::new();
        groups.push_block(&chunks[0], Block::new(chunks[1].id, chunks[1].region.start()));
    }
}
