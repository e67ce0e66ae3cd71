//! Chunk store backed by an embedded ordered key-value engine.
//!
//! Tables:
//! - `chunks`: chunk ID → one chunk record
//! - `blocks`: chunk ID → the whole block array of a leaf chunk
//! - `maps`: map ID → game map descriptor
//! - `meta`: format record
//!
//! Every put runs in exactly one write transaction, so readers never see a
//! chunk record without its reserved block array or a half-patched array.
//! Block-array read-modify-write additionally holds the chunk's
//! [`ChunkLease`], which serializes writers of the same chunk while writers
//! of different chunks only contend on the engine's commit.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};
use delve_common::{ChunkId, FormatVersion, MagicBytes, MapId, Point};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableTable, Table, TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::block::{record_at, Block, BlockArray, BLOCK_RECORD_SIZE};
use crate::chunk::{Chunk, CHUNK_RECORD_SIZE};
use crate::error::{StoreError, StoreResult};
use crate::map::GameMap;

const CHUNKS: TableDefinition<u64, &[u8]> = TableDefinition::new("chunks");
const BLOCKS: TableDefinition<u64, &[u8]> = TableDefinition::new("blocks");
const MAPS: TableDefinition<u32, &[u8]> = TableDefinition::new("maps");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const FORMAT_KEY: &str = "format";

/// Number of lock stripes guarding block arrays.
const LEASE_STRIPES: usize = 256;

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page cache size in bytes
    pub cache_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_size: 64 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct FormatRecord {
    magic: [u8; 4],
    version: [u8; 4],
    chunk_record_size: [u8; 4],
    block_record_size: [u8; 4],
}

impl FormatRecord {
    fn current() -> Self {
        Self {
            magic: MagicBytes::STORE.0,
            version: FormatVersion::STORE.to_u32().to_le_bytes(),
            chunk_record_size: (CHUNK_RECORD_SIZE as u32).to_le_bytes(),
            block_record_size: (BLOCK_RECORD_SIZE as u32).to_le_bytes(),
        }
    }

    fn validate(bytes: &[u8]) -> StoreResult<()> {
        let record: Self = bytemuck::try_pod_read_unaligned(bytes)
            .map_err(|_| StoreError::IncompatibleFormat("malformed format record".into()))?;
        if record.magic != MagicBytes::STORE.0 {
            return Err(StoreError::IncompatibleFormat("bad magic bytes".into()));
        }
        let version = FormatVersion::from_u32(u32::from_le_bytes(record.version));
        if !FormatVersion::STORE.can_read(&version) {
            return Err(StoreError::IncompatibleFormat(format!(
                "store version {version}, supported {}",
                FormatVersion::STORE
            )));
        }
        let chunk_size = u32::from_le_bytes(record.chunk_record_size) as usize;
        let block_size = u32::from_le_bytes(record.block_record_size) as usize;
        if chunk_size != CHUNK_RECORD_SIZE || block_size != BLOCK_RECORD_SIZE {
            return Err(StoreError::IncompatibleFormat(format!(
                "record sizes {chunk_size}/{block_size}, expected {CHUNK_RECORD_SIZE}/{BLOCK_RECORD_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Counters describing store traffic.
#[derive(Debug, Default)]
pub struct StoreStats {
    chunks_written: AtomicU64,
    block_arrays_written: AtomicU64,
    bytes_written: AtomicU64,
    lookups: AtomicU64,
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Chunk records written
    pub chunks_written: u64,
    /// Block arrays written (reservations included)
    pub block_arrays_written: u64,
    /// Value bytes written
    pub bytes_written: u64,
    /// Point lookups served
    pub lookups: u64,
}

impl StoreStats {
    fn record_chunk(&self) {
        self.chunks_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add(CHUNK_RECORD_SIZE as u64, Ordering::Relaxed);
    }

    fn record_block_array(&self, len: usize) {
        self.block_arrays_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            block_arrays_written: self.block_arrays_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive write access to one chunk's block array.
///
/// Obtained from [`ChunkStore::lease`]. Stripes are re-entrant, so the
/// holder may call the store's block writes for any chunk on its own thread.
/// A thread must not hold two leases at once unless they were acquired
/// together through [`ChunkStore::lease_many`].
pub struct ChunkLease<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
}

/// Exclusive write access to a set of chunks, acquired in stripe order.
pub struct MultiLease<'a> {
    _guards: Vec<ReentrantMutexGuard<'a, ()>>,
}

struct LeaseTable {
    stripes: Box<[ReentrantMutex<()>]>,
}

impl LeaseTable {
    fn new() -> Self {
        Self {
            stripes: (0..LEASE_STRIPES).map(|_| ReentrantMutex::new(())).collect(),
        }
    }

    fn stripe(id: ChunkId) -> usize {
        // Fibonacci hashing spreads sequential IDs across stripes.
        (id.raw().wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 56) as usize % LEASE_STRIPES
    }

    fn lease(&self, id: ChunkId) -> ChunkLease<'_> {
        ChunkLease {
            _guard: self.stripes[Self::stripe(id)].lock(),
        }
    }

    fn lease_many(&self, ids: &[ChunkId]) -> MultiLease<'_> {
        let mut stripes: Vec<usize> = ids.iter().map(|&id| Self::stripe(id)).collect();
        stripes.sort_unstable();
        stripes.dedup();
        MultiLease {
            _guards: stripes.into_iter().map(|s| self.stripes[s].lock()).collect(),
        }
    }
}

/// Persistent chunk and block storage.
pub struct ChunkStore {
    db: Database,
    path: PathBuf,
    leases: LeaseTable,
    stats: StoreStats,
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("path", &self.path)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl ChunkStore {
    /// Opens (or creates) a store with the default configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::open_with(path, &StoreConfig::default())
    }

    /// Opens (or creates) a store.
    ///
    /// A new store gets a format record; an existing one must carry a
    /// compatible record or [`StoreError::IncompatibleFormat`] is returned.
    pub fn open_with<P: AsRef<Path>>(path: P, config: &StoreConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut builder = Database::builder();
        builder.set_cache_size(config.cache_size);
        let db = builder.create(&path)?;

        let txn = db.begin_write()?;
        {
            txn.open_table(CHUNKS)?;
            txn.open_table(BLOCKS)?;
            txn.open_table(MAPS)?;
            let mut meta = txn.open_table(META)?;
            let existing = meta.get(FORMAT_KEY)?.map(|g| g.value().to_vec());
            match existing {
                Some(bytes) => FormatRecord::validate(&bytes)?,
                None => {
                    debug!("Writing format record {}", FormatVersion::STORE);
                    meta.insert(FORMAT_KEY, bytemuck::bytes_of(&FormatRecord::current()))?;
                },
            }
        }
        txn.commit()?;

        info!("Opened chunk store at {}", path.display());
        Ok(Self {
            db,
            path,
            leases: LeaseTable::new(),
            stats: StoreStats::default(),
        })
    }

    /// Returns the store file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns traffic counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Starts a read burst over one consistent snapshot.
    pub fn reader(&self) -> StoreResult<StoreReader<'_>> {
        StoreReader::new(self.db.begin_read()?, &self.stats)
    }

    /// Acquires exclusive block-array access to one chunk.
    pub fn lease(&self, id: ChunkId) -> ChunkLease<'_> {
        self.leases.lease(id)
    }

    /// Acquires exclusive block-array access to several chunks at once.
    pub fn lease_many(&self, ids: &[ChunkId]) -> MultiLease<'_> {
        self.leases.lease_many(ids)
    }

    /// Runs `f` inside one write transaction and commits.
    ///
    /// If `f` fails the transaction is dropped and nothing is written.
    pub fn write<R>(&self, f: impl FnOnce(&mut StoreWriter<'_>) -> StoreResult<R>) -> StoreResult<R> {
        let txn = self.db.begin_write()?;
        let result = {
            let mut writer = StoreWriter::new(&txn, &self.stats)?;
            f(&mut writer)?
        };
        txn.commit()?;
        Ok(result)
    }

    /// Writes a chunk record, reserving a zeroed block array for new leaves.
    pub fn put_chunk(&self, chunk: &Chunk) -> StoreResult<()> {
        self.write(|w| w.put_chunk(chunk))
    }

    /// Writes a leaf chunk together with its block array.
    pub fn put_leaf(&self, chunk: &Chunk, blocks: &BlockArray) -> StoreResult<()> {
        self.write(|w| w.put_leaf(chunk, blocks))
    }

    /// Looks up a chunk.
    pub fn get_chunk(&self, id: ChunkId) -> StoreResult<Chunk> {
        self.reader()?.get_chunk(id)
    }

    /// Looks up a chunk, returning `None` when absent.
    pub fn find_chunk(&self, id: ChunkId) -> StoreResult<Option<Chunk>> {
        self.reader()?.find_chunk(id)
    }

    /// Reads one block of a leaf chunk.
    pub fn get_block(&self, chunk: &Chunk, position: Point) -> StoreResult<Block> {
        self.reader()?.get_block(chunk, position)
    }

    /// Patches one block into its chunk's array.
    pub fn put_block(&self, chunk: &Chunk, block: &Block) -> StoreResult<()> {
        self.put_blocks(chunk, std::slice::from_ref(block))
    }

    /// Patches several blocks of one chunk with a single read and write.
    ///
    /// # Panics
    ///
    /// Panics if a block belongs to another chunk or lies outside its region.
    pub fn put_blocks(&self, chunk: &Chunk, blocks: &[Block]) -> StoreResult<()> {
        for block in blocks {
            assert_eq!(block.chunk, chunk.id, "block belongs to another chunk");
        }
        self.with_block_buffer(chunk, |array| {
            for block in blocks {
                array.set_block(block);
            }
        })
    }

    /// Hands the chunk's block array to `f`, then persists it.
    ///
    /// Holds the chunk's lease for the whole read-modify-write. Writes that
    /// `f` makes to the same chunk through the store are overwritten when
    /// the array is persisted.
    pub fn with_block_buffer<R>(&self, chunk: &Chunk, f: impl FnOnce(&mut BlockArray) -> R) -> StoreResult<R> {
        let _lease = self.lease(chunk.id);
        let mut array = self.reader()?.block_array(chunk)?;
        let result = f(&mut array);
        self.write(|w| w.put_block_array(chunk.id, &array))?;
        Ok(result)
    }

    /// Hands the chunk's block array to `f` without writing it back.
    pub fn with_block_read_buffer<R>(&self, chunk: &Chunk, f: impl FnOnce(&BlockArray) -> R) -> StoreResult<R> {
        let array = self.reader()?.block_array(chunk)?;
        Ok(f(&array))
    }

    /// Visits every chunk record in ID order.
    pub fn for_each_chunk(&self, f: impl FnMut(Chunk) -> StoreResult<()>) -> StoreResult<()> {
        self.reader()?.for_each_chunk(f)
    }

    /// Writes a map descriptor.
    pub fn put_map(&self, map: &GameMap) -> StoreResult<()> {
        self.write(|w| w.put_map(map))
    }

    /// Looks up a map descriptor.
    pub fn get_map(&self, id: MapId) -> StoreResult<GameMap> {
        self.reader()?.get_map(id)
    }
}

/// Tables of one open write transaction.
pub struct StoreWriter<'txn> {
    chunks: Table<'txn, u64, &'static [u8]>,
    blocks: Table<'txn, u64, &'static [u8]>,
    maps: Table<'txn, u32, &'static [u8]>,
    stats: &'txn StoreStats,
}

impl<'txn> StoreWriter<'txn> {
    fn new(txn: &'txn WriteTransaction, stats: &'txn StoreStats) -> StoreResult<Self> {
        Ok(Self {
            chunks: txn.open_table(CHUNKS)?,
            blocks: txn.open_table(BLOCKS)?,
            maps: txn.open_table(MAPS)?,
            stats,
        })
    }

    /// Writes a chunk record, reserving a zeroed block array for new leaves.
    pub fn put_chunk(&mut self, chunk: &Chunk) -> StoreResult<()> {
        trace!("put chunk {} {}", chunk.id, chunk.region);
        self.chunks.insert(chunk.id.raw(), chunk.to_bytes().as_slice())?;
        self.stats.record_chunk();
        if chunk.is_leaf() && self.blocks.get(chunk.id.raw())?.is_none() {
            let reserved = BlockArray::zeroed(chunk.region);
            self.put_block_array(chunk.id, &reserved)?;
        }
        Ok(())
    }

    /// Writes a leaf chunk together with its block array.
    ///
    /// # Panics
    ///
    /// Panics if the chunk has children or the array covers another region.
    pub fn put_leaf(&mut self, chunk: &Chunk, blocks: &BlockArray) -> StoreResult<()> {
        assert!(chunk.is_leaf(), "chunk {} is not a leaf", chunk.id);
        assert_eq!(blocks.region(), chunk.region, "block array region mismatch");
        self.chunks.insert(chunk.id.raw(), chunk.to_bytes().as_slice())?;
        self.stats.record_chunk();
        self.put_block_array(chunk.id, blocks)
    }

    /// Replaces a chunk's whole block array.
    pub fn put_block_array(&mut self, id: ChunkId, blocks: &BlockArray) -> StoreResult<()> {
        self.blocks.insert(id.raw(), blocks.as_bytes())?;
        self.stats.record_block_array(blocks.as_bytes().len());
        Ok(())
    }

    /// Reads a chunk's block array as seen by this transaction.
    pub fn block_array(&self, chunk: &Chunk) -> StoreResult<BlockArray> {
        let bytes = self
            .blocks
            .get(chunk.id.raw())?
            .map(|g| g.value().to_vec())
            .ok_or(StoreError::BlocksNotFound(chunk.id))?;
        BlockArray::from_bytes(chunk.region, bytes)
    }

    /// Writes a map descriptor.
    pub fn put_map(&mut self, map: &GameMap) -> StoreResult<()> {
        self.maps.insert(map.id.raw(), map.to_bytes().as_slice())?;
        Ok(())
    }
}

/// Read burst over one snapshot of the store.
///
/// Holding a reader keeps its snapshot alive; writes committed afterwards
/// are only visible to a new reader.
pub struct StoreReader<'a> {
    _txn: ReadTransaction,
    chunks: ReadOnlyTable<u64, &'static [u8]>,
    blocks: ReadOnlyTable<u64, &'static [u8]>,
    maps: ReadOnlyTable<u32, &'static [u8]>,
    stats: &'a StoreStats,
}

impl<'a> StoreReader<'a> {
    fn new(txn: ReadTransaction, stats: &'a StoreStats) -> StoreResult<Self> {
        Ok(Self {
            chunks: txn.open_table(CHUNKS)?,
            blocks: txn.open_table(BLOCKS)?,
            maps: txn.open_table(MAPS)?,
            _txn: txn,
            stats,
        })
    }

    /// Looks up a chunk, returning `None` when absent.
    pub fn find_chunk(&self, id: ChunkId) -> StoreResult<Option<Chunk>> {
        self.stats.record_lookup();
        match self.chunks.get(id.raw())? {
            Some(guard) => Chunk::from_bytes(guard.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Looks up a chunk.
    pub fn get_chunk(&self, id: ChunkId) -> StoreResult<Chunk> {
        self.find_chunk(id)?.ok_or(StoreError::ChunkNotFound(id))
    }

    /// Checks whether a block array exists for `id`.
    pub fn has_block_array(&self, id: ChunkId) -> StoreResult<bool> {
        Ok(self.blocks.get(id.raw())?.is_some())
    }

    /// Reads a chunk's whole block array.
    pub fn block_array(&self, chunk: &Chunk) -> StoreResult<BlockArray> {
        self.stats.record_lookup();
        let bytes = self
            .blocks
            .get(chunk.id.raw())?
            .map(|g| g.value().to_vec())
            .ok_or(StoreError::BlocksNotFound(chunk.id))?;
        BlockArray::from_bytes(chunk.region, bytes)
    }

    /// Reads one block without copying the whole array.
    ///
    /// # Panics
    ///
    /// Panics if `position` lies outside the chunk's region.
    pub fn get_block(&self, chunk: &Chunk, position: Point) -> StoreResult<Block> {
        self.stats.record_lookup();
        let index = chunk.region.index_of(position);
        let guard = self
            .blocks
            .get(chunk.id.raw())?
            .ok_or(StoreError::BlocksNotFound(chunk.id))?;
        let bytes = guard.value();
        let expected = chunk.region.volume() * BLOCK_RECORD_SIZE;
        if bytes.len() != expected {
            return Err(StoreError::corrupt(
                "block array",
                format!("chunk {} holds {} bytes, expected {expected}", chunk.id, bytes.len()),
            ));
        }
        Ok(Block::from_record(chunk.id, position, &record_at(bytes, index)))
    }

    /// Visits every chunk record in ID order, stopping at the first error.
    pub fn for_each_chunk(&self, mut f: impl FnMut(Chunk) -> StoreResult<()>) -> StoreResult<()> {
        for entry in self.chunks.iter()? {
            let (_, value) = entry?;
            f(Chunk::from_bytes(value.value())?)?;
        }
        Ok(())
    }

    /// Counts chunk records.
    pub fn chunk_count(&self) -> StoreResult<u64> {
        let mut count = 0;
        for entry in self.chunks.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Counts block arrays.
    pub fn block_array_count(&self) -> StoreResult<u64> {
        let mut count = 0;
        for entry in self.blocks.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Looks up a map descriptor.
    pub fn get_map(&self, id: MapId) -> StoreResult<GameMap> {
        match self.maps.get(id.raw())? {
            Some(guard) => GameMap::from_bytes(guard.value()),
            None => Err(StoreError::MapNotFound(id)),
        }
    }
}
