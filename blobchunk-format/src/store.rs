//! The chunk store: digest table plus staging blob for one image build.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::chunker::{ChunkResolver, Chunker};
use crate::digest::ChunkDigest;
use crate::error::{Error, Result};
use crate::inode::ChunkedInode;
use crate::options::StoreOptions;
use crate::staging::BlobStaging;
use crate::table::{ChunkId, ChunkRecord, DigestTable, Lookup};

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct StoreStats {
    pub unique_chunks: u64,
    /// Bytes in the staging blob, padding included.
    pub staged_bytes: u64,
    /// Chunks resolved to an already staged record.
    pub hits: u64,
    /// Chunks that had to be staged.
    pub misses: u64,
}

impl StoreStats {
    /// Total chunks resolved, duplicates included.
    pub fn chunks(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Deduplicating chunk store.
///
/// Created once per build, fed every regular file through
/// [`BlobStore::chunk_file`], and finally consumed by
/// [`BlobStore::remap`], which moves the staged data into the image.
#[derive(Debug)]
pub struct BlobStore<S = File> {
    pub(crate) options: StoreOptions,
    pub(crate) chunker: Chunker,
    pub(crate) staging: BlobStaging<S>,
    pub(crate) table: DigestTable,
    pub(crate) stats: StoreStats,
}

impl BlobStore<File> {
    /// Creates a store staging into an anonymous temporary file.
    pub fn new(options: StoreOptions) -> Result<BlobStore<File>> {
        let chunker = Chunker::new(&options)?;
        let staging = BlobStaging::new(chunker.block_size())?;
        Ok(BlobStore::from_parts(options, chunker, staging))
    }
}

impl<S: Read + Write + Seek> BlobStore<S> {
    /// Creates a store staging into `sink`, which must be empty.
    pub fn with_sink(options: StoreOptions, sink: S) -> Result<BlobStore<S>> {
        let chunker = Chunker::new(&options)?;
        let staging = BlobStaging::with_sink(sink, chunker.block_size());
        Ok(BlobStore::from_parts(options, chunker, staging))
    }

    fn from_parts(options: StoreOptions, chunker: Chunker, staging: BlobStaging<S>) -> Self {
        tracing::debug!(
            block_size = chunker.block_size().get(),
            chunk_size = chunker.chunk_size(),
            format = %options.index_format,
            hash = %options.hash,
            "created chunk store"
        );

        BlobStore {
            options,
            chunker,
            staging,
            table: DigestTable::new(),
            stats: StoreStats::default(),
        }
    }

    #[inline(always)]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    #[inline(always)]
    pub fn chunker(&self) -> Chunker {
        self.chunker
    }

    #[inline(always)]
    pub fn table(&self) -> &DigestTable {
        &self.table
    }

    pub fn lookup(&self, digest: &ChunkDigest) -> Option<&ChunkRecord> {
        self.table.lookup(digest).map(|id| self.table.get(id))
    }

    /// Current length of the staging blob.
    #[inline(always)]
    pub fn staged_len(&self) -> u64 {
        self.staging.len()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Chunks `inode.size` bytes of `source`, see [`Chunker::chunk_file`].
    pub fn chunk_file<R: Read + ?Sized>(
        &mut self,
        inode: &mut ChunkedInode,
        source: &mut R,
    ) -> Result<()> {
        let chunker = self.chunker;
        chunker.chunk_file(self, inode, source)
    }

    pub fn chunk_path(&mut self, path: &Path) -> Result<ChunkedInode> {
        let chunker = self.chunker;
        chunker.chunk_path(self, path)
    }

    /// Looks `digest` up and stages `bytes` on a miss.
    ///
    /// The record is only inserted once the bytes are safely staged.
    pub fn resolve_chunk(&mut self, digest: ChunkDigest, bytes: &[u8]) -> Result<ChunkId> {
        let size = bytes.len() as u32;

        match self.table.lookup_or_reserve(digest) {
            Lookup::Hit(id) => {
                let existing = self.table.get(id).size;
                if existing != size {
                    return Err(Error::DigestCollision {
                        digest,
                        existing,
                        found: size,
                    });
                }

                tracing::trace!(%digest, size, "chunk already staged");
                self.stats.hits += 1;
                Ok(id)
            }
            Lookup::Vacant(slot) => {
                let staged_block = self.staging.append(bytes)?;
                let id = slot.commit(size, staged_block);

                self.stats.misses += 1;
                self.stats.unique_chunks += 1;
                self.stats.staged_bytes = self.staging.len();
                Ok(id)
            }
        }
    }
}

impl<S: Read + Write + Seek> ChunkResolver for BlobStore<S> {
    fn resolve(&mut self, digest: ChunkDigest, bytes: &[u8]) -> Result<ChunkId> {
        self.resolve_chunk(digest, bytes)
    }
}

/// Shared store: each resolution takes the lock for its lookup and append,
/// hashing and reading stay outside.
impl<S: Read + Write + Seek> ChunkResolver for &Mutex<BlobStore<S>> {
    fn resolve(&mut self, digest: ChunkDigest, bytes: &[u8]) -> Result<ChunkId> {
        self.lock().resolve_chunk(digest, bytes)
    }
}
