//! Splits files into fixed-size chunks and resolves each one to a record.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::block::BlockSize;
use crate::digest::{ChunkDigest, HashAlgorithm};
use crate::error::{Error, Result};
use crate::inode::{ChunkFormat, ChunkIndexFormat, ChunkedInode, DataLayout};
use crate::options::StoreOptions;
use crate::table::ChunkId;

/// Resolves a hashed chunk to a record, staging its bytes on first sight.
///
/// Lookup, append and insert happen as one step per call, which is what makes
/// a shared resolver safe to use from several chunkers at once.
pub trait ChunkResolver {
    fn resolve(&mut self, digest: ChunkDigest, bytes: &[u8]) -> Result<ChunkId>;
}

impl<T: ChunkResolver + ?Sized> ChunkResolver for &mut T {
    fn resolve(&mut self, digest: ChunkDigest, bytes: &[u8]) -> Result<ChunkId> {
        (**self).resolve(digest, bytes)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Chunker {
    block_size: BlockSize,
    chunk_bits: u8,
    index_format: ChunkIndexFormat,
    hash: HashAlgorithm,
}

impl Chunker {
    pub fn new(options: &StoreOptions) -> Result<Chunker> {
        let block_size = options.validate()?;
        Ok(Chunker {
            block_size,
            chunk_bits: options.chunk_bits,
            index_format: options.index_format,
            hash: options.hash,
        })
    }

    #[inline(always)]
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    #[inline(always)]
    pub fn chunk_bits(&self) -> u8 {
        self.chunk_bits
    }

    #[inline(always)]
    pub fn chunk_size(&self) -> u64 {
        1 << self.chunk_bits
    }

    #[inline(always)]
    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    #[inline(always)]
    pub fn index_format(&self) -> ChunkIndexFormat {
        self.index_format
    }

    /// Number of chunks a file of `size` bytes splits into.
    pub fn chunk_count(&self, size: u64) -> u64 {
        size.div_ceil(self.chunk_size())
    }

    /// Chunks `inode.size` bytes of `source` into `resolver`.
    ///
    /// The inode is only updated when every chunk resolved; on error it is left
    /// as it was and must not be finalized as chunk-based.
    pub fn chunk_file<C, R>(
        &self,
        resolver: &mut C,
        inode: &mut ChunkedInode,
        source: &mut R,
    ) -> Result<()>
    where
        C: ChunkResolver + ?Sized,
        R: Read + ?Sized,
    {
        let size = inode.size;
        let chunk_size = self.chunk_size();
        let count = self.chunk_count(size);

        let mut chunks = Vec::new();
        chunks
            .try_reserve_exact(count as usize)
            .map_err(|source| Error::OutOfMemory {
                size: count as usize * std::mem::size_of::<ChunkId>(),
                source,
            })?;

        let buf_len = chunk_size.min(size) as usize;
        let mut buf = Vec::new();
        buf.try_reserve_exact(buf_len)
            .map_err(|source| Error::OutOfMemory {
                size: buf_len,
                source,
            })?;
        buf.resize(buf_len, 0);

        let mut pos = 0;
        while pos < size {
            let len = (size - pos).min(chunk_size) as usize;
            let chunk = &mut buf[..len];
            read_chunk(source, chunk, pos)?;

            let digest = self.hash.digest(chunk);
            chunks.push(resolver.resolve(digest, chunk)?);
            pos += len as u64;
        }

        inode.chunk_format = ChunkFormat::new(self.index_format, self.chunk_bits, self.block_size);
        inode.index_size = count * self.index_format.unit_size();
        inode.layout = DataLayout::ChunkBased;
        inode.chunks = chunks;
        Ok(())
    }

    /// Opens `path`, measures it and chunks it into a new inode.
    pub fn chunk_path<C>(&self, resolver: &mut C, path: &Path) -> Result<ChunkedInode>
    where
        C: ChunkResolver + ?Sized,
    {
        let mut file = File::open(path)?;
        let mut inode = ChunkedInode::new(file.metadata()?.len());
        self.chunk_file(resolver, &mut inode, &mut file)?;
        Ok(inode)
    }
}

fn read_chunk<R: Read + ?Sized>(source: &mut R, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::ShortRead {
                    offset,
                    expected: buf.len() as u64,
                    actual: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
