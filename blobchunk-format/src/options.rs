use crate::block::{BlockSize, DEFAULT_BLOCK_BITS};
use crate::digest::HashAlgorithm;
use crate::error::{Error, Result};
use crate::inode::constants::CHUNK_FORMAT_BLKBITS_MASK;
use crate::inode::ChunkIndexFormat;

/// 1 MiB chunks.
pub const DEFAULT_CHUNK_BITS: u8 = 20;
pub const MAX_CHUNK_BITS: u8 = 31;

/// Options for a chunk store, fixed for the whole build.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StoreOptions {
    /// log2 of the image block size.
    pub block_bits: u8,
    /// log2 of the chunk size. Must not be smaller than `block_bits`.
    pub chunk_bits: u8,
    /// Encoding used for chunk indexes of inodes chunked by this store.
    pub index_format: ChunkIndexFormat,
    pub hash: HashAlgorithm,
    /// Written into indexed-format entries. Zero for single-device images.
    pub device_id: u16,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            block_bits: DEFAULT_BLOCK_BITS,
            chunk_bits: DEFAULT_CHUNK_BITS,
            index_format: ChunkIndexFormat::default(),
            hash: HashAlgorithm::default(),
            device_id: 0,
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_bits(mut self, block_bits: u8) -> Self {
        self.block_bits = block_bits;
        self
    }

    pub fn with_chunk_bits(mut self, chunk_bits: u8) -> Self {
        self.chunk_bits = chunk_bits;
        self
    }

    pub fn with_index_format(mut self, index_format: ChunkIndexFormat) -> Self {
        self.index_format = index_format;
        self
    }

    pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    pub fn with_device_id(mut self, device_id: u16) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn validate(&self) -> Result<BlockSize> {
        let block_size = BlockSize::new(self.block_bits)?;

        if self.chunk_bits < self.block_bits
            || self.chunk_bits > MAX_CHUNK_BITS
            || (self.chunk_bits - self.block_bits) as u16 > CHUNK_FORMAT_BLKBITS_MASK
        {
            return Err(Error::InvalidChunkBits {
                chunk_bits: self.chunk_bits,
                block_bits: self.block_bits,
            });
        }

        Ok(block_size)
    }
}
