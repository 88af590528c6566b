use crate::digest::ChunkDigest;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot allocate {size} bytes for chunk buffer")]
    OutOfMemory {
        size: usize,
        #[source]
        source: std::collections::TryReserveError,
    },

    #[error("Source ended at byte {actual} of chunk at offset {offset:#x} (expected {expected} bytes)")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("Short write at offset {offset:#x}: {written} of {expected} bytes")]
    ShortWrite {
        offset: u64,
        expected: u64,
        written: u64,
    },

    #[error("Cannot append chunk to staging blob at offset {offset:#x}")]
    OutOfSpace {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Digest {digest} already staged with {existing} bytes, found again with {found} bytes")]
    DigestCollision {
        digest: ChunkDigest,
        existing: u32,
        found: u32,
    },

    #[error("Staging offset {offset:#x} is not aligned to {block_size}-byte blocks")]
    Unaligned { offset: u64, block_size: u64 },

    #[error("Chunk bits {chunk_bits} invalid for block bits {block_bits}")]
    InvalidChunkBits { chunk_bits: u8, block_bits: u8 },

    #[error("Chunk bits {0} too large for a 64-bit file size")]
    ChunkBitsTooLarge(u8),

    #[error("Block bits {0} outside supported range")]
    InvalidBlockBits(u8),

    #[error("Inode of {0} bytes has not been chunked")]
    NotChunked(u64),

    #[error("Chunk index holds {found} entries, file needs {expected}")]
    IndexTooShort { expected: u64, found: u64 },

    #[error("Block address {0:#x} does not fit in 32 bits")]
    AddressOverflow(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
