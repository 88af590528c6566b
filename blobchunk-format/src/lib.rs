//! Chunk deduplication for chunk-based read-only filesystem images.
//!
//! Regular files are split into fixed-size chunks. Each distinct chunk is
//! written once to a staging blob; once every file has been chunked the blob
//! is relocated into the image as a single data region and each file's chunk
//! index is written with absolute block addresses.
//!
//! ```no_run
//! # fn main() -> blobchunk_format::Result<()> {
//! use std::fs::File;
//! use blobchunk_format::{Area, BlobStore, ImageFile, ImageSink, StoreOptions};
//!
//! let mut store = BlobStore::new(StoreOptions::default())?;
//! let inode = store.chunk_path("some/file".as_ref())?;
//!
//! let mut image = ImageFile::with_start(File::create("out.img")?, 4096);
//! let store = store.remap(&mut image)?;
//!
//! let offset = image.allocate(Area::Meta, inode.index_size, 8)?;
//! store.write_chunk_index(&inode, &mut image, offset)?;
//! # Ok(())
//! # }
//! ```

mod block;
mod chunker;
mod digest;
mod error;
mod image;
pub mod index;
mod inode;
mod options;
pub mod reader;
mod remap;
mod staging;
mod store;
mod table;

pub use block::{round_up, BlockAddr, BlockSize, DEFAULT_BLOCK_BITS, MAX_BLOCK_BITS, MIN_BLOCK_BITS};
pub use chunker::{ChunkResolver, Chunker};
pub use digest::{ChunkDigest, ChunkHasher, HashAlgorithm, ParseHashAlgorithmError, DIGEST_SIZE};
pub use error::{Error, Result};
pub use image::{Area, ImageFile, ImageSink};
pub use index::{decode_chunk_index, encode_chunk_index, ChunkIndexEntry};
pub use inode::{
    constants, ChunkFormat, ChunkIndexFormat, ChunkedInode, DataLayout, ParseChunkIndexFormatError,
};
pub use options::{StoreOptions, DEFAULT_CHUNK_BITS, MAX_CHUNK_BITS};
pub use reader::{read_chunk_index, read_chunked};
pub use remap::RemappedStore;
pub use staging::BlobStaging;
pub use store::{BlobStore, StoreStats};
pub use table::{ChunkId, ChunkRecord, DigestTable, Lookup, Reservation};
