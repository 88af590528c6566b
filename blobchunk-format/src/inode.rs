//! Per-inode metadata touched by chunking and index serialization.

use std::fmt;
use std::str::FromStr;

use crate::block::BlockSize;
use crate::table::ChunkId;

pub mod constants {
    /// Low bits of the chunk format: `chunk_bits - block_bits`.
    pub const CHUNK_FORMAT_BLKBITS_MASK: u16 = 0x001f;
    /// Set when the index uses full chunk index entries instead of a block map.
    pub const CHUNK_FORMAT_INDEXES: u16 = 0x0020;

    /// Size of one indexed-format entry: blkaddr (u32), device id (u16), reserved (u16).
    pub const CHUNK_INDEX_ENTRY_SIZE: u64 = 8;
    /// Size of one block-map entry: blkaddr (u32).
    pub const BLOCK_MAP_ENTRY_SIZE: u64 = 4;
}

use self::constants::*;

/// Encoding of an inode's chunk index.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ChunkIndexFormat {
    /// One 8-byte entry per chunk, with room for a device id.
    #[default]
    Indexes,
    /// One 4-byte block address per chunk.
    BlockMap,
}

impl ChunkIndexFormat {
    pub const fn available_variants() -> &'static [&'static str] {
        &["indexes", "blockmap"]
    }

    /// Bytes per index entry.
    #[inline(always)]
    pub const fn unit_size(self) -> u64 {
        match self {
            ChunkIndexFormat::Indexes => CHUNK_INDEX_ENTRY_SIZE,
            ChunkIndexFormat::BlockMap => BLOCK_MAP_ENTRY_SIZE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChunkIndexFormat::Indexes => "indexes",
            ChunkIndexFormat::BlockMap => "blockmap",
        }
    }
}

impl fmt::Display for ChunkIndexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown chunk index format: {0}")]
pub struct ParseChunkIndexFormatError(String);

impl FromStr for ChunkIndexFormat {
    type Err = ParseChunkIndexFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indexes" | "indexed" => Ok(ChunkIndexFormat::Indexes),
            "blockmap" | "block-map" | "legacy" => Ok(ChunkIndexFormat::BlockMap),
            other => Err(ParseChunkIndexFormatError(other.to_string())),
        }
    }
}

/// The inode's chunk format word as stored on disk.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct ChunkFormat(u16);

impl ChunkFormat {
    /// `chunk_bits` must already be validated against `block_size`.
    pub fn new(format: ChunkIndexFormat, chunk_bits: u8, block_size: BlockSize) -> ChunkFormat {
        let mut value = (chunk_bits - block_size.bits()) as u16 & CHUNK_FORMAT_BLKBITS_MASK;
        if format == ChunkIndexFormat::Indexes {
            value |= CHUNK_FORMAT_INDEXES;
        }
        ChunkFormat(value)
    }

    pub const fn from_raw(value: u16) -> ChunkFormat {
        ChunkFormat(value)
    }

    #[inline(always)]
    pub fn get(self) -> u16 {
        self.0
    }

    pub fn index_format(self) -> ChunkIndexFormat {
        if self.0 & CHUNK_FORMAT_INDEXES != 0 {
            ChunkIndexFormat::Indexes
        } else {
            ChunkIndexFormat::BlockMap
        }
    }

    pub fn chunk_bits(self, block_size: BlockSize) -> u8 {
        block_size.bits() + (self.0 & CHUNK_FORMAT_BLKBITS_MASK) as u8
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum DataLayout {
    /// Not (yet) chunked.
    #[default]
    Plain,
    /// Data addressed through a chunk index.
    ChunkBased,
}

/// Inode state owned by the image builder and updated by the chunker.
#[derive(Debug, Clone, Default)]
pub struct ChunkedInode {
    /// File size in bytes, as measured before chunking.
    pub size: u64,
    pub chunk_format: ChunkFormat,
    /// Bytes reserved for the chunk index in the inode's metadata area.
    pub index_size: u64,
    pub layout: DataLayout,
    pub(crate) chunks: Vec<ChunkId>,
}

impl ChunkedInode {
    pub fn new(size: u64) -> ChunkedInode {
        ChunkedInode {
            size,
            ..Default::default()
        }
    }

    /// Chunk references in file order. Empty until chunking succeeds.
    pub fn chunks(&self) -> &[ChunkId] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_chunk_based(&self) -> bool {
        self.layout == DataLayout::ChunkBased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_format_roundtrips_fields() {
        let bs = BlockSize::default();
        let format = ChunkFormat::new(ChunkIndexFormat::Indexes, 20, bs);
        assert_eq!(format.get(), 0x20 | 8);
        assert_eq!(format.index_format(), ChunkIndexFormat::Indexes);
        assert_eq!(format.chunk_bits(bs), 20);

        let format = ChunkFormat::new(ChunkIndexFormat::BlockMap, 12, bs);
        assert_eq!(format.get(), 0);
        assert_eq!(format.index_format(), ChunkIndexFormat::BlockMap);
        assert_eq!(format.chunk_bits(bs), 12);
    }

    #[test]
    fn unit_sizes() {
        assert_eq!(ChunkIndexFormat::Indexes.unit_size(), 8);
        assert_eq!(ChunkIndexFormat::BlockMap.unit_size(), 4);
    }

    #[test]
    fn parse_formats() {
        assert_eq!(
            "legacy".parse::<ChunkIndexFormat>().unwrap(),
            ChunkIndexFormat::BlockMap
        );
        for name in ChunkIndexFormat::available_variants() {
            assert_eq!(name.parse::<ChunkIndexFormat>().unwrap().name(), *name);
        }
        assert!("extents".parse::<ChunkIndexFormat>().is_err());
    }
}
