//! On-disk chunk index entries.
//!
//! All fields are little-endian. Indexed entries are 8 bytes:
//!
//! | offset | size | field      |
//! |--------|------|------------|
//! | 0      | 4    | blkaddr    |
//! | 4      | 2    | device id  |
//! | 6      | 2    | reserved   |
//!
//! Block-map entries are a bare 4-byte block address.

use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::block::{round_up, BlockAddr};
use crate::error::{Error, Result};
use crate::inode::ChunkIndexFormat;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ChunkIndexEntry {
    pub blkaddr: BlockAddr,
    /// Always zero in block-map indexes.
    pub device_id: u16,
}

impl ChunkIndexEntry {
    pub fn write<W: Write + ?Sized>(&self, format: ChunkIndexFormat, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.blkaddr)?;
        if format == ChunkIndexFormat::Indexes {
            w.write_u16::<LittleEndian>(self.device_id)?;
            w.write_u16::<LittleEndian>(0)?;
        }
        Ok(())
    }
}

/// Where an index requested at `offset` actually starts.
#[inline(always)]
pub fn index_offset(offset: u64, format: ChunkIndexFormat) -> u64 {
    round_up(offset, format.unit_size())
}

pub fn encode_chunk_index(entries: &[ChunkIndexEntry], format: ChunkIndexFormat) -> Result<Vec<u8>> {
    let len = entries.len() * format.unit_size() as usize;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|source| Error::OutOfMemory { size: len, source })?;

    for entry in entries {
        entry.write(format, &mut buf)?;
    }
    Ok(buf)
}

/// Decodes `count` entries from the start of `data`.
pub fn decode_chunk_index(
    mut data: &[u8],
    format: ChunkIndexFormat,
    count: usize,
) -> Result<Vec<ChunkIndexEntry>> {
    let needed = (count as u64).saturating_mul(format.unit_size());
    if (data.len() as u64) < needed {
        return Err(Error::ShortRead {
            offset: 0,
            expected: needed,
            actual: data.len() as u64,
        });
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let blkaddr = data.read_u32::<LittleEndian>()?;
        let device_id = match format {
            ChunkIndexFormat::Indexes => {
                let device_id = data.read_u16::<LittleEndian>()?;
                let _reserved = data.read_u16::<LittleEndian>()?;
                device_id
            }
            ChunkIndexFormat::BlockMap => 0,
        };
        entries.push(ChunkIndexEntry { blkaddr, device_id });
    }
    Ok(entries)
}
