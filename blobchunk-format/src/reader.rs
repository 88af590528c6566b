//! Reading chunk-based files back out of a finished image.

use std::io::Write;

use crate::block::BlockSize;
use crate::error::{Error, Result};
use crate::index::{decode_chunk_index, index_offset, ChunkIndexEntry};
use crate::inode::ChunkIndexFormat;

/// Decodes the index of a file of `size` bytes stored at `offset` in `image`.
pub fn read_chunk_index(
    image: &[u8],
    offset: u64,
    format: ChunkIndexFormat,
    size: u64,
    chunk_bits: u8,
) -> Result<Vec<ChunkIndexEntry>> {
    let start = index_offset(offset, format);
    let count = chunk_count(size, chunk_bits)?;
    let expected = count.saturating_mul(format.unit_size());
    let data = match image.get(start as usize..) {
        Some(data) => data,
        None => {
            return Err(Error::ShortRead {
                offset: start,
                expected,
                actual: 0,
            })
        }
    };
    let count = usize::try_from(count).map_err(|_| Error::ShortRead {
        offset: start,
        expected,
        actual: data.len() as u64,
    })?;
    decode_chunk_index(data, format, count)
}

/// Writes the `size` bytes of a chunk-based file to `out`, returning the
/// number of bytes written.
pub fn read_chunked<W: Write + ?Sized>(
    image: &[u8],
    entries: &[ChunkIndexEntry],
    size: u64,
    chunk_bits: u8,
    block_size: BlockSize,
    out: &mut W,
) -> Result<u64> {
    let count = chunk_count(size, chunk_bits)?;
    if (entries.len() as u64) < count {
        return Err(Error::IndexTooShort {
            expected: count,
            found: entries.len() as u64,
        });
    }

    let chunk_size = 1u64 << chunk_bits;
    let mut pos = 0;
    for entry in &entries[..count as usize] {
        let len = (size - pos).min(chunk_size);
        let start = block_size.byte_offset(entry.blkaddr);
        let end = start + len;
        if end > image.len() as u64 {
            return Err(Error::ShortRead {
                offset: start,
                expected: len,
                actual: (image.len() as u64).saturating_sub(start),
            });
        }

        out.write_all(&image[start as usize..end as usize])?;
        pos += len;
    }
    Ok(pos)
}

fn chunk_count(size: u64, chunk_bits: u8) -> Result<u64> {
    let chunk_size = 1u64
        .checked_shl(chunk_bits as u32)
        .ok_or(Error::ChunkBitsTooLarge(chunk_bits))?;
    Ok(size.div_ceil(chunk_size))
}
