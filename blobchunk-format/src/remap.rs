//! Moving staged chunks into the image and writing final chunk indexes.

use std::io::{Read, Seek, Write};

use crate::block::{BlockAddr, BlockSize};
use crate::error::{Error, Result};
use crate::image::ImageSink;
use crate::index::{self, ChunkIndexEntry};
use crate::inode::ChunkedInode;
use crate::options::StoreOptions;
use crate::store::{BlobStore, StoreStats};
use crate::table::{ChunkId, ChunkRecord, DigestTable};

impl<S: Read + Write + Seek> BlobStore<S> {
    /// Copies the staging blob into a data region of `image` and freezes the
    /// table.
    ///
    /// Every staged block address is shifted by the region's block address;
    /// chunk indexes can only be written after this, through the returned
    /// [`RemappedStore`].
    pub fn remap<I: ImageSink + ?Sized>(self, image: &mut I) -> Result<RemappedStore> {
        let BlobStore {
            options,
            chunker,
            staging,
            table,
            stats,
        } = self;

        let base = staging.relocate(image)?;

        tracing::info!(
            base,
            unique_chunks = stats.unique_chunks,
            hits = stats.hits,
            "remapped chunk store"
        );

        Ok(RemappedStore {
            options,
            block_size: chunker.block_size(),
            table,
            base,
            stats,
        })
    }
}

/// Chunk store after its data has been placed in the image.
#[derive(Debug)]
pub struct RemappedStore {
    options: StoreOptions,
    block_size: BlockSize,
    table: DigestTable,
    base: BlockAddr,
    stats: StoreStats,
}

impl RemappedStore {
    /// Block address of the relocated blob's first block.
    #[inline(always)]
    pub fn base(&self) -> BlockAddr {
        self.base
    }

    #[inline(always)]
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    pub fn record(&self, id: ChunkId) -> &ChunkRecord {
        self.table.get(id)
    }

    /// Absolute block address of a chunk in the image.
    pub fn block_addr(&self, id: ChunkId) -> Result<BlockAddr> {
        let staged = self.table.get(id).staged_block;
        staged
            .checked_add(self.base)
            .ok_or(Error::AddressOverflow(staged as u64 + self.base as u64))
    }

    pub fn chunk_index(&self, inode: &ChunkedInode) -> Result<Vec<ChunkIndexEntry>> {
        if !inode.is_chunk_based() {
            return Err(Error::NotChunked(inode.size));
        }

        inode
            .chunks()
            .iter()
            .map(|&id| {
                Ok(ChunkIndexEntry {
                    blkaddr: self.block_addr(id)?,
                    device_id: self.options.device_id,
                })
            })
            .collect()
    }

    /// Serializes the inode's index in the format its chunk format selects.
    pub fn encode_chunk_index(&self, inode: &ChunkedInode) -> Result<Vec<u8>> {
        let entries = self.chunk_index(inode)?;
        index::encode_chunk_index(&entries, inode.chunk_format.index_format())
    }

    /// Writes the inode's index at `offset`, rounded up to the entry size,
    /// and returns where it was written.
    pub fn write_chunk_index<I: ImageSink + ?Sized>(
        &self,
        inode: &ChunkedInode,
        image: &mut I,
        offset: u64,
    ) -> Result<u64> {
        let format = inode.chunk_format.index_format();
        let offset = index::index_offset(offset, format);
        let buf = self.encode_chunk_index(inode)?;

        let written = image.write_at(offset, &buf)?;
        if written < buf.len() {
            return Err(Error::ShortWrite {
                offset,
                expected: buf.len() as u64,
                written: written as u64,
            });
        }

        tracing::trace!(
            offset = format_args!("{:#x}", offset),
            entries = inode.chunk_count(),
            %format,
            "wrote chunk index"
        );
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Area, ImageFile};
    use crate::index::decode_chunk_index;
    use crate::inode::ChunkIndexFormat;
    use std::io::Cursor;

    fn store(format: ChunkIndexFormat) -> BlobStore<Cursor<Vec<u8>>> {
        let options = StoreOptions::new()
            .with_chunk_bits(12)
            .with_index_format(format)
            .with_device_id(3);
        BlobStore::with_sink(options, Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn addresses_are_shifted_by_base() {
        let mut store = store(ChunkIndexFormat::Indexes);
        let data: Vec<u8> = (0..3 * 4096u32).map(|x| (x / 4096) as u8).collect();
        let mut inode = ChunkedInode::new(data.len() as u64);
        store.chunk_file(&mut inode, &mut Cursor::new(&data)).unwrap();

        let mut image = ImageFile::with_start(Cursor::new(Vec::new()), 5 * 4096);
        let remapped = store.remap(&mut image).unwrap();
        assert_eq!(remapped.base(), 5);

        let addrs: Vec<_> = inode
            .chunks()
            .iter()
            .map(|&id| remapped.block_addr(id).unwrap())
            .collect();
        assert_eq!(addrs, vec![5, 6, 7]);
    }

    #[test]
    fn written_index_decodes_to_absolute_addresses() {
        let mut store = store(ChunkIndexFormat::Indexes);
        let mut inode = ChunkedInode::new(4097);
        store
            .chunk_file(&mut inode, &mut Cursor::new(vec![1u8; 4097]))
            .unwrap();

        let mut image = ImageFile::new(Cursor::new(Vec::new()));
        let remapped = store.remap(&mut image).unwrap();

        // One spare entry so the rounded-up index still fits.
        let region = image.allocate(Area::Meta, inode.index_size + 8, 8).unwrap();
        let start = remapped.write_chunk_index(&inode, &mut image, region + 1).unwrap();
        assert_eq!(start, region + 8);

        let bytes = image.into_inner().into_inner();
        let entries = decode_chunk_index(&bytes[start as usize..], ChunkIndexFormat::Indexes, 2).unwrap();
        assert_eq!(
            entries,
            vec![
                ChunkIndexEntry {
                    blkaddr: 0,
                    device_id: 3
                },
                ChunkIndexEntry {
                    blkaddr: 1,
                    device_id: 3
                },
            ]
        );
    }

    #[test]
    fn unchunked_inode_is_rejected() {
        let store = store(ChunkIndexFormat::BlockMap);
        let mut image = ImageFile::new(Cursor::new(Vec::new()));
        let remapped = store.remap(&mut image).unwrap();
        assert!(matches!(
            remapped.encode_chunk_index(&ChunkedInode::new(10)),
            Err(Error::NotChunked(10))
        ));
    }

    #[test]
    fn short_index_write_is_reported() {
        let mut store = store(ChunkIndexFormat::BlockMap);
        let mut inode = ChunkedInode::new(8192);
        let data: Vec<u8> = (0..8192u32).map(|x| (x >> 12) as u8).collect();
        store.chunk_file(&mut inode, &mut Cursor::new(&data)).unwrap();

        let mut buf = vec![0u8; 8192 + 6];
        let mut image = ImageFile::new(Cursor::new(&mut buf[..]));
        let remapped = store.remap(&mut image).unwrap();
        let err = remapped
            .write_chunk_index(&inode, &mut image, 8192)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ShortWrite {
                offset: 8192,
                expected: 8,
                written: 6
            }
        ));
    }
}
