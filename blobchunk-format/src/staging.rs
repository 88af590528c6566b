//! Append-only staging blob holding one copy of every unique chunk.
//!
//! Each chunk starts on a block boundary and short chunks are zero-padded to
//! the next one, so the blob can be relocated into the image as a whole and
//! addressed by block afterwards.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::block::{BlockAddr, BlockSize};
use crate::error::{Error, Result};
use crate::image::{Area, ImageSink};

const ZEROS: [u8; 4096] = [0u8; 4096];

/// Buffer used when copying the blob into the image.
const COPY_BUFFER_SIZE: usize = 1024 * 1024;

pub struct BlobStaging<S = File> {
    sink: S,
    /// Logical end of the blob. Always block-aligned.
    len: u64,
    /// Where the sink's cursor is, if known. Unknown after a failed write.
    sink_pos: Option<u64>,
    block_size: BlockSize,
    relocated: bool,
}

impl<S> std::fmt::Debug for BlobStaging<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStaging")
            .field("len", &self.len)
            .field("block_size", &self.block_size.get())
            .finish()
    }
}

impl BlobStaging<File> {
    /// Stages into an anonymous temporary file, removed when dropped.
    pub fn new(block_size: BlockSize) -> Result<BlobStaging<File>> {
        let file = tempfile::tempfile()?;
        Ok(BlobStaging::with_sink(file, block_size))
    }
}

impl<S: Read + Write + Seek> BlobStaging<S> {
    /// Stages into `sink`, which must be empty.
    pub fn with_sink(sink: S, block_size: BlockSize) -> BlobStaging<S> {
        BlobStaging {
            sink,
            len: 0,
            sink_pos: Some(0),
            block_size,
            relocated: false,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Appends one chunk and returns its block address within the blob.
    ///
    /// On failure the blob's length is unchanged; whatever partial data reached
    /// the sink lies past the end and is overwritten by the next append.
    pub fn append(&mut self, bytes: &[u8]) -> Result<BlockAddr> {
        let pos = self.len;
        if !self.block_size.is_aligned(pos) {
            return Err(Error::Unaligned {
                offset: pos,
                block_size: self.block_size.get(),
            });
        }

        let blkaddr = self.block_size.block_addr(pos)?;
        let padded = self.block_size.round_up(bytes.len() as u64);

        tracing::debug!(size = bytes.len(), blkaddr, "writing chunk");

        if let Err(source) = self.write_padded(pos, bytes, padded) {
            self.sink_pos = None;
            return Err(Error::OutOfSpace {
                offset: pos,
                source,
            });
        }

        self.len = pos + padded;
        self.sink_pos = Some(self.len);
        Ok(blkaddr)
    }

    fn write_padded(&mut self, pos: u64, bytes: &[u8], padded: u64) -> std::io::Result<()> {
        if self.sink_pos != Some(pos) {
            self.sink.seek(SeekFrom::Start(pos))?;
        }

        self.sink.write_all(bytes)?;

        let mut remaining = (padded - bytes.len() as u64) as usize;
        while remaining > 0 {
            let n = remaining.min(ZEROS.len());
            self.sink.write_all(&ZEROS[..n])?;
            remaining -= n;
        }
        Ok(())
    }

    /// Copies the whole blob, padding included, into a freshly allocated data
    /// region of `image` and returns that region's block address.
    ///
    /// The blob is consumed; for the default sink this removes the temporary
    /// file.
    pub fn relocate<I: ImageSink + ?Sized>(mut self, image: &mut I) -> Result<BlockAddr> {
        self.sink.flush()?;

        let len = self.len;
        let offset = image.allocate(Area::Data, len, self.block_size.get())?;
        if !self.block_size.is_aligned(offset) {
            return Err(Error::Unaligned {
                offset,
                block_size: self.block_size.get(),
            });
        }

        let base = self.block_size.block_addr(offset)?;
        // The last staged block has to be addressable too.
        self.block_size.block_addr(offset + len.saturating_sub(1))?;

        self.sink.seek(SeekFrom::Start(0))?;
        self.sink_pos = Some(0);

        let mut buf = vec![0u8; COPY_BUFFER_SIZE.min(len as usize).max(1)];
        let mut copied = 0u64;
        while copied < len {
            let want = (buf.len() as u64).min(len - copied) as usize;
            let n = match self.sink.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            let written = image.write_at(offset + copied, &buf[..n])?;
            copied += written as u64;
            if written < n {
                break;
            }
        }

        if copied < len {
            return Err(Error::ShortWrite {
                offset,
                expected: len,
                written: copied,
            });
        }

        tracing::info!(
            base,
            offset = format_args!("{:#x}", offset),
            len,
            "relocated staging blob"
        );

        self.relocated = true;
        Ok(base)
    }
}

impl<S> Drop for BlobStaging<S> {
    fn drop(&mut self) {
        if !self.relocated && self.len > 0 {
            tracing::warn!(
                len = self.len,
                "staging blob dropped before relocation, its chunks are lost"
            );
        }
    }
}
