//! The destination image the chunk engine writes into.

use std::io::{Seek, SeekFrom, Write};

use crate::block::round_up;

/// What a region allocated in the image will hold.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Area {
    /// Relocated chunk data.
    Data,
    /// Chunk indexes and other inode metadata.
    Meta,
}

/// Space allocation and raw writes into the image being built.
pub trait ImageSink {
    /// Reserves `len` bytes and returns the byte offset of the region,
    /// aligned to `alignment`.
    fn allocate(&mut self, area: Area, len: u64, alignment: u64) -> std::io::Result<u64>;

    /// Writes `buf` at `offset`, returning how many bytes the image accepted.
    /// Fewer bytes than `buf.len()` means the image is full.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<usize>;
}

impl<T: ImageSink + ?Sized> ImageSink for &mut T {
    fn allocate(&mut self, area: Area, len: u64, alignment: u64) -> std::io::Result<u64> {
        (**self).allocate(area, len, alignment)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<usize> {
        (**self).write_at(offset, buf)
    }
}

/// Bump-allocating image over any seekable writer.
///
/// Regions are handed out in allocation order starting at `start`; there is
/// no freeing.
#[derive(Debug)]
pub struct ImageFile<F> {
    inner: F,
    next_free: u64,
}

impl<F: Write + Seek> ImageFile<F> {
    pub fn new(inner: F) -> ImageFile<F> {
        ImageFile::with_start(inner, 0)
    }

    /// Leaves `[0, start)` to the caller, e.g. for a superblock.
    pub fn with_start(inner: F, start: u64) -> ImageFile<F> {
        ImageFile {
            inner,
            next_free: start,
        }
    }

    /// End of the last allocated region.
    pub fn len(&self) -> u64 {
        self.next_free
    }

    pub fn is_empty(&self) -> bool {
        self.next_free == 0
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    pub fn get_ref(&self) -> &F {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: Write + Seek> ImageSink for ImageFile<F> {
    fn allocate(&mut self, area: Area, len: u64, alignment: u64) -> std::io::Result<u64> {
        let offset = round_up(self.next_free, alignment);
        self.next_free = offset.checked_add(len).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "image size overflow")
        })?;
        tracing::trace!(
            ?area,
            offset = format_args!("{:#x}", offset),
            len,
            "allocated image region"
        );
        Ok(offset)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.seek(SeekFrom::Start(offset))?;

        let mut written = 0;
        while written < buf.len() {
            match self.inner.write(&buf[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn allocations_are_aligned_and_ordered() {
        let mut image = ImageFile::with_start(Cursor::new(Vec::new()), 1024);
        let a = image.allocate(Area::Data, 5000, 4096).unwrap();
        let b = image.allocate(Area::Meta, 12, 8).unwrap();
        let c = image.allocate(Area::Meta, 4, 8).unwrap();
        assert_eq!(a, 4096);
        assert_eq!(b, 9096);
        assert_eq!(c, 9112);
        assert_eq!(image.len(), 9116);
    }

    #[test]
    fn write_at_extends_cursor() {
        let mut image = ImageFile::new(Cursor::new(Vec::new()));
        assert_eq!(image.write_at(4, b"abcd").unwrap(), 4);
        assert_eq!(image.into_inner().into_inner(), b"\0\0\0\0abcd");
    }

    #[test]
    fn write_at_reports_short_write() {
        let mut buf = [0u8; 6];
        let mut image = ImageFile::new(Cursor::new(&mut buf[..]));
        assert_eq!(image.write_at(2, b"abcdef").unwrap(), 4);
    }
}
