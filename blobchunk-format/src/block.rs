//! Block geometry shared by the staging blob, the remapper and the chunk index.

use crate::error::{Error, Result};

/// Block address in units of the configured block size.
pub type BlockAddr = u32;

pub const DEFAULT_BLOCK_BITS: u8 = 12;
pub const MIN_BLOCK_BITS: u8 = 9;
pub const MAX_BLOCK_BITS: u8 = 16;

/// Block size together with its log2, as configured for one build.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BlockSize {
    bits: u8,
}

impl Default for BlockSize {
    fn default() -> Self {
        BlockSize {
            bits: DEFAULT_BLOCK_BITS,
        }
    }
}

impl BlockSize {
    pub fn new(bits: u8) -> Result<BlockSize> {
        if !(MIN_BLOCK_BITS..=MAX_BLOCK_BITS).contains(&bits) {
            return Err(Error::InvalidBlockBits(bits));
        }
        Ok(BlockSize { bits })
    }

    #[inline(always)]
    pub fn bits(self) -> u8 {
        self.bits
    }

    #[inline(always)]
    pub fn get(self) -> u64 {
        1 << self.bits
    }

    /// Byte offset within the containing block.
    #[inline(always)]
    pub fn offset_in_block(self, pos: u64) -> u64 {
        pos & (self.get() - 1)
    }

    #[inline(always)]
    pub fn is_aligned(self, pos: u64) -> bool {
        self.offset_in_block(pos) == 0
    }

    #[inline(always)]
    pub fn round_up(self, pos: u64) -> u64 {
        round_up(pos, self.get())
    }

    /// Block address of a byte offset, which must fit the on-disk 32-bit field.
    pub fn block_addr(self, pos: u64) -> Result<BlockAddr> {
        let blk = pos >> self.bits;
        BlockAddr::try_from(blk).map_err(|_| Error::AddressOverflow(blk))
    }

    #[inline(always)]
    pub fn byte_offset(self, addr: BlockAddr) -> u64 {
        (addr as u64) << self.bits
    }
}

#[inline(always)]
pub fn round_up(pos: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return pos;
    }
    let diff = pos % alignment;
    if diff == 0 {
        pos
    } else {
        pos + (alignment - diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_bits() {
        assert!(BlockSize::new(8).is_err());
        assert!(BlockSize::new(17).is_err());
        assert_eq!(BlockSize::new(12).unwrap().get(), 4096);
    }

    #[test]
    fn rounding() {
        let bs = BlockSize::default();
        assert_eq!(bs.round_up(0), 0);
        assert_eq!(bs.round_up(1), 4096);
        assert_eq!(bs.round_up(4096), 4096);
        assert_eq!(bs.round_up(10000), 12288);
        assert_eq!(round_up(13, 8), 16);
        assert_eq!(round_up(13, 0), 13);
    }

    #[test]
    fn block_addr_overflow() {
        let bs = BlockSize::default();
        assert_eq!(bs.block_addr(8192).unwrap(), 2);
        assert!(matches!(
            bs.block_addr((u32::MAX as u64 + 1) << 12),
            Err(Error::AddressOverflow(_))
        ));
    }
}
