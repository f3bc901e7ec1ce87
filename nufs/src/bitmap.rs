use alloc::sync::Arc;

use crate::{
    block_cache::BlockStore,
    error::{FsError, Resource, Result},
};

/// A bit per index of one allocation domain, stored as a byte region of a block.
/// Bit `i` lives in byte `i / 8` at position `i % 8` (least significant first).
pub struct Bitmap {
    store: Arc<BlockStore>,
    kind: Resource,
    block_id: usize,
    offset: usize,
    bits: usize,
}

impl Bitmap {
    pub fn new(
        store: Arc<BlockStore>,
        kind: Resource,
        block_id: usize,
        offset: usize,
        bits: usize,
    ) -> Self {
        Self {
            store,
            kind,
            block_id,
            offset,
            bits,
        }
    }

    fn locate(&self, bit: usize) -> Result<(usize, u8)> {
        if bit >= self.bits {
            return Err(FsError::OutOfRange {
                kind: self.kind,
                index: bit,
            });
        }
        Ok((self.offset + bit / 8, 1 << (bit % 8)))
    }

    pub fn get(&self, bit: usize) -> Result<bool> {
        let (byte, mask) = self.locate(bit)?;
        let block = self.store.block_at(self.block_id)?;
        let used = block.lock().bytes()[byte] & mask != 0;
        Ok(used)
    }

    pub fn set(&self, bit: usize) -> Result<()> {
        let (byte, mask) = self.locate(bit)?;
        self.store.block_at(self.block_id)?.lock().bytes_mut()[byte] |= mask;
        Ok(())
    }

    pub fn clear(&self, bit: usize) -> Result<()> {
        let (byte, mask) = self.locate(bit)?;
        self.store.block_at(self.block_id)?.lock().bytes_mut()[byte] &= !mask;
        Ok(())
    }

    /// Returns the first free index and marks it used.
    /// # Return
    /// * `None` if every index of the domain is in use.
    pub fn alloc(&self) -> Result<Option<usize>> {
        let block = self.store.block_at(self.block_id)?;
        let mut block = block.lock();
        let region = &mut block.bytes_mut()[self.offset..self.offset + self.bits.div_ceil(8)];
        let free = region
            .iter()
            .enumerate()
            .find(|(_, byte)| **byte != u8::MAX)
            .map(|(byte_position, byte)| byte_position * 8 + byte.trailing_ones() as usize)
            .filter(|bit| *bit < self.bits);
        if let Some(bit) = free {
            region[bit / 8] |= 1 << (bit % 8);
        }
        Ok(free)
    }

    /// Mark `bit` free again.
    /// # Return
    /// * `NotAllocated` if the bit was already clear.
    pub fn dealloc(&self, bit: usize) -> Result<()> {
        if !self.get(bit)? {
            return Err(FsError::NotAllocated {
                kind: self.kind,
                index: bit,
            });
        }
        self.clear(bit)
    }

    pub fn count_used(&self) -> Result<usize> {
        let block = self.store.block_at(self.block_id)?;
        let block = block.lock();
        let region = &block.bytes()[self.offset..self.offset + self.bits.div_ceil(8)];
        Ok(region.iter().map(|byte| byte.count_ones() as usize).sum())
    }

    pub fn maximum(&self) -> usize {
        self.bits
    }
}
