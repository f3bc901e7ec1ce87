use alloc::sync::Arc;

use crate::{
    block_cache::BlockStore,
    error::{FsError, Resource, Result},
    layout::DiskInode,
    BLOCK_SIZE, DISK_INODE_SIZE, INODE_COUNT, INODE_TABLE_OFFSET,
};

/// Fixed-size inode records starting at `INODE_TABLE_OFFSET` of block 0 and
/// running on into block 1.
pub struct InodeTable {
    store: Arc<BlockStore>,
}

impl InodeTable {
    pub fn new(store: Arc<BlockStore>) -> Self {
        Self { store }
    }

    /// Get the block number and offset of the block where the inode is located.
    /// # Parameter
    /// * 'inum' - Inode id.
    /// # Return
    /// * (block id, offset)
    pub fn position(&self, inum: u32) -> Result<(usize, usize)> {
        let inum = inum as usize;
        if inum >= INODE_COUNT {
            return Err(FsError::OutOfRange {
                kind: Resource::Inode,
                index: inum,
            });
        }
        let byte = INODE_TABLE_OFFSET + inum * DISK_INODE_SIZE;
        Ok((byte / BLOCK_SIZE, byte % BLOCK_SIZE))
    }

    pub fn read<V>(&self, inum: u32, func: impl FnOnce(&DiskInode) -> V) -> Result<V> {
        let (block_id, offset) = self.position(inum)?;
        let block = self.store.block_at(block_id)?;
        let ret = block.lock().read(offset, func);
        Ok(ret)
    }

    pub fn modify<V>(&self, inum: u32, func: impl FnOnce(&mut DiskInode) -> V) -> Result<V> {
        let (block_id, offset) = self.position(inum)?;
        let block = self.store.block_at(block_id)?;
        let ret = block.lock().modify(offset, func);
        Ok(ret)
    }

    /// Copy of the whole record.
    pub fn get(&self, inum: u32) -> Result<DiskInode> {
        self.read(inum, |inode| *inode)
    }
}
