use alloc::sync::Arc;
use spin::Mutex;

use crate::{
    bitmap::Bitmap,
    block_cache::{BlockCache, BlockStore},
    block_dev::BlockDevice,
    dir::Directory,
    error::{FsError, Resource, Result},
    inode::InodeTable,
    layout::InodeMode,
    BLOCK_BITMAP_OFFSET, BLOCK_COUNT, INODE_BITMAP_OFFSET, INODE_COUNT, RESERVED_BLOCKS,
    ROOT_BLOCK, ROOT_INUM,
};

/// The storage engine: bitmaps and inode table over one block store.
///
/// Every mutating operation takes `&mut self`; the caller serializes access
/// (wrap the file system in a lock to share it).
pub struct FileSystem {
    store: Arc<BlockStore>,
    pub(crate) inode_bitmap: Bitmap,
    pub(crate) block_bitmap: Bitmap,
    inodes: InodeTable,
}

impl FileSystem {
    fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        let store = Arc::new(BlockStore::new(block_device));
        Self {
            inode_bitmap: Bitmap::new(
                Arc::clone(&store),
                Resource::Inode,
                0,
                INODE_BITMAP_OFFSET,
                INODE_COUNT,
            ),
            block_bitmap: Bitmap::new(
                Arc::clone(&store),
                Resource::Block,
                0,
                BLOCK_BITMAP_OFFSET,
                BLOCK_COUNT,
            ),
            inodes: InodeTable::new(Arc::clone(&store)),
            store,
        }
    }

    /// Zero every block of the device and lay down an empty root directory.
    pub fn format(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut fs = Self::new(block_device);
        for block_id in 0..BLOCK_COUNT {
            fs.store.block_at(block_id)?.lock().bytes_mut().fill(0);
        }
        fs.initialize()?;
        Ok(fs)
    }

    /// Open the store on `block_device`, initializing it first if the root
    /// directory is not there yet.
    pub fn open(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut fs = Self::new(block_device);
        fs.initialize()?;
        Ok(fs)
    }

    /// Whether the root directory's block is marked used.
    pub fn is_initialized(&self) -> Result<bool> {
        self.block_bitmap.get(ROOT_BLOCK as usize)
    }

    /// Reserve the metadata blocks and create the root directory.
    /// Does nothing on an initialized store.
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized()? {
            log::debug!("[initialize] root directory present");
            return Ok(());
        }
        for block_id in RESERVED_BLOCKS {
            self.block_bitmap.set(block_id as usize)?;
        }
        self.inode_bitmap.set(ROOT_INUM as usize)?;
        self.inodes.modify(ROOT_INUM, |root| {
            root.initialize(InodeMode::ROOT_DIR, ROOT_BLOCK);
        })?;
        self.store.block_at(ROOT_BLOCK as usize)?.lock().bytes_mut().fill(0);
        self.store.sync_all();
        log::debug!(
            "[initialize] root directory: inode {}, block {}",
            ROOT_INUM,
            ROOT_BLOCK
        );
        Ok(())
    }

    /// Alloc a inode (The first free bitmap number).
    pub fn alloc_inode(&mut self) -> Result<u32> {
        let inum = self
            .inode_bitmap
            .alloc()?
            .ok_or(FsError::ResourceExhausted(Resource::Inode))?;
        log::trace!("[alloc_inode] -> {}", inum);
        Ok(inum as u32)
    }

    /// Alloc a block for data. Reserved blocks are never returned.
    pub fn alloc_block(&mut self) -> Result<u32> {
        let block_id = self
            .block_bitmap
            .alloc()?
            .ok_or(FsError::ResourceExhausted(Resource::Block))?;
        log::trace!("[alloc_block] -> {}", block_id);
        Ok(block_id as u32)
    }

    /// Clear the inode-used bit. The record and its data block are left as they are.
    pub fn free_inode(&mut self, inum: u32) -> Result<()> {
        if inum == ROOT_INUM {
            return Err(FsError::IsDirectory);
        }
        log::trace!("[free_inode] {}", inum);
        self.inode_bitmap.dealloc(inum as usize)
    }

    /// Whether inode `inum` is marked used.
    pub fn inode_allocated(&self, inum: u32) -> Result<bool> {
        self.inode_bitmap.get(inum as usize)
    }

    /// Number of inodes marked used, the root included.
    pub fn used_inodes(&self) -> Result<usize> {
        self.inode_bitmap.count_used()
    }

    /// Number of blocks marked used, the reserved ones included.
    pub fn used_blocks(&self) -> Result<usize> {
        self.block_bitmap.count_used()
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn block_at(&self, block_id: u32) -> Result<Arc<Mutex<BlockCache>>> {
        self.store.block_at(block_id as usize)
    }

    /// The one directory there is.
    pub fn root_dir(&self) -> Directory {
        Directory::root()
    }

    /// Write every dirty block back to the device.
    pub fn sync(&self) {
        self.store.sync_all();
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_device::MemoryDevice;
    use crate::{BLOCK_SIZE, INODE_TABLE_OFFSET};

    #[test]
    fn fresh_store_gets_root_directory() {
        let fs = FileSystem::open(Arc::new(MemoryDevice::new())).unwrap();
        let root = fs.inodes().get(ROOT_INUM).unwrap();
        assert_eq!(root.mode(), InodeMode::ROOT_DIR);
        assert_eq!(root.mode, 0o040755);
        assert_eq!(root.block, ROOT_BLOCK);
        assert_eq!(root.files, 0);
        assert!(fs.block_bitmap.get(ROOT_BLOCK as usize).unwrap());
        assert!(fs.inode_bitmap.get(ROOT_INUM as usize).unwrap());
        assert!(fs.is_initialized().unwrap());
    }

    #[test]
    fn initialize_is_idempotent() {
        let device = Arc::new(MemoryDevice::new());
        let mut fs = FileSystem::open(device.clone()).unwrap();
        let before = device.block(0);
        fs.initialize().unwrap();
        fs.sync();
        assert_eq!(device.block(0), before);
        drop(fs);
        let fs = FileSystem::open(device.clone()).unwrap();
        assert_eq!(fs.used_inodes(), Ok(1));
        assert_eq!(fs.used_blocks(), Ok(RESERVED_BLOCKS.len()));
        assert_eq!(device.block(0), before);
    }

    #[test]
    fn reopen_keeps_existing_allocations() {
        let device = Arc::new(MemoryDevice::new());
        let mut fs = FileSystem::open(device.clone()).unwrap();
        assert_eq!(fs.alloc_inode().unwrap(), 1);
        assert_eq!(fs.alloc_block().unwrap(), 3);
        drop(fs);
        let mut fs = FileSystem::open(device).unwrap();
        assert_eq!(fs.alloc_inode().unwrap(), 2);
        assert_eq!(fs.alloc_block().unwrap(), 4);
    }

    #[test]
    fn reserved_blocks_never_allocated() {
        let mut fs = FileSystem::open(Arc::new(MemoryDevice::new())).unwrap();
        let mut allocated = 0;
        loop {
            match fs.alloc_block() {
                Ok(block_id) => {
                    assert!(!RESERVED_BLOCKS.contains(&block_id));
                    allocated += 1;
                }
                Err(err) => {
                    assert_eq!(err, FsError::ResourceExhausted(Resource::Block));
                    break;
                }
            }
        }
        assert_eq!(allocated, BLOCK_COUNT - RESERVED_BLOCKS.len());
    }

    #[test]
    fn inode_domain_is_its_own_bound() {
        let mut fs = FileSystem::open(Arc::new(MemoryDevice::new())).unwrap();
        for expected in 1..INODE_COUNT as u32 {
            assert_eq!(fs.alloc_inode().unwrap(), expected);
        }
        assert_eq!(
            fs.alloc_inode(),
            Err(FsError::ResourceExhausted(Resource::Inode))
        );
    }

    #[test]
    fn free_inode_only_clears_bit() {
        let mut fs = FileSystem::open(Arc::new(MemoryDevice::new())).unwrap();
        let inum = fs.alloc_inode().unwrap();
        let block = fs.alloc_block().unwrap();
        fs.inodes()
            .modify(inum, |inode| inode.initialize(InodeMode::REGULAR_FILE, block))
            .unwrap();
        fs.free_inode(inum).unwrap();
        assert_eq!(fs.inode_allocated(inum), Ok(false));
        assert!(fs.block_bitmap.get(block as usize).unwrap());
        assert_eq!(fs.inodes().get(inum).unwrap().block, block);
        assert_eq!(
            fs.free_inode(inum),
            Err(FsError::NotAllocated {
                kind: Resource::Inode,
                index: inum as usize
            })
        );
        assert_eq!(fs.free_inode(ROOT_INUM), Err(FsError::IsDirectory));
    }

    #[test]
    fn format_wipes_device() {
        let device = Arc::new(MemoryDevice::new());
        {
            let fs = FileSystem::open(device.clone()).unwrap();
            fs.block_at(100).unwrap().lock().bytes_mut()[7] = 0xaa;
        }
        assert_eq!(device.block(100)[7], 0xaa);
        let fs = FileSystem::format(device.clone()).unwrap();
        fs.sync();
        assert_eq!(device.block(100), [0u8; BLOCK_SIZE]);
        assert_eq!(
            &device.block(0)[INODE_TABLE_OFFSET + 4..INODE_TABLE_OFFSET + 8],
            0o040755u32.to_le_bytes()
        );
    }
}
