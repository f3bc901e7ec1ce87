use alloc::collections::VecDeque;
use alloc::sync::Arc;
use spin::Mutex;

use crate::{
    block_dev::BlockDevice,
    error::{FsError, Resource, Result},
    layout::OnDisk,
    BLOCK_COUNT, BLOCK_SIZE, MAX_BLOCK_CACHE_QUANTITY,
};

pub struct BlockCache {
    cache: [u8; BLOCK_SIZE],
    block_id: usize,
    block_device: Arc<dyn BlockDevice>,
    modified: bool,
}

impl BlockCache {
    pub fn new(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Self {
        let mut cache = [0u8; BLOCK_SIZE];
        block_device.read_block(block_id, &mut cache);
        Self {
            cache,
            block_id,
            block_device,
            modified: false,
        }
    }

    fn record_range<T: OnDisk>(offset: usize) -> core::ops::Range<usize> {
        assert!(
            offset + T::SIZE <= BLOCK_SIZE,
            "record at {} overruns the block",
            offset
        );
        offset..offset + T::SIZE
    }

    /// Decode the record at `offset` and hand it to `func`.
    pub fn read<T: OnDisk, V>(&self, offset: usize, func: impl FnOnce(&T) -> V) -> V {
        let record = T::decode(&self.cache[Self::record_range::<T>(offset)]);
        func(&record)
    }

    /// Decode the record at `offset`, let `func` change it, then encode it back.
    pub fn modify<T: OnDisk, V>(&mut self, offset: usize, func: impl FnOnce(&mut T) -> V) -> V {
        let range = Self::record_range::<T>(offset);
        let mut record = T::decode(&self.cache[range.clone()]);
        let ret = func(&mut record);
        record.encode(&mut self.cache[range]);
        self.modified = true;
        ret
    }

    pub fn bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.cache
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        self.modified = true;
        &mut self.cache
    }

    pub fn sync(&mut self) {
        if self.modified {
            self.modified = false;
            self.block_device.write_block(self.block_id, &self.cache);
        }
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.sync();
    }
}

pub struct BlockCacheManager {
    queue: VecDeque<(usize, Arc<Mutex<BlockCache>>)>,
}

impl BlockCacheManager {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// The cached copy of `block_id`, loading it when absent. A full cache
    /// evicts the oldest slot nobody else holds.
    /// # Return
    /// * `ResourceExhausted(CacheSlot)` if every slot is still in use.
    pub fn get_block_cache(
        &mut self,
        block_id: usize,
        block_device: Arc<dyn BlockDevice>,
    ) -> Result<Arc<Mutex<BlockCache>>> {
        if let Some((_, cache)) = self.queue.iter().find(|(id, _)| *id == block_id) {
            return Ok(Arc::clone(cache));
        }
        if self.queue.len() >= MAX_BLOCK_CACHE_QUANTITY {
            let idle = self
                .queue
                .iter()
                .position(|(_, cache)| Arc::strong_count(cache) == 1)
                .ok_or(FsError::ResourceExhausted(Resource::CacheSlot))?;
            // dropping the evicted slot writes it back
            self.queue.remove(idle);
        }
        let block_cache = Arc::new(Mutex::new(BlockCache::new(block_id, block_device)));
        self.queue.push_back((block_id, Arc::clone(&block_cache)));
        Ok(block_cache)
    }

    pub fn sync_all(&self) {
        for (_, cache) in self.queue.iter() {
            cache.lock().sync();
        }
    }
}

impl Default for BlockCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The block store every other component reaches the device through.
pub struct BlockStore {
    block_device: Arc<dyn BlockDevice>,
    manager: Mutex<BlockCacheManager>,
}

impl BlockStore {
    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            block_device,
            manager: Mutex::new(BlockCacheManager::new()),
        }
    }

    /// Get the cached block `block_id`.
    /// # Return
    /// * `OutOfRange` if `block_id` is not below `BLOCK_COUNT`.
    /// * `ResourceExhausted(CacheSlot)` if every cache slot is pinned.
    pub fn block_at(&self, block_id: usize) -> Result<Arc<Mutex<BlockCache>>> {
        if block_id >= BLOCK_COUNT {
            return Err(FsError::OutOfRange {
                kind: Resource::Block,
                index: block_id,
            });
        }
        self.manager
            .lock()
            .get_block_cache(block_id, Arc::clone(&self.block_device))
    }

    /// Write every dirty cached block back to the device.
    pub fn sync_all(&self) {
        self.manager.lock().sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DiskInode;
    use crate::test_device::MemoryDevice;
    use alloc::vec::Vec;

    #[test]
    fn modify_writes_back_on_sync() {
        let device = Arc::new(MemoryDevice::new());
        let store = BlockStore::new(device.clone());
        store
            .block_at(7)
            .unwrap()
            .lock()
            .modify(32, |inode: &mut DiskInode| {
                inode.size = 42;
                inode.block = 9;
            });
        assert_eq!(device.block(7)[40..44], [0; 4]);
        store.sync_all();
        assert_eq!(device.block(7)[40..44], 42u32.to_le_bytes());
        assert_eq!(device.block(7)[44..48], 9u32.to_le_bytes());
    }

    #[test]
    fn block_at_rejects_out_of_range() {
        let store = BlockStore::new(Arc::new(MemoryDevice::new()));
        assert!(store.block_at(BLOCK_COUNT - 1).is_ok());
        assert_eq!(
            store.block_at(BLOCK_COUNT).err(),
            Some(FsError::OutOfRange {
                kind: Resource::Block,
                index: BLOCK_COUNT
            })
        );
    }

    #[test]
    fn eviction_keeps_data() {
        let device = Arc::new(MemoryDevice::new());
        let store = BlockStore::new(device.clone());
        for id in 0..MAX_BLOCK_CACHE_QUANTITY * 2 {
            store.block_at(id).unwrap().lock().bytes_mut()[0] = id as u8 + 1;
        }
        store.sync_all();
        for id in 0..MAX_BLOCK_CACHE_QUANTITY * 2 {
            assert_eq!(device.block(id)[0], id as u8 + 1);
        }
    }

    #[test]
    fn pinned_cache_reports_exhaustion() {
        let device = Arc::new(MemoryDevice::new());
        let store = BlockStore::new(device.clone());
        let pinned: Vec<_> = (0..MAX_BLOCK_CACHE_QUANTITY)
            .map(|id| store.block_at(id).unwrap())
            .collect();
        pinned[0].lock().bytes_mut()[0] = 0x5a;
        assert_eq!(
            store.block_at(MAX_BLOCK_CACHE_QUANTITY).err(),
            Some(FsError::ResourceExhausted(Resource::CacheSlot))
        );
        assert!(store.block_at(1).is_ok());
        drop(pinned);
        assert!(store.block_at(MAX_BLOCK_CACHE_QUANTITY).is_ok());
        assert_eq!(device.block(0)[0], 0x5a);
    }

    #[test]
    #[should_panic(expected = "overruns the block")]
    fn record_past_block_end_panics() {
        let store = BlockStore::new(Arc::new(MemoryDevice::new()));
        store
            .block_at(0)
            .unwrap()
            .lock()
            .read(BLOCK_SIZE - 8, |_: &DiskInode| ());
    }
}
