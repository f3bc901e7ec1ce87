use alloc::{vec, vec::Vec};
use spin::Mutex;

use crate::{block_dev::BlockDevice, BLOCK_COUNT, BLOCK_SIZE};

/// RAM-backed device for unit tests.
pub struct MemoryDevice {
    blocks: Mutex<Vec<u8>>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(vec![0; BLOCK_COUNT * BLOCK_SIZE]),
        }
    }

    /// Snapshot of what the device holds for `block_id`.
    pub fn block(&self, block_id: usize) -> Vec<u8> {
        let start = block_id * BLOCK_SIZE;
        self.blocks.lock()[start..start + BLOCK_SIZE].to_vec()
    }
}

impl BlockDevice for MemoryDevice {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let start = block_id * BLOCK_SIZE;
        buf.copy_from_slice(&self.blocks.lock()[start..start + BLOCK_SIZE]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let start = block_id * BLOCK_SIZE;
        self.blocks.lock()[start..start + BLOCK_SIZE].copy_from_slice(buf);
    }
}
