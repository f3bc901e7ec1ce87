use core::any::Any;

/// Backing store of `BLOCK_COUNT` blocks of `BLOCK_SIZE` bytes.
pub trait BlockDevice: Send + Sync + Any {
    /// Read block `block_id` into `buf`.
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// Write `buf` back to block `block_id`.
    fn write_block(&self, block_id: usize, buf: &[u8]);
}
