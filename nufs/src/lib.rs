#![no_std]
extern crate alloc;
pub mod bitmap;
pub mod block_cache;
pub mod block_dev;
pub mod dir;
pub mod error;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod vfs;

#[cfg(test)]
mod test_device;

pub use block_dev::BlockDevice;
pub use dir::Directory;
pub use error::{FsError, Resource, Result};
pub use fs::FileSystem;
pub use layout::{DirEntry, DiskInode, InodeMode};
pub use vfs::Stat;

pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_COUNT: usize = 256;
pub const INODE_COUNT: usize = 256;
pub const MAX_BLOCK_CACHE_QUANTITY: usize = 16;

// Block 0: [inode bitmap][block bitmap][inode table ...], table continues into block 1.
pub const INODE_BITMAP_OFFSET: usize = 0;
pub const BLOCK_BITMAP_OFFSET: usize = INODE_BITMAP_OFFSET + INODE_COUNT / 8;
pub const INODE_TABLE_OFFSET: usize = BLOCK_BITMAP_OFFSET + BLOCK_COUNT / 8;
pub const INODE_TABLE_BLOCKS: usize = 2;
pub const DISK_INODE_SIZE: usize = 16;

pub const DIR_NAME_LENGTH: usize = 20;
pub const NAME_LENGTH_LIMIT: usize = DIR_NAME_LENGTH - 1;
pub const DIRENT_SIZE: usize = DIR_NAME_LENGTH + 4;
pub const DIRENT_CAPACITY: usize = BLOCK_SIZE / DIRENT_SIZE;

pub const ROOT_INUM: u32 = 0;
pub const ROOT_BLOCK: u32 = 2;
pub const RESERVED_BLOCKS: [u32; 3] = [0, 1, ROOT_BLOCK];

const _: () = assert!(
    INODE_TABLE_OFFSET + INODE_COUNT * DISK_INODE_SIZE <= INODE_TABLE_BLOCKS * BLOCK_SIZE,
    "inode table does not fit in its reserved blocks"
);
const _: () = assert!(INODE_COUNT % 8 == 0 && BLOCK_COUNT % 8 == 0);
