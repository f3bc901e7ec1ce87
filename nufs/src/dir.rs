use alloc::vec::Vec;

use crate::{
    error::{FsError, Resource, Result},
    fs::FileSystem,
    layout::{validate_name, DirEntry, InodeMode},
    DIRENT_CAPACITY, DIRENT_SIZE, ROOT_INUM,
};

/// Handle on a directory: an array of `DirEntry` filling the directory
/// inode's data block, its length kept in the inode's `files` field.
///
/// Only the root handle can be constructed, so every entry lives in the one
/// flat namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directory {
    inum: u32,
}

impl Directory {
    pub(crate) fn root() -> Self {
        Self { inum: ROOT_INUM }
    }

    pub fn inum(&self) -> u32 {
        self.inum
    }

    pub fn capacity(&self) -> usize {
        DIRENT_CAPACITY
    }

    /// (data block, entry count)
    fn header(&self, fs: &FileSystem) -> Result<(u32, usize)> {
        let inode = fs.inodes().get(self.inum)?;
        Ok((inode.block, (inode.files as usize).min(DIRENT_CAPACITY)))
    }

    pub fn len(&self, fs: &FileSystem) -> Result<usize> {
        Ok(self.header(fs)?.1)
    }

    pub fn is_empty(&self, fs: &FileSystem) -> Result<bool> {
        Ok(self.len(fs)? == 0)
    }

    /// Every entry, in insertion order.
    pub fn entries(&self, fs: &FileSystem) -> Result<Vec<DirEntry>> {
        let (block_id, files) = self.header(fs)?;
        let block = fs.block_at(block_id)?;
        let block = block.lock();
        Ok((0..files)
            .map(|i| block.read(i * DIRENT_SIZE, |entry: &DirEntry| entry.clone()))
            .collect())
    }

    /// Slot index and inode number of the first entry called `name`.
    fn find(&self, fs: &FileSystem, name: &str) -> Result<Option<(usize, u32)>> {
        Ok(self
            .entries(fs)?
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.matches(name))
            .map(|(i, entry)| (i, entry.inode_number())))
    }

    /// Inode number of the entry called `name`.
    pub fn lookup(&self, fs: &FileSystem, name: &str) -> Result<u32> {
        self.find(fs, name)?
            .map(|(_, inum)| inum)
            .ok_or(FsError::NotFound)
    }

    /// Fail unless a `put` of `name` would succeed as far as the directory is concerned.
    pub fn check_insert(&self, fs: &FileSystem, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.len(fs)? >= DIRENT_CAPACITY {
            return Err(FsError::DirectoryFull {
                capacity: DIRENT_CAPACITY,
            });
        }
        if self.find(fs, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        Ok(())
    }

    /// Fail unless `inum` is allocated and has no data block yet. Block 0 is
    /// reserved, so a record owning a block never reads `block == 0`.
    fn check_unowned(&self, fs: &FileSystem, inum: u32) -> Result<()> {
        if !fs.inode_allocated(inum)? {
            return Err(FsError::NotAllocated {
                kind: Resource::Inode,
                index: inum as usize,
            });
        }
        if inum == self.inum || inum == ROOT_INUM || fs.inodes().get(inum)?.block != 0 {
            return Err(FsError::InodeInUse { inum });
        }
        Ok(())
    }

    /// Give the freshly allocated inode `inum` a data block, initialize it
    /// with `mode` and append an entry for it. Nothing is allocated unless
    /// the entry fits and `inum` owns no block yet.
    pub fn put(&self, fs: &mut FileSystem, name: &str, mode: InodeMode, inum: u32) -> Result<()> {
        if let Err(err) = self
            .check_insert(fs, name)
            .and_then(|_| self.check_unowned(fs, inum))
        {
            log::warn!("[put] {} (inode {}) rejected: {}", name, inum, err);
            return Err(err);
        }
        let entry = DirEntry::new(name, inum)?;
        let block_id = fs.alloc_block()?;
        fs.block_at(block_id)?.lock().bytes_mut().fill(0);
        fs.inodes()
            .modify(inum, |inode| inode.initialize(mode, block_id))?;
        let (dir_block, files) = self.header(fs)?;
        fs.block_at(dir_block)?
            .lock()
            .modify(files * DIRENT_SIZE, |slot: &mut DirEntry| *slot = entry);
        fs.inodes().modify(self.inum, |dir| dir.files += 1)?;
        log::trace!("[put] {} -> inode {}, block {}", name, inum, block_id);
        Ok(())
    }

    /// Rename the entry `from` to `to` in place.
    /// # Return
    /// * The inode number of the renamed entry.
    pub fn rename(&self, fs: &mut FileSystem, from: &str, to: &str) -> Result<u32> {
        let (index, inum) = self.find(fs, from)?.ok_or(FsError::NotFound)?;
        validate_name(to)?;
        if from != to && self.find(fs, to)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        let (dir_block, _) = self.header(fs)?;
        fs.block_at(dir_block)?
            .lock()
            .modify(index * DIRENT_SIZE, |entry: &mut DirEntry| entry.set_name(to))?;
        log::trace!("[rename] {} -> {} (inode {})", from, to, inum);
        Ok(inum)
    }
}
