use alloc::{string::String, vec::Vec};

use crate::{
    error::{FsError, Result},
    fs::FileSystem,
    layout::{DiskInode, InodeMode},
    BLOCK_SIZE, ROOT_INUM,
};

/// What `stat` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inum: u32,
    pub mode: InodeMode,
    /// Bytes.
    pub size: u32,
}

enum Path<'a> {
    Root,
    Entry(&'a str),
}

/// `"/"` or a single `"/name"` segment; the namespace is flat.
fn parse_path(path: &str) -> Result<Path<'_>> {
    let name = path.strip_prefix('/').ok_or(FsError::InvalidPath)?;
    if name.is_empty() {
        Ok(Path::Root)
    } else if name.contains('/') {
        Err(FsError::InvalidPath)
    } else {
        Ok(Path::Entry(name))
    }
}

fn check_range(offset: usize, len: usize) -> Result<usize> {
    offset
        .checked_add(len)
        .filter(|end| *end <= BLOCK_SIZE)
        .ok_or(FsError::FileTooLarge {
            offset,
            len,
            limit: BLOCK_SIZE,
        })
}

impl FileSystem {
    /// Resolve `path` to an inode number.
    pub fn lookup(&self, path: &str) -> Result<u32> {
        match parse_path(path)? {
            Path::Root => Ok(ROOT_INUM),
            Path::Entry(name) => self.root_dir().lookup(self, name),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_ok()
    }

    /// Inode of the regular file at `path`; `Ok(None)` if there is no such entry.
    fn file_inode(&self, path: &str) -> Result<Option<(u32, DiskInode)>> {
        match parse_path(path)? {
            Path::Root => Err(FsError::IsDirectory),
            Path::Entry(name) => match self.root_dir().lookup(self, name) {
                Ok(inum) => Ok(Some((inum, self.inodes().get(inum)?))),
                Err(FsError::NotFound) => Ok(None),
                Err(err) => Err(err),
            },
        }
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let stat = match parse_path(path)? {
            Path::Root => Stat {
                inum: ROOT_INUM,
                mode: InodeMode::ROOT_DIR,
                size: 0,
            },
            Path::Entry(name) => {
                let inum = self.root_dir().lookup(self, name)?;
                Stat {
                    inum,
                    mode: InodeMode::REGULAR_FILE,
                    size: self.inodes().get(inum)?.size,
                }
            }
        };
        log::trace!("[stat] {} -> {:?}", path, stat);
        Ok(stat)
    }

    /// Read bytes from file into buffer.
    /// # Parameter
    /// * 'path' - File path.
    /// * 'buffer' - Buffer in memory, its length is the request size.
    /// * 'offset' - File offset.
    /// # Return
    /// * Length of bytes read, 0 for a missing file or an offset past the end.
    pub fn read(&self, path: &str, buffer: &mut [u8], offset: usize) -> Result<usize> {
        let Some((_, inode)) = self.file_inode(path)? else {
            log::debug!("[read] {} not found", path);
            return Ok(0);
        };
        let size = (inode.size as usize).min(BLOCK_SIZE);
        if offset >= size {
            return Ok(0);
        }
        let end = size.min(offset + buffer.len());
        let len = end - offset;
        let block = self.block_at(inode.block)?;
        buffer[..len].copy_from_slice(&block.lock().bytes()[offset..end]);
        log::trace!("[read] {}, {} bytes @+{} -> {}", path, buffer.len(), offset, len);
        Ok(len)
    }

    /// Write bytes from buffer into file, growing the size to cover them.
    /// An empty buffer changes nothing, whatever the offset.
    /// # Return
    /// * Length of bytes written, 0 for a missing file.
    pub fn write(&mut self, path: &str, buffer: &[u8], offset: usize) -> Result<usize> {
        let Some((inum, inode)) = self.file_inode(path)? else {
            log::debug!("[write] {} not found", path);
            return Ok(0);
        };
        if buffer.is_empty() {
            return Ok(0);
        }
        let end = check_range(offset, buffer.len())?;
        self.block_at(inode.block)?.lock().bytes_mut()[offset..end].copy_from_slice(buffer);
        self.inodes().modify(inum, |inode| {
            inode.size = inode.size.max(end as u32);
        })?;
        self.sync();
        log::trace!("[write] {}, {} bytes @+{}", path, buffer.len(), offset);
        Ok(buffer.len())
    }

    /// Set the size of the file at `path`. Bytes cut off are zeroed so that a
    /// later grow reads them back as zeros.
    pub fn truncate(&mut self, path: &str, size: usize) -> Result<()> {
        let (inum, inode) = self.file_inode(path)?.ok_or(FsError::NotFound)?;
        check_range(0, size)?;
        let old_size = (inode.size as usize).min(BLOCK_SIZE);
        if size < old_size {
            self.block_at(inode.block)?.lock().bytes_mut()[size..old_size].fill(0);
        }
        self.inodes().modify(inum, |inode| inode.size = size as u32)?;
        self.sync();
        log::trace!("[truncate] {}, {} -> {} bytes", path, old_size, size);
        Ok(())
    }

    /// Create an empty file at `path`.
    /// # Return
    /// * The new inode number.
    pub fn create(&mut self, path: &str, mode: InodeMode) -> Result<u32> {
        let name = match parse_path(path)? {
            Path::Root => return Err(FsError::AlreadyExists),
            Path::Entry(name) => name,
        };
        let root = self.root_dir();
        root.check_insert(self, name)?;
        let inum = self.alloc_inode()?;
        if let Err(err) = root.put(self, name, mode, inum) {
            self.free_inode(inum)?;
            return Err(err);
        }
        self.sync();
        log::debug!("[create] {} ({:o}) -> inode {}", path, mode.bits(), inum);
        Ok(inum)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (Path::Entry(from_name), Path::Entry(to_name)) = (parse_path(from)?, parse_path(to)?)
        else {
            return Err(FsError::InvalidPath);
        };
        self.root_dir().rename(self, from_name, to_name)?;
        self.sync();
        log::debug!("[rename] {} -> {}", from, to);
        Ok(())
    }

    /// Names in the root directory, in insertion order.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .root_dir()
            .entries(self)?
            .iter()
            .map(|entry| entry.name().into_owned())
            .collect())
    }

    /// Every root entry with its `stat`, in insertion order. Entries are
    /// stated by inode number, so a damaged name still lists its own file.
    pub fn list_stat(&self) -> Result<Vec<(String, Stat)>> {
        self.root_dir()
            .entries(self)?
            .iter()
            .map(|entry| {
                let inum = entry.inode_number();
                let stat = Stat {
                    inum,
                    mode: InodeMode::REGULAR_FILE,
                    size: self.inodes().get(inum)?.size,
                };
                Ok((entry.name().into_owned(), stat))
            })
            .collect()
    }
}
