use alloc::{borrow::Cow, string::String};
use bitflags::bitflags;

use crate::{
    error::{FsError, Result},
    DIRENT_SIZE, DIR_NAME_LENGTH, DISK_INODE_SIZE, NAME_LENGTH_LIMIT,
};

/// A fixed-size record with an explicit little-endian encoding.
pub trait OnDisk: Sized {
    const SIZE: usize;
    fn decode(bytes: &[u8]) -> Self;
    fn encode(&self, bytes: &mut [u8]);
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

bitflags! {
    /// POSIX type and permission bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InodeMode: u32 {
        const DIR = 0o040000;
        const FILE = 0o100000;
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC = 0o100;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC = 0o010;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC = 0o001;
    }
}

impl InodeMode {
    /// What the root directory reports: `drwxr-xr-x`.
    pub const ROOT_DIR: Self = Self::from_bits_retain(0o040755);
    /// What every regular file reports: `-rw-r--r--`.
    pub const REGULAR_FILE: Self = Self::from_bits_retain(0o100644);

    pub fn is_dir(&self) -> bool {
        self.contains(Self::DIR)
    }

    pub fn permissions(&self) -> u32 {
        self.bits() & 0o7777
    }
}

/// Inode record: four `u32` in order files, mode, size, block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskInode {
    /// Entry count when the inode is the root directory.
    pub files: u32,
    pub mode: u32,
    /// File size in bytes.
    pub size: u32,
    /// The single data block this inode owns.
    pub block: u32,
}

impl DiskInode {
    pub fn initialize(&mut self, mode: InodeMode, block: u32) {
        *self = Self {
            files: 0,
            mode: mode.bits(),
            size: 0,
            block,
        };
    }

    pub fn mode(&self) -> InodeMode {
        InodeMode::from_bits_retain(self.mode)
    }

    /// Determine whether the current Inode is a directory.
    pub fn is_directory(&self) -> bool {
        self.mode().is_dir()
    }
}

impl OnDisk for DiskInode {
    const SIZE: usize = DISK_INODE_SIZE;

    fn decode(bytes: &[u8]) -> Self {
        Self {
            files: read_u32(bytes, 0),
            mode: read_u32(bytes, 4),
            size: read_u32(bytes, 8),
            block: read_u32(bytes, 12),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        write_u32(bytes, 0, self.files);
        write_u32(bytes, 4, self.mode);
        write_u32(bytes, 8, self.size);
        write_u32(bytes, 12, self.block);
    }
}

/// Check that `name` fits a directory entry.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.bytes().any(|b| b == b'/' || b == 0) {
        return Err(FsError::InvalidName);
    }
    if name.len() > NAME_LENGTH_LIMIT {
        return Err(FsError::NameTooLong {
            limit: NAME_LENGTH_LIMIT,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    name: [u8; DIR_NAME_LENGTH], // The end must be '\0'.
    inode_number: u32,
}

impl DirEntry {
    /// Create a empty directory entry.
    pub fn empty() -> Self {
        Self {
            name: [0; DIR_NAME_LENGTH],
            inode_number: 0,
        }
    }

    /// Create a new directory entry from a file name and inode number.
    /// # Parameter
    /// * 'name' - At most NAME_LENGTH_LIMIT bytes, no '/' or '\0'.
    /// * 'inode_number' - File inode number.
    pub fn new(name: &str, inode_number: u32) -> Result<Self> {
        let mut entry = Self::empty();
        entry.set_name(name)?;
        entry.inode_number = inode_number;
        Ok(entry)
    }

    /// Overwrite the stored name, NUL padding the rest of the field.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.name = [0; DIR_NAME_LENGTH];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
        Ok(())
    }

    fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(DIR_NAME_LENGTH);
        &self.name[..len]
    }

    /// Get file name, not include '\0'. Bytes that are not UTF-8 come back
    /// as U+FFFD.
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name_bytes() == name.as_bytes()
    }

    pub fn inode_number(&self) -> u32 {
        self.inode_number
    }
}

impl OnDisk for DirEntry {
    const SIZE: usize = DIRENT_SIZE;

    fn decode(bytes: &[u8]) -> Self {
        let mut name = [0u8; DIR_NAME_LENGTH];
        name.copy_from_slice(&bytes[..DIR_NAME_LENGTH]);
        Self {
            name,
            inode_number: read_u32(bytes, DIR_NAME_LENGTH),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        bytes[..DIR_NAME_LENGTH].copy_from_slice(&self.name);
        write_u32(bytes, DIR_NAME_LENGTH, self.inode_number);
    }
}
