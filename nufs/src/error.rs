use core::fmt;

use thiserror::Error;

/// Things that can run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Inode,
    Block,
    /// A slot in the block cache, all of them pinned by live handles.
    CacheSlot,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Inode => f.write_str("inode"),
            Resource::Block => f.write_str("block"),
            Resource::CacheSlot => f.write_str("block cache slot"),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("no free {0} left")]
    ResourceExhausted(Resource),
    #[error("root directory is full ({capacity} entries)")]
    DirectoryFull { capacity: usize },
    #[error("file already exists")]
    AlreadyExists,
    #[error("name is longer than {limit} bytes")]
    NameTooLong { limit: usize },
    #[error("name is empty or contains '/' or NUL")]
    InvalidName,
    #[error("path is not '/' or a single '/name' segment")]
    InvalidPath,
    #[error("is a directory")]
    IsDirectory,
    #[error("range {offset}+{len} exceeds the {limit}-byte file limit")]
    FileTooLarge {
        offset: usize,
        len: usize,
        limit: usize,
    },
    #[error("{kind} index {index} is out of range")]
    OutOfRange { kind: Resource, index: usize },
    #[error("{kind} {index} is not allocated")]
    NotAllocated { kind: Resource, index: usize },
    #[error("inode {inum} already has a data block")]
    InodeInUse { inum: u32 },
}

pub type Result<T> = core::result::Result<T, FsError>;
