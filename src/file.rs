//! In-memory file handle (C4 data model).
//!
//! Mirrors the teacher's `VirtFile` (`crates/fat32/src/dir.rs`): a cached
//! view of one dentry plus enough positional information to rewrite it.
//! The operations that actually move bytes (`pread`/`pwrite`/`truncate`/
//! `unlink`/`hide`/`set_times`/`read_children`) live on `Volume`
//! (`volume.rs`) rather than here, since they need the device, FAT and BPB
//! the teacher's `FAT32Manager` holds — this struct stays a plain value type
//! so tree nodes can own it without borrowing the volume.

use crate::dentry::{ShortDirEntry, ATTR_DIRECTORY};

/// Locates one 32-byte slot within a directory's cluster chain by a linear
/// slot index, rather than the teacher's `(block_id, offset)` pair, since
/// this driver addresses directories through `Fat::cluster_chain` instead of
/// a block cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirSlotPos {
    pub dir_start_cluster: u32,
    pub slot_index: u32,
}

#[derive(Debug, Clone)]
pub struct File {
    pub path: String,
    pub name: String,
    pub dentry: ShortDirEntry,
    /// `None` only for the root, which has no parent directory entry.
    pub parent_pos: Option<DirSlotPos>,
    /// Number of long-name slots immediately preceding `parent_pos`,
    /// needed by `unlink` to zero the whole atomic group.
    pub lfn_count: u32,
    pub start_cluster: u32,
    pub children_read: bool,
}

impl File {
    pub fn is_directory(&self) -> bool {
        self.dentry.attr & ATTR_DIRECTORY != 0
    }

    pub fn file_size(&self) -> u32 {
        self.dentry.file_size
    }

    pub fn is_hidden(&self) -> bool {
        self.dentry.attr & crate::dentry::ATTR_HIDDEN != 0
    }
}
