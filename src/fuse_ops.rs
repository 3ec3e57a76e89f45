//! Operation dispatcher (C6).
//!
//! spec.md's operation table is written against the original's path-based
//! `struct fuse_operations` (`original_source/esqueleto/fat_fuse_ops.c`);
//! the `fuse` crate implements the kernel's low-level, inode-based
//! protocol instead. This adapts by making a tree node id double as the
//! FUSE inode number (`ino = node_id + 1`, since inode 1 is reserved for
//! the mount root and node 0 always is the root) and adding the
//! `lookup`/`forget`/`setattr` entry points the inode protocol requires
//! but spec.md's table doesn't name. `rename` is deliberately left at the
//! trait's default `ENOSYS` per spec.md §9.
//!
//! No teacher file covers FUSE dispatch (`crates/fat32` targets an in-kernel
//! VFS, not userspace FUSE); method bodies instead follow the shape of
//! `fat_fuse_ops.c`'s handlers, translated to the `fuse` crate's reply-object
//! style.

use crate::activity_log;
use crate::dentry::FatTimestamp;
use crate::file::File;
use crate::tree::NodeId;
use crate::volume::Volume;
use chrono::{Datelike, Timelike};
use fuse::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request,
};
use log::{debug, error, warn};
use std::ffi::OsStr;
use time::Timespec;

const TTL: Timespec = Timespec { sec: 1, nsec: 0 };

pub struct FuseDriver {
    volume: Volume,
}

impl FuseDriver {
    pub fn new(volume: Volume) -> Self {
        Self { volume }
    }

    fn node(&self, ino: u64) -> Option<NodeId> {
        if ino == 0 {
            None
        } else {
            Some((ino - 1) as NodeId)
        }
    }

    fn ino_of(node: NodeId) -> u64 {
        node as u64 + 1
    }

    fn attr_of(&self, node: NodeId) -> FileAttr {
        to_file_attr(self.volume.tree.get_file(node), Self::ino_of(node))
    }

    fn is_log_path(path: &str) -> bool {
        path == activity_log::LOG_FILE_PATH
    }

    fn hidden(&self, file: &File) -> bool {
        self.volume.config.hide_log && Self::is_log_path(&file.path)
    }
}

fn to_file_attr(file: &File, ino: u64) -> FileAttr {
    let kind = if file.is_directory() {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    let perm = if file.is_directory() { 0o755 } else { 0o644 };
    let mtime = fat_to_timespec(file.dentry.modify_time.date, file.dentry.modify_time.time);
    let atime = fat_to_timespec(file.dentry.access_date, file.dentry.modify_time.time);
    let ctime = fat_to_timespec(file.dentry.create_time.date, file.dentry.create_time.time);
    FileAttr {
        ino,
        size: file.file_size() as u64,
        blocks: (file.file_size() as u64 + 511) / 512,
        atime,
        mtime,
        ctime,
        crtime: ctime,
        kind,
        perm,
        nlink: 1,
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
        rdev: 0,
        flags: 0,
    }
}

fn fat_to_timespec(date: u16, time: u16) -> Timespec {
    let year = 1980 + ((date >> 9) & 0x7F) as i32;
    let month = (((date >> 5) & 0x0F) as u32).max(1);
    let day = ((date & 0x1F) as u32).max(1);
    let hour = ((time >> 11) & 0x1F) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) as u32) * 2;
    let secs = chrono::NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0);
    Timespec::new(secs, 0)
}

fn timespec_to_fat(ts: Timespec) -> FatTimestamp {
    let naive = chrono::DateTime::from_timestamp(ts.sec, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default();
    let year = (naive.year() - 1980).max(0) as u16;
    let date = (year << 9) | ((naive.month() as u16) << 5) | (naive.day() as u16);
    let time = ((naive.hour() as u16) << 11) | ((naive.minute() as u16) << 5) | (naive.second() as u16 / 2);
    FatTimestamp { date, time }
}

impl Filesystem for FuseDriver {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let parent_node = match self.node(parent) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        let name_str = match name.to_str() {
            Some(s) => s,
            None => return reply.error(libc::ENOENT),
        };
        if let Err(e) = self.volume.ensure_children(parent_node) {
            return reply.error(e.errno());
        }
        match self.volume.tree.find_child(parent_node, name_str) {
            Some(child) if !self.hidden(self.volume.tree.get_file(child)) => {
                reply.entry(&TTL, &self.attr_of(child), 0)
            }
            _ => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.node(ino) {
            Some(node) => reply.attr(&TTL, &self.attr_of(node)),
            None => reply.error(libc::ENOENT),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<Timespec>,
        mtime: Option<Timespec>,
        _fh: Option<u64>,
        _crtime: Option<Timespec>,
        _chgtime: Option<Timespec>,
        _bkuptime: Option<Timespec>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let node = match self.node(ino) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        let mut file = self.volume.tree.get_file(node).clone();
        if let Some(new_len) = size {
            if file.is_directory() {
                return reply.error(libc::EISDIR);
            }
            if self.hidden(&file) {
                return reply.error(libc::ENOENT);
            }
            if let Err(e) = self.volume.truncate(&mut file, new_len as u32) {
                return reply.error(e.errno());
            }
        }
        if atime.is_some() || mtime.is_some() {
            let at = atime.map(timespec_to_fat).unwrap_or(FatTimestamp {
                date: file.dentry.access_date,
                time: file.dentry.modify_time.time,
            });
            let mt = mtime.map(timespec_to_fat).unwrap_or(file.dentry.modify_time);
            if let Err(e) = self.volume.set_times(&mut file, at, mt) {
                return reply.error(e.errno());
            }
        }
        let attr = to_file_attr(&file, ino);
        *self.volume.tree.get_file_mut(node) = file;
        reply.attr(&TTL, &attr);
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: u32, reply: ReplyOpen) {
        let node = match self.node(ino) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        let file = self.volume.tree.get_file(node);
        if file.is_directory() {
            return reply.error(libc::EISDIR);
        }
        if self.hidden(file) {
            return reply.error(libc::ENOENT);
        }
        self.volume.tree.inc_open(node);
        reply.opened(ino, 0);
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: u32, reply: ReplyOpen) {
        let node = match self.node(ino) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        if !self.volume.tree.get_file(node).is_directory() {
            return reply.error(libc::ENOTDIR);
        }
        self.volume.tree.inc_open(node);
        reply.opened(ino, 0);
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let node = match self.node(ino) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        if !self.volume.tree.get_file(node).is_directory() {
            return reply.error(libc::ENOTDIR);
        }
        if let Err(e) = self.volume.ensure_children(node) {
            return reply.error(e.errno());
        }
        if let Err(e) = self.volume.ensure_log_file() {
            warn!("log_init failed: {}", e);
        }
        let parent_ino = self
            .volume
            .tree
            .get_parent(node)
            .map(Self::ino_of)
            .unwrap_or(ino);
        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for child_id in self.volume.tree.child_ids(node) {
            let child = self.volume.tree.get_file(child_id);
            if self.hidden(child) {
                continue;
            }
            let kind = if child.is_directory() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            entries.push((Self::ino_of(child_id), kind, child.name.clone()));
        }
        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn read(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, size: u32, reply: ReplyData) {
        let node = match self.node(ino) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        let path = self.volume.tree.get_file(node).path.clone();
        if self.hidden(self.volume.tree.get_file(node)) {
            return reply.error(libc::ENOENT);
        }
        debug!("read {} offset={} size={}", path, offset, size);
        let mut file = self.volume.tree.get_file(node).clone();
        match self.volume.pread(&mut file, offset as u64, size) {
            Ok(data) => {
                *self.volume.tree.get_file_mut(node) = file;
                if let Err(e) = activity_log::log_operation(&mut self.volume, &path, "read", &data) {
                    warn!("activity log write failed: {}", e);
                }
                reply.data(&data);
            }
            Err(e) => {
                error!("read {} failed: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _flags: u32,
        reply: ReplyWrite,
    ) {
        let node = match self.node(ino) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        let path = self.volume.tree.get_file(node).path.clone();
        if self.hidden(self.volume.tree.get_file(node)) {
            return reply.error(libc::ENOENT);
        }
        debug!("write {} offset={} len={}", path, offset, data.len());
        let mut file = self.volume.tree.get_file(node).clone();
        match self.volume.pwrite(&mut file, offset as u64, data) {
            Ok(written) => {
                *self.volume.tree.get_file_mut(node) = file;
                if written > 0 {
                    if let Err(e) = activity_log::log_operation(&mut self.volume, &path, "write", data) {
                        warn!("activity log write failed: {}", e);
                    }
                }
                reply.written(written);
            }
            Err(e) => {
                error!("write {} failed: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let parent_node = match self.node(parent) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        let name_str = match name.to_str() {
            Some(s) => s,
            None => return reply.error(libc::EINVAL),
        };
        let parent_file = self.volume.tree.get_file(parent_node).clone();
        if !parent_file.is_directory() {
            return reply.error(libc::ENOTDIR);
        }
        if let Err(e) = self.volume.ensure_children(parent_node) {
            return reply.error(e.errno());
        }
        match self.volume.mknod(&parent_file, name_str) {
            Ok(child) => {
                let child_id = self.volume.tree.insert(parent_node, child);
                reply.entry(&TTL, &self.attr_of(child_id), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(&mut self, _req: &Request, parent: u64, name: &OsStr, _mode: u32, reply: ReplyEntry) {
        let parent_node = match self.node(parent) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        let name_str = match name.to_str() {
            Some(s) => s,
            None => return reply.error(libc::EINVAL),
        };
        let parent_file = self.volume.tree.get_file(parent_node).clone();
        if !parent_file.is_directory() {
            return reply.error(libc::ENOTDIR);
        }
        if let Err(e) = self.volume.ensure_children(parent_node) {
            return reply.error(e.errno());
        }
        match self.volume.mkdir(&parent_file, name_str) {
            Ok(child) => {
                let child_id = self.volume.tree.insert(parent_node, child);
                self.volume.tree.mark_populated(child_id);
                reply.entry(&TTL, &self.attr_of(child_id), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let parent_node = match self.node(parent) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        let name_str = match name.to_str() {
            Some(s) => s,
            None => return reply.error(libc::ENOENT),
        };
        if let Err(e) = self.volume.ensure_children(parent_node) {
            return reply.error(e.errno());
        }
        let child_id = match self.volume.tree.find_child(parent_node, name_str) {
            Some(c) => c,
            None => return reply.error(libc::ENOENT),
        };
        let file = self.volume.tree.get_file(child_id).clone();
        if file.is_directory() {
            return reply.error(libc::EISDIR);
        }
        if self.hidden(&file) {
            return reply.error(libc::ENOENT);
        }
        match self.volume.unlink(&file) {
            Ok(()) => {
                let _ = self.volume.tree.delete(&file.path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let parent_node = match self.node(parent) {
            Some(n) => n,
            None => return reply.error(libc::ENOENT),
        };
        let name_str = match name.to_str() {
            Some(s) => s,
            None => return reply.error(libc::ENOENT),
        };
        if let Err(e) = self.volume.ensure_children(parent_node) {
            return reply.error(e.errno());
        }
        let child_id = match self.volume.tree.find_child(parent_node, name_str) {
            Some(c) => c,
            None => return reply.error(libc::ENOENT),
        };
        let file = self.volume.tree.get_file(child_id).clone();
        if !file.is_directory() {
            return reply.error(libc::ENOTDIR);
        }
        if let Err(e) = self.volume.ensure_children(child_id) {
            return reply.error(e.errno());
        }
        if !self.volume.tree.flatten_children(child_id).is_empty() {
            return reply.error(libc::ENOTEMPTY);
        }
        match self.volume.unlink(&file) {
            Ok(()) => {
                let _ = self.volume.tree.delete(&file.path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if let Some(node) = self.node(ino) {
            self.volume.tree.dec_open(node);
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, ino: u64, _fh: u64, _flags: u32, reply: ReplyEmpty) {
        if let Some(node) = self.node(ino) {
            self.volume.tree.dec_open(node);
        }
        reply.ok();
    }
}
