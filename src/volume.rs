//! Volume orchestration (C2 mount path, plus the C4 operations that move
//! bytes through C1/C2/C3).
//!
//! Grounded on the teacher's `FAT32Manager` (`crates/fat32/src/lib.rs`),
//! which owns the device, BPB and FAT and exposes directory/file
//! operations built from `dir.rs`'s dentry walking. This driver folds the
//! teacher's inode cache into `tree::Tree` and keeps the mutating
//! operations (`pread`/`pwrite`/`truncate`/`unlink`/`hide`/`set_times`,
//! plus `mkdir`/`mknod`) here since they all need `device` + `fat` + `bpb`
//! together.

use std::convert::TryInto;

use crate::bpb::BiosParameterBlock;
use crate::dentry::{
    decode_slot, generate_short_name, long_name_chunk_to_string, long_name_split, needs_long_name,
    short_name_format, split_name_ext, FatTimestamp, LongDirEntry, Slot, ShortDirEntry,
    ATTR_ARCHIVE, ATTR_DIRECTORY, ATTR_HIDDEN, ATTR_SYSTEM, DIRENT_SIZE, DIR_ENTRY_DELETED,
    DIR_ENTRY_LAST_AND_UNUSED, LAST_LONG_ENTRY,
};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::fat::Fat;
use crate::file::{DirSlotPos, File};
use crate::tree::{NodeId, Tree};
use chrono::{Datelike, Timelike};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct MountConfig {
    pub hide_log: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self { hide_log: true }
    }
}

pub struct Volume {
    device: Arc<dyn BlockDevice>,
    bpb: BiosParameterBlock,
    fat: Fat,
    pub tree: Tree,
    pub config: MountConfig,
}

fn now_timestamp() -> FatTimestamp {
    let now = chrono::Local::now();
    let year = (now.year() - 1980).max(0) as u16;
    let date = (year << 9) | ((now.month() as u16) << 5) | (now.day() as u16);
    let time = ((now.hour() as u16) << 11) | ((now.minute() as u16) << 5) | (now.second() as u16 / 2);
    FatTimestamp { date, time }
}

fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

fn reconstruct_long_name(entries: &[LongDirEntry]) -> String {
    let mut sorted: Vec<&LongDirEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.sequence());
    sorted
        .into_iter()
        .map(|e| long_name_chunk_to_string(&e.chars))
        .collect()
}

impl Volume {
    pub fn mount(device: Arc<dyn BlockDevice>, config: MountConfig) -> Result<Self> {
        let mut sector = [0u8; crate::bpb::BOOT_SECTOR_SIZE];
        device.read(0, &mut sector)?;
        let bpb = BiosParameterBlock::parse(&sector)?;
        let fat = Fat::load(device.clone(), bpb)?;
        let root = File {
            path: "/".to_string(),
            name: String::new(),
            dentry: ShortDirEntry::new([0x20; 8], [0x20; 3], ATTR_DIRECTORY, bpb.root_cluster),
            parent_pos: None,
            lfn_count: 0,
            start_cluster: bpb.root_cluster,
            children_read: false,
        };
        Ok(Self {
            device,
            bpb,
            fat,
            tree: Tree::new(root),
            config,
        })
    }

    fn slots_per_cluster(&self) -> u32 {
        (self.bpb.bytes_per_cluster() / DIRENT_SIZE as u64) as u32
    }

    fn slot_offset(&self, pos: DirSlotPos) -> Result<u64> {
        let spc = self.slots_per_cluster();
        let chain = self.fat.cluster_chain(pos.dir_start_cluster);
        let cluster = *chain
            .get((pos.slot_index / spc) as usize)
            .ok_or(Error::NotFound)?;
        let within = (pos.slot_index % spc) as u64 * DIRENT_SIZE as u64;
        Ok(self.bpb.cluster_to_offset(cluster) + within)
    }

    fn read_slot(&self, pos: DirSlotPos) -> Result<[u8; DIRENT_SIZE]> {
        let offset = self.slot_offset(pos)?;
        let mut buf = [0u8; DIRENT_SIZE];
        self.device.read(offset, &mut buf)?;
        Ok(buf)
    }

    fn write_slot(&self, pos: DirSlotPos, bytes: &[u8; DIRENT_SIZE]) -> Result<()> {
        let offset = self.slot_offset(pos)?;
        self.device.write(offset, bytes)
    }

    fn write_dentry_back(&self, file: &File) -> Result<()> {
        match file.parent_pos {
            Some(pos) => self.write_slot(pos, &file.dentry.to_bytes()),
            None => Ok(()),
        }
    }

    /// Stream the 32-byte slots of a directory's chain into classified
    /// `File`s, per spec.md §4.3. Stops at the first trailing free slot.
    pub fn read_children(&self, dir: &File) -> Result<Vec<File>> {
        if !dir.is_directory() {
            return Err(Error::NotDirectory);
        }
        let chain = self.fat.cluster_chain(dir.start_cluster);
        let spc = self.slots_per_cluster();
        let mut children = Vec::new();
        let mut pending: Vec<LongDirEntry> = Vec::new();
        let mut slot_index: u32 = 0;
        'outer: for &cluster in &chain {
            let mut buf = vec![0u8; self.bpb.bytes_per_cluster() as usize];
            self.device.read(self.bpb.cluster_to_offset(cluster), &mut buf)?;
            for chunk in buf.chunks_exact(DIRENT_SIZE) {
                let bytes: [u8; DIRENT_SIZE] = chunk.try_into().unwrap();
                match decode_slot(&bytes) {
                    Slot::Free => break 'outer,
                    Slot::Deleted => pending.clear(),
                    Slot::VolumeLabel => pending.clear(),
                    Slot::LongName(lde) => pending.push(lde),
                    Slot::Short(sde) => {
                        let short_name = sde.short_name_string();
                        if short_name != "." && short_name != ".." {
                            let checksum_ok =
                                !pending.is_empty() && pending.iter().all(|e| e.checksum == sde.checksum());
                            let (name, lfn_count) = if checksum_ok {
                                (reconstruct_long_name(&pending), pending.len() as u32)
                            } else {
                                (short_name, 0)
                            };
                            children.push(File {
                                path: join_path(&dir.path, &name),
                                name,
                                start_cluster: sde.first_cluster(),
                                dentry: sde,
                                parent_pos: Some(DirSlotPos {
                                    dir_start_cluster: dir.start_cluster,
                                    slot_index,
                                }),
                                lfn_count,
                                children_read: false,
                            });
                        }
                        pending.clear();
                    }
                }
                slot_index += 1;
            }
        }
        let _ = spc;
        Ok(children)
    }

    pub fn ensure_children(&mut self, node: NodeId) -> Result<()> {
        if self.tree.is_populated(node) {
            return Ok(());
        }
        let dir_file = self.tree.get_file(node).clone();
        let children = self.read_children(&dir_file)?;
        for child in children {
            self.tree.insert(node, child);
        }
        self.tree.mark_populated(node);
        Ok(())
    }

    /// Find a run of `needed` free-or-deleted slots in `dir`'s chain,
    /// extending the chain by whole clusters if none is long enough.
    fn allocate_slots(&mut self, dir_start_cluster: u32, needed: u32) -> Result<u32> {
        let spc = self.slots_per_cluster();
        let mut chain = self.fat.cluster_chain(dir_start_cluster);
        let mut run_start: Option<u32> = None;
        let mut run_len = 0u32;
        let total = chain.len() as u32 * spc;
        for slot in 0..total {
            let bytes = self.read_slot(DirSlotPos {
                dir_start_cluster,
                slot_index: slot,
            })?;
            if matches!(decode_slot(&bytes), Slot::Free | Slot::Deleted) {
                if run_start.is_none() {
                    run_start = Some(slot);
                }
                run_len += 1;
                if run_len >= needed {
                    return Ok(run_start.unwrap());
                }
            } else {
                run_start = None;
                run_len = 0;
            }
        }
        let shortfall = needed - run_len;
        let extra_clusters = ((shortfall as u64 * DIRENT_SIZE as u64 + self.bpb.bytes_per_cluster() - 1)
            / self.bpb.bytes_per_cluster())
        .max(1) as u32;
        let new_total = chain.len() as u32 + extra_clusters;
        self.fat.extend_chain(dir_start_cluster, new_total)?;
        chain = self.fat.cluster_chain(dir_start_cluster);
        let zeros = vec![0u8; self.bpb.bytes_per_cluster() as usize];
        for &cluster in &chain[(chain.len() - extra_clusters as usize)..] {
            self.device.write(self.bpb.cluster_to_offset(cluster), &zeros)?;
        }
        Ok(run_start.unwrap_or(total))
    }

    /// Write a new dentry group (long-name entries, if needed, then the
    /// short entry last) into `dir`. Does not allocate data clusters.
    pub fn create_child(&mut self, dir: &File, name: &str, attr: u8) -> Result<File> {
        if !dir.is_directory() {
            return Err(Error::NotDirectory);
        }
        let long_form_needed = needs_long_name(name);
        let (sname, sext) = if long_form_needed {
            let (base, ext) = generate_short_name(name);
            short_name_format(&base, &ext)
        } else {
            let (base, ext) = split_name_ext(name);
            short_name_format(base, ext)
        };
        let mut sde = ShortDirEntry::new(sname, sext, attr, 0);
        let now = now_timestamp();
        sde.create_time = now;
        sde.modify_time = now;
        sde.access_date = now.date;

        let lfn_chunks: Vec<LongDirEntry> = if long_form_needed {
            let checksum = sde.checksum();
            let groups = long_name_split(name);
            let last = groups.len() - 1;
            groups
                .into_iter()
                .enumerate()
                .map(|(i, chars)| {
                    let mut order = i as u8 + 1;
                    if i == last {
                        order |= LAST_LONG_ENTRY;
                    }
                    LongDirEntry {
                        order,
                        chars,
                        checksum,
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        let needed = lfn_chunks.len() as u32 + 1;
        let start_slot = self.allocate_slots(dir.start_cluster, needed)?;

        let mut idx = start_slot;
        for chunk in lfn_chunks.iter().rev() {
            self.write_slot(
                DirSlotPos {
                    dir_start_cluster: dir.start_cluster,
                    slot_index: idx,
                },
                &chunk.to_bytes(),
            )?;
            idx += 1;
        }
        let short_pos = DirSlotPos {
            dir_start_cluster: dir.start_cluster,
            slot_index: idx,
        };
        self.write_slot(short_pos, &sde.to_bytes())?;

        Ok(File {
            path: join_path(&dir.path, name),
            name: name.to_string(),
            dentry: sde,
            parent_pos: Some(short_pos),
            lfn_count: lfn_chunks.len() as u32,
            start_cluster: 0,
            children_read: false,
        })
    }

    pub fn mknod(&mut self, dir: &File, name: &str) -> Result<File> {
        self.create_child(dir, name, ATTR_ARCHIVE)
    }

    pub fn mkdir(&mut self, dir: &File, name: &str) -> Result<File> {
        let mut child = self.create_child(dir, name, ATTR_DIRECTORY)?;
        let cluster = self.fat.alloc_chain(1)?;
        child.start_cluster = cluster;
        child.dentry.set_first_cluster(cluster);
        self.write_dentry_back(&child)?;
        self.init_dir_cluster(cluster, dir.start_cluster)?;
        Ok(child)
    }

    fn init_dir_cluster(&self, cluster: u32, parent_cluster: u32) -> Result<()> {
        let zeros = vec![0u8; self.bpb.bytes_per_cluster() as usize];
        self.device.write(self.bpb.cluster_to_offset(cluster), &zeros)?;
        let now = now_timestamp();
        let mut dot = ShortDirEntry::new(*b".       ", [0x20; 3], ATTR_DIRECTORY, cluster);
        dot.create_time = now;
        dot.modify_time = now;
        let parent_for_dotdot = if parent_cluster == self.root_cluster() {
            0
        } else {
            parent_cluster
        };
        let mut dotdot = ShortDirEntry::new(*b"..      ", [0x20; 3], ATTR_DIRECTORY, parent_for_dotdot);
        dotdot.create_time = now;
        dotdot.modify_time = now;
        self.write_slot(
            DirSlotPos {
                dir_start_cluster: cluster,
                slot_index: 0,
            },
            &dot.to_bytes(),
        )?;
        self.write_slot(
            DirSlotPos {
                dir_start_cluster: cluster,
                slot_index: 1,
            },
            &dotdot.to_bytes(),
        )?;
        Ok(())
    }

    pub fn root_cluster(&self) -> u32 {
        self.bpb.root_cluster
    }

    pub fn pread(&mut self, file: &mut File, offset: u64, n: u32) -> Result<Vec<u8>> {
        if file.is_directory() {
            return Err(Error::IsDirectory);
        }
        let size = file.file_size() as u64;
        if offset >= size {
            return Ok(Vec::new());
        }
        let to_read = n.min((size - offset) as u32) as usize;
        let bpc = self.bpb.bytes_per_cluster();
        let chain = self.fat.cluster_chain(file.start_cluster);
        let mut out = Vec::with_capacity(to_read);
        let mut remaining = to_read;
        let mut cluster_idx = (offset / bpc) as usize;
        let mut within = offset % bpc;
        while remaining > 0 {
            let cluster = *chain.get(cluster_idx).ok_or(Error::Overflow)?;
            let chunk = std::cmp::min(remaining as u64, bpc - within) as usize;
            let mut buf = vec![0u8; chunk];
            self.device
                .read(self.bpb.cluster_to_offset(cluster) + within, &mut buf)?;
            out.extend_from_slice(&buf);
            remaining -= chunk;
            cluster_idx += 1;
            within = 0;
        }
        file.dentry.access_date = now_timestamp().date;
        self.write_dentry_back(file)?;
        Ok(out)
    }

    pub fn pwrite(&mut self, file: &mut File, offset: u64, data: &[u8]) -> Result<u32> {
        if file.is_directory() {
            return Err(Error::IsDirectory);
        }
        let size = file.file_size() as u64;
        if offset > size {
            return Err(Error::Overflow);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset + data.len() as u64;
        let bpc = self.bpb.bytes_per_cluster();
        let needed_clusters = ((end + bpc - 1) / bpc) as u32;
        if file.start_cluster == 0 {
            file.start_cluster = self.fat.alloc_chain(needed_clusters.max(1))?;
        } else {
            let have = self.fat.chain_len(file.start_cluster) as u32;
            if have < needed_clusters {
                self.fat.extend_chain(file.start_cluster, needed_clusters)?;
            }
        }
        let chain = self.fat.cluster_chain(file.start_cluster);
        let mut cluster_idx = (offset / bpc) as usize;
        let mut within = offset % bpc;
        let mut written = 0usize;
        while written < data.len() {
            let cluster = *chain.get(cluster_idx).ok_or(Error::NoSpace)?;
            let chunk = std::cmp::min((data.len() - written) as u64, bpc - within) as usize;
            self.device.write(
                self.bpb.cluster_to_offset(cluster) + within,
                &data[written..written + chunk],
            )?;
            written += chunk;
            cluster_idx += 1;
            within = 0;
        }
        file.dentry.file_size = std::cmp::max(file.dentry.file_size, end as u32);
        file.dentry.modify_time = now_timestamp();
        self.write_dentry_back(file)?;
        Ok(written as u32)
    }

    pub fn truncate(&mut self, file: &mut File, new_len: u32) -> Result<()> {
        if file.is_directory() {
            return Err(Error::IsDirectory);
        }
        let bpc = self.bpb.bytes_per_cluster();
        if new_len < file.file_size() {
            if new_len == 0 {
                self.fat.free_chain(file.start_cluster)?;
                file.start_cluster = 0;
            } else {
                let keep = ((new_len as u64 + bpc - 1) / bpc) as u32;
                self.fat.truncate_chain(file.start_cluster, keep)?;
            }
            file.dentry.file_size = new_len;
            file.dentry.modify_time = now_timestamp();
            self.write_dentry_back(file)
        } else if new_len > file.file_size() {
            let pad = vec![0u8; (new_len - file.file_size()) as usize];
            let offset = file.file_size() as u64;
            self.pwrite(file, offset, &pad).map(|_| ())
        } else {
            Ok(())
        }
    }

    pub fn unlink(&mut self, file: &File) -> Result<()> {
        let pos = file.parent_pos.ok_or(Error::Busy)?;
        if file.start_cluster != 0 {
            self.fat.free_chain(file.start_cluster)?;
        }
        let mut short_bytes = self.read_slot(pos)?;
        short_bytes[0] = DIR_ENTRY_DELETED;
        self.write_slot(pos, &short_bytes)?;
        for i in 1..=file.lfn_count {
            if pos.slot_index < i {
                break;
            }
            let lfn_pos = DirSlotPos {
                dir_start_cluster: pos.dir_start_cluster,
                slot_index: pos.slot_index - i,
            };
            let mut zeroed = [0u8; DIRENT_SIZE];
            zeroed[0] = DIR_ENTRY_LAST_AND_UNUSED;
            self.write_slot(lfn_pos, &zeroed)?;
        }
        Ok(())
    }

    pub fn hide(&mut self, file: &mut File) -> Result<()> {
        file.dentry.attr |= ATTR_HIDDEN | ATTR_SYSTEM;
        self.write_dentry_back(file)
    }

    pub fn set_times(&mut self, file: &mut File, atime: FatTimestamp, mtime: FatTimestamp) -> Result<()> {
        if file.parent_pos.is_none() {
            return Ok(());
        }
        file.dentry.access_date = atime.date;
        file.dentry.modify_time = mtime;
        self.write_dentry_back(file)
    }

    /// Locate `/fs.log`, creating and hiding it if absent. Best-effort: if
    /// the root has no accessible parent slot (it never does — the root's
    /// `parent_pos` is always `None`), hiding is skipped but the node still
    /// exists and is still filterable by name, per spec.md §9's open question.
    pub fn ensure_log_file(&mut self) -> Result<NodeId> {
        let root = self.tree.root();
        self.ensure_children(root)?;
        if let Some(id) = self.tree.search("/fs.log") {
            return Ok(id);
        }
        let root_file = self.tree.get_file(root).clone();
        let mut child = self.mknod(&root_file, "fs.log")?;
        self.hide(&mut child)?;
        Ok(self.tree.insert(root, child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpb::BOOT_SECTOR_SIZE;
    use crate::device::test_support::MemDevice;

    fn formatted_image() -> Arc<dyn BlockDevice> {
        let bytes_per_sector = 512u64;
        let sectors_per_cluster = 1u64;
        let reserved = 1u64;
        let num_fats = 1u64;
        let fat_sectors = 16u64;
        let total_sectors = 4096u64;
        let size = (total_sectors * bytes_per_sector) as usize;
        let device = MemDevice::new(size);

        let mut sector = [0u8; BOOT_SECTOR_SIZE];
        sector[0x0B..0x0D].copy_from_slice(&(bytes_per_sector as u16).to_le_bytes());
        sector[0x0D] = sectors_per_cluster as u8;
        sector[0x0E..0x10].copy_from_slice(&(reserved as u16).to_le_bytes());
        sector[0x10] = num_fats as u8;
        sector[0x20..0x24].copy_from_slice(&(total_sectors as u32).to_le_bytes());
        sector[0x24..0x28].copy_from_slice(&(fat_sectors as u32).to_le_bytes());
        sector[0x2C..0x30].copy_from_slice(&2u32.to_le_bytes());
        device.write(0, &sector).unwrap();

        // Mark cluster 2 (root) allocated and end-of-chain in the FAT.
        let fat_offset = reserved * bytes_per_sector;
        let mut eoc = [0u8; 4];
        eoc.copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
        device.write(fat_offset + 2 * 4, &eoc).unwrap();

        Arc::new(device)
    }

    fn mounted() -> Volume {
        Volume::mount(formatted_image(), MountConfig::default()).unwrap()
    }

    #[test]
    fn mknod_then_readdir_round_trips() {
        let mut vol = mounted();
        let root_id = vol.tree.root();
        let root = vol.tree.get_file(root_id).clone();
        let child = vol.mknod(&root, "a.txt").unwrap();
        assert_eq!(child.file_size(), 0);
        let children = vol.read_children(&root).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "a.txt");
    }

    #[test]
    fn write_then_read_round_trips_bytes() {
        let mut vol = mounted();
        let root = vol.tree.get_file(vol.tree.root()).clone();
        let mut child = vol.mknod(&root, "a.txt").unwrap();
        let n = vol.pwrite(&mut child, 0, b"Hello revolution").unwrap();
        assert_eq!(n as usize, b"Hello revolution".len());
        let data = vol.pread(&mut child, 0, 64).unwrap();
        assert_eq!(data, b"Hello revolution");
    }

    #[test]
    fn truncate_frees_suffix_clusters() {
        let mut vol = mounted();
        let root = vol.tree.get_file(vol.tree.root()).clone();
        let mut child = vol.mknod(&root, "a.txt").unwrap();
        let big = vec![b'x'; 4096];
        vol.pwrite(&mut child, 0, &big).unwrap();
        vol.truncate(&mut child, 5).unwrap();
        assert_eq!(child.file_size(), 5);
        let data = vol.pread(&mut child, 0, 16).unwrap();
        assert_eq!(data, b"xxxxx");
    }

    #[test]
    fn unlink_removes_dentry_and_frees_chain() {
        let mut vol = mounted();
        let root = vol.tree.get_file(vol.tree.root()).clone();
        let mut child = vol.mknod(&root, "a.txt").unwrap();
        vol.pwrite(&mut child, 0, b"data").unwrap();
        vol.unlink(&child).unwrap();
        let children = vol.read_children(&root).unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn long_name_round_trips_through_directory() {
        let mut vol = mounted();
        let root = vol.tree.get_file(vol.tree.root()).clone();
        vol.mknod(&root, "a fairly long file name.txt").unwrap();
        let children = vol.read_children(&root).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "a fairly long file name.txt");
    }

    #[test]
    fn write_past_size_is_overflow() {
        let mut vol = mounted();
        let root = vol.tree.get_file(vol.tree.root()).clone();
        let mut child = vol.mknod(&root, "a.txt").unwrap();
        let err = vol.pwrite(&mut child, 10, b"x").unwrap_err();
        assert!(matches!(err, Error::Overflow));
    }

    #[test]
    fn mkdir_creates_populated_directory() {
        let mut vol = mounted();
        let root = vol.tree.get_file(vol.tree.root()).clone();
        let sub = vol.mkdir(&root, "sub").unwrap();
        assert!(sub.is_directory());
        let children = vol.read_children(&sub).unwrap();
        assert!(children.is_empty(), "dot entries must be filtered out");
    }
}
