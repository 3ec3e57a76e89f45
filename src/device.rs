//! Block device trait for FAT32 (C1).
//!
//! Generalizes the teacher's `BlockDevice` trait
//! (`crates/fat32/src/device.rs`, block-id + fixed-size-buffer reads/writes
//! against a block cache) to byte-offset reads/writes against a plain
//! seekable file, since this driver has no block cache layer and addresses
//! the backing image directly.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

pub trait BlockDevice: Send + Sync {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write(&self, offset: u64, buf: &[u8]) -> Result<()>;
}

/// A `BlockDevice` backed by a regular file or block device node.
pub struct FileBlockDevice {
    file: Mutex<File>,
}

impl FileBlockDevice {
    pub fn open(file: File) -> Self {
        Self {
            file: Mutex::new(file),
        }
    }
}

impl BlockDevice for FileBlockDevice {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset)).map_err(Error::Io)?;
        file.read_exact(buf).map_err(Error::Io)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset)).map_err(Error::Io)?;
        file.write_all(buf).map_err(Error::Io)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// In-memory device for unit tests, avoiding a real file on disk.
    pub struct MemDevice(StdMutex<Vec<u8>>);

    impl MemDevice {
        pub fn new(size: usize) -> Self {
            Self(StdMutex::new(vec![0u8; size]))
        }
    }

    impl BlockDevice for MemDevice {
        fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
            let data = self.0.lock().unwrap();
            let start = offset as usize;
            let end = start + buf.len();
            if end > data.len() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "read past end of device",
                )));
            }
            buf.copy_from_slice(&data[start..end]);
            Ok(())
        }

        fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
            let mut data = self.0.lock().unwrap();
            let start = offset as usize;
            let end = start + buf.len();
            if end > data.len() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "write past end of device",
                )));
            }
            data[start..end].copy_from_slice(buf);
            Ok(())
        }
    }
}
