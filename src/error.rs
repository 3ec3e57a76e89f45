//! Crate-wide error type.
//!
//! Every fallible operation below C6 returns `Result<T, Error>`. C6 is the
//! only place that turns an `Error` into a negated POSIX errno (see
//! `fuse_ops.rs`), matching the teacher's pattern of a flat enum consumed by
//! `match` at the call site (`crates/fat32/src/dir.rs::DirError`,
//! `crates/fat32/src/fat.rs::ClusterChainErr`).

use std::fmt;

#[derive(Debug)]
pub enum Error {
    NotFound,
    NotDirectory,
    IsDirectory,
    NotEmpty,
    Busy,
    Overflow,
    NoSpace,
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "no such file or directory"),
            Error::NotDirectory => write!(f, "not a directory"),
            Error::IsDirectory => write!(f, "is a directory"),
            Error::NotEmpty => write!(f, "directory not empty"),
            Error::Busy => write!(f, "resource busy"),
            Error::Overflow => write!(f, "offset beyond end of file"),
            Error::NoSpace => write!(f, "no space left on device"),
            Error::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl Error {
    /// Positive errno, matching what `reply.error()` expects from the `fuse` crate.
    pub fn errno(&self) -> i32 {
        match self {
            Error::NotFound => libc::ENOENT,
            Error::NotDirectory => libc::ENOTDIR,
            Error::IsDirectory => libc::EISDIR,
            Error::NotEmpty => libc::ENOTEMPTY,
            Error::Busy => libc::EBUSY,
            Error::Overflow => libc::EOVERFLOW,
            Error::NoSpace => libc::ENOSPC,
            Error::Io(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
