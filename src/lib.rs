pub mod activity_log;
pub mod bpb;
pub mod dentry;
pub mod device;
pub mod error;
pub mod fat;
pub mod file;
pub mod fuse_ops;
pub mod tree;
pub mod volume;
