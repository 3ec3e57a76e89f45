//! CLI & mount driver (C8).
//!
//! Argument handling is out of scope for the core (spec.md §1), but the
//! crate still needs an entry point. The `clap` builder style and version
//! string are grounded in the teacher's sibling `fat32-fuse` package
//! manifest (`examples/soxsx-oskernel2023-bitethedisk/fat32-fuse/Cargo.toml`,
//! `clap = "2.33.3"`) even though that package's `src/` was never retrieved;
//! `env_logger` initialization stands in for the teacher's no_std
//! `print.rs` console macros, which don't apply to a std userspace binary.

use clap::{App, Arg};
use fat32_fuse::device::{BlockDevice, FileBlockDevice};
use fat32_fuse::fuse_ops::FuseDriver;
use fat32_fuse::volume::{MountConfig, Volume};
use log::info;
use std::fs::OpenOptions;
use std::process;
use std::sync::Arc;

fn main() {
    env_logger::init();

    let matches = App::new("fat32-fuse")
        .version("0.1.0")
        .author("Haochen Gong <1527198893@qq.com>")
        .about("Mounts a FAT32 image as a FUSE filesystem")
        .arg(
            Arg::with_name("IMAGE")
                .help("path to the FAT32 image file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("MOUNTPOINT")
                .help("directory to mount the filesystem at")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::with_name("show-log")
                .long("show-log")
                .help("do not hide /fs.log from readdir and direct access"),
        )
        .get_matches();

    let image_path = matches.value_of("IMAGE").unwrap();
    let mountpoint = matches.value_of("MOUNTPOINT").unwrap();
    let hide_log = !matches.is_present("show-log");

    let file = match OpenOptions::new().read(true).write(true).open(image_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("fat32-fuse: cannot open {}: {}", image_path, e);
            process::exit(1);
        }
    };

    let device: Arc<dyn BlockDevice> = Arc::new(FileBlockDevice::open(file));
    let volume = match Volume::mount(device, MountConfig { hide_log }) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("fat32-fuse: failed to mount {}: {}", image_path, e);
            process::exit(1);
        }
    };

    info!("mounted {} at {}, hide_log={}", image_path, mountpoint, hide_log);
    let driver = FuseDriver::new(volume);
    if let Err(e) = fuse::mount(driver, &mountpoint, &[]) {
        eprintln!("fat32-fuse: mount failed: {}", e);
        process::exit(1);
    }
}
