// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Block-device write capability for apply runs.
// Author: Lukas Bower

//! Target-device abstraction.
//!
//! The engine writes through [`BlockDevice`] and never touches the target
//! any other way, so tests can capture writes in a scratch file and the
//! production path can point at an SD card, eMMC, or disk image.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

/// Size of one device block in bytes.
pub const BLOCK_SIZE: u64 = 512;

/// Synchronous, exclusive-access write capability for one target device.
pub trait BlockDevice {
    /// Write `data` starting at an absolute byte offset.
    fn write_bytes(&mut self, byte_offset: u64, data: &[u8]) -> io::Result<()>;

    /// Write `data` starting at a block offset.
    fn write_blocks(&mut self, block_offset: u32, data: &[u8]) -> io::Result<()> {
        self.write_bytes(u64::from(block_offset) * BLOCK_SIZE, data)
    }

    /// Total block count of the device, or zero when unknown.
    fn total_blocks(&self) -> u32;

    /// Flush pending writes to the medium.
    fn sync(&mut self) -> io::Result<()>;
}

/// A block device backed by a file: a disk image or a raw device node.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    total_blocks: u32,
}

impl FileDevice {
    /// Open (or create) the target at `path` for writing.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        // Sizes past the MBR's 32-bit horizon report as unknown.
        let total_blocks = u32::try_from(len / BLOCK_SIZE).unwrap_or(0);
        Ok(Self { file, total_blocks })
    }
}

impl BlockDevice for FileDevice {
    fn write_bytes(&mut self, byte_offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(byte_offset))?;
        self.file.write_all(data)
    }

    fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn writes_land_at_the_requested_block() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("disk.img");
        std::fs::write(&path, vec![0u8; 4 * BLOCK_SIZE as usize]).expect("seed image");

        let mut device = FileDevice::open(&path).expect("open");
        assert_eq!(device.total_blocks(), 4);
        device.write_blocks(2, b"hello").expect("write");
        device.sync().expect("sync");

        let mut contents = Vec::new();
        File::open(&path)
            .expect("reopen")
            .read_to_end(&mut contents)
            .expect("read");
        assert_eq!(&contents[2 * BLOCK_SIZE as usize..2 * BLOCK_SIZE as usize + 5], b"hello");
    }
}
