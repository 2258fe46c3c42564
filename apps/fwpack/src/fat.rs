// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: FAT filesystem collaborator seam for the task engine.
// Author: Lukas Bower

//! FAT collaborator interface.
//!
//! The engine delegates `fat_mkfs`, `fat_write`, and `fat_cp` operations
//! here verbatim and interprets only their success or failure; filesystem
//! internals are out of scope for this crate. Platform builds supply a
//! real implementation, tests use a recording mock.

use std::io;

use crate::device::BlockDevice;

/// FAT filesystem operations on a partition of the target device.
pub trait FatOps {
    /// Format a FAT filesystem spanning `block_count` blocks at
    /// `block_offset`.
    fn mkfs(
        &mut self,
        device: &mut dyn BlockDevice,
        block_offset: u32,
        block_count: u32,
    ) -> io::Result<()>;

    /// Append `data` to `path` inside the filesystem at `block_offset`,
    /// creating the file on the first chunk.
    fn write(
        &mut self,
        device: &mut dyn BlockDevice,
        block_offset: u32,
        path: &str,
        data: &[u8],
    ) -> io::Result<()>;

    /// Copy a file between filesystems on the device.
    fn copy(
        &mut self,
        device: &mut dyn BlockDevice,
        src_offset: u32,
        src_path: &str,
        dst_offset: u32,
        dst_path: &str,
    ) -> io::Result<()>;
}

/// Placeholder collaborator for builds without FAT support linked in.
#[derive(Debug, Default)]
pub struct UnsupportedFat;

impl UnsupportedFat {
    fn unsupported(operation: &str) -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{operation}: FAT support is not built into this binary"),
        )
    }
}

impl FatOps for UnsupportedFat {
    fn mkfs(
        &mut self,
        _device: &mut dyn BlockDevice,
        _block_offset: u32,
        _block_count: u32,
    ) -> io::Result<()> {
        Err(Self::unsupported("fat_mkfs"))
    }

    fn write(
        &mut self,
        _device: &mut dyn BlockDevice,
        _block_offset: u32,
        _path: &str,
        _data: &[u8],
    ) -> io::Result<()> {
        Err(Self::unsupported("fat_write"))
    }

    fn copy(
        &mut self,
        _device: &mut dyn BlockDevice,
        _src_offset: u32,
        _src_path: &str,
        _dst_offset: u32,
        _dst_path: &str,
    ) -> io::Result<()> {
        Err(Self::unsupported("fat_cp"))
    }
}
