// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the MBR and OSIP data model shared across fwpack crates.
// Author: Lukas Bower

//! Data model for the MBR boot sector and the OSIP boot header.

use thiserror::Error;

/// Size of one disk sector in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Number of primary partition slots in an MBR.
pub const MBR_PRIMARY_PARTITIONS: usize = 4;

/// Maximum number of image descriptors in an OSIP header.
pub const MAX_OSIP_IMAGES: usize = 15;

/// One primary partition slot.
///
/// A `partition_type` of zero marks the slot unused. `block_count` is the
/// nominal extent; when `expand` is set the encoder stretches the on-disk
/// count to fill the device at write time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Partition {
    /// Marks the active/bootable partition (`0x80` boot byte).
    pub boot: bool,
    /// Requests write-time expansion to the remaining device capacity.
    pub expand: bool,
    /// MBR partition type byte; zero means unused.
    pub partition_type: u8,
    /// Starting block in 512-byte units.
    pub block_offset: u32,
    /// Nominal block count; pre-expansion minimum when `expand` is set.
    pub block_count: u32,
}

impl Partition {
    /// Whether the slot holds no partition at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partition_type == 0
    }

    /// Whether the slot is a zero-extent, non-expanding placeholder.
    ///
    /// Placeholders are exempt from overlap and expand-ordering checks.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.block_count == 0 && !self.expand
    }
}

/// The fixed four-slot primary partition table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionTable {
    /// Primary partition slots, indexed 0 through 3.
    pub partitions: [Partition; MBR_PRIMARY_PARTITIONS],
}

/// One OSIP image descriptor (OSII).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Osii {
    /// OS minor revision.
    pub os_minor: u16,
    /// OS major revision.
    pub os_major: u16,
    /// First block of the image on the device.
    pub start_block_offset: u32,
    /// DDR address the image is loaded to.
    pub ddr_load_address: u32,
    /// Entry point address.
    pub entry_point: u32,
    /// Image size in blocks.
    pub image_size: u32,
    /// Platform-defined attribute byte.
    pub attribute: u8,
}

/// OSIP boot header, embedded in the MBR in place of bootstrap code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsipHeader {
    /// Header major revision.
    pub major: u8,
    /// Header minor revision.
    pub minor: u8,
    /// Number of pointers reported in the header.
    pub num_pointers: u8,
    /// Number of valid image descriptors; one past the highest used index.
    pub num_images: u8,
    /// Image descriptors; only the first `num_images` are emitted.
    pub descriptors: [Osii; MAX_OSIP_IMAGES],
}

impl Default for OsipHeader {
    fn default() -> Self {
        Self {
            major: 0,
            minor: 0,
            num_pointers: 0,
            num_images: 0,
            descriptors: [Osii::default(); MAX_OSIP_IMAGES],
        }
    }
}

/// Errors produced by the MBR codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MbrError {
    /// Two partitions claim intersecting block ranges.
    #[error("partitions {i} (blocks {i_start} to {i_end}) and {j} (blocks {j_start} to {j_end}) overlap")]
    Overlap {
        /// Lower-indexed slot.
        i: usize,
        /// Start block of slot `i`.
        i_start: u64,
        /// One past the last block of slot `i`.
        i_end: u64,
        /// Higher-indexed slot.
        j: usize,
        /// Start block of slot `j`.
        j_start: u64,
        /// One past the last block of slot `j`.
        j_end: u64,
    },

    /// A partition was declared after the one marked for expansion.
    #[error("a partition can't be specified after the one with \"expand = true\"")]
    ExpandOrder,

    /// The sector does not end in the `0x55 0xAA` boot signature.
    #[error("MBR signature missing")]
    BadSignature,

    /// Bootstrap code and an OSIP header were both supplied.
    #[error("can't specify both bootstrap code and OSIP in the MBR")]
    BootstrapConflict,
}
