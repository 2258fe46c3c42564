// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode, decode, and validate MBR boot sectors for fwpack.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Master Boot Record codec for firmware update images.
//!
//! The 512-byte boot sector is the one wire format third-party tools
//! (bootloaders, `fdisk`-family utilities) consume directly, so the layout
//! here is bit-exact: four 16-byte primary partition entries, a little-endian
//! disk signature, the `0x55 0xAA` boot signature, and either raw bootstrap
//! code or an OSIP boot header in the first 440 bytes.

mod codec;
mod osip;
mod types;

pub use codec::{decode, encode, verify};
pub use osip::encode_osip;
pub use types::{MbrError, Osii, OsipHeader, Partition, PartitionTable, MAX_OSIP_IMAGES, MBR_PRIMARY_PARTITIONS, SECTOR_SIZE};
