// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode, decode, and validate the 512-byte MBR sector.
// Author: Lukas Bower

//! Partition-table codec for the 512-byte MBR sector.

use crate::osip::encode_osip;
use crate::types::{MbrError, OsipHeader, Partition, PartitionTable, MBR_PRIMARY_PARTITIONS, SECTOR_SIZE};

// Hardcoded geometry; CHS addressing is irrelevant for the flash and
// SD/eMMC media fwpack targets, so these only feed the legacy fields.
const SECTORS_PER_HEAD: u64 = 63;
const HEADS_PER_CYLINDER: u64 = 255;

const PARTITION_TABLE_OFFSET: usize = 446;
const PARTITION_ENTRY_LEN: usize = 16;
const BOOTSTRAP_LEN: usize = 440;

/// Check that the table's partitions make sense and do not overlap.
///
/// Empty slots are skipped. A zero-extent, non-expanding slot is a
/// placeholder and exempt from both checks. The partition marked `expand`
/// must be the highest-indexed non-placeholder slot, and every pair of
/// remaining partitions must occupy disjoint half-open block ranges.
pub fn verify(table: &PartitionTable) -> Result<(), MbrError> {
    let mut expanding = false;
    for partition in &table.partitions {
        if partition.is_empty() || partition.is_placeholder() {
            continue;
        }
        if expanding {
            return Err(MbrError::ExpandOrder);
        }
        if partition.expand {
            expanding = true;
        }
    }

    for i in 0..MBR_PRIMARY_PARTITIONS {
        let a = &table.partitions[i];
        if a.is_empty() || a.is_placeholder() {
            continue;
        }
        let (a_start, a_end) = block_range(a);
        for j in (i + 1)..MBR_PRIMARY_PARTITIONS {
            let b = &table.partitions[j];
            if b.is_empty() || b.is_placeholder() {
                continue;
            }
            let (b_start, b_end) = block_range(b);
            if a_start < b_end && b_start < a_end {
                return Err(MbrError::Overlap {
                    i,
                    i_start: a_start,
                    i_end: a_end,
                    j,
                    j_start: b_start,
                    j_end: b_end,
                });
            }
        }
    }

    Ok(())
}

// Half-open claimed range in u64 so `offset + count` cannot wrap. An
// expanding partition with a zero nominal count still claims its first
// block; it grows from there at write time.
fn block_range(partition: &Partition) -> (u64, u64) {
    let start = u64::from(partition.block_offset);
    let count = u64::from(partition.block_count).max(u64::from(partition.expand));
    (start, start + count)
}

/// Encode a master boot record.
///
/// `bootstrap` and `osip` are mutually exclusive; `num_blocks` is the total
/// block count of the destination device, or zero when unknown. The
/// partition marked `expand` has its emitted block count stretched to
/// `num_blocks - offset` when the device is larger than its nominal extent;
/// the in-memory table is never mutated.
pub fn encode(
    table: &PartitionTable,
    bootstrap: Option<&[u8; 440]>,
    osip: Option<&OsipHeader>,
    disk_signature: u32,
    num_blocks: u32,
) -> Result<[u8; SECTOR_SIZE], MbrError> {
    if bootstrap.is_some() && osip.is_some() {
        return Err(MbrError::BootstrapConflict);
    }
    verify(table)?;

    let mut output = [0u8; SECTOR_SIZE];
    if let Some(code) = bootstrap {
        output[..BOOTSTRAP_LEN].copy_from_slice(code);
    }
    if let Some(header) = osip {
        encode_osip(header, &mut output[..BOOTSTRAP_LEN]);
    }

    output[440..444].copy_from_slice(&disk_signature.to_le_bytes());
    // Bytes 444-445 stay zero: not copy protected.

    for (i, partition) in table.partitions.iter().enumerate() {
        let start = PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_LEN;
        encode_entry(partition, &mut output[start..start + PARTITION_ENTRY_LEN], num_blocks);
    }

    output[510] = 0x55;
    output[511] = 0xaa;
    Ok(output)
}

fn encode_entry(partition: &Partition, output: &mut [u8], num_blocks: u32) {
    let mut block_count = partition.block_count;
    if partition.expand && num_blocks > partition.block_offset.saturating_add(partition.block_count) {
        block_count = num_blocks - partition.block_offset;
    }

    if !partition.is_empty() {
        output[0] = if partition.boot { 0x80 } else { 0x00 };
        lba_to_chs(u64::from(partition.block_offset), &mut output[1..4]);
        output[4] = partition.partition_type;
        let end = u64::from(partition.block_offset) + u64::from(block_count);
        if end > 0 {
            lba_to_chs(end - 1, &mut output[5..8]);
        }
    }

    // Unused entries keep their offset/count in the trailing eight bytes:
    // some images stash auxiliary data in the free slots, so this is
    // intentional even though the geometry fields above are zeroed.
    output[8..12].copy_from_slice(&partition.block_offset.to_le_bytes());
    output[12..16].copy_from_slice(&block_count.to_le_bytes());
}

// Best-effort CHS. Anything past the CHS horizon keeps all-zero bytes;
// the LBA fields are authoritative for every consumer that matters.
fn lba_to_chs(lba: u64, output: &mut [u8]) {
    if lba <= SECTORS_PER_HEAD * HEADS_PER_CYLINDER * 0x3ff {
        let cylinder = (lba / (SECTORS_PER_HEAD * HEADS_PER_CYLINDER)) as u16;
        let head = ((lba / SECTORS_PER_HEAD) % HEADS_PER_CYLINDER) as u8;
        let sector = (lba % SECTORS_PER_HEAD) as u8 + 1;

        output[0] = head;
        output[1] = (((cylinder & 0x300) >> 2) as u8) | sector;
        output[2] = (cylinder & 0xff) as u8;
    }
}

/// Decode the partition table from a 512-byte MBR sector.
///
/// Fails with [`MbrError::BadSignature`] unless the sector ends in
/// `0x55 0xAA`. CHS fields are never decoded; only the authoritative LBA
/// offset and count are read back, so `expand` is always false.
pub fn decode(input: &[u8; SECTOR_SIZE]) -> Result<PartitionTable, MbrError> {
    if input[510] != 0x55 || input[511] != 0xaa {
        return Err(MbrError::BadSignature);
    }

    let mut table = PartitionTable::default();
    for (i, partition) in table.partitions.iter_mut().enumerate() {
        let entry = &input[PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_LEN..];
        partition.boot = entry[0] & 0x80 != 0;
        partition.partition_type = entry[4];
        partition.block_offset = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]);
        partition.block_count = u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]);
    }
    Ok(table)
}
