// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load and validate the declarative update configuration.
// Author: Lukas Bower

//! Declarative update configuration (`meta.conf`).
//!
//! The configuration is TOML: named `[mbr.<name>]` tables with partition
//! and OSIP sections, `[[file-resource]]` declarations for the data blobs
//! carried by the package, and `[task.<name>]` buckets of operations keyed
//! by lifecycle trigger. Everything is validated here, before any I/O, so
//! the engine never starts a run with input it has not fully checked.

use std::collections::BTreeMap;

use fwpack_mbr::{Osii, OsipHeader, Partition, PartitionTable, MAX_OSIP_IMAGES, MBR_PRIMARY_PARTITIONS};
use serde::Deserialize;
use thiserror::Error;

use crate::error::Error;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration text is not valid TOML.
    #[error("error parsing meta.conf: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration entry is not UTF-8.
    #[error("meta.conf is not valid UTF-8")]
    NotUtf8,

    /// A partition section index is not a number from 0 through 3.
    #[error("partition must be numbered 0 through {}", MBR_PRIMARY_PARTITIONS - 1)]
    BadPartitionIndex,

    /// A partition type byte is out of range.
    #[error("partition {index}'s type must be between 0 and 255")]
    BadPartitionType {
        /// Slot index of the offending partition.
        index: usize,
    },

    /// A partition block offset does not fit the MBR.
    #[error("partition {index}'s block-offset must be less than 2^32 - 1")]
    BadBlockOffset {
        /// Slot index of the offending partition.
        index: usize,
    },

    /// A partition block count does not fit the MBR.
    #[error("partition {index}'s block-count must be less than 2^31 - 1")]
    BadBlockCount {
        /// Slot index of the offending partition.
        index: usize,
    },

    /// An MBR table declares no partitions at all.
    #[error("mbr '{table}' has an empty partition table")]
    EmptyPartitionTable {
        /// Name of the offending table.
        table: String,
    },

    /// An OSII section index is not a number from 0 through 14.
    #[error("osii must be numbered 0 through {}", MAX_OSIP_IMAGES - 1)]
    BadOsiiIndex,

    /// OSIP was requested but no image descriptors were declared.
    #[error("need to specify one or more osii")]
    NoOsii,

    /// The bootstrap code is not the size of the MBR boot region.
    #[error("bootstrap-code should be exactly 440 bytes")]
    BadBootstrapLength,

    /// The bootstrap code is not valid hex.
    #[error("error parsing bootstrap-code: {0}")]
    BadBootstrapHex(hex::FromHexError),

    /// Bootstrap code and OSIP are mutually exclusive.
    #[error("cannot specify OSIP if including bootstrap code")]
    BootstrapOsipConflict,

    /// An `mbr_write` operation names an undeclared table.
    #[error("task '{task}' writes undeclared mbr '{table}'")]
    UnknownMbrRef {
        /// Task declaring the operation.
        task: String,
        /// Referenced table name.
        table: String,
    },

    /// An `on-resource` trigger names an undeclared resource.
    #[error("task '{task}' triggers on undeclared resource '{resource}'")]
    UnknownResource {
        /// Task declaring the trigger.
        task: String,
        /// Referenced resource name.
        resource: String,
    },

    /// A streaming operation was declared outside an `on-resource` trigger.
    #[error("task '{task}': {op} is only valid under on-resource")]
    StreamingOpWithoutResource {
        /// Task declaring the operation.
        task: String,
        /// Operation keyword.
        op: &'static str,
    },

    /// The selected task does not exist in the configuration.
    #[error("task '{name}' not found in meta.conf")]
    UnknownTask {
        /// Requested task name.
        name: String,
    },
}

/// One device-mutating operation, dispatched by the task engine.
///
/// The set is closed and matched exhaustively, so adding an operation is a
/// compile-time-checked change everywhere it is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Stream resource bytes to the device starting at a block offset.
    RawWrite {
        /// Destination block offset.
        block_offset: u32,
    },
    /// Encode a declared MBR table and write it to block 0.
    MbrWrite {
        /// Name of the `[mbr.<name>]` table.
        table: String,
    },
    /// Format a FAT filesystem in the given block range.
    FatMkfs {
        /// First block of the filesystem.
        block_offset: u32,
        /// Filesystem size in blocks.
        block_count: u32,
    },
    /// Stream resource bytes into a path on a FAT filesystem.
    FatWrite {
        /// First block of the filesystem.
        block_offset: u32,
        /// Destination path inside the filesystem.
        path: String,
    },
    /// Copy a file between FAT filesystems on the device.
    FatCp {
        /// First block of the source filesystem.
        src_offset: u32,
        /// Source path.
        src_path: String,
        /// First block of the destination filesystem.
        dst_offset: u32,
        /// Destination path.
        dst_path: String,
    },
}

impl Operation {
    /// Whether the operation consumes streamed resource bytes.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, Operation::RawWrite { .. } | Operation::FatWrite { .. })
    }

    /// Configuration keyword for the operation.
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            Operation::RawWrite { .. } => "raw_write",
            Operation::MbrWrite { .. } => "mbr_write",
            Operation::FatMkfs { .. } => "fat_mkfs",
            Operation::FatWrite { .. } => "fat_write",
            Operation::FatCp { .. } => "fat_cp",
        }
    }
}

/// A declared MBR table together with its boot-region payload.
#[derive(Debug, Clone)]
pub struct MbrSpec {
    /// Partition slots.
    pub table: PartitionTable,
    /// Raw bootstrap code for bytes 0-439, if any.
    pub bootstrap: Option<Box<[u8; 440]>>,
    /// OSIP header for bytes 0-439, if any.
    pub osip: Option<OsipHeader>,
    /// Little-endian disk signature for bytes 440-443.
    pub disk_signature: u32,
}

/// A data blob the package must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Entry name inside the package.
    pub name: String,
    /// Expected length in bytes, when declared.
    pub length: Option<u64>,
}

/// A named bucket of operations keyed by lifecycle trigger.
#[derive(Debug, Clone, Default)]
pub struct Task {
    /// Fired once before any resource streaming.
    pub on_init: Vec<Operation>,
    /// Fired per named resource, in archive order.
    pub on_resource: BTreeMap<String, Vec<Operation>>,
    /// Fired once all resources are consumed.
    pub on_finish: Vec<Operation>,
    /// Fired best-effort after a hard failure.
    pub on_error: Vec<Operation>,
}

/// Fully validated in-memory configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Declared MBR tables by name.
    pub mbr_tables: BTreeMap<String, MbrSpec>,
    /// Declared package resources, in declaration order.
    pub resources: Vec<ResourceSpec>,
    /// Declared tasks by name.
    pub tasks: BTreeMap<String, Task>,
}

impl Config {
    /// Parse and validate configuration bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(bytes).map_err(|_| ConfigError::NotUtf8)?;
        Self::from_str(text)
    }

    /// Parse and validate configuration text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, Error> {
        let raw: RawConfig = toml::from_str(text).map_err(ConfigError::Parse)?;
        compile(raw)
    }

    /// Look up a task, failing with [`ConfigError::UnknownTask`].
    pub fn task(&self, name: &str) -> Result<&Task, Error> {
        self.tasks.get(name).ok_or_else(|| {
            ConfigError::UnknownTask {
                name: name.to_owned(),
            }
            .into()
        })
    }

    /// Resource declaration by name, if present.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|resource| resource.name == name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    mbr: BTreeMap<String, RawMbr>,
    #[serde(default, rename = "file-resource")]
    file_resource: Vec<RawResource>,
    #[serde(default)]
    task: BTreeMap<String, RawTask>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMbr {
    #[serde(rename = "bootstrap-code")]
    bootstrap_code: Option<String>,
    signature: Option<u32>,
    #[serde(rename = "include-osip", default)]
    include_osip: bool,
    #[serde(rename = "osip-major", default)]
    osip_major: u8,
    #[serde(rename = "osip-minor", default)]
    osip_minor: u8,
    #[serde(rename = "osip-num-pointers", default)]
    osip_num_pointers: u8,
    #[serde(default)]
    partition: BTreeMap<String, RawPartition>,
    #[serde(default)]
    osii: BTreeMap<String, RawOsii>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPartition {
    #[serde(rename = "type")]
    partition_type: i64,
    #[serde(rename = "block-offset")]
    block_offset: i64,
    #[serde(rename = "block-count", default)]
    block_count: i64,
    #[serde(default)]
    boot: bool,
    #[serde(default)]
    expand: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOsii {
    #[serde(rename = "os-major", default)]
    os_major: u16,
    #[serde(rename = "os-minor", default)]
    os_minor: u16,
    #[serde(rename = "start-block-offset", default)]
    start_block_offset: u32,
    #[serde(rename = "ddr-load-address", default)]
    ddr_load_address: u32,
    #[serde(rename = "entry-point", default)]
    entry_point: u32,
    #[serde(rename = "image-size-blocks", default)]
    image_size: u32,
    #[serde(default)]
    attribute: u8,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    name: String,
    length: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawTask {
    #[serde(rename = "on-init", default)]
    on_init: Vec<RawOp>,
    #[serde(rename = "on-resource", default)]
    on_resource: BTreeMap<String, Vec<RawOp>>,
    #[serde(rename = "on-finish", default)]
    on_finish: Vec<RawOp>,
    #[serde(rename = "on-error", default)]
    on_error: Vec<RawOp>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum RawOp {
    RawWrite {
        #[serde(rename = "block-offset")]
        block_offset: u32,
    },
    MbrWrite {
        mbr: String,
    },
    FatMkfs {
        #[serde(rename = "block-offset")]
        block_offset: u32,
        #[serde(rename = "block-count")]
        block_count: u32,
    },
    FatWrite {
        #[serde(rename = "block-offset")]
        block_offset: u32,
        path: String,
    },
    FatCp {
        #[serde(rename = "src-block-offset")]
        src_offset: u32,
        #[serde(rename = "src-path")]
        src_path: String,
        #[serde(rename = "dst-block-offset")]
        dst_offset: u32,
        #[serde(rename = "dst-path")]
        dst_path: String,
    },
}

impl From<RawOp> for Operation {
    fn from(raw: RawOp) -> Self {
        match raw {
            RawOp::RawWrite { block_offset } => Operation::RawWrite { block_offset },
            RawOp::MbrWrite { mbr } => Operation::MbrWrite { table: mbr },
            RawOp::FatMkfs {
                block_offset,
                block_count,
            } => Operation::FatMkfs {
                block_offset,
                block_count,
            },
            RawOp::FatWrite { block_offset, path } => Operation::FatWrite { block_offset, path },
            RawOp::FatCp {
                src_offset,
                src_path,
                dst_offset,
                dst_path,
            } => Operation::FatCp {
                src_offset,
                src_path,
                dst_offset,
                dst_path,
            },
        }
    }
}

fn compile(raw: RawConfig) -> Result<Config, Error> {
    let mut mbr_tables = BTreeMap::new();
    for (name, raw_mbr) in raw.mbr {
        let spec = compile_mbr(&name, raw_mbr)?;
        fwpack_mbr::verify(&spec.table)?;
        mbr_tables.insert(name, spec);
    }

    let resources: Vec<ResourceSpec> = raw
        .file_resource
        .into_iter()
        .map(|resource| ResourceSpec {
            name: resource.name,
            length: resource.length,
        })
        .collect();

    let mut tasks = BTreeMap::new();
    for (name, raw_task) in raw.task {
        let task = compile_task(&name, raw_task, &mbr_tables, &resources)?;
        tasks.insert(name, task);
    }

    Ok(Config {
        mbr_tables,
        resources,
        tasks,
    })
}

fn compile_mbr(name: &str, raw: RawMbr) -> Result<MbrSpec, Error> {
    let mut table = PartitionTable::default();
    if raw.partition.is_empty() {
        return Err(ConfigError::EmptyPartitionTable {
            table: name.to_owned(),
        }
        .into());
    }

    for (key, partition) in &raw.partition {
        let index: usize = key.parse().map_err(|_| ConfigError::BadPartitionIndex)?;
        if index >= MBR_PRIMARY_PARTITIONS {
            return Err(ConfigError::BadPartitionIndex.into());
        }
        if !(0..=0xff).contains(&partition.partition_type) {
            return Err(ConfigError::BadPartitionType { index }.into());
        }
        if !(0..i64::from(u32::MAX)).contains(&partition.block_offset) {
            return Err(ConfigError::BadBlockOffset { index }.into());
        }
        if !(0..i64::from(i32::MAX)).contains(&partition.block_count) {
            return Err(ConfigError::BadBlockCount { index }.into());
        }
        table.partitions[index] = Partition {
            boot: partition.boot,
            expand: partition.expand,
            partition_type: partition.partition_type as u8,
            block_offset: partition.block_offset as u32,
            block_count: partition.block_count as u32,
        };
    }

    let bootstrap = match &raw.bootstrap_code {
        None => None,
        Some(hex_text) => {
            let bytes = hex::decode(hex_text.trim()).map_err(ConfigError::BadBootstrapHex)?;
            let code: Box<[u8; 440]> = bytes
                .into_boxed_slice()
                .try_into()
                .map_err(|_| ConfigError::BadBootstrapLength)?;
            Some(code)
        }
    };

    let osip = if raw.include_osip {
        if bootstrap.is_some() {
            return Err(ConfigError::BootstrapOsipConflict.into());
        }
        Some(compile_osip(&raw)?)
    } else {
        None
    };

    Ok(MbrSpec {
        table,
        bootstrap,
        osip,
        disk_signature: raw.signature.unwrap_or(0),
    })
}

fn compile_osip(raw: &RawMbr) -> Result<OsipHeader, Error> {
    let mut osip = OsipHeader {
        major: raw.osip_major,
        minor: raw.osip_minor,
        num_pointers: raw.osip_num_pointers,
        ..OsipHeader::default()
    };

    let mut largest_index = None;
    for (key, descriptor) in &raw.osii {
        let index: usize = key.parse().map_err(|_| ConfigError::BadOsiiIndex)?;
        if index >= MAX_OSIP_IMAGES {
            return Err(ConfigError::BadOsiiIndex.into());
        }
        largest_index = largest_index.max(Some(index));
        osip.descriptors[index] = Osii {
            os_major: descriptor.os_major,
            os_minor: descriptor.os_minor,
            start_block_offset: descriptor.start_block_offset,
            ddr_load_address: descriptor.ddr_load_address,
            entry_point: descriptor.entry_point,
            image_size: descriptor.image_size,
            attribute: descriptor.attribute,
        };
    }

    // The image count is one past the highest used descriptor index.
    match largest_index {
        Some(index) => osip.num_images = index as u8 + 1,
        None => return Err(ConfigError::NoOsii.into()),
    }
    Ok(osip)
}

fn compile_task(
    name: &str,
    raw: RawTask,
    mbr_tables: &BTreeMap<String, MbrSpec>,
    resources: &[ResourceSpec],
) -> Result<Task, Error> {
    let mut task = Task {
        on_init: raw.on_init.into_iter().map(Operation::from).collect(),
        on_finish: raw.on_finish.into_iter().map(Operation::from).collect(),
        on_error: raw.on_error.into_iter().map(Operation::from).collect(),
        on_resource: BTreeMap::new(),
    };

    for (resource, ops) in raw.on_resource {
        if !resources.iter().any(|spec| spec.name == resource) {
            return Err(ConfigError::UnknownResource {
                task: name.to_owned(),
                resource,
            }
            .into());
        }
        task.on_resource
            .insert(resource, ops.into_iter().map(Operation::from).collect());
    }

    // Streaming operations need resource bytes to consume.
    for operation in task
        .on_init
        .iter()
        .chain(task.on_finish.iter())
        .chain(task.on_error.iter())
    {
        if operation.is_streaming() {
            return Err(ConfigError::StreamingOpWithoutResource {
                task: name.to_owned(),
                op: operation.keyword(),
            }
            .into());
        }
    }

    for operation in task
        .on_init
        .iter()
        .chain(task.on_finish.iter())
        .chain(task.on_error.iter())
        .chain(task.on_resource.values().flatten())
    {
        if let Operation::MbrWrite { table } = operation {
            if !mbr_tables.contains_key(table) {
                return Err(ConfigError::UnknownMbrRef {
                    task: name.to_owned(),
                    table: table.clone(),
                }
                .into());
            }
        }
    }

    Ok(task)
}
