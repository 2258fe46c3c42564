// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Drive configuration-derived tasks against a target device.
// Author: Lukas Bower

//! Task execution engine.
//!
//! One apply run interprets one package against one target device, with
//! exclusive access assumed for the run's lifetime. The run is a fixed
//! lifecycle: `on-init` operations, then each data entry streamed in
//! archive order to the operations registered for it, then `on-finish`.
//! Nothing is written until the configuration, geometry, and package
//! contents have all been validated; after streaming begins, the first
//! hard failure ends the run and `on-error` operations get one
//! best-effort chance to clean up. Apply is not atomic at the device
//! level: operations overwrite unconditionally, so a failed or cancelled
//! run is recovered by re-running apply from scratch.

use std::io::{Read, Write};
use std::path::Path;

use ed25519_dalek::VerifyingKey;
use log::{debug, info, warn};

use crate::archive::{entry_name, is_meta_entry, open_package, read_config_entry, META_CONF, META_CONF_SIGNATURE};
use crate::config::{Config, ConfigError, Operation, Task};
use crate::crypto;
use crate::device::{BlockDevice, BLOCK_SIZE};
use crate::error::{CryptoError, Error, PackageError};
use crate::fat::FatOps;
use crate::progress::ProgressReporter;

/// Streaming chunk size; memory use is bounded to one chunk per run.
const CHUNK_SIZE: usize = 4096;

/// Lifecycle state of one apply run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Running `on-init` operations.
    Init,
    /// Streaming data entries to their operations.
    Streaming,
    /// Running `on-finish` operations.
    Finishing,
    /// The run completed cleanly.
    Done,
    /// The run ended on a hard failure.
    Failed,
}

/// Result of scanning a package without mutating anything.
#[derive(Debug)]
pub struct PackageSummary {
    /// Parsed and validated configuration.
    pub config: Config,
    /// Exact configuration entry bytes, as covered by the signature.
    pub config_bytes: Vec<u8>,
    /// Detached signature entry bytes, when present.
    pub signature: Option<Vec<u8>>,
    /// Data entry names and sizes, in archive order.
    pub entries: Vec<(String, u64)>,
}

/// Scan a package: entry ordering, configuration parsing, no writes.
pub fn scan_package(path: &Path) -> Result<PackageSummary, Error> {
    let mut archive = open_package(path)?;
    let mut config_bytes: Option<Vec<u8>> = None;
    let mut signature: Option<Vec<u8>> = None;
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry_name(&entry)?;

        if name == META_CONF_SIGNATURE {
            let mut bytes = Vec::with_capacity(crypto::SIGNATURE_LEN);
            entry.read_to_end(&mut bytes)?;
            signature = Some(bytes);
        } else if name == META_CONF {
            if config_bytes.is_some() {
                return Err(PackageError::DuplicateConfig.into());
            }
            config_bytes = Some(read_config_entry(&mut entry)?);
        } else {
            if config_bytes.is_none() {
                return Err(PackageError::ConfigNotFirst { name }.into());
            }
            entries.push((name, entry.size()));
        }
    }

    let config_bytes = config_bytes.ok_or(PackageError::MissingConfig)?;
    let config = Config::from_slice(&config_bytes)?;
    Ok(PackageSummary {
        config,
        config_bytes,
        signature,
        entries,
    })
}

/// Verify-only mode: confirm every referenced resource is present and
/// that the signature validates. Performs no device writes.
pub fn verify_package(
    path: &Path,
    public_key: Option<&VerifyingKey>,
) -> Result<PackageSummary, Error> {
    let summary = scan_package(path)?;

    match (public_key, &summary.signature) {
        (Some(key), Some(signature)) => {
            crypto::verify_config(key, &summary.config_bytes, signature)?;
            debug!("{META_CONF} signature verified");
        }
        (Some(_), None) => return Err(CryptoError::MissingSignature.into()),
        (None, Some(_)) => warn!("package is signed but no public key was supplied"),
        (None, None) => {}
    }

    for resource in &summary.config.resources {
        if !summary.entries.iter().any(|(name, _)| name == &resource.name) {
            return Err(PackageError::MissingResource {
                name: resource.name.clone(),
            }
            .into());
        }
    }

    // Declared lengths are a contract on the package contents.
    for (name, size) in &summary.entries {
        if let Some(expected) = summary.config.resource(name).and_then(|spec| spec.length) {
            if expected != *size {
                return Err(PackageError::ResourceSize {
                    name: name.clone(),
                    expected,
                    got: *size,
                }
                .into());
            }
        }
    }

    Ok(summary)
}

/// Apply the selected task of a package to a target device.
///
/// Validation (configuration, geometry, package contents, signature) runs
/// to completion before the first device mutation.
pub fn apply<W: Write>(
    package: &Path,
    task_name: &str,
    device: &mut dyn BlockDevice,
    fat: &mut dyn FatOps,
    reporter: &mut ProgressReporter<W>,
    public_key: Option<&VerifyingKey>,
) -> Result<(), Error> {
    let summary = verify_package(package, public_key)?;
    let task = summary.config.task(task_name)?;

    let mut engine = TaskEngine {
        config: &summary.config,
        task_name,
        task,
        device,
        fat,
        reporter,
        state: RunState::Init,
        bytes_written: 0,
        bytes_total: streamed_bytes(task, &summary.entries),
    };

    info!("applying task '{task_name}' from {}", package.display());
    match engine.run(package) {
        Ok(()) => Ok(()),
        Err(err) => {
            engine.set_state(RunState::Failed);
            engine.run_on_error();
            Err(err)
        }
    }
}

// Total bytes the selected task will stream: data entries with at least
// one registered on-resource operation. Unmatched entries are skipped
// and never counted.
fn streamed_bytes(task: &Task, entries: &[(String, u64)]) -> u64 {
    entries
        .iter()
        .filter(|(name, _)| task.on_resource.contains_key(name))
        .map(|(_, size)| size)
        .sum()
}

struct TaskEngine<'a, W: Write> {
    config: &'a Config,
    task_name: &'a str,
    task: &'a Task,
    device: &'a mut dyn BlockDevice,
    fat: &'a mut dyn FatOps,
    reporter: &'a mut ProgressReporter<W>,
    state: RunState,
    bytes_written: u64,
    bytes_total: u64,
}

impl<W: Write> TaskEngine<'_, W> {
    fn set_state(&mut self, state: RunState) {
        debug!("run state {:?} -> {state:?}", self.state);
        self.state = state;
    }

    fn run(&mut self, package: &Path) -> Result<(), Error> {
        let task = self.task;

        self.set_state(RunState::Init);
        for operation in &task.on_init {
            self.run_operation(operation)?;
        }

        self.set_state(RunState::Streaming);
        self.reporter.report(0, self.bytes_total)?;

        let mut archive = open_package(package)?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry_name(&entry)?;
            if is_meta_entry(&name) {
                continue;
            }
            match task.on_resource.get(&name) {
                Some(operations) => self.stream_resource(&name, &mut entry, operations)?,
                None => {
                    // Not an error: the resource belongs to another task.
                    debug!("skipping resource '{name}': no operations registered");
                }
            }
        }

        self.set_state(RunState::Finishing);
        for operation in &task.on_finish {
            self.run_operation(operation)?;
        }
        self.device.sync()?;
        self.reporter.success()?;
        self.set_state(RunState::Done);
        Ok(())
    }

    fn stream_resource<R: Read>(
        &mut self,
        name: &str,
        entry: &mut R,
        operations: &[Operation],
    ) -> Result<(), Error> {
        debug!("streaming resource '{name}'");
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut streamed: u64 = 0;

        loop {
            let len = entry.read(&mut chunk)?;
            if len == 0 {
                break;
            }
            // Every streaming target sees this chunk before the next read,
            // bounding memory to one chunk regardless of resource size.
            for operation in operations {
                self.dispatch_chunk(operation, streamed, &chunk[..len])?;
            }
            streamed += len as u64;
            self.bytes_written += len as u64;
            self.reporter.report(self.bytes_written, self.bytes_total)?;
        }

        // Non-streaming operations under the same trigger fire once the
        // resource is fully streamed, in declared order.
        for operation in operations {
            if !operation.is_streaming() {
                self.run_operation(operation)?;
            }
        }
        Ok(())
    }

    fn dispatch_chunk(
        &mut self,
        operation: &Operation,
        streamed: u64,
        chunk: &[u8],
    ) -> Result<(), Error> {
        match operation {
            Operation::RawWrite { block_offset } => {
                let offset = u64::from(*block_offset) * BLOCK_SIZE + streamed;
                self.device.write_bytes(offset, chunk)?;
            }
            Operation::FatWrite { block_offset, path } => {
                self.fat.write(&mut *self.device, *block_offset, path, chunk)?;
            }
            Operation::MbrWrite { .. } | Operation::FatMkfs { .. } | Operation::FatCp { .. } => {}
        }
        Ok(())
    }

    fn run_operation(&mut self, operation: &Operation) -> Result<(), Error> {
        match operation {
            Operation::MbrWrite { table } => {
                let spec = self.config.mbr_tables.get(table).ok_or_else(|| {
                    ConfigError::UnknownMbrRef {
                        task: self.task_name.to_owned(),
                        table: table.clone(),
                    }
                })?;
                let sector = fwpack_mbr::encode(
                    &spec.table,
                    spec.bootstrap.as_deref(),
                    spec.osip.as_ref(),
                    spec.disk_signature,
                    self.device.total_blocks(),
                )?;
                self.device.write_blocks(0, &sector)?;
            }
            Operation::FatMkfs {
                block_offset,
                block_count,
            } => {
                self.fat.mkfs(&mut *self.device, *block_offset, *block_count)?;
            }
            Operation::FatCp {
                src_offset,
                src_path,
                dst_offset,
                dst_path,
            } => {
                self.fat
                    .copy(&mut *self.device, *src_offset, src_path, *dst_offset, dst_path)?;
            }
            // Streaming operations consume chunks in stream_resource and
            // are rejected outside on-resource triggers at load time.
            Operation::RawWrite { .. } | Operation::FatWrite { .. } => {}
        }
        Ok(())
    }

    // Best-effort cleanup: failures here are reported, never allowed to
    // mask the original error.
    fn run_on_error(&mut self) {
        let task = self.task;
        for operation in &task.on_error {
            if let Err(err) = self.run_operation(operation) {
                warn!("on-error operation {} failed: {err}", operation.keyword());
            }
        }
    }
}
