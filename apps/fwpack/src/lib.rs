// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Firmware-update packaging and apply library for host tooling.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Firmware-update packaging for embedded storage devices.
//!
//! A package is a signed archive: a declarative `meta.conf` script first,
//! an optional detached Ed25519 signature over it, then named data
//! resources. Applying a package replays the script's selected task
//! against a raw block device, writing MBR partition tables and streaming
//! resource bytes to raw offsets or FAT paths. Validation always runs to
//! completion before the first device write; once streaming begins, the
//! first hard failure ends the run.

pub mod archive;
pub mod config;
pub mod crypto;
pub mod device;
pub mod engine;
pub mod error;
pub mod fat;
pub mod progress;
pub mod resign;

pub use config::{Config, Operation};
pub use device::{BlockDevice, FileDevice};
pub use engine::{apply, scan_package, verify_package, PackageSummary, RunState};
pub use error::{ConfigError, CryptoError, Error, PackageError};
pub use fat::{FatOps, UnsupportedFat};
pub use progress::ProgressReporter;
pub use resign::resign;
