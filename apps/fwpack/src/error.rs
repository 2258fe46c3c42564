// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the fwpack error taxonomy.
// Author: Lukas Bower

//! Error taxonomy for package building, verification, and apply runs.
//!
//! Configuration, geometry, and package errors all surface before the
//! first device mutation; an I/O error after streaming begins is fatal
//! for the run.

use thiserror::Error;

pub use crate::config::ConfigError;

/// Top-level fwpack error.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing declarative input, caught before any I/O.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Partition geometry violation, caught before any device write.
    #[error(transparent)]
    Geometry(#[from] fwpack_mbr::MbrError),

    /// Malformed, missing, or out-of-order package content.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Device or filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Signature or key-material failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Errors concerning the update package's entry ordering and contents.
#[derive(Debug, Error)]
pub enum PackageError {
    /// A data entry appeared before the configuration entry.
    #[error("invalid package: '{name}' appears before meta.conf")]
    ConfigNotFirst {
        /// Name of the offending entry.
        name: String,
    },

    /// More than one configuration entry was found.
    #[error("invalid package: more than one meta.conf found")]
    DuplicateConfig,

    /// No configuration entry was found.
    #[error("invalid package: no meta.conf found")]
    MissingConfig,

    /// The configuration entry's size is outside the sanity bounds.
    #[error("unexpected meta.conf size: {len}")]
    ConfigSize {
        /// Observed size in bytes.
        len: u64,
    },

    /// A resource referenced by the configuration is absent.
    #[error("resource '{name}' referenced in meta.conf is missing from the package")]
    MissingResource {
        /// Name of the missing resource.
        name: String,
    },

    /// A resource's size does not match its declared length.
    #[error("resource '{name}' is {got} bytes but meta.conf declares {expected}")]
    ResourceSize {
        /// Name of the offending resource.
        name: String,
        /// Length declared in the configuration.
        expected: u64,
        /// Size of the package entry.
        got: u64,
    },
}

/// Errors from the signing and verification capability.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The signature entry does not verify against the configuration bytes.
    #[error("meta.conf signature does not verify")]
    BadSignature,

    /// A public key was supplied but the package carries no signature.
    #[error("package is unsigned but a public key was supplied")]
    MissingSignature,

    /// The signature entry has the wrong length.
    #[error("signature entry must be {expected} bytes (got {got})")]
    SignatureLength {
        /// Expected signature length.
        expected: usize,
        /// Observed length.
        got: u64,
    },

    /// Key material could not be loaded.
    #[error("bad key material: {0}")]
    BadKey(String),
}
