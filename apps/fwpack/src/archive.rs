// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Read and write update-package archive entries.
// Author: Lukas Bower

//! Update-package container layer.
//!
//! A package is a tar archive: the configuration entry `meta.conf` comes
//! first, optionally paired with a detached `meta.conf.ed25519` signature
//! entry, followed by opaque data entries addressed by name. Only entry
//! ordering and naming are constrained here; the container format itself
//! is a capability supplied by the `tar` crate.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use ed25519_dalek::SigningKey;
use tar::{Archive, Builder, Entry, EntryType, Header};

use crate::crypto;
use crate::error::{Error, PackageError};

/// Name of the configuration entry.
pub const META_CONF: &str = "meta.conf";

/// Name of the detached signature entry.
pub const META_CONF_SIGNATURE: &str = "meta.conf.ed25519";

/// Lower sanity bound on the configuration entry size.
pub const META_CONF_MIN_LEN: u64 = 10;

/// Upper sanity bound on the configuration entry size (exclusive).
pub const META_CONF_MAX_LEN: u64 = 50_000;

/// Open a package for sequential entry iteration.
pub fn open_package(path: &Path) -> io::Result<Archive<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(Archive::new(BufReader::new(file)))
}

/// Entry name as a string.
pub fn entry_name<R: Read>(entry: &Entry<'_, R>) -> io::Result<String> {
    Ok(entry.path()?.to_string_lossy().into_owned())
}

/// Whether the entry name belongs to the package metadata, not the data.
#[must_use]
pub fn is_meta_entry(name: &str) -> bool {
    name == META_CONF || name == META_CONF_SIGNATURE
}

fn normalized_header(len: u64) -> Header {
    // Incoming metadata is never trusted; every written entry gets a
    // regular-file header with fixed permissions and a zero mtime.
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(len);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header
}

/// Append an in-memory entry with normalized metadata.
pub fn append_entry<W: Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> io::Result<()> {
    let mut header = normalized_header(data.len() as u64);
    builder.append_data(&mut header, name, data)
}

/// Append `len` bytes streamed from `reader` with normalized metadata.
pub fn append_streamed<W: Write, R: Read>(
    builder: &mut Builder<W>,
    name: &str,
    len: u64,
    reader: R,
) -> io::Result<()> {
    let mut header = normalized_header(len);
    builder.append_data(&mut header, name, reader)
}

/// Emit the configuration entry, preceded by nothing and followed by its
/// signature entry when a signing key is supplied.
///
/// The signature covers exactly the configuration bytes as written.
pub fn add_meta_conf<W: Write>(
    builder: &mut Builder<W>,
    config_text: &[u8],
    signing_key: Option<&SigningKey>,
) -> io::Result<()> {
    append_entry(builder, META_CONF, config_text)?;
    if let Some(key) = signing_key {
        let signature = crypto::sign_config(key, config_text);
        append_entry(builder, META_CONF_SIGNATURE, &signature)?;
    }
    Ok(())
}

/// Read the configuration entry in full, enforcing the sanity bounds.
pub fn read_config_entry<R: Read>(entry: &mut Entry<'_, R>) -> Result<Vec<u8>, Error> {
    let size = entry.size();
    if !(META_CONF_MIN_LEN..META_CONF_MAX_LEN).contains(&size) {
        return Err(PackageError::ConfigSize { len: size }.into());
    }
    let mut bytes = Vec::with_capacity(size as usize);
    entry.read_to_end(&mut bytes)?;
    if !(META_CONF_MIN_LEN..META_CONF_MAX_LEN).contains(&(bytes.len() as u64)) {
        return Err(PackageError::ConfigSize {
            len: bytes.len() as u64,
        }
        .into());
    }
    Ok(bytes)
}
