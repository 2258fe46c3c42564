// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Re-sign update packages without touching their data entries.
// Author: Lukas Bower

//! Archive re-signing transform.
//!
//! Streams an existing package entry by entry: any prior signature entry
//! is dropped, the configuration entry is buffered and re-emitted with a
//! freshly computed signature, and every data entry is copied byte for
//! byte with normalized metadata. The output is built at a temporary path
//! and renamed over the destination only after both streams close
//! cleanly, so a failed resign never leaves a half-written package
//! behind.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use log::debug;
use tar::{Archive, Builder};

use crate::archive::{
    add_meta_conf, append_streamed, entry_name, open_package, read_config_entry, META_CONF,
    META_CONF_SIGNATURE,
};
use crate::error::{Error, PackageError};

fn temp_path_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Re-sign `input` into `output` with `signing_key`.
pub fn resign(input: &Path, output: &Path, signing_key: &SigningKey) -> Result<(), Error> {
    let mut archive = open_package(input)?;
    let temp_path = temp_path_for(output);

    let result = copy_resigned(&mut archive, &temp_path, signing_key)
        .and_then(|()| fs::rename(&temp_path, output).map_err(Error::from));
    match result {
        Ok(()) => {
            debug!("re-signed {} -> {}", input.display(), output.display());
            Ok(())
        }
        Err(err) => {
            // The destination stays untouched; only the temp file is removed.
            // Covers the rename itself, not just the copy.
            let _ = fs::remove_file(&temp_path);
            Err(err)
        }
    }
}

fn copy_resigned<R: Read>(
    archive: &mut Archive<R>,
    temp_path: &Path,
    signing_key: &SigningKey,
) -> Result<(), Error> {
    let out_file = File::create(temp_path)?;
    let mut builder = Builder::new(BufWriter::new(out_file));
    let mut config_seen = false;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry_name(&entry)?;

        if name == META_CONF_SIGNATURE {
            // Prior signature; a fresh one is emitted with the config.
            continue;
        }

        if name == META_CONF {
            if config_seen {
                return Err(PackageError::DuplicateConfig.into());
            }
            let config_text = read_config_entry(&mut entry)?;
            add_meta_conf(&mut builder, &config_text, Some(signing_key))?;
            config_seen = true;
            continue;
        }

        if !config_seen {
            return Err(PackageError::ConfigNotFirst { name }.into());
        }
        let size = entry.size();
        append_streamed(&mut builder, &name, size, &mut entry)?;
    }

    if !config_seen {
        return Err(PackageError::MissingConfig.into());
    }

    let mut inner = builder.into_inner()?;
    inner.flush()?;
    Ok(())
}
