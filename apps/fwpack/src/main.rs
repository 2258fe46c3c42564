// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Command-line entry point for fwpack.
// Author: Lukas Bower

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use fwpack::{crypto, engine, resign, FileDevice, ProgressReporter, UnsupportedFat};

#[derive(Parser)]
#[command(name = "fwpack", about = "Firmware update packaging and apply tool")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply an update package to a block device or disk image
    Apply {
        /// Update package to apply
        #[arg(long)]
        package: PathBuf,
        /// Target block device or disk image
        #[arg(long)]
        device: PathBuf,
        /// Task to run
        #[arg(long, default_value = "complete")]
        task: String,
        /// Verify the package signature with this hex public key first
        #[arg(long)]
        public_key: Option<PathBuf>,
    },
    /// Check a package's contents and signature without writing anything
    Verify {
        /// Update package to check
        #[arg(long)]
        package: PathBuf,
        /// Hex public key to verify the signature with
        #[arg(long)]
        public_key: Option<PathBuf>,
    },
    /// Re-sign an update package with a new key
    Sign {
        /// Package to re-sign
        #[arg(long)]
        input: PathBuf,
        /// Where to write the signed package
        #[arg(long)]
        output: PathBuf,
        /// Hex signing key file
        #[arg(long)]
        key: PathBuf,
    },
    /// Generate a signing keypair
    GenKey {
        /// Output prefix; writes <prefix>.priv and <prefix>.pub
        #[arg(long)]
        out: PathBuf,
    },
}

fn load_public_key(path: Option<&PathBuf>) -> Result<Option<ed25519_dalek::VerifyingKey>> {
    match path {
        Some(path) => {
            let key = crypto::load_verifying_key(path)
                .with_context(|| format!("load public key {}", path.display()))?;
            Ok(Some(key))
        }
        None => Ok(None),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Apply {
            package,
            device,
            task,
            public_key,
        } => {
            let key = load_public_key(public_key.as_ref())?;
            let mut target = FileDevice::open(&device)
                .with_context(|| format!("open device {}", device.display()))?;
            let mut fat = UnsupportedFat;
            let mut reporter = ProgressReporter::new(io::stdout().lock());
            engine::apply(&package, &task, &mut target, &mut fat, &mut reporter, key.as_ref())
                .with_context(|| format!("apply {}", package.display()))?;
        }
        Cmd::Verify {
            package,
            public_key,
        } => {
            let key = load_public_key(public_key.as_ref())?;
            let summary = engine::verify_package(&package, key.as_ref())
                .with_context(|| format!("verify {}", package.display()))?;
            println!(
                "{}: {} resources, {}",
                package.display(),
                summary.entries.len(),
                if summary.signature.is_some() {
                    "signed"
                } else {
                    "unsigned"
                }
            );
        }
        Cmd::Sign { input, output, key } => {
            let signing_key = crypto::load_signing_key(&key)
                .with_context(|| format!("load signing key {}", key.display()))?;
            resign(&input, &output, &signing_key)
                .with_context(|| format!("re-sign {}", input.display()))?;
            println!("Success!");
        }
        Cmd::GenKey { out } => {
            crypto::generate_keypair(&out)
                .with_context(|| format!("write keypair {}", out.display()))?;
            println!("wrote {}.priv and {}.pub", out.display(), out.display());
        }
    }

    Ok(())
}
