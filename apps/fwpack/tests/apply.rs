// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: End-to-end apply runs against scratch disk images.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Read;
use std::path::Path;

use ed25519_dalek::SigningKey;
use fwpack::archive::{add_meta_conf, append_entry};
use fwpack::error::{CryptoError, Error, PackageError};
use fwpack::{apply, verify_package, FileDevice, ProgressReporter, UnsupportedFat};
use tempfile::TempDir;

const BLOCK: usize = 512;

fn write_package(path: &Path, config: &str, entries: &[(&str, &[u8])], key: Option<&SigningKey>) {
    let file = File::create(path).expect("create package");
    let mut builder = tar::Builder::new(file);
    add_meta_conf(&mut builder, config.as_bytes(), key).expect("add meta.conf");
    for (name, data) in entries {
        append_entry(&mut builder, name, data).expect("append entry");
    }
    builder.finish().expect("finish package");
}

fn seed_image(path: &Path, blocks: usize, fill: u8) {
    std::fs::write(path, vec![fill; blocks * BLOCK]).expect("seed image");
}

fn read_image(path: &Path) -> Vec<u8> {
    let mut bytes = Vec::new();
    File::open(path)
        .expect("open image")
        .read_to_end(&mut bytes)
        .expect("read image");
    bytes
}

fn run_apply(
    package: &Path,
    image: &Path,
    task: &str,
) -> (Result<(), Error>, Vec<String>) {
    let mut device = FileDevice::open(image).expect("open device");
    let mut fat = UnsupportedFat;
    let mut reporter = ProgressReporter::new(Vec::new());
    let result = apply(package, task, &mut device, &mut fat, &mut reporter, None);
    let output = String::from_utf8(reporter.into_inner()).expect("utf-8 output");
    (result, output.lines().map(str::to_owned).collect())
}

fn bar_line(percent: usize) -> String {
    let filled = percent * 36 / 100;
    format!("{percent:3}% [{}{}]", "=".repeat(filled), " ".repeat(36 - filled))
}

#[test]
fn four_equal_resources_step_progress_by_quarters() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let image = dir.path().join("disk.img");
    seed_image(&image, 16, 0);

    let config = r#"
        [[file-resource]]
        name = "a.bin"
        [[file-resource]]
        name = "b.bin"
        [[file-resource]]
        name = "c.bin"
        [[file-resource]]
        name = "d.bin"

        [task.complete.on-resource]
        "a.bin" = [{ op = "raw_write", block-offset = 0 }]
        "b.bin" = [{ op = "raw_write", block-offset = 0 }]
        "c.bin" = [{ op = "raw_write", block-offset = 0 }]
        "d.bin" = [{ op = "raw_write", block-offset = 0 }]
    "#;
    let chunk = vec![0x11u8; 1024];
    write_package(
        &package,
        config,
        &[
            ("a.bin", &chunk),
            ("b.bin", &chunk),
            ("c.bin", &chunk),
            ("d.bin", &chunk),
        ],
        None,
    );

    let (result, lines) = run_apply(&package, &image, "complete");
    result.expect("apply");
    assert_eq!(
        lines,
        vec![
            bar_line(0),
            bar_line(25),
            bar_line(50),
            bar_line(75),
            bar_line(100),
            "Success!".to_owned(),
        ]
    );
}

#[test]
fn raw_write_lands_resource_bytes_at_the_block_offset() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let image = dir.path().join("disk.img");
    seed_image(&image, 32, 0);

    let config = r#"
        [[file-resource]]
        name = "boot.bin"

        [task.complete.on-resource]
        "boot.bin" = [{ op = "raw_write", block-offset = 4 }]
    "#;
    // Larger than one streaming chunk so the offset bookkeeping is exercised.
    let payload: Vec<u8> = (0..9000u32).map(|i| (i % 251) as u8).collect();
    write_package(&package, config, &[("boot.bin", &payload)], None);

    let (result, lines) = run_apply(&package, &image, "complete");
    result.expect("apply");
    assert_eq!(lines.last().map(String::as_str), Some("Success!"));

    let contents = read_image(&image);
    assert_eq!(&contents[4 * BLOCK..4 * BLOCK + payload.len()], &payload[..]);
    assert!(contents[..4 * BLOCK].iter().all(|&b| b == 0), "blocks before the offset untouched");
}

#[test]
fn mbr_write_produces_a_bootable_sector_with_expansion() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let image = dir.path().join("disk.img");
    seed_image(&image, 10_000, 0);

    let config = r#"
        [mbr.main]
        signature = 0x01020304

        [mbr.main.partition.0]
        type = 0x0c
        block-offset = 63
        block-count = 100
        boot = true

        [mbr.main.partition.1]
        type = 0x83
        block-offset = 200
        block-count = 100
        expand = true

        [[file-resource]]
        name = "boot.bin"

        [task.complete]
        on-init = [{ op = "mbr_write", mbr = "main" }]

        [task.complete.on-resource]
        "boot.bin" = [{ op = "raw_write", block-offset = 63 }]
    "#;
    let payload = vec![0xeeu8; 600];
    write_package(&package, config, &[("boot.bin", &payload)], None);

    let (result, _) = run_apply(&package, &image, "complete");
    result.expect("apply");

    let contents = read_image(&image);
    let sector: &[u8; 512] = contents[..512].try_into().expect("sector");
    let table = fwpack_mbr::decode(sector).expect("decode mbr");

    assert!(table.partitions[0].boot);
    assert_eq!(table.partitions[0].partition_type, 0x0c);
    assert_eq!(table.partitions[0].block_offset, 63);
    assert_eq!(table.partitions[0].block_count, 100);
    // The expanding partition claims everything to the end of the image.
    assert_eq!(table.partitions[1].block_offset, 200);
    assert_eq!(table.partitions[1].block_count, 10_000 - 200);
    assert_eq!(&sector[440..444], &[0x04, 0x03, 0x02, 0x01]);

    assert_eq!(&contents[63 * BLOCK..63 * BLOCK + payload.len()], &payload[..]);
}

#[test]
fn missing_resource_fails_before_any_write() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let image = dir.path().join("disk.img");
    seed_image(&image, 8, 0xab);

    let config = r#"
        [[file-resource]]
        name = "ghost.bin"

        [task.complete.on-resource]
        "ghost.bin" = [{ op = "raw_write", block-offset = 0 }]
    "#;
    write_package(&package, config, &[], None);

    let (result, lines) = run_apply(&package, &image, "complete");
    let err = result.expect_err("must fail");
    assert!(matches!(
        err,
        Error::Package(PackageError::MissingResource { ref name }) if name == "ghost.bin"
    ));
    assert!(lines.is_empty(), "no progress before validation passes");
    assert!(read_image(&image).iter().all(|&b| b == 0xab), "device untouched");
}

#[test]
fn declared_length_is_checked_against_the_entry_size() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let image = dir.path().join("disk.img");
    seed_image(&image, 8, 0xab);

    let config = r#"
        [[file-resource]]
        name = "a.bin"
        length = 1024

        [task.complete.on-resource]
        "a.bin" = [{ op = "raw_write", block-offset = 0 }]
    "#;
    write_package(&package, config, &[("a.bin", &[1u8; 100])], None);

    let (result, _) = run_apply(&package, &image, "complete");
    let err = result.expect_err("must fail");
    assert!(matches!(
        err,
        Error::Package(PackageError::ResourceSize {
            ref name,
            expected: 1024,
            got: 100,
        }) if name == "a.bin"
    ));
    assert!(read_image(&image).iter().all(|&b| b == 0xab), "device untouched");

    // The matching size passes.
    write_package(&package, config, &[("a.bin", &[1u8; 1024])], None);
    let (result, _) = run_apply(&package, &image, "complete");
    result.expect("apply with matching length");
}

#[test]
fn unknown_task_fails_before_any_write() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let image = dir.path().join("disk.img");
    seed_image(&image, 8, 0xab);

    let config = r#"
        [[file-resource]]
        name = "a.bin"

        [task.complete.on-resource]
        "a.bin" = [{ op = "raw_write", block-offset = 0 }]
    "#;
    write_package(&package, config, &[("a.bin", &[1u8; 16])], None);

    let (result, _) = run_apply(&package, &image, "upgrade");
    assert!(result.is_err());
    assert!(read_image(&image).iter().all(|&b| b == 0xab), "device untouched");
}

#[test]
fn resources_without_operations_are_skipped() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let image = dir.path().join("disk.img");
    seed_image(&image, 8, 0);

    // extra.bin belongs to the upgrade task; complete must pass over it.
    let config = r#"
        [[file-resource]]
        name = "a.bin"
        [[file-resource]]
        name = "extra.bin"

        [task.complete.on-resource]
        "a.bin" = [{ op = "raw_write", block-offset = 0 }]

        [task.upgrade.on-resource]
        "extra.bin" = [{ op = "raw_write", block-offset = 2 }]
    "#;
    let wanted = vec![0x22u8; 512];
    let unwanted = vec![0x99u8; 512];
    write_package(
        &package,
        config,
        &[("a.bin", &wanted), ("extra.bin", &unwanted)],
        None,
    );

    let (result, _) = run_apply(&package, &image, "complete");
    result.expect("apply");

    let contents = read_image(&image);
    assert_eq!(&contents[..512], &wanted[..]);
    assert!(contents[2 * BLOCK..3 * BLOCK].iter().all(|&b| b == 0), "other task's write skipped");
}

#[test]
fn failed_run_fires_on_error_and_reports_no_success() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let image = dir.path().join("disk.img");
    seed_image(&image, 100, 0);

    // fat_mkfs fails under UnsupportedFat; on-error then stamps the MBR.
    let config = r#"
        [mbr.recovery.partition.0]
        type = 0x83
        block-offset = 1
        block-count = 10

        [[file-resource]]
        name = "a.bin"

        [task.complete]
        on-init = [{ op = "fat_mkfs", block-offset = 20, block-count = 50 }]
        on-error = [{ op = "mbr_write", mbr = "recovery" }]

        [task.complete.on-resource]
        "a.bin" = [{ op = "raw_write", block-offset = 30 }]
    "#;
    write_package(&package, config, &[("a.bin", &[7u8; 64])], None);

    let (result, lines) = run_apply(&package, &image, "complete");
    assert!(matches!(result, Err(Error::Io(_))));
    assert!(!lines.iter().any(|line| line == "Success!"));

    let contents = read_image(&image);
    let sector: &[u8; 512] = contents[..512].try_into().expect("sector");
    let table = fwpack_mbr::decode(sector).expect("on-error wrote the recovery mbr");
    assert_eq!(table.partitions[0].block_offset, 1);
}

#[test]
fn signed_package_verifies_with_the_right_key_only() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let key = SigningKey::from_bytes(&[9u8; 32]);
    let wrong_key = SigningKey::from_bytes(&[10u8; 32]);

    let config = r#"
        [[file-resource]]
        name = "a.bin"

        [task.complete.on-resource]
        "a.bin" = [{ op = "raw_write", block-offset = 0 }]
    "#;
    write_package(&package, config, &[("a.bin", &[0u8; 16])], Some(&key));

    let summary = verify_package(&package, Some(&key.verifying_key())).expect("verify");
    assert!(summary.signature.is_some());
    assert_eq!(summary.entries, vec![("a.bin".to_owned(), 16)]);

    let err = verify_package(&package, Some(&wrong_key.verifying_key())).expect_err("wrong key");
    assert!(matches!(err, Error::Crypto(CryptoError::BadSignature)));
}

#[test]
fn unsigned_package_with_required_key_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("update.fw");
    let key = SigningKey::from_bytes(&[9u8; 32]);

    let config = r#"
        [[file-resource]]
        name = "a.bin"

        [task.complete.on-resource]
        "a.bin" = [{ op = "raw_write", block-offset = 0 }]
    "#;
    write_package(&package, config, &[("a.bin", &[0u8; 16])], None);

    let err = verify_package(&package, Some(&key.verifying_key())).expect_err("must fail");
    assert!(matches!(err, Error::Crypto(CryptoError::MissingSignature)));
}
