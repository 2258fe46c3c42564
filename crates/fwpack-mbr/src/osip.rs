// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Emit the OSIP boot header into the MBR bootstrap region.
// Author: Lukas Bower

//! OSIP boot-header encoder.
//!
//! The OSIP header occupies the first bytes of the MBR in place of raw
//! bootstrap code on platforms that boot through it. The XOR checksum and
//! fixed 24-byte descriptor layout are format-mandated legacy quirks;
//! they are reproduced bit for bit.

use crate::types::{OsipHeader, MAX_OSIP_IMAGES};

const OSIP_FIXED_LEN: usize = 32;
const OSII_LEN: usize = 24;

/// Encode `osip` into the start of `output`.
///
/// `output` must be at least `32 + 24 * num_images` bytes, which always
/// holds for the 440-byte MBR boot region. Descriptors past
/// [`MAX_OSIP_IMAGES`] are never emitted.
pub fn encode_osip(osip: &OsipHeader, output: &mut [u8]) {
    let num_images = usize::from(osip.num_images).min(MAX_OSIP_IMAGES);
    let header_size = OSIP_FIXED_LEN + OSII_LEN * num_images;

    output[0..4].copy_from_slice(b"$OS$");
    output[4] = 0; // reserved
    output[5] = osip.minor;
    output[6] = osip.major;
    output[7] = 0; // checksum slot, filled last
    output[8] = osip.num_pointers;
    output[9] = num_images as u8;
    output[10..12].copy_from_slice(&(header_size as u16).to_le_bytes());
    output[12..OSIP_FIXED_LEN].fill(0); // reserved

    for (i, descriptor) in osip.descriptors.iter().take(num_images).enumerate() {
        let entry = &mut output[OSIP_FIXED_LEN + i * OSII_LEN..OSIP_FIXED_LEN + (i + 1) * OSII_LEN];
        entry[0..2].copy_from_slice(&descriptor.os_minor.to_le_bytes());
        entry[2..4].copy_from_slice(&descriptor.os_major.to_le_bytes());
        entry[4..8].copy_from_slice(&descriptor.start_block_offset.to_le_bytes());
        entry[8..12].copy_from_slice(&descriptor.ddr_load_address.to_le_bytes());
        entry[12..16].copy_from_slice(&descriptor.entry_point.to_le_bytes());
        entry[16..20].copy_from_slice(&descriptor.image_size.to_le_bytes());
        entry[20] = descriptor.attribute;
        entry[21..24].fill(0); // reserved
    }

    let mut sum = output[0];
    for byte in &output[1..header_size] {
        sum ^= byte;
    }
    output[7] = sum;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Osii;

    fn sample_header() -> OsipHeader {
        let mut osip = OsipHeader {
            major: 1,
            minor: 0,
            num_pointers: 1,
            num_images: 1,
            ..OsipHeader::default()
        };
        osip.descriptors[0] = Osii {
            os_minor: 0,
            os_major: 1,
            start_block_offset: 2048,
            ddr_load_address: 0x0110_0000,
            entry_point: 0x0110_0000,
            image_size: 8192,
            attribute: 0x0f,
        };
        osip
    }

    #[test]
    fn header_layout_matches_the_format() {
        let mut output = [0u8; 440];
        encode_osip(&sample_header(), &mut output);

        assert_eq!(&output[0..4], b"$OS$");
        assert_eq!(output[4], 0);
        assert_eq!(output[5], 0); // minor
        assert_eq!(output[6], 1); // major
        assert_eq!(output[8], 1); // pointers
        assert_eq!(output[9], 1); // images
        assert_eq!(&output[10..12], &56u16.to_le_bytes());
        assert_eq!(&output[12..32], &[0u8; 20]);

        let entry = &output[32..56];
        assert_eq!(&entry[0..2], &0u16.to_le_bytes());
        assert_eq!(&entry[2..4], &1u16.to_le_bytes());
        assert_eq!(&entry[4..8], &2048u32.to_le_bytes());
        assert_eq!(&entry[8..12], &0x0110_0000u32.to_le_bytes());
        assert_eq!(&entry[12..16], &0x0110_0000u32.to_le_bytes());
        assert_eq!(&entry[16..20], &8192u32.to_le_bytes());
        assert_eq!(entry[20], 0x0f);
        assert_eq!(&entry[21..24], &[0u8; 3]);
    }

    #[test]
    fn checksum_is_the_xor_of_the_header_bytes() {
        let mut output = [0u8; 440];
        encode_osip(&sample_header(), &mut output);

        let header_size = 32 + 24;
        let mut expected = 0u8;
        for (i, byte) in output[..header_size].iter().enumerate() {
            if i != 7 {
                expected ^= byte;
            }
        }
        assert_eq!(output[7], expected);
    }

    #[test]
    fn bytes_past_the_header_are_untouched() {
        let mut output = [0xffu8; 440];
        encode_osip(&sample_header(), &mut output);
        assert!(output[56..].iter().all(|&b| b == 0xff));
    }
}
