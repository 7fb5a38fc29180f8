// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Deterministic packet protection for tests.
//!
//! The "cipher" XORs payload bytes with a seed and appends a tag derived
//! from the seed, packet number, and associated data. It is reversible and
//! tamper-evident, which is all the pipeline tests need; it offers no
//! security whatsoever.

use crate::crypto::{Error, HeaderKey, HeaderProtectionMask, Key, HEADER_PROTECTION_MASK_LEN};

pub const TAG_LEN: usize = 16;
pub const SAMPLE_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketKey {
    seed: u8,
}

impl PacketKey {
    pub const fn new(seed: u8) -> Self {
        Self { seed }
    }

    /// Returns the key the peer would use at the same level/phase
    pub const fn peer(&self) -> Self {
        // the toy cipher is symmetric
        Self { seed: self.seed }
    }

    fn tag(&self, packet_number: u64, header: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
        let mut acc = self.seed;
        for byte in header.iter().chain(ciphertext.iter()) {
            acc = acc.rotate_left(3) ^ byte;
        }

        let pn = packet_number.to_be_bytes();
        let mut tag = [0u8; TAG_LEN];
        for (index, byte) in tag.iter_mut().enumerate() {
            *byte = acc
                .wrapping_add(index as u8)
                .wrapping_add(pn[index % pn.len()]);
        }
        tag
    }
}

impl Key for PacketKey {
    fn decrypt(&self, packet_number: u64, header: &[u8], payload: &mut [u8]) -> Result<(), Error> {
        let cleartext_len = payload.len().checked_sub(TAG_LEN).ok_or(Error::DECRYPT_ERROR)?;
        let (ciphertext, tag) = payload.split_at_mut(cleartext_len);

        let expected = self.tag(packet_number, header, ciphertext);
        if tag != expected {
            return Err(Error::DECRYPT_ERROR);
        }

        for byte in ciphertext.iter_mut() {
            *byte ^= self.seed;
        }

        Ok(())
    }

    fn encrypt(&self, packet_number: u64, header: &[u8], payload: &mut [u8]) -> Result<(), Error> {
        let cleartext_len = payload.len().checked_sub(TAG_LEN).ok_or(Error::INTERNAL_ERROR)?;
        let (ciphertext, tag) = payload.split_at_mut(cleartext_len);

        for byte in ciphertext.iter_mut() {
            *byte ^= self.seed;
        }

        tag.copy_from_slice(&self.tag(packet_number, header, ciphertext));

        Ok(())
    }

    fn tag_len(&self) -> usize {
        TAG_LEN
    }
}

impl HeaderKey for PacketKey {
    fn opening_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask {
        self.sealing_header_protection_mask(ciphertext_sample)
    }

    fn opening_sample_len(&self) -> usize {
        SAMPLE_LEN
    }

    fn sealing_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask {
        // header protection does not rotate with the packet key; see RFC
        // 9001 §5.4. Every test key shares the same mask derivation so
        // key updates behave like the real thing.
        let mut mask = [0u8; HEADER_PROTECTION_MASK_LEN];
        for (index, byte) in mask.iter_mut().enumerate() {
            *byte = ciphertext_sample[index % ciphertext_sample.len()] ^ 0x5a;
        }
        mask
    }

    fn sealing_sample_len(&self) -> usize {
        SAMPLE_LEN
    }
}
