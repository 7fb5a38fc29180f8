// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::{header_protection::HeaderKey, Error};

/// A key capable of encrypting and decrypting packet payloads in place.
///
/// Implementations derive the nonce from the packet number and use the
/// packet header as associated data.
pub trait Key: Send {
    /// Decrypts `payload` in place.
    ///
    /// `payload` includes the AEAD tag in its final `tag_len` bytes; on
    /// success the leading `payload.len() - tag_len()` bytes hold the
    /// cleartext.
    fn decrypt(&self, packet_number: u64, header: &[u8], payload: &mut [u8]) -> Result<(), Error>;

    /// Encrypts `payload` in place.
    ///
    /// The final `tag_len` bytes of `payload` are reserved for the AEAD
    /// tag and their input contents are ignored.
    fn encrypt(&self, packet_number: u64, header: &[u8], payload: &mut [u8]) -> Result<(), Error>;

    /// Returns the length of the AEAD tag appended to each payload
    fn tag_len(&self) -> usize;
}

/// The full set of capabilities required to protect or unprotect a packet
/// at one encryption level.
pub trait PacketKey: Key + HeaderKey {}

impl<K: Key + HeaderKey> PacketKey for K {}

impl HeaderKey for alloc::boxed::Box<dyn PacketKey> {
    #[inline]
    fn opening_header_protection_mask(
        &self,
        sample: &[u8],
    ) -> crate::crypto::HeaderProtectionMask {
        (**self).opening_header_protection_mask(sample)
    }

    #[inline]
    fn opening_sample_len(&self) -> usize {
        (**self).opening_sample_len()
    }

    #[inline]
    fn sealing_header_protection_mask(
        &self,
        sample: &[u8],
    ) -> crate::crypto::HeaderProtectionMask {
        (**self).sealing_header_protection_mask(sample)
    }

    #[inline]
    fn sealing_sample_len(&self) -> usize {
        (**self).sealing_sample_len()
    }
}

impl Key for alloc::boxed::Box<dyn PacketKey> {
    #[inline]
    fn decrypt(&self, packet_number: u64, header: &[u8], payload: &mut [u8]) -> Result<(), Error> {
        (**self).decrypt(packet_number, header, payload)
    }

    #[inline]
    fn encrypt(&self, packet_number: u64, header: &[u8], payload: &mut [u8]) -> Result<(), Error> {
        (**self).encrypt(packet_number, header, payload)
    }

    #[inline]
    fn tag_len(&self) -> usize {
        (**self).tag_len()
    }
}
