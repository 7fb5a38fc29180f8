// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet protection primitives.
//!
//! The TLS handshake driver that derives the actual key material is an
//! external collaborator; this module only defines the traits it must
//! implement and the header-protection plumbing shared by all levels.

mod error;
mod header_protection;
mod key;
mod payload;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::Error;
pub use header_protection::{
    HeaderKey, HeaderProtectionMask, HEADER_PROTECTION_MASK_LEN, HEADER_PROTECTION_SAMPLE_OFFSET,
};
pub use key::{Key, PacketKey};
pub use payload::{CleartextPayload, EncryptedPayload, ProtectedPayload};

use crate::packet::number::{PacketNumber, PacketNumberSpace, TruncatedPacketNumber};

//= https://www.rfc-editor.org/rfc/rfc9001#section-2.1
//# Data is protected using a number of encryption levels:
//#
//# *  Initial keys
//#
//# *  Early data (0-RTT) keys
//#
//# *  Handshake keys
//#
//# *  Application data (1-RTT) keys

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EncryptionLevel {
    Initial,
    ZeroRtt,
    Handshake,
    OneRtt,
}

impl EncryptionLevel {
    /// Returns the packet number space packets at this level belong to
    #[inline]
    pub fn packet_number_space(self) -> PacketNumberSpace {
        match self {
            Self::Initial => PacketNumberSpace::Initial,
            Self::Handshake => PacketNumberSpace::Handshake,
            Self::ZeroRtt | Self::OneRtt => PacketNumberSpace::ApplicationData,
        }
    }

    pub const fn all() -> [Self; 4] {
        [Self::Initial, Self::ZeroRtt, Self::Handshake, Self::OneRtt]
    }
}

impl core::fmt::Display for EncryptionLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let name = match self {
            Self::Initial => "initial",
            Self::ZeroRtt => "0-rtt",
            Self::Handshake => "handshake",
            Self::OneRtt => "1-rtt",
        };
        f.write_str(name)
    }
}

/// Removes header protection from a packet, returning the truncated packet
/// number and the payload positioned for decryption.
#[inline]
pub fn unprotect<'a, K: HeaderKey + ?Sized>(
    header_key: &K,
    space: PacketNumberSpace,
    payload: ProtectedPayload<'a>,
) -> Result<(TruncatedPacketNumber, EncryptedPayload<'a>), Error> {
    let sample = payload.header_protection_sample(header_key.opening_sample_len())?;
    let mask = header_key.opening_header_protection_mask(sample);

    header_protection::remove_header_protection(space, mask, payload)
        .map_err(|_| Error::HEADER_PROTECTION_FAILURE)
}

/// Applies header protection to an encrypted packet
#[inline]
pub fn protect<'a, K: HeaderKey + ?Sized>(
    header_key: &K,
    payload: EncryptedPayload<'a>,
) -> Result<ProtectedPayload<'a>, Error> {
    let sample = payload.header_protection_sample(header_key.sealing_sample_len())?;
    let mask = header_key.sealing_header_protection_mask(sample);

    Ok(header_protection::apply_header_protection(mask, payload))
}

/// Decrypts a packet payload in place.
///
/// The associated data is the unprotected header including the packet
/// number in its actual length. On success the cleartext payload no longer
/// includes the AEAD tag.
#[inline]
pub fn decrypt<'a, K: Key + ?Sized>(
    key: &K,
    packet_number: PacketNumber,
    payload: EncryptedPayload<'a>,
) -> Result<CleartextPayload<'a>, Error> {
    let tag_len = key.tag_len();
    let (header, ciphertext) = payload.split_header_and_ciphertext()?;

    key.decrypt(packet_number.as_u64(), header, ciphertext)?;

    let cleartext_len = ciphertext
        .len()
        .checked_sub(tag_len)
        .ok_or(Error::DECRYPT_ERROR)?;

    Ok(CleartextPayload {
        payload: &mut ciphertext[..cleartext_len],
    })
}

/// Encrypts a packet payload in place.
///
/// `buffer` holds the entire packet; the final `tag_len` bytes are
/// reserved for the AEAD tag.
#[inline]
pub fn encrypt<'a, K: Key + ?Sized>(
    key: &K,
    packet_number: PacketNumber,
    packet_number_len: usize,
    header_len: usize,
    buffer: &'a mut [u8],
) -> Result<EncryptedPayload<'a>, Error> {
    let header_with_pn_len = header_len + packet_number_len;
    if header_with_pn_len > buffer.len() {
        return Err(Error::INTERNAL_ERROR);
    }
    let (header, payload) = buffer.split_at_mut(header_with_pn_len);

    key.encrypt(packet_number.as_u64(), header, payload)?;

    Ok(EncryptedPayload::new(header_len, packet_number_len, buffer))
}
