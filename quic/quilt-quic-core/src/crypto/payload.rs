// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::{Error, HEADER_PROTECTION_SAMPLE_OFFSET};

/// A packet whose header protection has not been removed yet.
///
/// `buffer` spans the entire packet, from the first header byte through
/// the AEAD tag. `header_len` is the offset of the packet number field.
#[derive(Debug)]
pub struct ProtectedPayload<'a> {
    pub(crate) header_len: usize,
    pub(crate) buffer: &'a mut [u8],
}

impl<'a> ProtectedPayload<'a> {
    #[inline]
    pub fn new(header_len: usize, buffer: &'a mut [u8]) -> Self {
        debug_assert!(header_len <= buffer.len());
        Self { header_len, buffer }
    }

    /// Returns the ciphertext sample used to derive the header protection
    /// mask.
    //= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.2
    //# in sampling packet ciphertext for header protection, the Packet Number field is
    //# assumed to be 4 bytes long
    #[inline]
    pub fn header_protection_sample(&self, sample_len: usize) -> Result<&[u8], Error> {
        header_protection_sample(self.buffer, self.header_len, sample_len)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// A packet whose header is in the clear but whose payload is still
/// encrypted.
#[derive(Debug)]
pub struct EncryptedPayload<'a> {
    pub(crate) header_len: usize,
    pub(crate) packet_number_len: usize,
    pub(crate) buffer: &'a mut [u8],
}

impl<'a> EncryptedPayload<'a> {
    #[inline]
    pub fn new(header_len: usize, packet_number_len: usize, buffer: &'a mut [u8]) -> Self {
        debug_assert!(header_len + packet_number_len <= buffer.len());
        Self {
            header_len,
            packet_number_len,
            buffer,
        }
    }

    /// Returns the first byte of the packet
    #[inline]
    pub fn get_tag(&self) -> u8 {
        self.buffer[0]
    }

    #[inline]
    pub fn header_protection_sample(&self, sample_len: usize) -> Result<&[u8], Error> {
        header_protection_sample(self.buffer, self.header_len, sample_len)
    }

    /// Splits the payload into the associated data (header including the
    /// packet number) and the ciphertext with its trailing tag.
    #[inline]
    pub fn split_header_and_ciphertext(self) -> Result<(&'a [u8], &'a mut [u8]), Error> {
        let at = self.header_len + self.packet_number_len;
        if at > self.buffer.len() {
            return Err(Error::INTERNAL_ERROR);
        }
        let (header, ciphertext) = self.buffer.split_at_mut(at);
        Ok((&*header, ciphertext))
    }
}

/// A fully decrypted packet payload, ready for frame parsing
#[derive(Debug)]
pub struct CleartextPayload<'a> {
    pub payload: &'a mut [u8],
}

#[inline]
fn header_protection_sample(
    buffer: &[u8],
    header_len: usize,
    sample_len: usize,
) -> Result<&[u8], Error> {
    let start = header_len + HEADER_PROTECTION_SAMPLE_OFFSET;
    let end = start
        .checked_add(sample_len)
        .ok_or(Error::HEADER_PROTECTION_FAILURE)?;

    buffer
        .get(start..end)
        .ok_or(Error::HEADER_PROTECTION_FAILURE)
}
