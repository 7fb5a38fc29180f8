// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    crypto::{Error, EncryptedPayload, ProtectedPayload},
    packet::number::{PacketNumberSpace, TruncatedPacketNumber},
};

/// Types which are able to perform header cryptography
pub trait HeaderKey: Send {
    /// Derives a header protection mask from a ciphertext sample, to be
    /// used for opening a packet.
    ///
    /// The sample size is determined by the key function.
    fn opening_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask;

    /// Returns the sample size needed to open a packet header
    fn opening_sample_len(&self) -> usize;

    /// Derives a header protection mask from a ciphertext sample, to be
    /// used for sealing a packet.
    fn sealing_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask;

    /// Returns the sample size needed to seal a packet header
    fn sealing_sample_len(&self) -> usize;
}

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# The output of this algorithm is a 5-byte mask that is applied to the
//# protected header fields using exclusive OR.

pub const HEADER_PROTECTION_MASK_LEN: usize = 5;
pub type HeaderProtectionMask = [u8; HEADER_PROTECTION_MASK_LEN];

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.2
//# An endpoint MUST discard packets that are not long enough to contain
//# a complete sample.
//#
//# To ensure that sufficient data is available for sampling, packets are
//# padded so that the combined lengths of the encoded packet number and
//# protected payload are at least 4 bytes longer than the sample required
//# for header protection.

pub const HEADER_PROTECTION_SAMPLE_OFFSET: usize = 4;

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# mask = header_protection(hp_key, sample)
//#
//# pn_length = (packet[0] & 0x03) + 1
//# if (packet[0] & 0x80) == 0x80:
//#    # Long header: 4 bits masked
//#    packet[0] ^= mask[0] & 0x0f
//# else:
//#    # Short header: 5 bits masked
//#    packet[0] ^= mask[0] & 0x1f

const LONG_HEADER_TAG: u8 = 0x80;
pub(crate) const LONG_HEADER_MASK: u8 = 0x0f;
pub(crate) const SHORT_HEADER_MASK: u8 = 0x1f;

#[inline(always)]
fn mask_from_packet_tag(tag: u8) -> u8 {
    if tag & LONG_HEADER_TAG == LONG_HEADER_TAG {
        LONG_HEADER_MASK
    } else {
        SHORT_HEADER_MASK
    }
}

#[inline(always)]
fn xor_mask(packet_number_bytes: &mut [u8], mask: &HeaderProtectionMask) {
    for (byte, mask_byte) in packet_number_bytes.iter_mut().zip(&mask[1..]) {
        *byte ^= mask_byte;
    }
}

#[inline]
pub(crate) fn apply_header_protection<'a>(
    mask: HeaderProtectionMask,
    payload: EncryptedPayload<'a>,
) -> ProtectedPayload<'a> {
    let header_len = payload.header_len;
    let packet_number_len = payload.packet_number_len;
    let buffer = payload.buffer;

    buffer[0] ^= mask[0] & mask_from_packet_tag(buffer[0]);

    let header_with_pn_len = header_len + packet_number_len;
    xor_mask(&mut buffer[header_len..header_with_pn_len], &mask);

    ProtectedPayload::new(header_len, buffer)
}

#[inline]
pub(crate) fn remove_header_protection<'a>(
    space: PacketNumberSpace,
    mask: HeaderProtectionMask,
    payload: ProtectedPayload<'a>,
) -> Result<(TruncatedPacketNumber, EncryptedPayload<'a>), Error> {
    let header_len = payload.header_len;
    let buffer = payload.buffer;

    // the packet number may occupy up to 4 bytes past the header
    if buffer.len() < header_len + HEADER_PROTECTION_SAMPLE_OFFSET {
        return Err(Error::HEADER_PROTECTION_FAILURE);
    }

    buffer[0] ^= mask[0] & mask_from_packet_tag(buffer[0]);
    let packet_number_len = space.new_packet_number_len(buffer[0]);

    let header_with_pn_len = header_len + packet_number_len.bytesize();
    let packet_number_bytes = &mut buffer[header_len..header_with_pn_len];
    xor_mask(packet_number_bytes, &mask);

    let packet_number = packet_number_len.decode_truncated(packet_number_bytes, space);

    Ok((
        packet_number,
        EncryptedPayload::new(header_len, packet_number_len.bytesize(), buffer),
    ))
}
