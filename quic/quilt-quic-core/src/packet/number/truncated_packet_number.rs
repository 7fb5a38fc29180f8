// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::packet::number::{
    decode_packet_number, PacketNumber, PacketNumberLen, PacketNumberSpace,
};
use quilt_codec::{DecoderBuffer, DecoderBufferResult, Encoder};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
//# When present in long or short packet headers, they are encoded in 1
//# to 4 bytes.  The number of bits required to represent the packet
//# number is reduced by including only the least significant bits of the
//# packet number.

/// The low bits of a packet number as they appear on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TruncatedPacketNumber {
    value: u64,
    len: PacketNumberLen,
    space: PacketNumberSpace,
}

impl TruncatedPacketNumber {
    #[inline]
    pub fn new(value: u64, len: PacketNumberLen, space: PacketNumberSpace) -> Self {
        debug_assert!(value <= len.max_value());
        Self { value, len, space }
    }

    #[inline]
    pub fn space(self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub fn len(self) -> PacketNumberLen {
        self.len
    }

    #[inline]
    pub fn bitsize(self) -> usize {
        self.len.bitsize()
    }

    #[inline]
    pub fn into_u64(self) -> u64 {
        self.value
    }

    /// Reconstructs the full packet number as the value closest to
    /// `largest + 1` within the truncation window
    #[inline]
    pub fn expand(self, largest: PacketNumber) -> PacketNumber {
        decode_packet_number(largest, self)
    }

    /// Writes the truncated packet number in network byte order
    #[inline]
    pub fn encode<E: Encoder>(self, encoder: &mut E) {
        let bytes = self.value.to_be_bytes();
        let len = self.len.bytesize();
        encoder.write_sized(len, |buffer| {
            buffer.copy_from_slice(&bytes[8 - len..]);
        });
    }

    /// Reads a truncated packet number of `len` bytes
    #[inline]
    pub fn decode(
        buffer: DecoderBuffer,
        len: PacketNumberLen,
        space: PacketNumberSpace,
    ) -> DecoderBufferResult<Self> {
        let (slice, buffer) = buffer.decode_slice(len.bytesize())?;
        let value = slice
            .as_less_safe_slice()
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | *byte as u64);
        Ok((Self::new(value, len, space), buffer))
    }
}

impl PacketNumberLen {
    /// Reads a truncated packet number directly from unmasked header bytes
    #[inline]
    pub(crate) fn decode_truncated(
        self,
        bytes: &[u8],
        space: PacketNumberSpace,
    ) -> TruncatedPacketNumber {
        debug_assert_eq!(bytes.len(), self.bytesize());
        let value = bytes
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | *byte as u64);
        TruncatedPacketNumber::new(value, self, space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_codec::EncoderBuffer;

    #[test]
    fn encode_decode_test() {
        for (value, bytes) in [
            (0x2du64, 1usize),
            (0x9b32, 2),
            (0x00ac_e8fe, 3),
            (0xface_b00c, 4),
        ] {
            let len = PacketNumberLen::new(bytes as u8).unwrap();
            let truncated =
                TruncatedPacketNumber::new(value, len, PacketNumberSpace::ApplicationData);

            let mut buffer = [0u8; 4];
            let mut encoder = EncoderBuffer::new(&mut buffer);
            truncated.encode(&mut encoder);
            assert_eq!(encoder.len(), bytes);

            let decoder = DecoderBuffer::new(&buffer[..bytes]);
            let (decoded, remaining) =
                TruncatedPacketNumber::decode(decoder, len, PacketNumberSpace::ApplicationData)
                    .unwrap();
            assert!(remaining.is_empty());
            assert_eq!(decoded, truncated);
        }
    }
}
