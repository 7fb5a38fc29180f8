// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection::ConnectionId,
    crypto::EncryptionLevel,
    packet::{number::TruncatedPacketNumber, Tag, Version, FIXED_BIT, LONG_HEADER_TAG},
    varint::VarInt,
};
use quilt_codec::{decoder_invariant, DecoderBuffer, DecoderError, Encoder};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# Long Header Packet {
//#   Header Form (1) = 1,
//#   Fixed Bit (1) = 1,
//#   Long Packet Type (2),
//#   Type-Specific Bits (4),
//#   Version (32),
//#   Destination Connection ID Length (8),
//#   Destination Connection ID (0..160),
//#   Source Connection ID Length (8),
//#   Source Connection ID (0..160),
//#   Type-Specific Payload (..),
//# }

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# +======+===========+================+
//# | Type | Name      | Section        |
//# +======+===========+================+
//# |  0x0 | Initial   | Section 17.2.2 |
//# +------+-----------+----------------+
//# |  0x1 | 0-RTT     | Section 17.2.3 |
//# +------+-----------+----------------+
//# |  0x2 | Handshake | Section 17.2.4 |
//# +------+-----------+----------------+
//# |  0x3 | Retry     | Section 17.2.5 |
//# +------+-----------+----------------+

const PACKET_TYPE_MASK: Tag = 0x30;
const PACKET_TYPE_OFFSET: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    Initial,
    ZeroRtt,
    Handshake,
    Retry,
}

impl PacketType {
    #[inline]
    pub fn from_tag(tag: Tag) -> Self {
        match (tag & PACKET_TYPE_MASK) >> PACKET_TYPE_OFFSET {
            0b00 => Self::Initial,
            0b01 => Self::ZeroRtt,
            0b10 => Self::Handshake,
            _ => Self::Retry,
        }
    }

    #[inline]
    pub fn into_tag_bits(self) -> Tag {
        let bits: Tag = match self {
            Self::Initial => 0b00,
            Self::ZeroRtt => 0b01,
            Self::Handshake => 0b10,
            Self::Retry => 0b11,
        };
        bits << PACKET_TYPE_OFFSET
    }

    /// Returns the encryption level protecting packets of this type
    #[inline]
    pub fn encryption_level(self) -> EncryptionLevel {
        match self {
            Self::Initial => EncryptionLevel::Initial,
            Self::ZeroRtt => EncryptionLevel::ZeroRtt,
            Self::Handshake => EncryptionLevel::Handshake,
            // retry packets are not protected with packet keys; callers
            // must special-case them before asking for a level
            Self::Retry => EncryptionLevel::Initial,
        }
    }
}

/// A parsed long header, up to and excluding the packet number.
///
/// Offsets index into the datagram slice the header was parsed from so the
/// caller can run header protection and decryption in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongHeader {
    pub packet_type: PacketType,
    pub version: Version,
    pub destination_connection_id: ConnectionId,
    pub source_connection_id: ConnectionId,
    /// Token bytes within the datagram; empty except for initial packets
    pub token: core::ops::Range<usize>,
    /// Offset of the packet number field
    pub header_len: usize,
    /// Total length of this packet within the datagram, including the
    /// packet number, payload, and AEAD tag
    pub packet_len: usize,
}

impl LongHeader {
    /// Parses a long header from the start of `buffer`.
    ///
    /// `buffer` must start at the packet's first byte. Retry and version
    /// negotiation packets are not handled here.
    pub fn decode(buffer: DecoderBuffer) -> Result<Self, DecoderError> {
        let datagram_len = buffer.len();
        let peek = buffer;

        let (tag, peek) = peek.decode::<Tag>()?;
        decoder_invariant!(tag & FIXED_BIT == FIXED_BIT, "fixed bit not set");
        let packet_type = PacketType::from_tag(tag);
        debug_assert!(!matches!(packet_type, PacketType::Retry));

        let (version, peek) = peek.decode::<Version>()?;

        let (destination_connection_id, peek) = decode_connection_id(peek)?;
        let (source_connection_id, peek) = decode_connection_id(peek)?;

        let (token, peek) = if matches!(packet_type, PacketType::Initial) {
            let (token_len, peek) = peek.decode::<VarInt>()?;
            let token_len: usize = token_len
                .try_into()
                .map_err(|_| DecoderError::LengthCapacityExceeded)?;
            let token_start = datagram_len - peek.len();
            let peek = peek.skip(token_len)?;
            (token_start..token_start + token_len, peek)
        } else {
            (0..0, peek)
        };

        let (length, peek) = peek.decode::<VarInt>()?;
        let length: usize = length
            .try_into()
            .map_err(|_| DecoderError::LengthCapacityExceeded)?;

        let header_len = datagram_len - peek.len();
        let packet_len = header_len
            .checked_add(length)
            .ok_or(DecoderError::LengthCapacityExceeded)?;

        decoder_invariant!(
            packet_len <= datagram_len,
            "packet length exceeds datagram"
        );

        Ok(Self {
            packet_type,
            version,
            destination_connection_id,
            source_connection_id,
            token,
            header_len,
            packet_len,
        })
    }
}

/// Reads a length-prefixed connection ID, rejecting lengths above the
/// version 1 limit
pub(crate) fn decode_connection_id(
    buffer: DecoderBuffer,
) -> Result<(ConnectionId, DecoderBuffer), DecoderError> {
    let (slice, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;
    let id = ConnectionId::try_from_slice(slice.as_less_safe_slice())
        .map_err(|_| DecoderError::InvariantViolation("invalid connection id length"))?;
    Ok((id, buffer))
}

/// Writes a long header through the packet number and returns the packet
/// number offset.
///
/// `payload_len` counts the frame bytes only; the length field also covers
/// the packet number and the AEAD tag.
#[allow(clippy::too_many_arguments)]
pub fn encode_header<E: Encoder>(
    encoder: &mut E,
    packet_type: PacketType,
    version: Version,
    destination_connection_id: &ConnectionId,
    source_connection_id: &ConnectionId,
    token: &[u8],
    packet_number: TruncatedPacketNumber,
    payload_len: usize,
    tag_len: usize,
) -> usize {
    let tag = LONG_HEADER_TAG
        | FIXED_BIT
        | packet_type.into_tag_bits()
        | packet_number.len().into_packet_tag_mask();

    encoder.encode(&tag);
    encoder.encode(&version);
    encoder.encode(&(destination_connection_id.len() as u8));
    encoder.encode(destination_connection_id);
    encoder.encode(&(source_connection_id.len() as u8));
    encoder.encode(source_connection_id);

    if matches!(packet_type, PacketType::Initial) {
        encoder.encode(&VarInt::from_u32(token.len() as u32));
        encoder.write_slice(token);
    }

    let length = packet_number.len().bytesize() + payload_len + tag_len;
    encoder.encode(&VarInt::from_u32(length as u32));

    let header_len = encoder.len();
    packet_number.encode(encoder);

    header_len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::number::{PacketNumberLen, PacketNumberSpace};
    use quilt_codec::EncoderBuffer;

    fn cid(bytes: &[u8]) -> ConnectionId {
        ConnectionId::try_from_slice(bytes).unwrap()
    }

    #[test]
    fn round_trip_test() {
        let mut buffer = [0u8; 128];
        let packet_number = crate::packet::number::TruncatedPacketNumber::new(
            0x2d,
            PacketNumberLen::new(1).unwrap(),
            PacketNumberSpace::Initial,
        );

        let mut encoder = EncoderBuffer::new(&mut buffer);
        let header_len = encode_header(
            &mut encoder,
            PacketType::Initial,
            crate::packet::QUIC_VERSION_1,
            &cid(&[1, 2, 3, 4]),
            &cid(&[5, 6]),
            b"token",
            packet_number,
            20,
            16,
        );
        // packet number follows the header
        assert_eq!(encoder.len(), header_len + 1);

        // fill in the payload and tag the length field promised
        encoder.write_repeated(20 + 16, 0);
        let total = encoder.len();

        let decoder = DecoderBuffer::new(&buffer[..total]);
        let header = LongHeader::decode(decoder).unwrap();

        assert_eq!(header.packet_type, PacketType::Initial);
        assert_eq!(header.version, crate::packet::QUIC_VERSION_1);
        assert_eq!(header.destination_connection_id, cid(&[1, 2, 3, 4]));
        assert_eq!(header.source_connection_id, cid(&[5, 6]));
        assert_eq!(&buffer[header.token.clone()], b"token");
        assert_eq!(header.header_len, header_len);
        assert_eq!(header.packet_len, total);
    }

    #[test]
    fn truncated_packet_test() {
        let mut buffer = [0u8; 64];
        let packet_number = crate::packet::number::TruncatedPacketNumber::new(
            1,
            PacketNumberLen::new(1).unwrap(),
            PacketNumberSpace::Handshake,
        );

        let mut encoder = EncoderBuffer::new(&mut buffer);
        encode_header(
            &mut encoder,
            PacketType::Handshake,
            crate::packet::QUIC_VERSION_1,
            &cid(&[1]),
            &cid(&[2]),
            &[],
            packet_number,
            30,
            16,
        );
        let written = encoder.len();

        // the length field promises more bytes than the datagram carries
        let decoder = DecoderBuffer::new(&buffer[..written]);
        assert!(LongHeader::decode(decoder).is_err());
    }
}
