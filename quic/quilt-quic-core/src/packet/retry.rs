// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection::ConnectionId,
    packet::{
        long::{decode_connection_id, PacketType},
        Tag, Version, FIXED_BIT, LONG_HEADER_TAG,
    },
};
use quilt_codec::{decoder_invariant, DecoderBuffer, DecoderError, Encoder};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.5
//# Retry Packet {
//#   Header Form (1) = 1,
//#   Fixed Bit (1) = 1,
//#   Long Packet Type (2) = 3,
//#   Unused (4),
//#   Version (32),
//#   Destination Connection ID Length (8),
//#   Destination Connection ID (0..160),
//#   Source Connection ID Length (8),
//#   Source Connection ID (0..160),
//#   Retry Token (..),
//#   Retry Integrity Tag (128),
//# }

pub const INTEGRITY_TAG_LEN: usize = 16;

/// Validates the integrity tag of a retry packet.
///
/// The real implementation lives with the crypto provider; see RFC 9001
/// §5.8 for the AEAD construction over the pseudo-packet.
pub trait IntegrityValidator {
    fn validate_retry_tag(&self, pseudo_packet: &[u8], tag: &[u8; INTEGRITY_TAG_LEN]) -> bool;
}

/// A parsed retry packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Retry<'a> {
    pub version: Version,
    pub destination_connection_id: ConnectionId,
    pub source_connection_id: ConnectionId,
    pub retry_token: &'a [u8],
    pub integrity_tag: [u8; INTEGRITY_TAG_LEN],
}

impl<'a> Retry<'a> {
    /// Parses a retry packet; `buffer` must span the whole datagram
    pub fn decode(buffer: DecoderBuffer<'a>) -> Result<Self, DecoderError> {
        let (tag, buffer) = buffer.decode::<Tag>()?;
        decoder_invariant!(tag & FIXED_BIT == FIXED_BIT, "fixed bit not set");
        decoder_invariant!(
            matches!(PacketType::from_tag(tag), PacketType::Retry),
            "not a retry packet"
        );

        let (version, buffer) = buffer.decode::<Version>()?;
        let (destination_connection_id, buffer) = decode_connection_id(buffer)?;
        let (source_connection_id, buffer) = decode_connection_id(buffer)?;

        let token_len = buffer
            .len()
            .checked_sub(INTEGRITY_TAG_LEN)
            .ok_or(DecoderError::InvariantViolation("retry packet too short"))?;

        //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.5.1
        //# A client MUST discard a Retry packet with a zero-length Retry Token
        //# field.
        decoder_invariant!(token_len > 0, "empty retry token");

        let (retry_token, buffer) = buffer.decode_slice(token_len)?;
        let (tag_bytes, buffer) = buffer.decode_slice(INTEGRITY_TAG_LEN)?;
        debug_assert!(buffer.is_empty());

        let mut integrity_tag = [0; INTEGRITY_TAG_LEN];
        integrity_tag.copy_from_slice(tag_bytes.as_less_safe_slice());

        Ok(Self {
            version,
            destination_connection_id,
            source_connection_id,
            retry_token: retry_token.into_less_safe_slice(),
            integrity_tag,
        })
    }

    /// Builds the pseudo-packet the integrity tag covers: the original
    /// destination connection ID followed by the retry packet without its
    /// tag.
    //= https://www.rfc-editor.org/rfc/rfc9001#section-5.8
    //# The Retry Pseudo-Packet is computed by taking the transmitted Retry
    //# packet, removing the Retry Integrity Tag, and prepending the two
    //# following fields:  ODCID Length, Original Destination Connection ID
    pub fn pseudo_packet(
        &self,
        original_destination_connection_id: &ConnectionId,
        packet: &[u8],
    ) -> alloc::vec::Vec<u8> {
        let body_len = packet.len().saturating_sub(INTEGRITY_TAG_LEN);
        let mut pseudo =
            alloc::vec::Vec::with_capacity(1 + original_destination_connection_id.len() + body_len);
        pseudo.push(original_destination_connection_id.len() as u8);
        pseudo.extend_from_slice(original_destination_connection_id.as_bytes());
        pseudo.extend_from_slice(&packet[..body_len]);
        pseudo
    }
}

/// Writes a retry packet. The integrity tag must be computed by the caller
/// over the pseudo-packet and is appended verbatim.
pub fn encode<E: Encoder>(
    encoder: &mut E,
    version: Version,
    destination_connection_id: &ConnectionId,
    source_connection_id: &ConnectionId,
    retry_token: &[u8],
    integrity_tag: &[u8; INTEGRITY_TAG_LEN],
) {
    encoder.encode(&(LONG_HEADER_TAG | FIXED_BIT | PacketType::Retry.into_tag_bits()));
    encoder.encode(&version);
    encoder.encode(&(destination_connection_id.len() as u8));
    encoder.encode(destination_connection_id);
    encoder.encode(&(source_connection_id.len() as u8));
    encoder.encode(source_connection_id);
    encoder.write_slice(retry_token);
    encoder.write_slice(integrity_tag);
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// Computes a toy integrity tag: a rotating checksum of the
    /// pseudo-packet. Matches nothing a real peer would produce.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Validator;

    pub fn tag(pseudo_packet: &[u8]) -> [u8; INTEGRITY_TAG_LEN] {
        let mut acc = 0x51u8;
        for byte in pseudo_packet {
            acc = acc.rotate_left(1) ^ byte;
        }

        let mut tag = [0; INTEGRITY_TAG_LEN];
        for (index, byte) in tag.iter_mut().enumerate() {
            *byte = acc.wrapping_add(index as u8);
        }
        tag
    }

    impl IntegrityValidator for Validator {
        fn validate_retry_tag(
            &self,
            pseudo_packet: &[u8],
            packet_tag: &[u8; INTEGRITY_TAG_LEN],
        ) -> bool {
            tag(pseudo_packet) == *packet_tag
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::QUIC_VERSION_1;
    use quilt_codec::EncoderBuffer;

    fn cid(bytes: &[u8]) -> ConnectionId {
        ConnectionId::try_from_slice(bytes).unwrap()
    }

    #[test]
    fn round_trip_with_integrity_test() {
        let odcid = cid(&[9, 9, 9, 9]);
        let new_scid = cid(&[7, 7]);

        // encode without the tag to compute the pseudo packet
        let mut buffer = [0u8; 256];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        encode(
            &mut encoder,
            QUIC_VERSION_1,
            &cid(&[1, 2]),
            &new_scid,
            b"retry-token",
            &[0; INTEGRITY_TAG_LEN],
        );
        let written = encoder.len();

        // fix up the tag over the pseudo packet
        let mut pseudo = vec![odcid.len() as u8];
        pseudo.extend_from_slice(odcid.as_bytes());
        pseudo.extend_from_slice(&buffer[..written - INTEGRITY_TAG_LEN]);
        let tag = testing::tag(&pseudo);
        buffer[written - INTEGRITY_TAG_LEN..written].copy_from_slice(&tag);

        let decoder = DecoderBuffer::new(&buffer[..written]);
        let retry = Retry::decode(decoder).unwrap();

        assert_eq!(retry.version, QUIC_VERSION_1);
        assert_eq!(retry.source_connection_id, new_scid);
        assert_eq!(retry.retry_token, b"retry-token");

        let pseudo = retry.pseudo_packet(&odcid, &buffer[..written]);
        use testing::Validator;
        assert!(Validator.validate_retry_tag(&pseudo, &retry.integrity_tag));

        // a different original destination connection id fails validation
        let pseudo = retry.pseudo_packet(&cid(&[1]), &buffer[..written]);
        assert!(!Validator.validate_retry_tag(&pseudo, &retry.integrity_tag));
    }

    #[test]
    fn empty_token_rejected_test() {
        let mut buffer = [0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        encode(
            &mut encoder,
            QUIC_VERSION_1,
            &cid(&[1]),
            &cid(&[2]),
            &[],
            &[0; INTEGRITY_TAG_LEN],
        );
        let written = encoder.len();

        let decoder = DecoderBuffer::new(&buffer[..written]);
        assert!(Retry::decode(decoder).is_err());
    }
}
