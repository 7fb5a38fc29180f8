// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection::ConnectionId,
    packet::{key_phase::KeyPhase, number::TruncatedPacketNumber, Tag, FIXED_BIT},
};
use quilt_codec::{decoder_invariant, DecoderBuffer, DecoderError, Encoder};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.3.1
//# 1-RTT Packet {
//#   Header Form (1) = 0,
//#   Fixed Bit (1) = 1,
//#   Spin Bit (1),
//#   Reserved Bits (2),
//#   Key Phase (1),
//#   Packet Number Length (2),
//#   Destination Connection ID (0..160),
//#   Packet Number (8..32),
//#   Packet Payload (8..),
//# }

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.3.1
//# Spin Bit:  The third most significant bit (0x20) of byte 0 is the
//#    latency spin bit, set as described in Section 17.4.

pub const SPIN_BIT_MASK: Tag = 0x20;

/// A parsed short header, up to and excluding the packet number.
///
/// The destination connection ID length is not self-describing; the caller
/// supplies the length it issues for short header packets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortHeader {
    pub spin_bit: bool,
    pub destination_connection_id: ConnectionId,
    /// Offset of the packet number field
    pub header_len: usize,
}

impl ShortHeader {
    pub fn decode(
        buffer: DecoderBuffer,
        destination_connection_id_len: usize,
    ) -> Result<Self, DecoderError> {
        let datagram_len = buffer.len();

        let (tag, buffer) = buffer.decode::<Tag>()?;
        decoder_invariant!(tag & FIXED_BIT == FIXED_BIT, "fixed bit not set");
        let spin_bit = tag & SPIN_BIT_MASK == SPIN_BIT_MASK;

        let (id_bytes, buffer) = buffer.decode_slice(destination_connection_id_len)?;
        let destination_connection_id =
            ConnectionId::try_from_slice(id_bytes.as_less_safe_slice())
                .map_err(|_| DecoderError::InvariantViolation("invalid connection id length"))?;

        let header_len = datagram_len - buffer.len();

        Ok(Self {
            spin_bit,
            destination_connection_id,
            header_len,
        })
    }
}

/// Writes a short header through the packet number and returns the packet
/// number offset
pub fn encode_header<E: Encoder>(
    encoder: &mut E,
    spin_bit: bool,
    key_phase: KeyPhase,
    destination_connection_id: &ConnectionId,
    packet_number: TruncatedPacketNumber,
) -> usize {
    let mut tag = FIXED_BIT
        | key_phase.into_packet_tag_mask()
        | packet_number.len().into_packet_tag_mask();

    if spin_bit {
        tag |= SPIN_BIT_MASK;
    }

    encoder.encode(&tag);
    encoder.encode(destination_connection_id);

    let header_len = encoder.len();
    packet_number.encode(encoder);

    header_len
}
