// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use core::time::Duration;
use quilt_codec::{decoder_invariant, decoder_parameterized_value, Encoder, EncoderValue};

// An ACK_FREQUENCY frame lets a sender adjust how often its peer sends
// acknowledgments. Defined by the QUIC Acknowledgement Frequency
// extension; the codepoint requires a two byte frame type encoding.

pub(crate) const ACK_FREQUENCY_TAG: u64 = 0xaf;

/// Requested delays above this bound are malformed
const MAX_ACK_DELAY_BOUND_US: u64 = 1 << 24;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AckFrequency {
    /// Frames with a sequence number below the latest seen are obsolete
    /// and ignored
    pub sequence_number: VarInt,

    /// The number of ack-eliciting packets after which an ack must be
    /// sent. Zero is invalid.
    pub packet_tolerance: VarInt,

    /// The requested maximum ack delay, in microseconds before scaling
    pub update_max_ack_delay: VarInt,

    /// The number of reordered packets that trigger an immediate ack.
    /// Zero asks the peer not to ack immediately on reordering.
    pub reordering_threshold: VarInt,
}

impl AckFrequency {
    #[inline]
    pub fn tag(&self) -> VarInt {
        VarInt::from_u16(ACK_FREQUENCY_TAG as u16)
    }

    /// Returns the requested maximum ack delay
    #[inline]
    pub fn max_ack_delay(&self) -> Duration {
        Duration::from_micros(self.update_max_ack_delay.as_u64())
    }

    /// Returns true if the peer asked to suppress immediate acks on
    /// packet reordering
    #[inline]
    pub fn ignore_order(&self) -> bool {
        self.reordering_threshold == VarInt::ZERO
    }
}

decoder_parameterized_value!(
    impl<'a> AckFrequency {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            let (sequence_number, buffer) = buffer.decode::<VarInt>()?;

            let (packet_tolerance, buffer) = buffer.decode::<VarInt>()?;
            decoder_invariant!(
                packet_tolerance != VarInt::ZERO,
                "invalid packet tolerance"
            );

            let (update_max_ack_delay, buffer) = buffer.decode::<VarInt>()?;
            decoder_invariant!(
                update_max_ack_delay.as_u64() <= MAX_ACK_DELAY_BOUND_US,
                "invalid max ack delay"
            );

            let (reordering_threshold, buffer) = buffer.decode::<VarInt>()?;

            let frame = AckFrequency {
                sequence_number,
                packet_tolerance,
                update_max_ack_delay,
                reordering_threshold,
            };

            Ok((frame, buffer))
        }
    }
);

impl EncoderValue for AckFrequency {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.sequence_number);
        buffer.encode(&self.packet_tolerance);
        buffer.encode(&self.update_max_ack_delay);
        buffer.encode(&self.reordering_threshold);
    }
}
