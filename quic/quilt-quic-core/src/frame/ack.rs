// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use core::{convert::TryInto, ops::RangeInclusive};
use quilt_codec::{
    decoder_invariant, decoder_value, DecoderBuffer, DecoderBufferResult, DecoderError,
    DecoderParameterizedValue, Encoder, EncoderValue,
};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//# Receivers send ACK frames (types 0x02 and 0x03) to inform senders of
//# packets they have received and processed.  The ACK frame contains one
//# or more ACK Ranges.  ACK Ranges identify acknowledged packets.  If
//# the frame type is 0x03, ACK frames also contain the cumulative count
//# of QUIC packets with associated ECN marks received on the connection
//# up until this point.

pub(crate) const ACK_TAG: Tag = 0x02;
const ACK_W_ECN_TAG: Tag = 0x03;

/// ACK frames which trade the ECN section for per-packet receive
/// timestamps. Not an IANA-registered codepoint yet.
pub const ACK_W_RECEIVE_TIMESTAMPS_TAG: Tag = 0x22;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//# ACK Frame {
//#   Type (i) = 0x02..0x03,
//#   Largest Acknowledged (i),
//#   ACK Delay (i),
//#   ACK Range Count (i),
//#   First ACK Range (i),
//#   ACK Range (..) ...,
//#   [ECN Counts (..)],
//# }

#[derive(Clone, PartialEq, Eq)]
pub struct Ack<AckRanges> {
    /// The acknowledgment delay, scaled by the sender's ack delay exponent
    pub ack_delay: VarInt,

    /// Ranges of packets which are alternately not acknowledged (Gap)
    /// and acknowledged (ACK Range)
    pub ack_ranges: AckRanges,

    /// ECN counts, present in ACK_ECN frames
    pub ecn_counts: Option<EcnCounts>,

    /// Receive timestamp ranges, present in ACK_RECEIVE_TIMESTAMPS frames.
    /// When present the ECN section is not emitted.
    pub receive_timestamps: Option<ReceiveTimestamps>,
}

impl<A> Ack<A> {
    pub fn tag(&self) -> Tag {
        if self.receive_timestamps.is_some() {
            ACK_W_RECEIVE_TIMESTAMPS_TAG
        } else if self.ecn_counts.is_some() {
            ACK_W_ECN_TAG
        } else {
            ACK_TAG
        }
    }
}

impl<A: AckRanges> Ack<A> {
    pub fn ack_delay(&self) -> core::time::Duration {
        core::time::Duration::from_micros(self.ack_delay.as_u64())
    }

    /// Iterates the acknowledged ranges from largest to smallest
    pub fn ack_ranges(&self) -> A::Iter {
        self.ack_ranges.ack_ranges()
    }

    pub fn largest_acknowledged(&self) -> VarInt {
        self.ack_ranges.largest_acknowledged()
    }
}

impl<A: core::fmt::Debug> core::fmt::Debug for Ack<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Ack")
            .field("ack_delay", &self.ack_delay)
            .field("ack_ranges", &self.ack_ranges)
            .field("ecn_counts", &self.ecn_counts)
            .field("receive_timestamps", &self.receive_timestamps)
            .finish()
    }
}

impl<'a> DecoderParameterizedValue<'a> for Ack<AckRangesDecoder<'a>> {
    type Parameter = Tag;

    #[inline]
    fn decode_parameterized(
        tag: Tag,
        buffer: DecoderBuffer<'a>,
    ) -> DecoderBufferResult<'a, Self> {
        let (largest_acknowledged, buffer) = buffer.decode::<VarInt>()?;
        let (ack_delay, buffer) = buffer.decode::<VarInt>()?;
        let (ack_ranges, buffer) = AckRangesDecoder::decode(largest_acknowledged, buffer)?;

        let (ecn_counts, buffer) = if tag == ACK_W_ECN_TAG {
            let (ecn_counts, buffer) = buffer.decode()?;
            (Some(ecn_counts), buffer)
        } else {
            (None, buffer)
        };

        let (receive_timestamps, buffer) = if tag == ACK_W_RECEIVE_TIMESTAMPS_TAG {
            let (timestamps, buffer) = buffer.decode()?;
            (Some(timestamps), buffer)
        } else {
            (None, buffer)
        };

        let frame = Ack {
            ack_delay,
            ack_ranges,
            ecn_counts,
            receive_timestamps,
        };

        Ok((frame, buffer))
    }
}

impl<A: AckRanges> EncoderValue for Ack<A> {
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());

        let mut iter = self.ack_ranges.ack_ranges();

        let first_ack_range = iter.next().expect("at least one ack range is required");
        let (mut smallest, largest_acknowledged) = first_ack_range.into_inner();
        let first_ack_range = largest_acknowledged - smallest;

        let ack_range_count: VarInt = iter
            .len()
            .try_into()
            .expect("ack range count cannot exceed VarInt::MAX");

        buffer.encode(&largest_acknowledged);
        buffer.encode(&self.ack_delay);
        buffer.encode(&ack_range_count);
        buffer.encode(&first_ack_range);

        for range in iter {
            smallest = encode_ack_range(range, smallest, buffer);
        }

        if let Some(receive_timestamps) = self.receive_timestamps.as_ref() {
            buffer.encode(receive_timestamps);
        } else if let Some(ecn_counts) = self.ecn_counts.as_ref() {
            buffer.encode(ecn_counts);
        }
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.1
//# Each ACK Range consists of alternating Gap and ACK Range Length
//# values in descending packet number order.

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.1
//# Gap:  A variable-length integer indicating the number of contiguous
//#    unacknowledged packets preceding the packet number one lower than
//#    the smallest in the preceding ACK Range.
//#
//# ACK Range Length:  A variable-length integer indicating the number of
//#    contiguous acknowledged packets preceding the largest packet
//#    number, as determined by the preceding Gap.

/// Encodes a single `(gap, length)` pair and returns the smallest value
/// covered so far
fn encode_ack_range<E: Encoder>(
    range: RangeInclusive<VarInt>,
    smallest: VarInt,
    buffer: &mut E,
) -> VarInt {
    let (start, end) = range.into_inner();
    let gap = smallest - end - 2usize;
    let ack_range = end - start;

    buffer.encode(&gap);
    buffer.encode(&ack_range);

    start
}

/// A provider of acknowledged ranges, iterated from largest to smallest
pub trait AckRanges {
    type Iter: Iterator<Item = RangeInclusive<VarInt>> + ExactSizeIterator;

    fn ack_ranges(&self) -> Self::Iter;

    fn largest_acknowledged(&self) -> VarInt {
        *self
            .ack_ranges()
            .next()
            .expect("at least one ack range is required")
            .end()
    }
}

/// Lazily decoded ACK ranges. The ranges are validated up front so
/// iteration cannot fail.
#[derive(Clone, Copy)]
pub struct AckRangesDecoder<'a> {
    largest_acknowledged: VarInt,
    first_ack_range: VarInt,
    /// number of (gap, length) pairs following the first range
    pair_count: u64,
    range_buffer: DecoderBuffer<'a>,
}

impl<'a> AckRangesDecoder<'a> {
    fn decode(
        largest_acknowledged: VarInt,
        buffer: DecoderBuffer<'a>,
    ) -> DecoderBufferResult<'a, Self> {
        let (ack_range_count, buffer) = buffer.decode::<VarInt>()?;
        let (first_ack_range, buffer) = buffer.decode::<VarInt>()?;

        decoder_invariant!(
            first_ack_range <= largest_acknowledged,
            "first ack range larger than largest acked"
        );

        let mut smallest = largest_acknowledged - first_ack_range;
        let range_start_len = buffer.len();
        let mut remaining = buffer;

        // walk the ranges once so iteration is infallible
        for _ in 0..ack_range_count.as_u64() {
            let (gap, rest) = remaining.decode::<VarInt>()?;
            let (ack_range, rest) = rest.decode::<VarInt>()?;

            let largest = smallest
                .checked_sub(gap)
                .and_then(|value| value.checked_sub(VarInt::from_u8(2)))
                .ok_or(DecoderError::InvariantViolation(
                    "ack range extends below zero",
                ))?;
            smallest = largest
                .checked_sub(ack_range)
                .ok_or(DecoderError::InvariantViolation(
                    "ack range extends below zero",
                ))?;
            remaining = rest;
        }

        let range_len = range_start_len - remaining.len();
        let (range_buffer, buffer) = buffer.decode_slice(range_len)?;

        let decoder = AckRangesDecoder {
            largest_acknowledged,
            first_ack_range,
            pair_count: ack_range_count.as_u64(),
            range_buffer,
        };

        Ok((decoder, buffer))
    }
}

impl<'a> AckRanges for AckRangesDecoder<'a> {
    type Iter = AckRangesIter<'a>;

    fn ack_ranges(&self) -> Self::Iter {
        AckRangesIter {
            next_largest: Some(self.largest_acknowledged),
            first_ack_range: Some(self.first_ack_range),
            remaining_pairs: self.pair_count,
            range_buffer: self.range_buffer,
        }
    }

    fn largest_acknowledged(&self) -> VarInt {
        self.largest_acknowledged
    }
}

impl<'a> PartialEq for AckRangesDecoder<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.ack_ranges().eq(other.ack_ranges())
    }
}

impl<'a> Eq for AckRangesDecoder<'a> {}

impl<'a> core::fmt::Debug for AckRangesDecoder<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_list().entries(self.ack_ranges()).finish()
    }
}

/// Iterates decoded ack ranges in descending packet number order
#[derive(Clone)]
pub struct AckRangesIter<'a> {
    /// largest packet number of the range yielded next
    next_largest: Option<VarInt>,
    /// length of the first range; `Some` until it has been yielded
    first_ack_range: Option<VarInt>,
    remaining_pairs: u64,
    range_buffer: DecoderBuffer<'a>,
}

impl<'a> Iterator for AckRangesIter<'a> {
    type Item = RangeInclusive<VarInt>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(first_ack_range) = self.first_ack_range.take() {
            let largest = self.next_largest?;
            let smallest = largest.saturating_sub(first_ack_range);
            self.next_largest = Some(smallest);
            return Some(smallest..=largest);
        }

        if self.remaining_pairs == 0 {
            return None;
        }
        self.remaining_pairs -= 1;

        let prev_smallest = self.next_largest?;

        // decoding was validated up front and cannot fail here
        let (gap, buffer) = self.range_buffer.decode::<VarInt>().ok()?;
        let (ack_range, buffer) = buffer.decode::<VarInt>().ok()?;
        self.range_buffer = buffer;

        let largest = prev_smallest
            .saturating_sub(gap)
            .saturating_sub(VarInt::from_u8(2));
        let smallest = largest.saturating_sub(ack_range);
        self.next_largest = Some(smallest);

        Some(smallest..=largest)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.first_ack_range.is_some() as usize + self.remaining_pairs as usize;
        (count, Some(count))
    }
}

impl<'a> ExactSizeIterator for AckRangesIter<'a> {}

/// A slice of ranges ordered from largest to smallest can be encoded
/// directly; used when building ACK frames from owned range sets.
impl<'a> AckRanges for &'a [RangeInclusive<VarInt>] {
    type Iter = core::iter::Cloned<core::slice::Iter<'a, RangeInclusive<VarInt>>>;

    fn ack_ranges(&self) -> Self::Iter {
        self.iter().cloned()
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.2
//# ECN Counts {
//#   ECT0 Count (i),
//#   ECT1 Count (i),
//#   ECN-CE Count (i),
//# }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EcnCounts {
    /// The total number of packets received with the ECT(0) codepoint
    pub ect_0_count: VarInt,

    /// The total number of packets received with the ECT(1) codepoint
    pub ect_1_count: VarInt,

    /// The total number of packets received with the CE codepoint
    pub ce_count: VarInt,
}

decoder_value!(
    impl<'a> EcnCounts {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (ect_0_count, buffer) = buffer.decode()?;
            let (ect_1_count, buffer) = buffer.decode()?;
            let (ce_count, buffer) = buffer.decode()?;

            let ecn_counts = EcnCounts {
                ect_0_count,
                ect_1_count,
                ce_count,
            };

            Ok((ecn_counts, buffer))
        }
    }
);

impl EncoderValue for EcnCounts {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.ect_0_count);
        buffer.encode(&self.ect_1_count);
        buffer.encode(&self.ce_count);
    }
}

/// A run of receive timestamps for a contiguous range of packets.
///
/// `gap` counts packets down from the previous range (or the largest
/// acknowledged for the first entry). Each delta is scaled by the
/// negotiated receive timestamp exponent; the first delta in the frame is
/// relative to the receiver's epoch, subsequent deltas count backwards
/// from the previous timestamp.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimestampRange {
    pub gap: VarInt,
    pub deltas: alloc::vec::Vec<VarInt>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiveTimestamps {
    pub ranges: alloc::vec::Vec<TimestampRange>,
}

decoder_value!(
    impl<'a> ReceiveTimestamps {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (range_count, mut buffer) = buffer.decode::<VarInt>()?;

            // every range needs at least a gap and a count byte
            decoder_invariant!(
                range_count.as_u64() <= buffer.len() as u64 / 2,
                "timestamp range count exceeds frame size"
            );

            let mut ranges = alloc::vec::Vec::with_capacity(range_count.as_u64() as usize);

            for _ in 0..range_count.as_u64() {
                let (gap, rest) = buffer.decode::<VarInt>()?;
                let (delta_count, mut rest) = rest.decode::<VarInt>()?;

                decoder_invariant!(
                    delta_count.as_u64() <= rest.len() as u64,
                    "timestamp delta count exceeds frame size"
                );

                let mut deltas = alloc::vec::Vec::with_capacity(delta_count.as_u64() as usize);
                for _ in 0..delta_count.as_u64() {
                    let (delta, r) = rest.decode::<VarInt>()?;
                    deltas.push(delta);
                    rest = r;
                }

                ranges.push(TimestampRange { gap, deltas });
                buffer = rest;
            }

            Ok((ReceiveTimestamps { ranges }, buffer))
        }
    }
);

impl EncoderValue for ReceiveTimestamps {
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&VarInt::from_u32(self.ranges.len() as u32));
        for range in &self.ranges {
            buffer.encode(&range.gap);
            buffer.encode(&VarInt::from_u32(range.deltas.len() as u32));
            for delta in &range.deltas {
                buffer.encode(delta);
            }
        }
    }
}
