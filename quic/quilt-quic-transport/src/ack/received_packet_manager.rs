// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{ack::AckSettings, interval_set::IntervalSet};
use alloc::{collections::VecDeque, vec::Vec};
use core::ops::RangeInclusive;
use quilt_quic_core::{
    frame::{ack::TimestampRange, AckFrequency, EcnCounts, ReceiveTimestamps},
    inet::ExplicitCongestionNotification,
    packet::number::{PacketNumber, PacketNumberSpace},
    time::{Duration, Timestamp},
    varint::VarInt,
};

/// Everything needed to build the next ACK frame for a space
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckFrameData {
    pub largest_acknowledged: VarInt,
    /// Unscaled delay; the framer applies the ack delay exponent
    pub ack_delay: Duration,
    /// Acknowledged ranges ordered largest to smallest
    pub ranges: Vec<RangeInclusive<VarInt>>,
    pub ecn_counts: Option<EcnCounts>,
    pub receive_timestamps: Option<ReceiveTimestamps>,
}

#[derive(Debug, Default)]
struct SpaceState {
    received: IntervalSet,
    largest_received: Option<u64>,
    largest_received_time: Option<Timestamp>,
    /// Packets below this are no longer acknowledged
    peer_least_packet_awaiting_ack: Option<u64>,
    ack_timeout: Option<Timestamp>,
    ack_eliciting_since_last_ack: u64,
    received_count: u64,
    ecn_counts: Option<EcnCounts>,
    timestamps: VecDeque<(u64, Timestamp)>,
}

/// Tracks received packet numbers per space and decides when an ACK frame
/// must be sent back
#[derive(Debug)]
pub struct ReceivedPacketManager {
    settings: AckSettings,
    spaces: [SpaceState; PacketNumberSpace::COUNT],
    multiple_spaces: bool,
    any_received: bool,
    /// An IMMEDIATE_ACK latched an immediate-ack intent; persists until
    /// the next successful ack send
    ack_now: bool,
    min_rtt: Option<Duration>,
    last_ack_frequency_sequence: Option<u64>,
}

impl ReceivedPacketManager {
    pub fn new(settings: AckSettings) -> Self {
        Self {
            settings,
            spaces: Default::default(),
            multiple_spaces: false,
            any_received: false,
            ack_now: false,
            min_rtt: None,
            last_ack_frequency_sequence: None,
        }
    }

    /// Turns on per-space ack tracking. Must be called before the first
    /// received packet.
    pub fn enable_multiple_packet_number_spaces(&mut self) {
        debug_assert!(
            !self.any_received,
            "multiple packet number spaces must be enabled before the first received packet"
        );
        self.multiple_spaces = true;
    }

    #[inline]
    fn index(&self, space: PacketNumberSpace) -> usize {
        if self.multiple_spaces {
            space.as_index()
        } else {
            0
        }
    }

    #[inline]
    fn state(&self, space: PacketNumberSpace) -> &SpaceState {
        &self.spaces[self.index(space)]
    }

    #[inline]
    fn state_mut(&mut self, space: PacketNumberSpace) -> &mut SpaceState {
        let index = self.index(space);
        &mut self.spaces[index]
    }

    /// Records a successfully decrypted packet
    pub fn record_packet_received(
        &mut self,
        packet_number: PacketNumber,
        receipt_time: Timestamp,
        ecn: ExplicitCongestionNotification,
    ) {
        self.any_received = true;
        let max_ack_ranges = self.settings.max_ack_ranges;
        let max_timestamps = self.settings.max_receive_timestamps_per_ack;
        let timestamps_enabled = self.settings.receive_timestamps_enabled;
        let state = self.state_mut(packet_number.space());
        let value = packet_number.as_u64();

        if let Some(least) = state.peer_least_packet_awaiting_ack {
            if value < least {
                return;
            }
        }

        let previous_ce = state
            .ecn_counts
            .map_or(0, |counts| counts.ce_count.as_u64());

        let _ = state.received.insert_value(value);
        while state.received.interval_len() > max_ack_ranges {
            state.received.pop_min_interval();
        }

        if state.largest_received.map_or(true, |largest| value > largest) {
            state.largest_received = Some(value);
            state.largest_received_time = Some(receipt_time);
        }

        if ecn.using_ecn() || ecn.congestion_experienced() {
            let counts = state.ecn_counts.get_or_insert_with(EcnCounts::default);
            match ecn {
                ExplicitCongestionNotification::Ect0 => {
                    counts.ect_0_count = counts.ect_0_count.saturating_add(VarInt::from_u8(1));
                }
                ExplicitCongestionNotification::Ect1 => {
                    counts.ect_1_count = counts.ect_1_count.saturating_add(VarInt::from_u8(1));
                }
                ExplicitCongestionNotification::Ce => {
                    counts.ce_count = counts.ce_count.saturating_add(VarInt::from_u8(1));
                }
                ExplicitCongestionNotification::NotEct => {}
            }
        }

        // a transition into congestion-experienced acks immediately
        let ce_count = state
            .ecn_counts
            .map_or(0, |counts| counts.ce_count.as_u64());
        if ce_count > previous_ce {
            state.ack_timeout = Some(receipt_time);
        }

        if timestamps_enabled {
            state.timestamps.push_back((value, receipt_time));
            while state.timestamps.len() > max_timestamps {
                state.timestamps.pop_front();
            }
        }

        state.received_count += 1;
    }

    /// Applies the ack-sending rules for an ack-eliciting packet. Called
    /// after the packet's frames have been dispatched.
    pub fn maybe_update_ack_timeout(
        &mut self,
        packet_number: PacketNumber,
        now: Timestamp,
    ) {
        let effective_delay = self.effective_ack_delay();
        let packet_tolerance = self.settings.packet_tolerance;
        let ignore_order = self.settings.ignore_order;
        let ack_now = self.ack_now;

        let state = self.state_mut(packet_number.space());
        let value = packet_number.as_u64();

        if let Some(least) = state.peer_least_packet_awaiting_ack {
            if value < least {
                return;
            }
        }

        state.ack_eliciting_since_last_ack += 1;

        if ack_now {
            state.ack_timeout = Some(now);
            return;
        }

        // out-of-order receipt recovers a gap the peer may be waiting on
        let reordered = state
            .largest_received
            .map_or(false, |largest| value < largest);
        if reordered && !ignore_order {
            state.ack_timeout = Some(now);
            return;
        }

        if state.ack_eliciting_since_last_ack >= packet_tolerance {
            state.ack_timeout = Some(now);
            return;
        }

        let deadline = now + effective_delay;
        state.ack_timeout = Some(
            state
                .ack_timeout
                .map_or(deadline, |existing| existing.min(deadline)),
        );
    }

    /// The delay before a solitary ack-eliciting packet is acknowledged
    fn effective_ack_delay(&self) -> Duration {
        let mut delay = self.settings.max_ack_delay;

        if self.settings.decimation_enabled {
            let received: u64 = self
                .spaces
                .iter()
                .map(|state| state.received_count)
                .sum();
            if received >= self.settings.min_received_before_ack_decimation {
                if let Some(min_rtt) = self.min_rtt {
                    delay = delay.min(min_rtt / 4);
                }
            }
        }

        delay.min(self.settings.local_max_ack_delay)
    }

    /// Feeds an RTT sample for the decimation policy
    pub fn on_rtt_sample(&mut self, rtt: Duration) {
        self.min_rtt = Some(self.min_rtt.map_or(rtt, |min| min.min(rtt)));
    }

    /// Latches an immediate-ack intent; cleared by the next ack send
    pub fn on_immediate_ack(&mut self, space: PacketNumberSpace, now: Timestamp) {
        self.ack_now = true;
        let state = self.state_mut(space);
        if state.largest_received.is_some() {
            state.ack_timeout = Some(now);
        }
    }

    /// Applies an ACK_FREQUENCY update; obsolete sequence numbers are
    /// ignored
    pub fn on_ack_frequency_frame(&mut self, frame: &AckFrequency) {
        let sequence = frame.sequence_number.as_u64();
        if let Some(last) = self.last_ack_frequency_sequence {
            if sequence <= last {
                return;
            }
        }
        self.last_ack_frequency_sequence = Some(sequence);

        self.settings.packet_tolerance = frame.packet_tolerance.as_u64();
        self.settings.max_ack_delay = frame.max_ack_delay();
        self.settings.ignore_order = frame.ignore_order();
    }

    /// Returns when the next ACK frame must be emitted, if scheduled
    pub fn ack_timeout(&self, space: PacketNumberSpace) -> Option<Timestamp> {
        self.state(space).ack_timeout
    }

    /// Returns true once an ack for the space is due
    pub fn ack_frame_required(&self, space: PacketNumberSpace, now: Timestamp) -> bool {
        self.state(space)
            .ack_timeout
            .map_or(false, |deadline| deadline.has_elapsed(now))
    }

    /// The peer no longer expects acknowledgment of packets below
    /// `packet_number`
    pub fn dont_wait_for_packets_before(&mut self, packet_number: PacketNumber) {
        let state = self.state_mut(packet_number.space());
        let value = packet_number.as_u64();
        state.peer_least_packet_awaiting_ack = Some(value);
        if value > 0 {
            let _ = state.received.remove(0..value);
        }
        state
            .timestamps
            .retain(|(timestamped, _)| *timestamped >= value);
    }

    /// Builds the ACK frame covering everything received in the space and
    /// resets the ack schedule
    pub fn get_updated_ack_frame(
        &mut self,
        space: PacketNumberSpace,
        now: Timestamp,
    ) -> Option<AckFrameData> {
        let exponent = self.settings.receive_timestamps_exponent;
        let timestamps_enabled = self.settings.receive_timestamps_enabled;
        let state = self.state_mut(space);

        let largest = state.largest_received?;
        let largest_time = state.largest_received_time?;

        let ranges: Vec<RangeInclusive<VarInt>> = state
            .received
            .iter()
            .rev()
            .filter_map(|range| {
                let start = VarInt::new(range.start).ok()?;
                let end = VarInt::new(range.end - 1).ok()?;
                Some(start..=end)
            })
            .collect();

        if ranges.is_empty() {
            return None;
        }

        let receive_timestamps = if timestamps_enabled {
            Some(build_receive_timestamps(
                largest,
                &state.timestamps,
                exponent,
            ))
        } else {
            None
        };

        let data = AckFrameData {
            largest_acknowledged: VarInt::new(largest).ok()?,
            ack_delay: now.saturating_duration_since(largest_time),
            ranges,
            ecn_counts: if timestamps_enabled {
                None
            } else {
                state.ecn_counts
            },
            receive_timestamps,
        };

        state.ack_timeout = None;
        state.ack_eliciting_since_last_ack = 0;
        self.ack_now = false;

        Some(data)
    }

    /// Returns true if `packet_number` was already recorded; used to drop
    /// duplicate deliveries
    pub fn is_duplicate(&self, packet_number: PacketNumber) -> bool {
        self.state(packet_number.space())
            .received
            .contains(packet_number.as_u64())
    }

    /// Returns every received packet number currently acknowledged in the
    /// space
    #[cfg(any(test, feature = "testing"))]
    pub fn received_set(&self, space: PacketNumberSpace) -> &IntervalSet {
        &self.state(space).received
    }
}

/// Encodes the retained receive times as timestamp ranges.
///
/// Packets are grouped into contiguous descending runs. The first delta
/// in the frame is the receipt time of the newest packet relative to the
/// clock epoch; each following delta counts backwards from the previous
/// timestamp. All deltas are scaled down by the negotiated exponent.
fn build_receive_timestamps(
    largest: u64,
    timestamps: &VecDeque<(u64, Timestamp)>,
    exponent: u8,
) -> ReceiveTimestamps {
    let mut entries: Vec<(u64, Timestamp)> = timestamps.iter().copied().collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    let scale = |duration: Duration| -> VarInt {
        let micros = duration.as_micros() as u64 >> exponent;
        VarInt::new(micros).unwrap_or(VarInt::MAX)
    };

    let mut ranges: Vec<TimestampRange> = Vec::new();
    let mut previous_packet: Option<u64> = None;
    let mut previous_time: Option<Timestamp> = None;

    for (packet_number, time) in entries {
        let delta = match previous_time {
            None => scale(time.as_duration()),
            Some(previous) => scale(previous.saturating_duration_since(time)),
        };

        let contiguous = previous_packet == Some(packet_number + 1);
        if contiguous {
            if let Some(range) = ranges.last_mut() {
                range.deltas.push(delta);
            }
        } else {
            let reference = previous_packet.unwrap_or(largest + 1);
            let gap = reference - packet_number - 1;
            ranges.push(TimestampRange {
                gap: VarInt::new(gap).unwrap_or(VarInt::MAX),
                deltas: alloc::vec![delta],
            });
        }

        previous_packet = Some(packet_number);
        previous_time = Some(time);
    }

    ReceiveTimestamps { ranges }
}
