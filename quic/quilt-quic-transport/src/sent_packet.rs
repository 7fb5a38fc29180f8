// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Records for every packet in flight, keyed by packet number space.
//!
//! The loss detector's algorithms are external; this map only provides
//! the bookkeeping they operate on: which packets are outstanding, what
//! each one carried, and which transmission produced it.

use crate::interval_set::IntervalSet;
use alloc::{collections::BTreeMap, vec::Vec};
use quilt_quic_core::{
    connection,
    crypto::EncryptionLevel,
    packet::number::{PacketNumber, PacketNumberSpace},
    time::Timestamp,
    varint::VarInt,
};
use smallvec::SmallVec;

/// Why a packet was produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransmissionType {
    #[default]
    NotRetransmission,
    /// Data declared lost by the loss detector
    LossRetransmission,
    /// Data resent on probe timeout
    PtoRetransmission,
    /// Data resent on a new path after migration
    PathRetransmission,
}

impl TransmissionType {
    #[inline]
    pub fn is_retransmission(self) -> bool {
        !matches!(self, Self::NotRetransmission)
    }
}

/// What a sent packet carried, at the granularity retransmission needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentFrame {
    Stream {
        stream_id: VarInt,
        offset: u64,
        length: u64,
        is_fin: bool,
    },
    Crypto {
        level: EncryptionLevel,
        offset: u64,
        length: u64,
    },
    /// A control frame tracked by id in the control frame manager
    Control {
        id: u64,
    },
    Ack,
    Ping,
    MtuProbe {
        size: u16,
    },
    PathChallenge {
        data: [u8; 8],
    },
}

#[derive(Clone, Debug)]
pub struct SentPacketInfo {
    pub sent_time: Timestamp,
    pub encryption_level: EncryptionLevel,
    pub transmission_type: TransmissionType,
    pub size: u16,
    pub ack_eliciting: bool,
    pub in_flight: bool,
    pub frames: SmallVec<[SentFrame; 4]>,
}

/// Per-space sent packet records
#[derive(Debug, Default)]
pub struct SentPacketMap {
    spaces: [SpaceMap; PacketNumberSpace::COUNT],
    /// Bound on the total number of outstanding packet records
    limit: Option<usize>,
}

#[derive(Debug, Default)]
struct SpaceMap {
    packets: BTreeMap<u64, SentPacketInfo>,
    largest_acked: Option<u64>,
    bytes_in_flight: u64,
}

/// Packets this far below the largest acknowledged are declared lost
const PACKET_REORDERING_THRESHOLD: u64 = 3;

impl SentPacketMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    #[inline]
    fn space(&self, space: PacketNumberSpace) -> &SpaceMap {
        &self.spaces[space.as_index()]
    }

    #[inline]
    fn space_mut(&mut self, space: PacketNumberSpace) -> &mut SpaceMap {
        &mut self.spaces[space.as_index()]
    }

    /// Records a sent packet
    pub fn on_packet_sent(
        &mut self,
        packet_number: PacketNumber,
        info: SentPacketInfo,
    ) -> Result<(), connection::Error> {
        if let Some(limit) = self.limit {
            let total: usize = self.spaces.iter().map(|space| space.packets.len()).sum();
            if total >= limit {
                return Err(connection::Error::TooManyOutstandingPackets);
            }
        }

        let space = self.space_mut(packet_number.space());
        if info.in_flight {
            space.bytes_in_flight += info.size as u64;
        }
        let replaced = space.packets.insert(packet_number.as_u64(), info);
        debug_assert!(replaced.is_none(), "packet number reused");

        Ok(())
    }

    /// Removes and returns the acked packets within `range`, largest first
    pub fn on_ack_range(
        &mut self,
        space: PacketNumberSpace,
        range: core::ops::RangeInclusive<u64>,
    ) -> Vec<(u64, SentPacketInfo)> {
        let space = self.space_mut(space);

        let acked: Vec<u64> = space
            .packets
            .range(range)
            .rev()
            .map(|(packet_number, _)| *packet_number)
            .collect();

        let mut removed = Vec::with_capacity(acked.len());
        for packet_number in acked {
            if let Some(info) = space.packets.remove(&packet_number) {
                if info.in_flight {
                    space.bytes_in_flight -= info.size as u64;
                }
                removed.push((packet_number, info));
            }
        }

        removed
    }

    /// Updates the largest acked packet and returns packets now considered
    /// lost by the packet reordering threshold, smallest first
    pub fn on_largest_acked(
        &mut self,
        space: PacketNumberSpace,
        largest_acked: u64,
    ) -> Vec<(u64, SentPacketInfo)> {
        let space = self.space_mut(space);
        space.largest_acked = Some(
            space
                .largest_acked
                .map_or(largest_acked, |prev| prev.max(largest_acked)),
        );

        let Some(cutoff) = largest_acked.checked_sub(PACKET_REORDERING_THRESHOLD) else {
            return Vec::new();
        };

        let lost: Vec<u64> = space
            .packets
            .range(..cutoff)
            .map(|(packet_number, _)| *packet_number)
            .collect();

        let mut removed = Vec::with_capacity(lost.len());
        for packet_number in lost {
            if let Some(info) = space.packets.remove(&packet_number) {
                if info.in_flight {
                    space.bytes_in_flight -= info.size as u64;
                }
                removed.push((packet_number, info));
            }
        }

        removed
    }

    /// Removes and returns the oldest ack-eliciting packet, used by the
    /// probe timeout to retransmit its frames
    pub fn detach_oldest_ack_eliciting(
        &mut self,
        space: PacketNumberSpace,
    ) -> Option<(u64, SentPacketInfo)> {
        let space = self.space_mut(space);
        let packet_number = space
            .packets
            .iter()
            .find(|(_, info)| info.ack_eliciting)
            .map(|(packet_number, _)| *packet_number)?;

        let info = space.packets.remove(&packet_number)?;
        if info.in_flight {
            space.bytes_in_flight -= info.size as u64;
        }
        Some((packet_number, info))
    }

    /// Drops every record in a space; used when its keys are discarded
    pub fn discard_space(&mut self, space: PacketNumberSpace) {
        let space = self.space_mut(space);
        space.packets.clear();
        space.bytes_in_flight = 0;
    }

    #[inline]
    pub fn largest_acked(&self, space: PacketNumberSpace) -> Option<u64> {
        self.space(space).largest_acked
    }

    #[inline]
    pub fn largest_acked_packet_number(&self, space: PacketNumberSpace) -> Option<PacketNumber> {
        self.space(space)
            .largest_acked
            .and_then(|value| VarInt::new(value).ok())
            .map(|value| space.new_packet_number(value))
    }

    #[inline]
    pub fn has_in_flight_ack_eliciting(&self) -> bool {
        self.spaces
            .iter()
            .any(|space| space.packets.values().any(|info| info.ack_eliciting))
    }

    #[inline]
    pub fn bytes_in_flight(&self) -> u64 {
        self.spaces.iter().map(|space| space.bytes_in_flight).sum()
    }

    #[inline]
    pub fn is_empty(&self, space: PacketNumberSpace) -> bool {
        self.space(space).packets.is_empty()
    }

    /// Returns true if any packet sent in `packet_numbers` is still
    /// outstanding
    pub fn has_outstanding_in(&self, space: PacketNumberSpace, packet_numbers: &IntervalSet) -> bool {
        self.space(space)
            .packets
            .keys()
            .any(|packet_number| packet_numbers.contains(*packet_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_quic_core::time::Duration;

    fn info(ack_eliciting: bool) -> SentPacketInfo {
        SentPacketInfo {
            sent_time: Timestamp::from_duration(Duration::from_millis(1)),
            encryption_level: EncryptionLevel::OneRtt,
            transmission_type: TransmissionType::NotRetransmission,
            size: 100,
            ack_eliciting,
            in_flight: true,
            frames: SmallVec::new(),
        }
    }

    fn pn(value: u32) -> PacketNumber {
        PacketNumberSpace::ApplicationData.new_packet_number(VarInt::from_u32(value))
    }

    #[test]
    fn ack_and_loss_test() {
        let mut map = SentPacketMap::new();
        for value in 1..=10u32 {
            map.on_packet_sent(pn(value), info(true)).unwrap();
        }
        assert_eq!(map.bytes_in_flight(), 1000);

        let acked = map.on_ack_range(PacketNumberSpace::ApplicationData, 8..=10);
        assert_eq!(
            acked.iter().map(|(packet_number, _)| *packet_number).collect::<Vec<_>>(),
            vec![10, 9, 8]
        );
        assert_eq!(map.bytes_in_flight(), 700);

        // packets more than the reordering threshold below 10 are lost
        let lost = map.on_largest_acked(PacketNumberSpace::ApplicationData, 10);
        assert_eq!(
            lost.iter().map(|(packet_number, _)| *packet_number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5, 6]
        );
        assert_eq!(map.bytes_in_flight(), 100);
        assert!(map.has_in_flight_ack_eliciting());
    }

    #[test]
    fn outstanding_limit_test() {
        let mut map = SentPacketMap::with_limit(2);
        map.on_packet_sent(pn(1), info(true)).unwrap();
        map.on_packet_sent(pn(2), info(true)).unwrap();
        assert_eq!(
            map.on_packet_sent(pn(3), info(true)),
            Err(connection::Error::TooManyOutstandingPackets)
        );
    }

    #[test]
    fn detach_oldest_test() {
        let mut map = SentPacketMap::new();
        map.on_packet_sent(pn(1), info(false)).unwrap();
        map.on_packet_sent(pn(2), info(true)).unwrap();
        map.on_packet_sent(pn(3), info(true)).unwrap();

        let (packet_number, _) = map
            .detach_oldest_ack_eliciting(PacketNumberSpace::ApplicationData)
            .unwrap();
        assert_eq!(packet_number, 2);
    }
}
