// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    packet::number::{
        derive_truncation_range, PacketNumberSpace, TruncatedPacketNumber,
    },
    varint::VarInt,
};
use core::{cmp::Ordering, fmt};

/// A full 62-bit packet number in a specific packet number space.
///
/// Packet numbers only order within their own space; comparing across
/// spaces is a programming error.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct PacketNumber {
    space: PacketNumberSpace,
    value: VarInt,
}

impl PacketNumber {
    #[inline]
    pub(crate) fn from_varint(value: VarInt, space: PacketNumberSpace) -> Self {
        Self { space, value }
    }

    #[inline]
    pub(crate) fn from_u64(value: u64, space: PacketNumberSpace) -> Self {
        debug_assert!(value <= VarInt::MAX.as_u64());
        let value = VarInt::new(value).unwrap_or(VarInt::MAX);
        Self { space, value }
    }

    #[inline]
    pub fn space(self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.value.as_u64()
    }

    #[inline]
    pub fn as_varint(self) -> VarInt {
        self.value
    }

    /// Returns the next packet number in the space, if one exists
    #[inline]
    pub fn next(self) -> Option<Self> {
        let value = self.value.checked_add(VarInt::from_u8(1))?;
        Some(Self::from_varint(value, self.space))
    }

    /// Returns the previous packet number in the space, if one exists
    #[inline]
    pub fn prev(self) -> Option<Self> {
        let value = self.value.checked_sub(VarInt::from_u8(1))?;
        Some(Self::from_varint(value, self.space))
    }

    /// Truncates the packet number for the wire given the largest packet
    /// number the peer has acknowledged.
    ///
    /// Returns `None` if the distance cannot be represented.
    #[inline]
    pub fn truncate(
        self,
        largest_acknowledged_packet_number: PacketNumber,
    ) -> Option<TruncatedPacketNumber> {
        let len = derive_truncation_range(largest_acknowledged_packet_number, self)?;
        let value = self.as_u64() & len.max_value();
        Some(TruncatedPacketNumber::new(value, len, self.space))
    }
}

impl fmt::Debug for PacketNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PacketNumber({:?}, {})", self.space, self.value)
    }
}

impl fmt::Display for PacketNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl PartialOrd for PacketNumber {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PacketNumber {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.space.assert_eq(other.space);
        self.value.cmp(&other.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new(value: u32) -> PacketNumber {
        PacketNumberSpace::ApplicationData.new_packet_number(VarInt::from_u32(value))
    }

    #[test]
    fn ordering_test() {
        assert!(new(1) < new(2));
        assert_eq!(new(3), new(3));
        assert_eq!(new(3).next().unwrap(), new(4));
        assert_eq!(new(3).prev().unwrap(), new(2));
        assert!(PacketNumberSpace::Initial
            .new_packet_number(VarInt::ZERO)
            .prev()
            .is_none());
    }

    #[test]
    fn truncate_test() {
        let largest = new(0x6afa);
        let packet_number = new(0x6b2d);

        let truncated = packet_number.truncate(largest).unwrap();
        assert_eq!(truncated.bitsize(), 8);
        assert_eq!(truncated.into_u64(), 0x2d);
    }
}
