// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;

mod packet_number;
mod packet_number_len;
mod packet_number_space;
mod truncated_packet_number;

pub use packet_number::PacketNumber;
pub use packet_number_len::PacketNumberLen;
pub use packet_number_space::PacketNumberSpace;
pub use truncated_packet_number::TruncatedPacketNumber;

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
//# The packet number is an integer in the range 0 to 2^62-1.  This
//# number is used in determining the cryptographic nonce for packet
//# protection.  Each endpoint maintains a separate packet number for
//# sending and receiving.

/// The packet number len is the two least significant bits of the packet tag
pub(crate) const PACKET_NUMBER_LEN_MASK: u8 = 0b11;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
//# The sender MUST use a packet number size able to represent more than
//# twice as large a range as the difference between the largest
//# acknowledged packet and the packet number being sent.

pub(crate) fn derive_truncation_range(
    largest_acknowledged_packet_number: PacketNumber,
    packet_number: PacketNumber,
) -> Option<PacketNumberLen> {
    let space = packet_number.space();
    space.assert_eq(largest_acknowledged_packet_number.space());
    packet_number
        .as_u64()
        .checked_sub(largest_acknowledged_packet_number.as_u64())
        .and_then(|value| value.checked_mul(2))
        .and_then(PacketNumberLen::for_value)
}

//= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.3
//# DecodePacketNumber(largest_pn, truncated_pn, pn_nbits):
//#    expected_pn  = largest_pn + 1
//#    pn_win       = 1 << pn_nbits
//#    pn_hwin      = pn_win / 2
//#    pn_mask      = pn_win - 1
//#    // The incoming packet number should be greater than
//#    // expected_pn - pn_hwin and less than or equal to
//#    // expected_pn + pn_hwin
//#    //
//#    // This means we cannot just strip the trailing bits from
//#    // expected_pn and add the truncated_pn because that might
//#    // yield a value outside the window.
//#    //
//#    // The following code calculates a candidate value and
//#    // makes sure it's within the packet number window.
//#    // Note the extra checks to prevent overflow and underflow.
//#    candidate_pn = (expected_pn & ~pn_mask) | truncated_pn
//#    if candidate_pn <= expected_pn - pn_hwin and
//#       candidate_pn < (1 << 62) - pn_win:
//#       return candidate_pn + pn_win
//#    if candidate_pn > expected_pn + pn_hwin and
//#       candidate_pn >= pn_win:
//#       return candidate_pn - pn_win
//#    return candidate_pn

pub(crate) fn decode_packet_number(
    largest_pn: PacketNumber,
    truncated_pn: TruncatedPacketNumber,
) -> PacketNumber {
    let space = largest_pn.space();
    space.assert_eq(truncated_pn.space());

    let pn_nbits = truncated_pn.bitsize();
    // work in u64 so the intermediate values have enough room
    let expected_pn = largest_pn.as_u64() + 1;
    let pn_win = 1u64 << pn_nbits;
    let pn_hwin = pn_win / 2;
    let pn_mask = pn_win - 1;
    let candidate_pn = (expected_pn & !pn_mask) | truncated_pn.into_u64();

    let max = VarInt::MAX.as_u64();

    if expected_pn
        .checked_sub(pn_hwin)
        .map_or(false, |lo| candidate_pn <= lo)
        && candidate_pn + pn_win <= max
    {
        return PacketNumber::from_u64(candidate_pn + pn_win, space);
    }

    if candidate_pn > expected_pn + pn_hwin && candidate_pn >= pn_win {
        return PacketNumber::from_u64(candidate_pn - pn_win, space);
    }

    PacketNumber::from_u64(candidate_pn.min(max), space)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;

    fn new(value: u64) -> PacketNumber {
        PacketNumberSpace::Initial.new_packet_number(VarInt::new(value).unwrap())
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
    //= type=test
    //# For example, if the highest successfully
    //# authenticated packet had a packet number of 0xa82f30ea, then a packet
    //# containing a 16-bit value of 0x9b32 has a packet number of
    //# 0xa82f9b32.
    #[test]
    fn rfc_example_test() {
        let largest = new(0xa82f_30ea);
        let truncated = TruncatedPacketNumber::new(
            0x9b32,
            PacketNumberLen::new(2).unwrap(),
            PacketNumberSpace::Initial,
        );
        assert_eq!(truncated.expand(largest), new(0xa82f_9b32));
    }

    #[test]
    fn window_edge_test() {
        // base = 0x3ffd: a one byte 0x02 wraps forward, a one byte 0xff
        // stays behind the expected packet number
        let largest = new(0x3ffd);
        let len = PacketNumberLen::new(1).unwrap();

        let truncated = TruncatedPacketNumber::new(0x02, len, PacketNumberSpace::Initial);
        assert_eq!(truncated.expand(largest), new(0x4002));

        let truncated = TruncatedPacketNumber::new(0xff, len, PacketNumberSpace::Initial);
        assert_eq!(truncated.expand(largest), new(0x3fff));
    }

    #[test]
    fn truncate_expand_test() {
        check!()
            .with_generator((
                0..=VarInt::MAX.as_u64(),
                0..=VarInt::MAX.as_u64(),
            ))
            .cloned()
            .for_each(|(largest, expected)| {
                let largest = new(largest);
                let expected = new(expected);
                if let Some(truncated) = expected.truncate(largest) {
                    assert_eq!(expected, truncated.expand(largest));
                }
            });
    }

    #[test]
    fn recovery_window_test() {
        // away from the numeric bounds, any delta within the truncation
        // window recovers a value within ±half a window of base + 1
        check!()
            .with_generator(((1u64 << 32)..(1u64 << 61), 0u64..=u32::MAX as u64, 1u8..=4))
            .cloned()
            .for_each(|(base, delta, len)| {
                let len = PacketNumberLen::new(len).unwrap();
                let delta = delta & len.max_value();
                let base_pn = new(base);
                let truncated =
                    TruncatedPacketNumber::new(delta, len, PacketNumberSpace::Initial);
                let recovered = truncated.expand(base_pn).as_u64();

                let expected = base + 1;
                let hwin = (1u64 << len.bitsize()) / 2;
                let distance = recovered.abs_diff(expected);

                assert!(distance <= hwin, "distance {distance} exceeds {hwin}");
            });
    }
}
