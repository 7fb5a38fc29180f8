// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use bolero::check;
use quilt_codec::{DecoderBuffer, EncoderBuffer};

fn round_trip(value: VarInt) -> (usize, VarInt) {
    let mut buffer = [0u8; 8];
    let mut encoder = EncoderBuffer::new(&mut buffer);
    encoder.encode(&value);
    let len = encoder.len();

    let decoder = DecoderBuffer::new(&buffer[..len]);
    let (actual, remaining) = decoder.decode::<VarInt>().unwrap();
    assert!(remaining.is_empty());

    (len, actual)
}

#[test]
fn round_trip_test() {
    check!()
        .with_generator(0..=MAX_VARINT_VALUE)
        .cloned()
        .for_each(|value| {
            let value = VarInt::new(value).unwrap();
            let (len, actual) = round_trip(value);
            assert_eq!(value, actual);
            assert_eq!(len, value.encoding_size());
        });
}

//= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.1
//= type=test
//# For example, the eight-byte sequence 0xc2197c5eff14e88c decodes to
//# the decimal value 151,288,809,941,952,652; the four-byte sequence
//# 0x9d7f3e7d decodes to 494,878,333; the two-byte sequence 0x7bbd
//# decodes to 15,293; and the single byte 0x25 decodes to 37 (as does
//# the two-byte sequence 0x4025).
#[test]
fn rfc_example_test() {
    macro_rules! example {
        ($bytes:expr, $expected:expr) => {{
            let bytes = $bytes;
            let buffer = DecoderBuffer::new(&bytes);
            let (value, _) = buffer.decode::<VarInt>().unwrap();
            assert_eq!(value.as_u64(), $expected);
        }};
    }

    example!(
        [0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c],
        151_288_809_941_952_652
    );
    example!([0x9d, 0x7f, 0x3e, 0x7d], 494_878_333);
    example!([0x7b, 0xbd], 15_293);
    example!([0x25], 37);
    example!([0x40, 0x25], 37);
}

#[test]
fn encoding_size_boundary_test() {
    for (value, expected) in [
        (0u64, 1),
        (63, 1),
        (64, 2),
        (16_383, 2),
        (16_384, 4),
        (1_073_741_823, 4),
        (1_073_741_824, 8),
        (MAX_VARINT_VALUE, 8),
    ] {
        assert_eq!(VarInt::new(value).unwrap().encoding_size(), expected);
    }
}

#[test]
fn minimal_encoding_test() {
    // values are always emitted with the smallest usable length prefix
    check!()
        .with_generator(0..=MAX_VARINT_VALUE)
        .cloned()
        .for_each(|value| {
            let varint = VarInt::new(value).unwrap();
            let mut buffer = [0u8; 8];
            let mut encoder = EncoderBuffer::new(&mut buffer);
            encoder.encode(&varint);
            let len = encoder.len();

            let smaller = match len {
                1 => None,
                2 => Some(1 << 6),
                4 => Some(1 << 14),
                8 => Some(1 << 30),
                _ => unreachable!(),
            };

            if let Some(limit) = smaller {
                assert!(value >= limit);
            }
        });
}

#[test]
fn range_test() {
    assert!(VarInt::new(MAX_VARINT_VALUE).is_ok());
    assert!(VarInt::new(MAX_VARINT_VALUE + 1).is_err());
    assert!(VarInt::MAX.checked_add(VarInt::from_u8(1)).is_none());
    assert_eq!(VarInt::MAX.saturating_add(VarInt::MAX), VarInt::MAX);
    assert_eq!(VarInt::ZERO.saturating_sub(VarInt::MAX), VarInt::ZERO);
}

#[test]
fn encode_updated_test() {
    let mut buffer = [0u8; 8];
    let mut encoder = EncoderBuffer::new(&mut buffer);
    let placeholder = VarInt::from_u16(1 << 14);
    encoder.encode(&placeholder);

    encoder.set_position(0);
    placeholder.encode_updated(VarInt::from_u32(1234), &mut encoder);
    let len = encoder.len();

    let decoder = DecoderBuffer::new(&buffer[..len]);
    let (actual, _) = decoder.decode::<VarInt>().unwrap();
    assert_eq!(actual, VarInt::from_u32(1234));
}
