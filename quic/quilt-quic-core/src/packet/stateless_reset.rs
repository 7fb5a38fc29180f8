// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{random, stateless_reset::Token};
use quilt_codec::Encoder;

//= https://www.rfc-editor.org/rfc/rfc9000#section-10.3
//# Stateless Reset {
//#   Fixed Bits (2) = 01,
//#   Unpredictable Bits (38..),
//#   Stateless Reset Token (128),
//# }

/// One header byte plus at least four unpredictable bytes before the token
pub const MIN_LEN: usize = 21;

/// Writes a stateless reset packet of exactly `len` bytes ending in
/// `token`.
///
/// The leading bits are forced to `0b01` so the packet cannot be confused
/// with a long header; everything before the token is unpredictable.
pub fn encode<E: Encoder, G: random::Generator>(
    encoder: &mut E,
    random: &mut G,
    token: Token,
    len: usize,
) {
    debug_assert!(len >= MIN_LEN);
    let pad_len = len.saturating_sub(crate::stateless_reset::token::LEN).max(5);

    encoder.write_sized(pad_len, |bytes| {
        random.fill_public(bytes);
        //= https://www.rfc-editor.org/rfc/rfc9000#section-10.3
        //# An endpoint MUST set the first two bits of a Stateless Reset to 0b01
        //# so that the packet is not mistaken for a long header packet.
        bytes[0] = (bytes[0] & 0b0011_1111) | 0b0100_0000;
    });

    encoder.encode(&token);
}
