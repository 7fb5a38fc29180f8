// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use quilt_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.6
//# A CRYPTO frame (type=0x06) is used to transmit cryptographic
//# handshake messages.  It can be sent in all packet types except 0-RTT.

pub(crate) const CRYPTO_TAG: Tag = 0x06;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.6
//# CRYPTO Frame {
//#   Type (i) = 0x06,
//#   Offset (i),
//#   Length (i),
//#   Crypto Data (..),
//# }

#[derive(Debug, PartialEq, Eq)]
pub struct Crypto<Data> {
    /// The byte offset in the cryptographic handshake stream.
    ///
    /// Offsets at different encryption levels are independent.
    pub offset: VarInt,

    /// The cryptographic message data
    pub data: Data,
}

pub type CryptoRef<'a> = Crypto<&'a [u8]>;

impl<Data> Crypto<Data> {
    #[inline]
    pub const fn tag(&self) -> Tag {
        CRYPTO_TAG
    }

    /// Converts the crypto data from one type to another
    #[inline]
    pub fn map_data<F: FnOnce(Data) -> Out, Out>(self, map: F) -> Crypto<Out> {
        Crypto {
            offset: self.offset,
            data: map(self.data),
        }
    }
}

decoder_parameterized_value!(
    impl<'a, Data> Crypto<Data> {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            let (offset, buffer) = buffer.decode()?;
            let (data, buffer) = buffer.decode_with_len_prefix::<VarInt, Data>()?;

            let frame = Crypto { offset, data };

            Ok((frame, buffer))
        }
    }
);

impl<Data: EncoderValue> EncoderValue for Crypto<Data> {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.offset);
        buffer.encode_with_len_prefix::<VarInt, _>(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_codec::{DecoderBuffer, DecoderParameterizedValue, EncoderBuffer};

    #[test]
    fn round_trip_test() {
        let frame = Crypto {
            offset: VarInt::from_u16(1000),
            data: &b"client hello"[..],
        };

        let mut buffer = [0u8; 32];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        encoder.encode(&frame);
        let written = encoder.len();

        let decoder = DecoderBuffer::new(&buffer[1..written]);
        let (decoded, remaining) = CryptoRef::decode_parameterized(CRYPTO_TAG, decoder).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(decoded, frame);
    }
}
