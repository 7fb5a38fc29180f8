// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use quilt_codec::{decoder_invariant, decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.7
//# A server sends a NEW_TOKEN frame (type=0x07) to provide the client
//# with a token to send in the header of an Initial packet for a future
//# connection.

pub(crate) const NEW_TOKEN_TAG: Tag = 0x07;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.7
//# NEW_TOKEN Frame {
//#   Type (i) = 0x07,
//#   Token Length (i),
//#   Token (..),
//# }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NewToken<'a> {
    /// An opaque blob the client may use for a future Initial packet
    pub token: &'a [u8],
}

impl<'a> NewToken<'a> {
    #[inline]
    pub const fn tag(&self) -> Tag {
        NEW_TOKEN_TAG
    }
}

decoder_parameterized_value!(
    impl<'a> NewToken<'a> {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            let (token, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;

            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.7
            //# A client MUST treat receipt of a NEW_TOKEN frame with an empty
            //# Token field as a connection error of type FRAME_ENCODING_ERROR.
            decoder_invariant!(!token.is_empty(), "empty new token");

            let token = token.into_less_safe_slice();

            Ok((NewToken { token: &*token }, buffer))
        }
    }
);

impl<'a> EncoderValue for NewToken<'a> {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode_with_len_prefix::<VarInt, _>(&self.token);
    }
}
