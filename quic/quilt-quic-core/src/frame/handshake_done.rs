// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::frame::Tag;
use quilt_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.20
//# The server uses a HANDSHAKE_DONE frame (type=0x1e) to signal
//# confirmation of the handshake to the client.

pub(crate) const HANDSHAKE_DONE_TAG: Tag = 0x1e;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HandshakeDone;

impl HandshakeDone {
    #[inline]
    pub const fn tag(&self) -> Tag {
        HANDSHAKE_DONE_TAG
    }
}

decoder_parameterized_value!(
    impl<'a> HandshakeDone {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            Ok((HandshakeDone, buffer))
        }
    }
);

impl EncoderValue for HandshakeDone {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&HANDSHAKE_DONE_TAG);
    }
}
