// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::frame::Tag;
use quilt_codec::{decoder_parameterized_value, Encoder, EncoderValue};

// An IMMEDIATE_ACK frame asks the receiver to acknowledge this packet
// right away. Defined by the QUIC Acknowledgement Frequency extension.

pub(crate) const IMMEDIATE_ACK_TAG: Tag = 0x1f;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ImmediateAck;

impl ImmediateAck {
    #[inline]
    pub const fn tag(&self) -> Tag {
        IMMEDIATE_ACK_TAG
    }
}

decoder_parameterized_value!(
    impl<'a> ImmediateAck {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            Ok((ImmediateAck, buffer))
        }
    }
);

impl EncoderValue for ImmediateAck {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&IMMEDIATE_ACK_TAG);
    }
}
