// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::frame::Tag;
use quilt_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.2
//# Endpoints can use PING frames (type=0x01) to verify that their peers
//# are still alive or to check reachability to the peer.

pub(crate) const PING_TAG: Tag = 0x01;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Ping;

impl Ping {
    #[inline]
    pub const fn tag(&self) -> Tag {
        PING_TAG
    }
}

decoder_parameterized_value!(
    impl<'a> Ping {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            Ok((Ping, buffer))
        }
    }
);

impl EncoderValue for Ping {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&PING_TAG);
    }
}
