// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::frame::Tag;
use quilt_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.17
//# Endpoints can use PATH_CHALLENGE frames (type=0x1a) to check
//# reachability to the peer and for path validation during connection
//# migration.

pub(crate) const PATH_CHALLENGE_TAG: Tag = 0x1a;

pub const DATA_LEN: usize = 8;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.17
//# PATH_CHALLENGE Frame {
//#   Type (i) = 0x1a,
//#   Data (64),
//# }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PathChallenge {
    /// Arbitrary data the peer must echo in a PATH_RESPONSE
    pub data: [u8; DATA_LEN],
}

impl PathChallenge {
    #[inline]
    pub const fn tag(&self) -> Tag {
        PATH_CHALLENGE_TAG
    }
}

decoder_parameterized_value!(
    impl<'a> PathChallenge {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            let (slice, buffer) = buffer.decode_slice(DATA_LEN)?;
            let mut data = [0; DATA_LEN];
            data.copy_from_slice(slice.as_less_safe_slice());
            Ok((PathChallenge { data }, buffer))
        }
    }
);

impl EncoderValue for PathChallenge {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.write_slice(&self.data);
    }
}
