// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    frame::{stream::StreamType, Tag},
    varint::VarInt,
};
use quilt_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.14
//# A sender SHOULD send a STREAMS_BLOCKED frame (type=0x16 or 0x17) when
//# it wishes to open a stream but is unable to do so due to the maximum
//# stream limit set by its peer.  A STREAMS_BLOCKED frame of type 0x16
//# is used to indicate reaching the bidirectional stream limit, and a
//# STREAMS_BLOCKED frame of type 0x17 is used to indicate reaching the
//# unidirectional stream limit.

pub(crate) const STREAMS_BLOCKED_BIDI_TAG: Tag = 0x16;
pub(crate) const STREAMS_BLOCKED_UNI_TAG: Tag = 0x17;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.14
//# STREAMS_BLOCKED Frame {
//#   Type (i) = 0x16..0x17,
//#   Maximum Streams (i),
//# }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamsBlocked {
    pub stream_type: StreamType,

    /// The stream limit at the time the frame was sent
    pub stream_limit: VarInt,
}

impl StreamsBlocked {
    #[inline]
    pub fn tag(&self) -> Tag {
        match self.stream_type {
            StreamType::Bidirectional => STREAMS_BLOCKED_BIDI_TAG,
            StreamType::Unidirectional => STREAMS_BLOCKED_UNI_TAG,
        }
    }
}

decoder_parameterized_value!(
    impl<'a> StreamsBlocked {
        fn decode(tag: Tag, buffer: Buffer) -> Result<Self> {
            let stream_type = if tag == STREAMS_BLOCKED_BIDI_TAG {
                StreamType::Bidirectional
            } else {
                StreamType::Unidirectional
            };

            let (stream_limit, buffer) = buffer.decode()?;

            let frame = StreamsBlocked {
                stream_type,
                stream_limit,
            };

            Ok((frame, buffer))
        }
    }
);

impl EncoderValue for StreamsBlocked {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.stream_limit);
    }
}
