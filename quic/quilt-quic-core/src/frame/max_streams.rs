// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    frame::{stream::StreamType, Tag},
    varint::VarInt,
};
use quilt_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.11
//# A MAX_STREAMS frame (type=0x12 or 0x13) informs the peer of the
//# cumulative number of streams of a given type it is permitted to open.
//# A MAX_STREAMS frame with a type of 0x12 applies to bidirectional
//# streams, and a MAX_STREAMS frame with a type of 0x13 applies to
//# unidirectional streams.

pub(crate) const MAX_STREAMS_BIDI_TAG: Tag = 0x12;
pub(crate) const MAX_STREAMS_UNI_TAG: Tag = 0x13;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.11
//# MAX_STREAMS Frame {
//#   Type (i) = 0x12..0x13,
//#   Maximum Streams (i),
//# }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaxStreams {
    pub stream_type: StreamType,

    /// The cumulative number of streams of the given type that can be
    /// opened over the lifetime of the connection
    pub maximum_streams: VarInt,
}

impl MaxStreams {
    #[inline]
    pub fn tag(&self) -> Tag {
        match self.stream_type {
            StreamType::Bidirectional => MAX_STREAMS_BIDI_TAG,
            StreamType::Unidirectional => MAX_STREAMS_UNI_TAG,
        }
    }
}

decoder_parameterized_value!(
    impl<'a> MaxStreams {
        fn decode(tag: Tag, buffer: Buffer) -> Result<Self> {
            let stream_type = if tag == MAX_STREAMS_BIDI_TAG {
                StreamType::Bidirectional
            } else {
                StreamType::Unidirectional
            };

            let (maximum_streams, buffer) = buffer.decode()?;

            let frame = MaxStreams {
                stream_type,
                maximum_streams,
            };

            Ok((frame, buffer))
        }
    }
);

impl EncoderValue for MaxStreams {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.maximum_streams);
    }
}
