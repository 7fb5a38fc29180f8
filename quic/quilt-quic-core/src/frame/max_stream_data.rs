// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.10
//# A MAX_STREAM_DATA frame (type=0x11) is used in flow control to inform
//# a peer of the maximum amount of data that can be sent on a stream.

pub(crate) const MAX_STREAM_DATA_TAG: Tag = 0x11;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.10
//# MAX_STREAM_DATA Frame {
//#   Type (i) = 0x11,
//#   Stream ID (i),
//#   Maximum Stream Data (i),
//# }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaxStreamData {
    /// The stream whose flow control window is updated
    pub stream_id: VarInt,

    /// The maximum amount of data that can be sent on the stream, in bytes
    pub maximum_stream_data: VarInt,
}

impl MaxStreamData {
    #[inline]
    pub const fn tag(&self) -> Tag {
        MAX_STREAM_DATA_TAG
    }
}

simple_frame_codec!(
    MaxStreamData {
        stream_id,
        maximum_stream_data
    },
    MAX_STREAM_DATA_TAG
);
