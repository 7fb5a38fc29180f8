// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.13
//# A sender SHOULD send a STREAM_DATA_BLOCKED frame (type=0x15) when it
//# wishes to send data but is unable to do so due to stream-level flow
//# control.

pub(crate) const STREAM_DATA_BLOCKED_TAG: Tag = 0x15;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.13
//# STREAM_DATA_BLOCKED Frame {
//#   Type (i) = 0x15,
//#   Stream ID (i),
//#   Maximum Stream Data (i),
//# }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamDataBlocked {
    /// The stream that is blocked by stream-level flow control
    pub stream_id: VarInt,

    /// The offset of the stream at which blocking occurred
    pub stream_data_limit: VarInt,
}

impl StreamDataBlocked {
    #[inline]
    pub const fn tag(&self) -> Tag {
        STREAM_DATA_BLOCKED_TAG
    }
}

simple_frame_codec!(
    StreamDataBlocked {
        stream_id,
        stream_data_limit
    },
    STREAM_DATA_BLOCKED_TAG
);
