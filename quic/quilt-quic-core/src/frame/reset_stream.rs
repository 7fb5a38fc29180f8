// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.4
//# An endpoint uses a RESET_STREAM frame (type=0x04) to abruptly
//# terminate the sending part of a stream.

pub(crate) const RESET_STREAM_TAG: Tag = 0x04;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.4
//# RESET_STREAM Frame {
//#   Type (i) = 0x04,
//#   Stream ID (i),
//#   Application Protocol Error Code (i),
//#   Final Size (i),
//# }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResetStream {
    /// The stream being terminated
    pub stream_id: VarInt,

    /// The application protocol error code
    pub application_error_code: VarInt,

    /// The final size of the stream in bytes
    pub final_size: VarInt,
}

impl ResetStream {
    #[inline]
    pub const fn tag(&self) -> Tag {
        RESET_STREAM_TAG
    }
}

simple_frame_codec!(
    ResetStream {
        stream_id,
        application_error_code,
        final_size
    },
    RESET_STREAM_TAG
);
