// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use quilt_codec::{decoder_invariant, decoder_parameterized_value, Encoder, EncoderValue};

// RESET_STREAM_AT resets a stream while still promising delivery of the
// bytes below a reliable offset. Defined by the reliable stream reset
// extension draft.

pub(crate) const RESET_STREAM_AT_TAG: Tag = 0x24;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResetStreamAt {
    /// The stream being terminated
    pub stream_id: VarInt,

    /// The application protocol error code
    pub application_error_code: VarInt,

    /// The final size of the stream in bytes
    pub final_size: VarInt,

    /// Bytes below this offset are still delivered before the reset takes
    /// effect; always at most `final_size`
    pub reliable_size: VarInt,
}

impl ResetStreamAt {
    #[inline]
    pub const fn tag(&self) -> Tag {
        RESET_STREAM_AT_TAG
    }
}

decoder_parameterized_value!(
    impl<'a> ResetStreamAt {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            let (stream_id, buffer) = buffer.decode::<VarInt>()?;
            let (application_error_code, buffer) = buffer.decode::<VarInt>()?;
            let (final_size, buffer) = buffer.decode::<VarInt>()?;
            let (reliable_size, buffer) = buffer.decode::<VarInt>()?;

            decoder_invariant!(
                reliable_size <= final_size,
                "reliable_offset > final_offset"
            );

            let frame = ResetStreamAt {
                stream_id,
                application_error_code,
                final_size,
                reliable_size,
            };

            Ok((frame, buffer))
        }
    }
);

impl EncoderValue for ResetStreamAt {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.stream_id);
        buffer.encode(&self.application_error_code);
        buffer.encode(&self.final_size);
        buffer.encode(&self.reliable_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_codec::{DecoderBuffer, DecoderParameterizedValue};

    #[test]
    fn reliable_offset_validation_test() {
        // stream_id=3, error=0, final_offset=10, reliable_offset=20
        let bytes = [0x03u8, 0x00, 0x0a, 0x14];
        let decoder = DecoderBuffer::new(&bytes);
        let error = ResetStreamAt::decode_parameterized(RESET_STREAM_AT_TAG, decoder).unwrap_err();
        assert_eq!(<&'static str>::from(error), "reliable_offset > final_offset");
    }

    #[test]
    fn accepts_equal_offsets_test() {
        let bytes = [0x03u8, 0x00, 0x0a, 0x0a];
        let decoder = DecoderBuffer::new(&bytes);
        let (frame, remaining) =
            ResetStreamAt::decode_parameterized(RESET_STREAM_AT_TAG, decoder).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(frame.final_size, frame.reliable_size);
    }
}
