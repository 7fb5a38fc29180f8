// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{connection, frame::Tag, stateless_reset, varint::VarInt};
use quilt_codec::{decoder_invariant, decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.15
//# An endpoint sends a NEW_CONNECTION_ID frame (type=0x18) to provide
//# its peer with alternative connection IDs that can be used to break
//# linkability when migrating connections.

pub(crate) const NEW_CONNECTION_ID_TAG: Tag = 0x18;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.15
//# NEW_CONNECTION_ID Frame {
//#   Type (i) = 0x18,
//#   Sequence Number (i),
//#   Retire Prior To (i),
//#   Length (8),
//#   Connection ID (8..160),
//#   Stateless Reset Token (128),
//# }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NewConnectionId {
    /// The sequence number assigned to the connection ID by the sender
    pub sequence_number: VarInt,

    /// The sequence number below which connection IDs should be retired
    pub retire_prior_to: VarInt,

    /// The new connection ID
    pub connection_id: connection::ConnectionId,

    /// A token to use in a stateless reset when the associated connection
    /// ID is in use
    pub stateless_reset_token: stateless_reset::Token,
}

impl NewConnectionId {
    #[inline]
    pub const fn tag(&self) -> Tag {
        NEW_CONNECTION_ID_TAG
    }
}

decoder_parameterized_value!(
    impl<'a> NewConnectionId {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            let (sequence_number, buffer) = buffer.decode::<VarInt>()?;
            let (retire_prior_to, buffer) = buffer.decode::<VarInt>()?;

            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.15
            //# The value in the Retire Prior To field MUST be less than or equal
            //# to the value in the Sequence Number field.
            decoder_invariant!(
                retire_prior_to <= sequence_number,
                "retire_prior_to > sequence_number"
            );

            let (id_bytes, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;

            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.15
            //# Length:  An 8-bit unsigned integer containing the length of the
            //#    connection ID.  Values less than 1 and greater than 20 are
            //#    invalid and MUST be treated as a connection error of type
            //#    FRAME_ENCODING_ERROR.
            decoder_invariant!(!id_bytes.is_empty(), "invalid connection id length");
            let connection_id =
                connection::ConnectionId::try_from_slice(id_bytes.as_less_safe_slice())
                    .map_err(|_| {
                        quilt_codec::DecoderError::InvariantViolation(
                            "invalid connection id length",
                        )
                    })?;

            let (stateless_reset_token, buffer) = buffer.decode::<stateless_reset::Token>()?;

            let frame = NewConnectionId {
                sequence_number,
                retire_prior_to,
                connection_id,
                stateless_reset_token,
            };

            Ok((frame, buffer))
        }
    }
);

impl EncoderValue for NewConnectionId {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.sequence_number);
        buffer.encode(&self.retire_prior_to);
        buffer.encode(&(self.connection_id.len() as u8));
        buffer.encode(&self.connection_id);
        buffer.encode(&self.stateless_reset_token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_codec::{DecoderBuffer, DecoderParameterizedValue, EncoderBuffer};

    #[test]
    fn round_trip_test() {
        let frame = NewConnectionId {
            sequence_number: VarInt::from_u8(7),
            retire_prior_to: VarInt::from_u8(3),
            connection_id: connection::ConnectionId::try_from_slice(&[1, 2, 3, 4]).unwrap(),
            stateless_reset_token: stateless_reset::Token::from([0x5a; 16]),
        };

        let mut buffer = [0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        encoder.encode(&frame);
        let written = encoder.len();

        let decoder = DecoderBuffer::new(&buffer[1..written]);
        let (decoded, remaining) =
            NewConnectionId::decode_parameterized(NEW_CONNECTION_ID_TAG, decoder).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn retire_prior_to_validation_test() {
        let frame = NewConnectionId {
            sequence_number: VarInt::from_u8(3),
            retire_prior_to: VarInt::from_u8(3),
            connection_id: connection::ConnectionId::try_from_slice(&[1]).unwrap(),
            stateless_reset_token: stateless_reset::Token::from([0; 16]),
        };

        let mut buffer = [0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        encoder.encode(&frame);
        let written = encoder.len();

        // bump retire_prior_to above the sequence number on the wire
        buffer[2] = 4;

        let decoder = DecoderBuffer::new(&buffer[1..written]);
        let error = NewConnectionId::decode_parameterized(NEW_CONNECTION_ID_TAG, decoder)
            .unwrap_err();
        assert_eq!(
            <&'static str>::from(error),
            "retire_prior_to > sequence_number"
        );
    }
}
