// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use quilt_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.19
//# An endpoint sends a CONNECTION_CLOSE frame (type=0x1c or 0x1d) to
//# notify its peer that the connection is being closed.  The
//# CONNECTION_CLOSE frame with a type of 0x1c is used to signal errors
//# at only the QUIC layer, or the absence of errors (with the NO_ERROR
//# code).  The CONNECTION_CLOSE frame with a type of 0x1d is used to
//# signal an error with the application that uses QUIC.

pub(crate) const CONNECTION_CLOSE_TRANSPORT_TAG: Tag = 0x1c;
pub(crate) const CONNECTION_CLOSE_APPLICATION_TAG: Tag = 0x1d;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.19
//# CONNECTION_CLOSE Frame {
//#   Type (i) = 0x1c..0x1d,
//#   Error Code (i),
//#   [Frame Type (i)],
//#   Reason Phrase Length (i),
//#   Reason Phrase (..),
//# }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnectionClose<'a> {
    /// The error code; a transport error code for the 0x1c shape, an
    /// application error code for the 0x1d shape
    pub error_code: VarInt,

    /// The frame type that triggered the error, present only in the
    /// transport shape. `0` means the triggering frame is unknown.
    pub frame_type: Option<VarInt>,

    /// A more specific error code some peers tunnel through the reason
    /// phrase as a `"<decimal>:"` prefix. Extracted at decode time;
    /// `None` when the prefix is missing.
    pub quic_error_code: Option<u64>,

    /// A human-readable explanation of why the connection was closed,
    /// with any numeric prefix already removed
    pub reason: Option<&'a [u8]>,
}

impl<'a> ConnectionClose<'a> {
    #[inline]
    pub fn tag(&self) -> Tag {
        if self.frame_type.is_some() {
            CONNECTION_CLOSE_TRANSPORT_TAG
        } else {
            CONNECTION_CLOSE_APPLICATION_TAG
        }
    }
}

/// Splits a `"<decimal>:"` prefix out of a reason phrase, returning the
/// tunneled code and the remaining human-readable portion
fn extract_error_code(reason: Option<&[u8]>) -> (Option<u64>, Option<&[u8]>) {
    let Some(reason) = reason else {
        return (None, None);
    };

    let Some(colon) = reason.iter().position(|byte| *byte == b':') else {
        return (None, Some(reason));
    };

    let (digits, rest) = reason.split_at(colon);
    let rest = &rest[1..];

    if digits.is_empty() || !digits.iter().all(|byte| byte.is_ascii_digit()) {
        return (None, Some(reason));
    }

    let mut code = 0u64;
    for byte in digits {
        code = match code
            .checked_mul(10)
            .and_then(|code| code.checked_add((byte - b'0') as u64))
        {
            Some(code) => code,
            None => return (None, Some(reason)),
        };
    }

    let rest = if rest.is_empty() { None } else { Some(rest) };
    (Some(code), rest)
}

decoder_parameterized_value!(
    impl<'a> ConnectionClose<'a> {
        fn decode(tag: Tag, buffer: Buffer) -> Result<Self> {
            let (error_code, buffer) = buffer.decode::<VarInt>()?;

            let (frame_type, buffer) = if tag == CONNECTION_CLOSE_TRANSPORT_TAG {
                let (frame_type, buffer) = buffer.decode()?;
                (Some(frame_type), buffer)
            } else {
                (None, buffer)
            };

            let (reason, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;
            let reason = reason.into_less_safe_slice();
            let reason = if reason.is_empty() {
                None
            } else {
                Some(&*reason)
            };
            let (quic_error_code, reason) = extract_error_code(reason);

            let frame = ConnectionClose {
                error_code,
                frame_type,
                quic_error_code,
                reason,
            };

            Ok((frame, buffer))
        }
    }
);

impl<'a> EncoderValue for ConnectionClose<'a> {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.error_code);

        if let Some(frame_type) = self.frame_type.as_ref() {
            buffer.encode(frame_type);
        }

        match self.quic_error_code {
            Some(code) => {
                // re-emit the tunneled code as the reason phrase prefix
                let mut digits = [0u8; 20];
                let mut cursor = digits.len();
                let mut value = code;
                loop {
                    cursor -= 1;
                    digits[cursor] = b'0' + (value % 10) as u8;
                    value /= 10;
                    if value == 0 {
                        break;
                    }
                }
                let digits = &digits[cursor..];

                let reason_len = self.reason.map_or(0, |reason| reason.len());
                let total = digits.len() + 1 + reason_len;
                buffer.encode(&VarInt::from_u32(total as u32));
                buffer.write_slice(digits);
                buffer.encode(&b':');
                if let Some(reason) = self.reason {
                    buffer.write_slice(reason);
                }
            }
            None => {
                if let Some(reason) = self.reason.as_ref() {
                    buffer.encode_with_len_prefix::<VarInt, _>(reason);
                } else {
                    buffer.encode(&VarInt::ZERO);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_codec::{DecoderBuffer, DecoderParameterizedValue, EncoderBuffer};

    fn round_trip(frame: ConnectionClose) {
        let mut buffer = [0u8; 128];
        let written = {
            let mut encoder = EncoderBuffer::new(&mut buffer);
            encoder.encode(&frame);
            encoder.len()
        };

        let decoder = DecoderBuffer::new(&buffer[1..written]);
        let (decoded, remaining) =
            ConnectionClose::decode_parameterized(frame.tag(), decoder).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trip_test() {
        round_trip(ConnectionClose {
            error_code: VarInt::from_u8(0x0a),
            frame_type: Some(VarInt::from_u8(0x06)),
            quic_error_code: None,
            reason: Some(b"crypto stream error"),
        });

        round_trip(ConnectionClose {
            error_code: VarInt::from_u16(0x100),
            frame_type: None,
            quic_error_code: None,
            reason: None,
        });

        round_trip(ConnectionClose {
            error_code: VarInt::ZERO,
            frame_type: Some(VarInt::ZERO),
            quic_error_code: Some(17),
            reason: Some(b"server overloaded"),
        });

        round_trip(ConnectionClose {
            error_code: VarInt::ZERO,
            frame_type: None,
            quic_error_code: Some(9000),
            reason: None,
        });
    }

    #[test]
    fn numeric_prefix_extraction_test() {
        // a "<decimal>:" prefix is split into the tunneled code and the
        // remaining phrase at decode time
        let bytes = {
            let mut bytes = alloc::vec![0x00u8];
            let reason = b"17:server overloaded";
            bytes.push(reason.len() as u8);
            bytes.extend_from_slice(reason);
            bytes
        };
        let decoder = DecoderBuffer::new(&bytes);
        let (frame, _) = ConnectionClose::decode_parameterized(
            CONNECTION_CLOSE_APPLICATION_TAG,
            decoder,
        )
        .unwrap();

        assert_eq!(frame.quic_error_code, Some(17));
        assert_eq!(frame.reason, Some(&b"server overloaded"[..]));
    }

    #[test]
    fn missing_prefix_test() {
        for reason in [&b"no numeric prefix"[..], b"x1:not digits", b":empty"] {
            let mut bytes = alloc::vec![0x00u8];
            bytes.push(reason.len() as u8);
            bytes.extend_from_slice(reason);

            let decoder = DecoderBuffer::new(&bytes);
            let (frame, _) = ConnectionClose::decode_parameterized(
                CONNECTION_CLOSE_APPLICATION_TAG,
                decoder,
            )
            .unwrap();

            // the sentinel is "missing"; the phrase is untouched
            assert_eq!(frame.quic_error_code, None);
            assert_eq!(frame.reason, Some(reason));
        }
    }
}
