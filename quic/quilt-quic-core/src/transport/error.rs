// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;
use core::fmt;
use quilt_codec::DecoderError;

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# QUIC transport error codes and application error codes are 62-bit
//# unsigned integers.

/// A transport-level error, carried on the wire in CONNECTION_CLOSE frames
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Error {
    pub code: VarInt,
    pub frame_type: Option<VarInt>,
    pub reason: &'static str,
}

impl Error {
    /// Creates a new `Error` with the specified code
    pub const fn new(code: VarInt) -> Self {
        Self {
            code,
            frame_type: None,
            reason: "",
        }
    }

    /// Updates the `Error` with the frame type that triggered it
    #[must_use]
    pub const fn with_frame_type(mut self, frame_type: VarInt) -> Self {
        self.frame_type = Some(frame_type);
        self
    }

    /// Updates the `Error` with the specified reason
    #[must_use]
    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.reason.is_empty() {
            let code: u64 = self.code.into();
            write!(f, "TransportError({code})")
        } else {
            f.write_str(self.reason)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<DecoderError> for Error {
    fn from(error: DecoderError) -> Self {
        match error {
            DecoderError::InvariantViolation(reason) => {
                Self::new(Self::FRAME_ENCODING_ERROR).with_reason(reason)
            }
            _ => Self::new(Self::FRAME_ENCODING_ERROR).with_reason("malformed frame"),
        }
    }
}

/// Internal convenience macro for defining standard error codes
macro_rules! def_error {
    ($doc:expr, $name:ident, $code:expr) => {
        impl Error {
            #[doc = $doc]
            pub const $name: VarInt = VarInt::from_u8($code);
        }
    };
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# NO_ERROR (0x00):  An endpoint uses this with CONNECTION_CLOSE to
//#    signal that the connection is being closed abruptly in the absence
//#    of any error.

def_error!(
    "An endpoint uses this with CONNECTION_CLOSE to signal that the connection is being closed abruptly in the absence of any error.",
    NO_ERROR,
    0x00
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# INTERNAL_ERROR (0x01):  The endpoint encountered an internal error
//#    and cannot continue with the connection.

def_error!(
    "The endpoint encountered an internal error and cannot continue with the connection.",
    INTERNAL_ERROR,
    0x01
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# CONNECTION_REFUSED (0x02):  The server refused to accept a new
//#    connection.

def_error!(
    "The server refused to accept a new connection.",
    CONNECTION_REFUSED,
    0x02
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# FLOW_CONTROL_ERROR (0x03):  An endpoint received more data than it
//#    permitted in its advertised data limits; see Section 4.

def_error!(
    "An endpoint received more data than it permitted in its advertised data limits.",
    FLOW_CONTROL_ERROR,
    0x03
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# STREAM_LIMIT_ERROR (0x04):  An endpoint received a frame for a stream
//#    identifier that exceeded its advertised stream limit for the
//#    corresponding stream type.

def_error!(
    "An endpoint received a frame for a stream identifier that exceeded its advertised stream limit.",
    STREAM_LIMIT_ERROR,
    0x04
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# STREAM_STATE_ERROR (0x05):  An endpoint received a frame for a stream
//#    that was not in a state that permitted that frame.

def_error!(
    "An endpoint received a frame for a stream that was not in a state that permitted that frame.",
    STREAM_STATE_ERROR,
    0x05
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# FINAL_SIZE_ERROR (0x06):  (1) An endpoint received a STREAM frame
//#    containing data that exceeded the previously established final
//#    size, (2) an endpoint received a STREAM frame or a RESET_STREAM
//#    frame containing a final size that was lower than the size of
//#    stream data that was already received, or (3) an endpoint received
//#    a STREAM frame or a RESET_STREAM frame containing a different
//#    final size to the one already established.

def_error!(
    "An endpoint received a STREAM frame containing data that exceeded the previously established final size.",
    FINAL_SIZE_ERROR,
    0x06
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# FRAME_ENCODING_ERROR (0x07):  An endpoint received a frame that was
//#    badly formatted -- for instance, a frame of an unknown type or an
//#    ACK frame that has more acknowledgment ranges than the remainder
//#    of the packet could carry.

def_error!(
    "An endpoint received a frame that was badly formatted.",
    FRAME_ENCODING_ERROR,
    0x07
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# TRANSPORT_PARAMETER_ERROR (0x08):  An endpoint received transport
//#    parameters that were badly formatted, included an invalid value,
//#    omitted a mandatory transport parameter, included a forbidden
//#    transport parameter, or were otherwise in error.

def_error!(
    "An endpoint received transport parameters that were badly formatted.",
    TRANSPORT_PARAMETER_ERROR,
    0x08
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# CONNECTION_ID_LIMIT_ERROR (0x09):  The number of connection IDs
//#    provided by the peer exceeds the advertised
//#    active_connection_id_limit.

def_error!(
    "The number of connection IDs provided by the peer exceeds the advertised active_connection_id_limit.",
    CONNECTION_ID_LIMIT_ERROR,
    0x09
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# PROTOCOL_VIOLATION (0x0a):  An endpoint detected an error with
//#    protocol compliance that was not covered by more specific error
//#    codes.

def_error!(
    "An endpoint detected an error with protocol compliance that was not covered by more specific error codes.",
    PROTOCOL_VIOLATION,
    0x0a
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# INVALID_TOKEN (0x0b):  A server received a client Initial that
//#    contained an invalid Token field.

def_error!(
    "A server received a client Initial that contained an invalid Token field.",
    INVALID_TOKEN,
    0x0b
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# APPLICATION_ERROR (0x0c):  The application or application protocol
//#    caused the connection to be closed.

def_error!(
    "The application or application protocol caused the connection to be closed.",
    APPLICATION_ERROR,
    0x0c
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# CRYPTO_BUFFER_EXCEEDED (0x0d):  An endpoint has received more data in
//#    CRYPTO frames than it can buffer.

def_error!(
    "An endpoint has received more data in CRYPTO frames than it can buffer.",
    CRYPTO_BUFFER_EXCEEDED,
    0x0d
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# KEY_UPDATE_ERROR (0x0e):  An endpoint detected errors in performing
//#    key updates; see Section 6 of [QUIC-TLS].

def_error!(
    "An endpoint detected errors in performing key updates.",
    KEY_UPDATE_ERROR,
    0x0e
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# AEAD_LIMIT_REACHED (0x0f):  An endpoint has reached the
//#    confidentiality or integrity limit for the AEAD algorithm used by
//#    the connection.

def_error!(
    "An endpoint has reached the confidentiality or integrity limit for the AEAD algorithm.",
    AEAD_LIMIT_REACHED,
    0x0f
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# NO_VIABLE_PATH (0x10):  An endpoint has determined that the network
//#    path is incapable of supporting QUIC.  An endpoint is unlikely to
//#    receive a CONNECTION_CLOSE frame carrying this code except when
//#    the path does not support a large enough MTU.

def_error!(
    "An endpoint has determined that the network path is incapable of supporting QUIC.",
    NO_VIABLE_PATH,
    0x10
);
