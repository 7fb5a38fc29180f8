// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{crypto::EncryptionLevel, transport, varint::VarInt};
use core::fmt;

/// The reason a connection failed or was closed.
///
/// The `kind` strings are stable contracts; callers may match on them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The connection was closed without an error
    NoError,
    /// AEAD verification failed with a present key
    DecryptionFailure,
    /// No decrypter exists at the apparent encryption level
    MissingKey(EncryptionLevel),
    /// The packet header was malformed
    InvalidPacketHeader(&'static str),
    /// A frame was malformed or not allowed at its encryption level
    InvalidFrameData(&'static str),
    /// The reconstructed packet number was not acceptable
    InvalidPacketNumber(&'static str),
    /// The control frame buffer limit was exceeded
    TooManyBufferedControlFrames,
    /// The sent packet map grew beyond its configured bound
    TooManyOutstandingPackets,
    /// The peer closed the connection
    PeerGoingAway,
    /// The TLS handshake failed
    HandshakeFailed,
    /// The packet writer returned a fatal error
    PacketWriteError(&'static str),
    /// The current path is degrading and no alternative validated
    PathDegrading,
    /// Forward progress stopped for several retransmission periods
    BlackholeDetected,
    /// No packet was received within the idle timeout
    IdleTimeout,
    /// The handshake did not complete within the handshake timeout
    HandshakeTimeout,
    /// The peer sent a stateless reset for this connection
    StatelessReset,
}

impl Error {
    /// Returns the stable name for this error kind
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoError => "no-error",
            Self::DecryptionFailure => "decryption-failure",
            Self::MissingKey(_) => "missing-key",
            Self::InvalidPacketHeader(_) => "invalid-packet-header",
            Self::InvalidFrameData(_) => "invalid-frame-data",
            Self::InvalidPacketNumber(_) => "invalid-packet-number",
            Self::TooManyBufferedControlFrames => "too-many-buffered-control-frames",
            Self::TooManyOutstandingPackets => "too-many-outstanding-packets",
            Self::PeerGoingAway => "peer-going-away",
            Self::HandshakeFailed => "handshake-failed",
            Self::PacketWriteError(_) => "packet-write-error",
            Self::PathDegrading => "path-degrading",
            Self::BlackholeDetected => "blackhole-detected",
            Self::IdleTimeout => "idle-timeout",
            Self::HandshakeTimeout => "handshake-timeout",
            Self::StatelessReset => "stateless-reset",
        }
    }

    /// Returns the detail string attached to the error, if any
    #[inline]
    pub fn detail(&self) -> Option<&'static str> {
        match self {
            Self::InvalidPacketHeader(detail)
            | Self::InvalidFrameData(detail)
            | Self::InvalidPacketNumber(detail)
            | Self::PacketWriteError(detail) => Some(detail),
            _ => None,
        }
    }

    /// Returns the transport error code carried in a locally generated
    /// CONNECTION_CLOSE for this error
    #[inline]
    pub fn close_code(&self) -> VarInt {
        use transport::Error as T;
        match self {
            Self::NoError | Self::IdleTimeout | Self::HandshakeTimeout => T::NO_ERROR,
            Self::DecryptionFailure | Self::MissingKey(_) => T::PROTOCOL_VIOLATION,
            Self::InvalidPacketHeader(_) | Self::InvalidPacketNumber(_) => T::PROTOCOL_VIOLATION,
            Self::InvalidFrameData(_) => T::FRAME_ENCODING_ERROR,
            Self::TooManyBufferedControlFrames | Self::TooManyOutstandingPackets => {
                T::INTERNAL_ERROR
            }
            Self::PeerGoingAway | Self::StatelessReset => T::NO_ERROR,
            Self::HandshakeFailed => T::CONNECTION_REFUSED,
            Self::PacketWriteError(_) => T::INTERNAL_ERROR,
            Self::PathDegrading | Self::BlackholeDetected => T::NO_VIABLE_PATH,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {detail}", self.kind()),
            None => f.write_str(self.kind()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<quilt_codec::DecoderError> for Error {
    #[inline]
    fn from(error: quilt_codec::DecoderError) -> Self {
        Self::InvalidFrameData(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_contract_test() {
        // the kind strings are contracts and must not drift
        assert_eq!(Error::DecryptionFailure.kind(), "decryption-failure");
        assert_eq!(
            Error::MissingKey(EncryptionLevel::Handshake).kind(),
            "missing-key"
        );
        assert_eq!(
            Error::TooManyBufferedControlFrames.kind(),
            "too-many-buffered-control-frames"
        );
        assert_eq!(Error::BlackholeDetected.kind(), "blackhole-detected");
    }

    #[test]
    fn display_test() {
        assert_eq!(
            Error::InvalidFrameData("reliable_offset > final_offset").to_string(),
            "invalid-frame-data: reliable_offset > final_offset"
        );
        assert_eq!(Error::IdleTimeout.to_string(), "idle-timeout");
    }
}
