// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{crypto::EncryptionLevel, varint::VarInt};
use core::{fmt, mem::size_of};
use quilt_codec::{
    decoder_invariant, DecoderBuffer, DecoderBufferResult, DecoderError, Encoder, EncoderValue,
};

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
//# Packets contain one or more frames.  This section describes the
//# format and semantics of the core QUIC frame types.

pub type Tag = u8;

/// Returned when a frame cannot be reduced to fit a packet's remaining
/// capacity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FitError;

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "could not fit the frame in the provided capacity")
    }
}

// This implements a codec for a frame that contains simple values that
// don't vary based on the tag
macro_rules! simple_frame_codec {
    ($name:ident {
        $(
            $field:ident
        ),*
    }, $tag:expr) => {
        quilt_codec::decoder_parameterized_value!(
            impl<'a> $name {
                fn decode(_tag: crate::frame::Tag, buffer: Buffer) -> Result<Self> {
                    $(
                        let ($field, buffer) = buffer.decode()?;
                    )*

                    let frame = $name { $($field),* };

                    Ok((frame, buffer))
                }
            }
        );

        impl quilt_codec::EncoderValue for $name {
            #[inline]
            fn encode<E: quilt_codec::Encoder>(&self, buffer: &mut E) {
                buffer.encode(&$tag);
                $(
                    buffer.encode(&self.$field);
                )*
            }
        }
    };
}

pub mod ack;
pub mod ack_elicitation;
pub mod ack_frequency;
pub mod connection_close;
pub mod crypto;
pub mod data_blocked;
pub mod datagram;
pub mod handshake_done;
pub mod immediate_ack;
pub mod max_data;
pub mod max_stream_data;
pub mod max_streams;
pub mod new_connection_id;
pub mod new_token;
pub mod padding;
pub mod path_challenge;
pub mod path_response;
pub mod ping;
pub mod reset_stream;
pub mod reset_stream_at;
pub mod retire_connection_id;
pub mod stop_sending;
pub mod stream;
pub mod stream_data_blocked;
pub mod streams_blocked;

#[cfg(test)]
mod tests;

pub use ack::{Ack, AckRanges, AckRangesDecoder, EcnCounts, ReceiveTimestamps, TimestampRange};
pub use ack_elicitation::AckElicitation;
pub use ack_frequency::AckFrequency;
pub use connection_close::ConnectionClose;
pub use crypto::{Crypto, CryptoRef};
pub use data_blocked::DataBlocked;
pub use datagram::{Datagram, DatagramRef};
pub use handshake_done::HandshakeDone;
pub use immediate_ack::ImmediateAck;
pub use max_data::MaxData;
pub use max_stream_data::MaxStreamData;
pub use max_streams::MaxStreams;
pub use new_connection_id::NewConnectionId;
pub use new_token::NewToken;
pub use padding::Padding;
pub use path_challenge::PathChallenge;
pub use path_response::PathResponse;
pub use ping::Ping;
pub use reset_stream::ResetStream;
pub use reset_stream_at::ResetStreamAt;
pub use retire_connection_id::RetireConnectionId;
pub use stop_sending::StopSending;
pub use stream::{Stream, StreamRef, StreamType};
pub use stream_data_blocked::StreamDataBlocked;
pub use streams_blocked::StreamsBlocked;

/// A decoded frame borrowing its variable-length payloads from the packet
/// it was parsed from
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    Padding(Padding),
    Ping(Ping),
    Ack(Ack<AckRangesDecoder<'a>>),
    ResetStream(ResetStream),
    ResetStreamAt(ResetStreamAt),
    StopSending(StopSending),
    Crypto(CryptoRef<'a>),
    NewToken(NewToken<'a>),
    Stream(StreamRef<'a>),
    MaxData(MaxData),
    MaxStreamData(MaxStreamData),
    MaxStreams(MaxStreams),
    DataBlocked(DataBlocked),
    StreamDataBlocked(StreamDataBlocked),
    StreamsBlocked(StreamsBlocked),
    NewConnectionId(NewConnectionId),
    RetireConnectionId(RetireConnectionId),
    PathChallenge(PathChallenge),
    PathResponse(PathResponse),
    ConnectionClose(ConnectionClose<'a>),
    HandshakeDone(HandshakeDone),
    Datagram(DatagramRef<'a>),
    AckFrequency(AckFrequency),
    ImmediateAck(ImmediateAck),
}

macro_rules! dispatch_frame {
    ($self:expr, |$frame:ident| $body:expr) => {
        match $self {
            Frame::Padding($frame) => $body,
            Frame::Ping($frame) => $body,
            Frame::Ack($frame) => $body,
            Frame::ResetStream($frame) => $body,
            Frame::ResetStreamAt($frame) => $body,
            Frame::StopSending($frame) => $body,
            Frame::Crypto($frame) => $body,
            Frame::NewToken($frame) => $body,
            Frame::Stream($frame) => $body,
            Frame::MaxData($frame) => $body,
            Frame::MaxStreamData($frame) => $body,
            Frame::MaxStreams($frame) => $body,
            Frame::DataBlocked($frame) => $body,
            Frame::StreamDataBlocked($frame) => $body,
            Frame::StreamsBlocked($frame) => $body,
            Frame::NewConnectionId($frame) => $body,
            Frame::RetireConnectionId($frame) => $body,
            Frame::PathChallenge($frame) => $body,
            Frame::PathResponse($frame) => $body,
            Frame::ConnectionClose($frame) => $body,
            Frame::HandshakeDone($frame) => $body,
            Frame::Datagram($frame) => $body,
            Frame::AckFrequency($frame) => $body,
            Frame::ImmediateAck($frame) => $body,
        }
    };
}

impl<'a> Frame<'a> {
    /// Decodes a single frame from the start of `buffer`.
    ///
    //= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
    //# The Frame Type field uses a variable-length integer encoding (see
    //# Section 16), with one exception.  To ensure simple and efficient
    //# implementations of frame parsing, a frame type MUST use the shortest
    //# possible encoding.
    pub fn decode(buffer: DecoderBuffer<'a>) -> DecoderBufferResult<'a, Self> {
        let tag = buffer.peek_byte(0)?;

        if tag < 0x40 {
            let buffer = buffer.skip(size_of::<Tag>())?;
            return Self::decode_single_byte_tag(tag, buffer);
        }

        // extension frame types use the full variable-length encoding
        let start_len = buffer.len();
        let (extended_tag, buffer) = buffer.decode::<VarInt>()?;
        let consumed = start_len - buffer.len();
        decoder_invariant!(
            consumed == extended_tag.encoding_size(),
            "frame type not minimally encoded"
        );

        match extended_tag.as_u64() {
            ack_frequency::ACK_FREQUENCY_TAG => {
                let (frame, buffer) = buffer.decode_parameterized::<AckFrequency>(0)?;
                Ok((Frame::AckFrequency(frame), buffer))
            }
            _ => Err(DecoderError::InvariantViolation("invalid frame")),
        }
    }

    fn decode_single_byte_tag(
        tag: Tag,
        buffer: DecoderBuffer<'a>,
    ) -> DecoderBufferResult<'a, Self> {
        macro_rules! decode {
            ($variant:ident, $ty:ty) => {{
                let (frame, buffer) = buffer.decode_parameterized::<$ty>(tag)?;
                Ok((Frame::$variant(frame), buffer))
            }};
        }

        match tag {
            0x00 => decode!(Padding, Padding),
            0x01 => decode!(Ping, Ping),
            0x02..=0x03 => decode!(Ack, Ack<AckRangesDecoder>),
            0x04 => decode!(ResetStream, ResetStream),
            0x05 => decode!(StopSending, StopSending),
            0x06 => decode!(Crypto, CryptoRef),
            0x07 => decode!(NewToken, NewToken),
            0x08..=0x0f => decode!(Stream, StreamRef),
            0x10 => decode!(MaxData, MaxData),
            0x11 => decode!(MaxStreamData, MaxStreamData),
            0x12..=0x13 => decode!(MaxStreams, MaxStreams),
            0x14 => decode!(DataBlocked, DataBlocked),
            0x15 => decode!(StreamDataBlocked, StreamDataBlocked),
            0x16..=0x17 => decode!(StreamsBlocked, StreamsBlocked),
            0x18 => decode!(NewConnectionId, NewConnectionId),
            0x19 => decode!(RetireConnectionId, RetireConnectionId),
            0x1a => decode!(PathChallenge, PathChallenge),
            0x1b => decode!(PathResponse, PathResponse),
            0x1c..=0x1d => decode!(ConnectionClose, ConnectionClose),
            0x1e => decode!(HandshakeDone, HandshakeDone),
            0x1f => decode!(ImmediateAck, ImmediateAck),
            ack::ACK_W_RECEIVE_TIMESTAMPS_TAG => decode!(Ack, Ack<AckRangesDecoder>),
            0x24 => decode!(ResetStreamAt, ResetStreamAt),
            0x30..=0x31 => decode!(Datagram, DatagramRef),
            _ => Err(DecoderError::InvariantViolation("invalid frame")),
        }
    }

    /// Returns the frame type as it appears on the wire
    pub fn frame_type(&self) -> VarInt {
        match self {
            Frame::Padding(frame) => VarInt::from_u8(frame.tag()),
            Frame::Ping(frame) => VarInt::from_u8(frame.tag()),
            Frame::Ack(frame) => VarInt::from_u8(frame.tag()),
            Frame::ResetStream(frame) => VarInt::from_u8(frame.tag()),
            Frame::ResetStreamAt(frame) => VarInt::from_u8(frame.tag()),
            Frame::StopSending(frame) => VarInt::from_u8(frame.tag()),
            Frame::Crypto(frame) => VarInt::from_u8(frame.tag()),
            Frame::NewToken(frame) => VarInt::from_u8(frame.tag()),
            Frame::Stream(frame) => VarInt::from_u8(frame.tag()),
            Frame::MaxData(frame) => VarInt::from_u8(frame.tag()),
            Frame::MaxStreamData(frame) => VarInt::from_u8(frame.tag()),
            Frame::MaxStreams(frame) => VarInt::from_u8(frame.tag()),
            Frame::DataBlocked(frame) => VarInt::from_u8(frame.tag()),
            Frame::StreamDataBlocked(frame) => VarInt::from_u8(frame.tag()),
            Frame::StreamsBlocked(frame) => VarInt::from_u8(frame.tag()),
            Frame::NewConnectionId(frame) => VarInt::from_u8(frame.tag()),
            Frame::RetireConnectionId(frame) => VarInt::from_u8(frame.tag()),
            Frame::PathChallenge(frame) => VarInt::from_u8(frame.tag()),
            Frame::PathResponse(frame) => VarInt::from_u8(frame.tag()),
            Frame::ConnectionClose(frame) => VarInt::from_u8(frame.tag()),
            Frame::HandshakeDone(frame) => VarInt::from_u8(frame.tag()),
            Frame::Datagram(frame) => VarInt::from_u8(frame.tag()),
            Frame::AckFrequency(frame) => frame.tag(),
            Frame::ImmediateAck(frame) => VarInt::from_u8(frame.tag()),
        }
    }

    /// Returns whether receipt of this frame obligates an acknowledgment
    //= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
    //# Table 3 lists and summarizes information about each frame type that
    //# is defined in this document.
    pub fn ack_elicitation(&self) -> AckElicitation {
        match self {
            Frame::Padding(_) | Frame::Ack(_) | Frame::ConnectionClose(_) => {
                AckElicitation::NonEliciting
            }
            _ => AckElicitation::Eliciting,
        }
    }

    /// Returns true if the frame may appear in a probing packet
    //= https://www.rfc-editor.org/rfc/rfc9000#section-9.1
    //# PATH_CHALLENGE, PATH_RESPONSE, NEW_CONNECTION_ID, and PADDING
    //# frames are "probing frames", and all other frames are "non-probing
    //# frames".
    pub fn is_probing(&self) -> bool {
        matches!(
            self,
            Frame::Padding(_)
                | Frame::PathChallenge(_)
                | Frame::PathResponse(_)
                | Frame::NewConnectionId(_)
        )
    }

    /// Returns true if the frame is acceptable in a packet decrypted at
    /// `level`.
    ///
    /// A forbidden frame at a given level is a protocol violation.
    pub fn is_allowed(&self, level: EncryptionLevel) -> bool {
        match level {
            EncryptionLevel::Initial | EncryptionLevel::Handshake => matches!(
                self,
                Frame::Crypto(_)
                    | Frame::Ack(_)
                    | Frame::Ping(_)
                    | Frame::Padding(_)
                    | Frame::ConnectionClose(_)
            ),
            EncryptionLevel::ZeroRtt => !matches!(
                self,
                Frame::Ack(_)
                    | Frame::HandshakeDone(_)
                    | Frame::NewToken(_)
                    | Frame::PathResponse(_)
                    | Frame::RetireConnectionId(_)
            ),
            EncryptionLevel::OneRtt => true,
        }
    }
}

impl<'a> EncoderValue for Frame<'a> {
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        dispatch_frame!(self, |frame| buffer.encode(frame))
    }
}

macro_rules! impl_from_frame {
    ($variant:ident, $ty:ty) => {
        impl<'a> From<$ty> for Frame<'a> {
            #[inline]
            fn from(frame: $ty) -> Self {
                Frame::$variant(frame)
            }
        }
    };
}

impl_from_frame!(Padding, Padding);
impl_from_frame!(Ping, Ping);
impl_from_frame!(ResetStream, ResetStream);
impl_from_frame!(ResetStreamAt, ResetStreamAt);
impl_from_frame!(StopSending, StopSending);
impl_from_frame!(Crypto, CryptoRef<'a>);
impl_from_frame!(NewToken, NewToken<'a>);
impl_from_frame!(Stream, StreamRef<'a>);
impl_from_frame!(MaxData, MaxData);
impl_from_frame!(MaxStreamData, MaxStreamData);
impl_from_frame!(MaxStreams, MaxStreams);
impl_from_frame!(DataBlocked, DataBlocked);
impl_from_frame!(StreamDataBlocked, StreamDataBlocked);
impl_from_frame!(StreamsBlocked, StreamsBlocked);
impl_from_frame!(NewConnectionId, NewConnectionId);
impl_from_frame!(RetireConnectionId, RetireConnectionId);
impl_from_frame!(PathChallenge, PathChallenge);
impl_from_frame!(PathResponse, PathResponse);
impl_from_frame!(ConnectionClose, ConnectionClose<'a>);
impl_from_frame!(HandshakeDone, HandshakeDone);
impl_from_frame!(Datagram, DatagramRef<'a>);
impl_from_frame!(AckFrequency, AckFrequency);
impl_from_frame!(ImmediateAck, ImmediateAck);
