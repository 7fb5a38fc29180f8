// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet-level orchestration: header parsing, header protection, packet
//! number recovery, decryption, frame dispatch, and the sealing path for
//! outgoing packets.
//!
//! The framer owns the per-level keys and the 1-RTT key phase state. It
//! does not own connection state; everything it learns is surfaced
//! through [`Visitor`].

use quilt_codec::{DecoderBuffer, Encoder, EncoderBuffer};
use quilt_quic_core::{
    connection::{self, ConnectionId},
    crypto::{self, EncryptionLevel, PacketKey, ProtectedPayload},
    endpoint,
    frame::{self, AckElicitation, Frame},
    inet::ExplicitCongestionNotification,
    packet::{
        self,
        key_phase::KeyPhase,
        long::{self, LongHeader, PacketType},
        number::{PacketNumber, PacketNumberSpace, TruncatedPacketNumber},
        retry::Retry,
        short::{self, ShortHeader},
        version_negotiation::VersionNegotiation,
        Version,
    },
    stateless_reset,
    time::Duration,
    varint::VarInt,
};

#[cfg(test)]
mod tests;

use alloc::boxed::Box;

/// Summary of a fully processed packet, delivered after its frames
#[derive(Clone, Copy, Debug)]
pub struct ProcessedPacket {
    pub packet_number: PacketNumber,
    pub encryption_level: EncryptionLevel,
    pub ack_elicitation: AckElicitation,
    /// True when every frame in the packet was a probing frame
    pub is_probing: bool,
    pub ecn: ExplicitCongestionNotification,
    pub len: usize,
}

/// Receives everything the framer decodes.
///
/// Frames are delivered in wire order; a returned error aborts processing
/// of the remaining datagram and surfaces at the connection.
#[allow(unused_variables)]
pub trait Visitor {
    fn on_stream_frame(&mut self, frame: frame::StreamRef) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_crypto_frame(
        &mut self,
        level: EncryptionLevel,
        frame: frame::CryptoRef,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_ack_frame(
        &mut self,
        space: PacketNumberSpace,
        frame: frame::Ack<frame::AckRangesDecoder>,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_reset_stream_frame(
        &mut self,
        frame: frame::ResetStream,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_reset_stream_at_frame(
        &mut self,
        frame: frame::ResetStreamAt,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_stop_sending_frame(
        &mut self,
        frame: frame::StopSending,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_max_data_frame(&mut self, frame: frame::MaxData) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_max_stream_data_frame(
        &mut self,
        frame: frame::MaxStreamData,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_max_streams_frame(&mut self, frame: frame::MaxStreams) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_data_blocked_frame(
        &mut self,
        frame: frame::DataBlocked,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_stream_data_blocked_frame(
        &mut self,
        frame: frame::StreamDataBlocked,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_streams_blocked_frame(
        &mut self,
        frame: frame::StreamsBlocked,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_new_connection_id_frame(
        &mut self,
        frame: frame::NewConnectionId,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_retire_connection_id_frame(
        &mut self,
        frame: frame::RetireConnectionId,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_new_token_frame(&mut self, frame: frame::NewToken) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_path_challenge_frame(
        &mut self,
        frame: frame::PathChallenge,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_path_response_frame(
        &mut self,
        frame: frame::PathResponse,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_connection_close_frame(
        &mut self,
        frame: frame::ConnectionClose,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_handshake_done_frame(
        &mut self,
        frame: frame::HandshakeDone,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_datagram_frame(&mut self, frame: frame::DatagramRef) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_ack_frequency_frame(
        &mut self,
        frame: frame::AckFrequency,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_immediate_ack_frame(
        &mut self,
        frame: frame::ImmediateAck,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_ping_frame(&mut self, frame: frame::Ping) -> Result<(), connection::Error> {
        Ok(())
    }

    /// A packet was successfully decrypted, before its frames are
    /// dispatched
    fn on_packet_decrypted(
        &mut self,
        level: EncryptionLevel,
        packet_number: PacketNumber,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    /// All frames of a packet were dispatched
    fn on_packet_processed(&mut self, packet: ProcessedPacket) -> Result<(), connection::Error> {
        Ok(())
    }

    /// A long header packet left trailing bytes which re-enter the
    /// pipeline as another packet
    fn on_coalesced_packet(&mut self, remaining_len: usize) {}

    /// The datagram matched a stored stateless reset token
    fn on_stateless_reset(&mut self, token: stateless_reset::Token) {}

    /// A version negotiation packet arrived
    fn on_version_negotiation(
        &mut self,
        packet: &VersionNegotiation,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    /// A retry packet arrived. `packet_bytes` spans the whole datagram so
    /// the integrity tag can be validated.
    fn on_retry(&mut self, packet: &Retry, packet_bytes: &[u8]) -> Result<(), connection::Error> {
        Ok(())
    }

    /// The peer appears to have initiated a key update; a decrypter for
    /// the next phase is needed
    fn create_next_one_rtt_key(&mut self) -> Option<Box<dyn PacketKey>>;

    /// Returns true if the packet number was already processed; the
    /// packet is silently dropped
    fn is_duplicate(&self, packet_number: PacketNumber) -> bool {
        let _ = packet_number;
        false
    }

    /// An initial packet carried an address token
    fn on_initial_token(&mut self, token: &[u8]) -> Result<(), connection::Error> {
        let _ = token;
        Ok(())
    }

    /// A key update was committed: the phase bit flipped and the previous
    /// phase's key is retained for reordered packets
    fn on_key_update(&mut self, phase: KeyPhase, remotely_initiated: bool) {}
}

/// Parameters for sealing one outgoing packet
#[derive(Debug)]
pub struct PacketParams<'a> {
    pub encryption_level: EncryptionLevel,
    pub destination_connection_id: ConnectionId,
    pub source_connection_id: ConnectionId,
    /// Initial packets only
    pub token: &'a [u8],
    pub packet_number: PacketNumber,
    pub largest_acked: Option<PacketNumber>,
    pub spin_bit: bool,
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
//# If this value is absent, a default of 3 is assumed (indicating a
//# multiplier of 8).
const DEFAULT_ACK_DELAY_EXPONENT: u8 = 3;

#[inline]
fn level_index(level: EncryptionLevel) -> usize {
    match level {
        EncryptionLevel::Initial => 0,
        EncryptionLevel::ZeroRtt => 1,
        EncryptionLevel::Handshake => 2,
        EncryptionLevel::OneRtt => 3,
    }
}

/// Orchestrates the wire codec, header protection, and AEAD for both
/// directions of a connection
pub struct Framer {
    perspective: endpoint::Type,
    version: Version,

    keys: [Option<Box<dyn PacketKey>>; 4],
    previous_one_rtt_key: Option<Box<dyn PacketKey>>,
    next_one_rtt_key: Option<Box<dyn PacketKey>>,
    key_phase: KeyPhase,
    /// First packet number decrypted in the current 1-RTT phase
    current_phase_first_received: Option<PacketNumber>,
    /// A key update has happened at least once on this connection, in
    /// either direction
    key_update_performed: bool,

    largest_received: [Option<PacketNumber>; PacketNumberSpace::COUNT],
    largest_zero_rtt_received: Option<PacketNumber>,
    smallest_one_rtt_received: Option<PacketNumber>,

    /// The connection ID length this endpoint puts in short headers it
    /// expects to receive
    expected_connection_id_len: usize,

    local_ack_delay_exponent: u8,
    peer_ack_delay_exponent: u8,
}

impl core::fmt::Debug for Framer {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Framer")
            .field("perspective", &self.perspective)
            .field("version", &self.version)
            .field("key_phase", &self.key_phase)
            .field("largest_received", &self.largest_received)
            .finish_non_exhaustive()
    }
}

impl Framer {
    pub fn new(
        perspective: endpoint::Type,
        version: Version,
        expected_connection_id_len: usize,
    ) -> Self {
        Self {
            perspective,
            version,
            keys: Default::default(),
            previous_one_rtt_key: None,
            next_one_rtt_key: None,
            key_phase: KeyPhase::Zero,
            current_phase_first_received: None,
            key_update_performed: false,
            largest_received: Default::default(),
            largest_zero_rtt_received: None,
            smallest_one_rtt_received: None,
            expected_connection_id_len,
            local_ack_delay_exponent: DEFAULT_ACK_DELAY_EXPONENT,
            peer_ack_delay_exponent: DEFAULT_ACK_DELAY_EXPONENT,
        }
    }

    pub fn install_key(&mut self, level: EncryptionLevel, key: Box<dyn PacketKey>) {
        self.keys[level_index(level)] = Some(key);
    }

    /// Drops the key for a level, e.g. when its packet number space is
    /// discarded
    pub fn discard_key(&mut self, level: EncryptionLevel) {
        self.keys[level_index(level)] = None;
    }

    pub fn has_key(&self, level: EncryptionLevel) -> bool {
        self.keys[level_index(level)].is_some()
    }

    pub fn key_phase(&self) -> KeyPhase {
        self.key_phase
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Adopts a different version after version negotiation
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn largest_received(&self, space: PacketNumberSpace) -> Option<PacketNumber> {
        self.largest_received[space.as_index()]
    }

    pub fn set_ack_delay_exponents(&mut self, local: u8, peer: u8) {
        self.local_ack_delay_exponent = local;
        self.peer_ack_delay_exponent = peer;
    }

    pub fn peer_ack_delay_exponent(&self) -> u8 {
        self.peer_ack_delay_exponent
    }

    /// Scales an outgoing ack delay by the local exponent
    pub fn encode_ack_delay(&self, delay: Duration) -> VarInt {
        let micros = delay.as_micros() as u64 >> self.local_ack_delay_exponent;
        VarInt::new(micros).unwrap_or(VarInt::MAX)
    }

    /// Scales a received ack delay by the peer's exponent
    pub fn decode_ack_delay(&self, delay: VarInt) -> Duration {
        Duration::from_micros(delay.as_u64() << self.peer_ack_delay_exponent)
    }

    /// Locally initiated key update: the caller supplies the new key, the
    /// phase bit flips, and the previous key is retained briefly for
    /// reordered packets.
    pub fn advance_one_rtt_keys(&mut self, new_key: Box<dyn PacketKey>) {
        let index = level_index(EncryptionLevel::OneRtt);
        self.previous_one_rtt_key = self.keys[index].take();
        self.keys[index] = Some(new_key);
        self.key_phase = self.key_phase.next();
        self.current_phase_first_received = None;
        self.next_one_rtt_key = None;
        self.key_update_performed = true;
    }

    /// Drops the previous-phase decrypter once reordered packets can no
    /// longer be expected
    pub fn discard_previous_one_rtt_key(&mut self) {
        self.previous_one_rtt_key = None;
    }

    /// Runs the decrypt pipeline over a datagram, iterating coalesced
    /// packets
    pub fn process_datagram<V: Visitor>(
        &mut self,
        datagram: &mut [u8],
        ecn: ExplicitCongestionNotification,
        peer_reset_tokens: &[stateless_reset::Token],
        visitor: &mut V,
    ) -> Result<(), connection::Error> {
        let total_len = datagram.len();
        let mut offset = 0;

        while offset < total_len {
            let remaining = &mut datagram[offset..];
            let first_byte = remaining[0];

            if !packet::is_long_header(first_byte) {
                // a short header packet consumes the rest of the datagram
                return self.process_short_packet(remaining, ecn, peer_reset_tokens, visitor);
            }

            let consumed = match self.peek_long_packet_kind(remaining)? {
                LongPacketKind::VersionNegotiation => {
                    let peek = DecoderBuffer::new(remaining);
                    let (packet, _count) = VersionNegotiation::decode(peek).map_err(|_| {
                        connection::Error::InvalidPacketHeader("malformed version negotiation")
                    })?;
                    visitor.on_version_negotiation(&packet)?;
                    return Ok(());
                }
                LongPacketKind::Retry => {
                    let peek = DecoderBuffer::new(remaining);
                    let packet = Retry::decode(peek)
                        .map_err(|_| connection::Error::InvalidPacketHeader("malformed retry"))?;
                    visitor.on_retry(&packet, &*remaining)?;
                    return Ok(());
                }
                LongPacketKind::Protected => self.process_long_packet(remaining, ecn, visitor)?,
            };

            offset += consumed;
            if offset < total_len {
                visitor.on_coalesced_packet(total_len - offset);
            }
        }

        Ok(())
    }

    fn peek_long_packet_kind(&self, packet: &[u8]) -> Result<LongPacketKind, connection::Error> {
        let version_bytes: [u8; 4] = packet
            .get(1..5)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(connection::Error::InvalidPacketHeader("truncated long header"))?;
        let version = u32::from_be_bytes(version_bytes);

        if version == packet::version_negotiation::VERSION_NEGOTIATION_VERSION {
            return Ok(LongPacketKind::VersionNegotiation);
        }

        if matches!(PacketType::from_tag(packet[0]), PacketType::Retry) {
            return Ok(LongPacketKind::Retry);
        }

        Ok(LongPacketKind::Protected)
    }

    /// Decrypts and dispatches one long header packet, returning the
    /// bytes it consumed
    fn process_long_packet<V: Visitor>(
        &mut self,
        packet_bytes: &mut [u8],
        ecn: ExplicitCongestionNotification,
        visitor: &mut V,
    ) -> Result<usize, connection::Error> {
        let header = LongHeader::decode(DecoderBuffer::new(packet_bytes))
            .map_err(|error| connection::Error::InvalidPacketHeader(error.into()))?;

        let level = header.packet_type.encryption_level();
        let space = level.packet_number_space();
        let packet_len = header.packet_len;

        if !header.token.is_empty() {
            let token = packet_bytes[header.token.clone()].to_vec();
            visitor.on_initial_token(&token)?;
        }

        let packet = &mut packet_bytes[..packet_len];
        let protected = ProtectedPayload::new(header.header_len, packet);
        let (truncated, encrypted) = {
            let Some(key) = &self.keys[level_index(level)] else {
                return Err(connection::Error::MissingKey(level));
            };
            crypto::unprotect(key, space, protected)
                .map_err(|_| connection::Error::DecryptionFailure)?
        };

        let packet_number = self.expand_packet_number(space, truncated)?;
        self.validate_zero_rtt_order(level, packet_number)?;

        if visitor.is_duplicate(packet_number) {
            return Ok(packet_len);
        }

        let Some(key) = &self.keys[level_index(level)] else {
            return Err(connection::Error::MissingKey(level));
        };
        let cleartext = crypto::decrypt(key, packet_number, encrypted)
            .map_err(|_| connection::Error::DecryptionFailure)?;

        self.on_packet_decrypted(space, packet_number);
        visitor.on_packet_decrypted(level, packet_number)?;

        self.dispatch_frames(
            level,
            packet_number,
            ecn,
            packet_len,
            cleartext.payload,
            visitor,
        )?;

        Ok(packet_len)
    }

    /// The 1-RTT pipeline, including key phase recovery and stateless
    /// reset detection
    fn process_short_packet<V: Visitor>(
        &mut self,
        packet_bytes: &mut [u8],
        ecn: ExplicitCongestionNotification,
        peer_reset_tokens: &[stateless_reset::Token],
        visitor: &mut V,
    ) -> Result<(), connection::Error> {
        let space = PacketNumberSpace::ApplicationData;
        let packet_len = packet_bytes.len();

        // peek the possible stateless reset token before anything can fail
        let trailing_token = packet_bytes
            .len()
            .checked_sub(stateless_reset::token::LEN)
            .and_then(|offset| {
                stateless_reset::Token::try_from(&packet_bytes[offset..]).ok()
            });
        let reset_token_match = trailing_token
            .filter(|token| peer_reset_tokens.iter().any(|known| known == token));

        let stateless_reset_or =
            |error: connection::Error,
             visitor: &mut V| {
                if let Some(token) = reset_token_match {
                    visitor.on_stateless_reset(token);
                    return Ok(());
                }
                Err(error)
            };

        let header = match ShortHeader::decode(
            DecoderBuffer::new(packet_bytes),
            self.expected_connection_id_len,
        ) {
            Ok(header) => header,
            Err(error) => {
                return stateless_reset_or(
                    connection::Error::InvalidPacketHeader(error.into()),
                    visitor,
                )
            }
        };

        let Some(current_key) = &self.keys[level_index(EncryptionLevel::OneRtt)] else {
            return stateless_reset_or(
                connection::Error::MissingKey(EncryptionLevel::OneRtt),
                visitor,
            );
        };

        let protected = ProtectedPayload::new(header.header_len, packet_bytes);
        let (truncated, encrypted) = match crypto::unprotect(current_key, space, protected) {
            Ok(unprotected) => unprotected,
            Err(_) => {
                return stateless_reset_or(connection::Error::DecryptionFailure, visitor)
            }
        };

        let packet_number = self.expand_packet_number(space, truncated)?;
        if visitor.is_duplicate(packet_number) {
            return Ok(());
        }
        let packet_phase = KeyPhase::from_tag(encrypted.get_tag());

        // pick a decrypter for the packet's phase
        enum Selected {
            Current,
            Previous,
            Next,
        }

        // A mismatched phase bit is either a reordered packet from before
        // the current phase took effect, or the peer rolling its keys.
        // Before the phase's first packet arrives the distinction rests on
        // whether any key update has ever happened: after one, an unset
        // first-received means the old phase is still draining.
        let old_phase = match self.current_phase_first_received {
            Some(first) => packet_number < first,
            None => self.key_update_performed,
        };

        let selected = if packet_phase == self.key_phase {
            Selected::Current
        } else if old_phase {
            Selected::Previous
        } else {
            // the peer appears to have rolled its keys
            if self.next_one_rtt_key.is_none() {
                self.next_one_rtt_key = visitor.create_next_one_rtt_key();
            }
            Selected::Next
        };

        let key = match selected {
            Selected::Current => self.keys[level_index(EncryptionLevel::OneRtt)].as_ref(),
            Selected::Previous => self.previous_one_rtt_key.as_ref(),
            Selected::Next => self.next_one_rtt_key.as_ref(),
        };
        let Some(key) = key else {
            return stateless_reset_or(
                connection::Error::MissingKey(EncryptionLevel::OneRtt),
                visitor,
            );
        };

        let cleartext = match crypto::decrypt(key, packet_number, encrypted) {
            Ok(cleartext) => cleartext,
            Err(_) => {
                return stateless_reset_or(connection::Error::DecryptionFailure, visitor)
            }
        };

        match selected {
            Selected::Next => {
                // commit the peer-initiated key update
                let index = level_index(EncryptionLevel::OneRtt);
                self.previous_one_rtt_key = self.keys[index].take();
                self.keys[index] = self.next_one_rtt_key.take();
                self.key_phase = packet_phase;
                self.current_phase_first_received = Some(packet_number);
                self.key_update_performed = true;
                visitor.on_key_update(self.key_phase, true);
            }
            Selected::Current => {
                // the first packet of the phase latches its packet number
                if self.current_phase_first_received.is_none() {
                    self.current_phase_first_received = Some(packet_number);
                }
            }
            Selected::Previous => {
                // the current phase's first-received must not regress
            }
        }

        if self.smallest_one_rtt_received.map_or(true, |smallest| packet_number < smallest) {
            self.smallest_one_rtt_received = Some(packet_number);
        }

        self.on_packet_decrypted(space, packet_number);
        visitor.on_packet_decrypted(EncryptionLevel::OneRtt, packet_number)?;

        self.dispatch_frames(
            EncryptionLevel::OneRtt,
            packet_number,
            ecn,
            packet_len,
            cleartext.payload,
            visitor,
        )
    }

    fn expand_packet_number(
        &self,
        space: PacketNumberSpace,
        truncated: TruncatedPacketNumber,
    ) -> Result<PacketNumber, connection::Error> {
        let largest = self.largest_received[space.as_index()]
            .unwrap_or_else(|| space.new_packet_number(VarInt::ZERO));
        let packet_number = truncated.expand(largest);

        if packet_number.as_u64() == 0 {
            return Err(connection::Error::InvalidPacketNumber("packet number zero"));
        }

        Ok(packet_number)
    }

    /// 0-RTT packets must not carry higher packet numbers than 1-RTT
    /// packets already seen
    fn validate_zero_rtt_order(
        &mut self,
        level: EncryptionLevel,
        packet_number: PacketNumber,
    ) -> Result<(), connection::Error> {
        if level != EncryptionLevel::ZeroRtt {
            return Ok(());
        }

        if let Some(smallest_one_rtt) = self.smallest_one_rtt_received {
            if packet_number > smallest_one_rtt {
                return Err(connection::Error::InvalidPacketNumber(
                    "0-RTT packet number above 1-RTT packet number",
                ));
            }
        }

        if self
            .largest_zero_rtt_received
            .map_or(true, |largest| packet_number > largest)
        {
            self.largest_zero_rtt_received = Some(packet_number);
        }

        Ok(())
    }

    fn on_packet_decrypted(&mut self, space: PacketNumberSpace, packet_number: PacketNumber) {
        let slot = &mut self.largest_received[space.as_index()];
        if slot.map_or(true, |largest| packet_number > largest) {
            *slot = Some(packet_number);
        }
    }

    /// Walks the frames of a decrypted payload in wire order, enforcing
    /// the level acceptance table
    fn dispatch_frames<V: Visitor>(
        &mut self,
        level: EncryptionLevel,
        packet_number: PacketNumber,
        ecn: ExplicitCongestionNotification,
        packet_len: usize,
        payload: &[u8],
        visitor: &mut V,
    ) -> Result<(), connection::Error> {
        let mut buffer = DecoderBuffer::new(payload);

        //= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
        //# An endpoint MUST treat receipt of a packet containing no frames as a
        //# connection error of type PROTOCOL_VIOLATION.
        if buffer.is_empty() {
            return Err(connection::Error::InvalidFrameData("empty packet payload"));
        }

        let mut ack_elicitation = AckElicitation::NonEliciting;
        let mut is_probing = true;

        while !buffer.is_empty() {
            let (frame, remaining) = Frame::decode(buffer)?;

            if !frame.is_allowed(level) {
                return Err(connection::Error::InvalidFrameData(
                    "frame not allowed at encryption level",
                ));
            }

            ack_elicitation = ack_elicitation.merge(frame.ack_elicitation());
            is_probing &= frame.is_probing();

            match frame {
                Frame::Padding(_) => {}
                Frame::Ping(frame) => visitor.on_ping_frame(frame)?,
                Frame::Ack(frame) => {
                    visitor.on_ack_frame(level.packet_number_space(), frame)?
                }
                Frame::ResetStream(frame) => visitor.on_reset_stream_frame(frame)?,
                Frame::ResetStreamAt(frame) => visitor.on_reset_stream_at_frame(frame)?,
                Frame::StopSending(frame) => visitor.on_stop_sending_frame(frame)?,
                Frame::Crypto(frame) => visitor.on_crypto_frame(level, frame)?,
                Frame::NewToken(frame) => visitor.on_new_token_frame(frame)?,
                Frame::Stream(frame) => visitor.on_stream_frame(frame)?,
                Frame::MaxData(frame) => visitor.on_max_data_frame(frame)?,
                Frame::MaxStreamData(frame) => visitor.on_max_stream_data_frame(frame)?,
                Frame::MaxStreams(frame) => visitor.on_max_streams_frame(frame)?,
                Frame::DataBlocked(frame) => visitor.on_data_blocked_frame(frame)?,
                Frame::StreamDataBlocked(frame) => {
                    visitor.on_stream_data_blocked_frame(frame)?
                }
                Frame::StreamsBlocked(frame) => visitor.on_streams_blocked_frame(frame)?,
                Frame::NewConnectionId(frame) => visitor.on_new_connection_id_frame(frame)?,
                Frame::RetireConnectionId(frame) => {
                    visitor.on_retire_connection_id_frame(frame)?
                }
                Frame::PathChallenge(frame) => visitor.on_path_challenge_frame(frame)?,
                Frame::PathResponse(frame) => visitor.on_path_response_frame(frame)?,
                Frame::ConnectionClose(frame) => visitor.on_connection_close_frame(frame)?,
                Frame::HandshakeDone(frame) => visitor.on_handshake_done_frame(frame)?,
                Frame::Datagram(frame) => visitor.on_datagram_frame(frame)?,
                Frame::AckFrequency(frame) => visitor.on_ack_frequency_frame(frame)?,
                Frame::ImmediateAck(frame) => visitor.on_immediate_ack_frame(frame)?,
            }

            buffer = remaining;
        }

        visitor.on_packet_processed(ProcessedPacket {
            packet_number,
            encryption_level: level,
            ack_elicitation,
            is_probing,
            ecn,
            len: packet_len,
        })
    }

    /// Builds and seals one packet into `out`, returning the bytes
    /// written.
    ///
    /// `payload` holds the already-encoded frames; the framer pads it to
    /// the minimum the header protection sample requires.
    pub fn seal_packet(
        &self,
        out: &mut [u8],
        params: &PacketParams,
        payload: &[u8],
    ) -> Result<usize, connection::Error> {
        let level = params.encryption_level;
        let space = level.packet_number_space();
        let Some(key) = &self.keys[level_index(level)] else {
            return Err(connection::Error::MissingKey(level));
        };

        let largest_acked = params
            .largest_acked
            .unwrap_or_else(|| space.new_packet_number(VarInt::ZERO));
        let truncated = params
            .packet_number
            .truncate(largest_acked)
            .ok_or(connection::Error::InvalidPacketNumber(
                "packet number below largest acked",
            ))?;

        // pad so the header protection sample is always available
        let min_payload =
            (crypto::HEADER_PROTECTION_SAMPLE_OFFSET).saturating_sub(truncated.len().bytesize());
        let padded_len = payload.len().max(min_payload);

        let tag_len = key.tag_len();
        let mut encoder = EncoderBuffer::new(out);

        let header_len = match level {
            EncryptionLevel::OneRtt => short::encode_header(
                &mut encoder,
                params.spin_bit,
                self.key_phase,
                &params.destination_connection_id,
                truncated,
            ),
            _ => long::encode_header(
                &mut encoder,
                match level {
                    EncryptionLevel::Initial => PacketType::Initial,
                    EncryptionLevel::ZeroRtt => PacketType::ZeroRtt,
                    _ => PacketType::Handshake,
                },
                self.version,
                &params.destination_connection_id,
                &params.source_connection_id,
                params.token,
                truncated,
                padded_len,
                tag_len,
            ),
        };

        encoder.write_slice(payload);
        encoder.write_repeated(padded_len - payload.len(), 0);
        encoder.write_repeated(tag_len, 0);
        let total = encoder.len();

        let encrypted = crypto::encrypt(
            key,
            params.packet_number,
            truncated.len().bytesize(),
            header_len,
            &mut out[..total],
        )
        .map_err(|_| connection::Error::DecryptionFailure)?;

        crypto::protect(key, encrypted).map_err(|_| connection::Error::DecryptionFailure)?;

        Ok(total)
    }
}

enum LongPacketKind {
    VersionNegotiation,
    Retry,
    Protected,
}
