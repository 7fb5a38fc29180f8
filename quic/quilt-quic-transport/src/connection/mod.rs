// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The per-connection state machine.
//!
//! A [`Connection`] ingests UDP datagrams, drives the framer's
//! encryption pipeline, feeds decrypted frames into the ack and
//! retransmission managers, and emits coalesced datagrams through a
//! non-blocking writer. All callbacks run on one thread of control; the
//! connection is not re-entrant.

pub mod blackhole;
pub mod close;
pub mod config;
pub mod idle;
pub mod local_id_registry;
pub mod mtu;
pub mod path;
pub mod peer_id_registry;
pub mod ping_manager;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use local_id_registry::LocalIdRegistry;
pub use path::Path;
pub use peer_id_registry::PeerIdRegistry;

use crate::{
    ack::ReceivedPacketManager,
    control_frame::{ControlFrame, ControlFrameManager, FrameSender},
    event::{self, Subscriber},
    framer::{self, Framer, PacketParams, ProcessedPacket},
    io::{PacketWriter, WriteResult},
    notifier::{DataSender, SessionNotifier},
    sent_packet::{SentFrame, SentPacketInfo, SentPacketMap, TransmissionType},
};
use alloc::{boxed::Box, collections::VecDeque, vec::Vec};
use blackhole::BlackholeDetector;
use close::CloseState;
use idle::IdleNetworkDetector;
use mtu::MtuDiscoverer;
use ping_manager::{PingAction, PingManager};
use quilt_codec::{Encoder, EncoderBuffer, EncoderValue};
use quilt_quic_core::{
    connection::{self, ConnectionId},
    crypto::{EncryptionLevel, PacketKey},
    endpoint,
    frame,
    inet::ExplicitCongestionNotification,
    packet::{
        self,
        key_phase::KeyPhase,
        number::{PacketNumber, PacketNumberSpace},
        retry::{IntegrityValidator, Retry},
        version_negotiation::VersionNegotiation,
        Version,
    },
    random,
    stateless_reset,
    time::{Clock, Duration, Timer, Timestamp},
    varint::VarInt,
};
use smallvec::SmallVec;
use std::net::SocketAddr;

/// Diagnostic counters for multi-port probing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MultiPortStats {
    pub probe_failures_when_path_degrading: u64,
    pub probe_failures_when_path_not_degrading: u64,
    pub alt_path_rtt: Option<Duration>,
}

/// The session-facing callbacks: the TLS driver, HTTP mapping, or a test
/// harness implements this.
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

    fn on_rst_stream(&mut self, frame: frame::ResetStream) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_reset_stream_at(
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

    fn on_max_streams_frame(
        &mut self,
        frame: frame::MaxStreams,
    ) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_blocked_frame(&mut self, frame: frame::DataBlocked) -> Result<(), connection::Error> {
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

    fn on_message_received(&mut self, data: &[u8]) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_handshake_done_received(&mut self) -> Result<(), connection::Error> {
        Ok(())
    }

    fn on_new_token_received(&mut self, token: &[u8]) -> Result<(), connection::Error> {
        Ok(())
    }

    /// The connection is no longer usable
    fn on_connection_closed(&mut self, error: connection::Error, remotely_initiated: bool) {}

    fn on_packet_decrypted(&mut self, level: EncryptionLevel) {}

    fn on_one_rtt_packet_acknowledged(&mut self, packet_number: PacketNumber) {}

    fn on_handshake_packet_sent(&mut self) {}

    fn on_key_update(&mut self, phase: KeyPhase, remotely_initiated: bool) {}

    /// The peer rolled its 1-RTT keys; produce the decrypter for the next
    /// phase
    fn advance_keys_and_create_current_one_rtt_key(&mut self) -> Option<Box<dyn PacketKey>> {
        None
    }

    /// The session has data it wants to write once the connection is
    /// able
    fn willing_and_able_to_write(&mut self) -> bool {
        false
    }

    fn should_keep_connection_alive(&mut self) -> bool {
        false
    }

    /// Servers validate the address token carried in initial packets
    fn validate_token(&mut self, token: &[u8]) -> bool {
        true
    }

    /// Servers may hand the client a token for a future connection once
    /// the handshake confirms; it goes out in a NEW_TOKEN frame
    fn maybe_send_address_token(&mut self) -> Option<bytes::Bytes> {
        None
    }

    /// Copies stream payload bytes for `[offset, offset + dest.len())`.
    /// The session owns the actual data.
    fn fill_stream_data(&mut self, stream_id: VarInt, offset: u64, dest: &mut [u8]) {
        let _ = (stream_id, offset);
        dest.fill(0);
    }

    /// Copies crypto payload bytes for the handshake stream at `level`
    fn fill_crypto_data(&mut self, level: EncryptionLevel, offset: u64, dest: &mut [u8]) {
        let _ = (level, offset);
        dest.fill(0);
    }
}

/// The collaborators a connection borrows from its environment
pub trait Context {
    type Visitor: Visitor;
    type Writer: PacketWriter;
    type Clock: Clock;
    type Random: random::Generator;
    type Subscriber: event::Subscriber;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Handshaking,
    Connected,
    Closed,
}

/// Actions recorded during frame dispatch and applied once the framer
/// returns, so dispatch never needs the whole connection mutably
#[derive(Debug)]
enum Action {
    SendPathResponse([u8; 8]),
    PathResponseReceived([u8; 8]),
    MtuProbeAcked(PacketNumber),
    MtuProbeLost(PacketNumber),
    HandshakeDone,
    Close(connection::Error),
    PeerClose {
        error: connection::Error,
        error_code: VarInt,
        quic_error_code: Option<u64>,
    },
    KeyUpdateCommitted(KeyPhase),
    ForwardProgress,
    OneRttPacketAcknowledged,
    RttSample(Duration),
    StatelessReset,
    Retry {
        source_connection_id: ConnectionId,
        token: Vec<u8>,
        packet: Vec<u8>,
        integrity_tag: [u8; 16],
    },
    VersionNegotiation(Vec<Version>),
}

pub struct Connection<C: Context> {
    perspective: endpoint::Type,
    config: Config,
    supported_versions: Vec<Version>,
    state: State,
    close_state: Option<CloseState>,

    framer: Framer,
    received: ReceivedPacketManager,
    control: ControlFrameManager,
    notifier: SessionNotifier,
    sent: SentPacketMap,

    local_ids: LocalIdRegistry,
    peer_ids: PeerIdRegistry,

    default_path: Path,
    alternative_path: Option<Path>,
    /// A new peer address observed on a packet; committed once a
    /// non-probing packet arrives from it
    pending_migration: Option<SocketAddr>,

    next_packet_number: [u64; PacketNumberSpace::COUNT],
    one_rtt_sent_in_phase: bool,
    one_rtt_acked_in_phase: bool,

    idle: IdleNetworkDetector,
    blackhole: BlackholeDetector,
    ping: PingManager,
    mtu: MtuDiscoverer,
    retransmission_timer: Timer,
    discard_previous_one_rtt_timer: Timer,
    discard_zero_rtt_timer: Timer,
    multi_port_timer: Timer,
    consecutive_ptos: u64,

    latest_rtt: Option<Duration>,

    is_processing_packet: bool,
    /// One datagram buffered while the writer is blocked
    blocked_datagram: Option<(SocketAddr, Vec<u8>)>,
    /// Coalesced packets waiting to be flushed as one datagram
    datagram_buffer: Vec<u8>,
    /// Short header packets carry no length field and must close the
    /// datagram
    datagram_has_short_packet: bool,
    send_scratch: Vec<u8>,
    recv_scratch: Vec<u8>,
    undecryptable_packets: VecDeque<Vec<u8>>,

    retry_token: Vec<u8>,
    received_retry: bool,
    retry_validator: Option<Box<dyn IntegrityValidator>>,

    handshake_confirmed: bool,
    multi_port_stats: MultiPortStats,
    pending_ping: bool,
    pending_path_responses: Vec<[u8; 8]>,

    visitor: C::Visitor,
    writer: C::Writer,
    clock: C::Clock,
    random: C::Random,
    subscriber: C::Subscriber,
}

/// Construction parameters, mirroring the environment the endpoint hands
/// every new connection
pub struct ConnectionParameters<C: Context> {
    pub perspective: endpoint::Type,
    pub config: Config,
    pub supported_versions: Vec<Version>,
    pub local_address: SocketAddr,
    pub peer_address: SocketAddr,
    /// The connection ID the peer addresses us with
    pub local_connection_id: ConnectionId,
    /// The connection ID we address the peer with
    pub peer_connection_id: ConnectionId,
    pub local_reset_token: stateless_reset::Token,
    pub retry_validator: Option<Box<dyn IntegrityValidator>>,
    pub visitor: C::Visitor,
    pub writer: C::Writer,
    pub clock: C::Clock,
    pub random: C::Random,
    pub subscriber: C::Subscriber,
}

impl<C: Context> Connection<C> {
    pub fn new(parameters: ConnectionParameters<C>) -> Self {
        let ConnectionParameters {
            perspective,
            config,
            supported_versions,
            local_address,
            peer_address,
            local_connection_id,
            peer_connection_id,
            local_reset_token,
            retry_validator,
            visitor,
            writer,
            clock,
            random,
            subscriber,
        } = parameters;

        debug_assert!(config.initial_packet_number > 0);
        let now = clock.get_time();
        let version = supported_versions
            .first()
            .copied()
            .unwrap_or(packet::QUIC_VERSION_1);

        let mut default_path = Path::new(
            local_address,
            peer_address,
            local_connection_id,
            peer_connection_id,
        );
        // a client reached out on this path by its own choice
        if perspective.is_client() {
            default_path.validated = true;
        }

        let mut received = ReceivedPacketManager::new(config.ack_settings());
        received.enable_multiple_packet_number_spaces();

        let max_packet_length = config.max_packet_length;

        Self {
            perspective,
            framer: Framer::new(perspective, version, local_connection_id.len()),
            received,
            control: ControlFrameManager::new(),
            notifier: SessionNotifier::new(),
            sent: SentPacketMap::with_limit(config.max_outstanding_packets),
            local_ids: LocalIdRegistry::new(
                local_connection_id,
                local_reset_token,
                config.active_connection_id_limit as usize,
            ),
            peer_ids: PeerIdRegistry::new(
                peer_connection_id,
                config.active_connection_id_limit,
            ),
            default_path,
            alternative_path: None,
            pending_migration: None,
            next_packet_number: [config.initial_packet_number; PacketNumberSpace::COUNT],
            one_rtt_sent_in_phase: false,
            one_rtt_acked_in_phase: false,
            idle: IdleNetworkDetector::new(
                config.idle_network_timeout,
                config.handshake_timeout,
                now,
            ),
            blackhole: BlackholeDetector::new(config.blackhole_threshold),
            ping: PingManager::new(
                config.keep_alive_timeout,
                config.initial_retransmittable_on_wire_timeout,
                config.max_retransmittable_on_wire_count,
                config.max_aggressive_retransmittable_on_wire_count,
            ),
            mtu: MtuDiscoverer::new(1200, max_packet_length, Duration::from_secs(30)),
            retransmission_timer: Timer::default(),
            discard_previous_one_rtt_timer: Timer::default(),
            discard_zero_rtt_timer: Timer::default(),
            multi_port_timer: Timer::default(),
            consecutive_ptos: 0,
            latest_rtt: None,
            is_processing_packet: false,
            blocked_datagram: None,
            datagram_buffer: Vec::with_capacity(max_packet_length as usize),
            datagram_has_short_packet: false,
            send_scratch: alloc::vec![0; max_packet_length as usize],
            recv_scratch: Vec::new(),
            undecryptable_packets: VecDeque::new(),
            retry_token: Vec::new(),
            received_retry: false,
            retry_validator,
            handshake_confirmed: false,
            multi_port_stats: MultiPortStats::default(),
            pending_ping: false,
            pending_path_responses: Vec::new(),
            state: State::Handshaking,
            close_state: None,
            supported_versions,
            config,
            visitor,
            writer,
            clock,
            random,
            subscriber,
        }
    }

    // === accessors ===

    pub fn is_connected(&self) -> bool {
        !matches!(self.state, State::Closed)
    }

    pub fn handshake_confirmed(&self) -> bool {
        self.handshake_confirmed
    }

    pub fn peer_address(&self) -> SocketAddr {
        self.default_path.peer_address
    }

    pub fn multi_port_stats(&self) -> &MultiPortStats {
        &self.multi_port_stats
    }

    pub fn retry_token(&self) -> &[u8] {
        &self.retry_token
    }

    pub fn visitor(&self) -> &C::Visitor {
        &self.visitor
    }

    pub fn visitor_mut(&mut self) -> &mut C::Visitor {
        &mut self.visitor
    }

    pub fn writer(&self) -> &C::Writer {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut C::Writer {
        &mut self.writer
    }

    pub fn key_phase(&self) -> KeyPhase {
        self.framer.key_phase()
    }

    /// The datagram size ordinary packets must fit
    fn packet_capacity(&self) -> usize {
        (self.mtu.mtu() as usize).min(self.config.max_packet_length as usize)
    }

    // === transport parameter plumbing ===

    /// Applies the negotiated ack delay exponents, ours and the peer's
    pub fn set_ack_delay_exponents(&mut self, local: u8, peer: u8) {
        self.framer.set_ack_delay_exponents(local, peer);
    }

    /// Records the stateless reset token the peer advertised for its
    /// handshake connection ID
    pub fn set_peer_stateless_reset_token(&mut self, token: stateless_reset::Token) {
        self.peer_ids.set_initial_stateless_reset_token(token);
        self.default_path.stateless_reset_token = Some(token);
    }

    /// Issues fresh connection IDs up to the peer's active limit and
    /// announces them with NEW_CONNECTION_ID frames
    pub fn issue_connection_ids(&mut self) {
        while let Some(frame) = self.local_ids.issue(&mut self.random) {
            if self
                .control
                .write_or_buffer(ControlFrame::NewConnectionId(frame))
                .is_err()
            {
                self.close(connection::Error::TooManyBufferedControlFrames);
                return;
            }
        }
        self.drive_sends();
    }

    // === key management ===

    /// Installs packet protection keys for a level; buffered packets that
    /// could not be decrypted before are replayed
    pub fn install_key(&mut self, level: EncryptionLevel, key: Box<dyn PacketKey>) {
        self.framer.install_key(level, key);

        // 0-RTT keys survive briefly once 1-RTT takes over, then go away
        if level == EncryptionLevel::OneRtt && self.framer.has_key(EncryptionLevel::ZeroRtt) {
            let deadline = self.clock.get_time() + self.pto_delay().saturating_mul(3);
            self.discard_zero_rtt_timer.set(deadline);
        }

        self.replay_undecryptable_packets();
    }

    /// Drops initial keys and makes initial data non-retransmittable,
    /// called once handshake keys take over
    pub fn discard_initial_keys(&mut self) {
        self.framer.discard_key(EncryptionLevel::Initial);
        self.sent.discard_space(PacketNumberSpace::Initial);
        self.notifier.neuter_unencrypted_data();
    }

    /// Marks the handshake confirmed: handshake keys are discarded and
    /// key updates become possible
    pub fn on_handshake_confirmed(&mut self) {
        self.handshake_confirmed = true;
        self.state = State::Connected;
        self.idle.on_handshake_confirmed();
        self.framer.discard_key(EncryptionLevel::Handshake);
        self.sent.discard_space(PacketNumberSpace::Handshake);

        if self.perspective.is_server() {
            let _ = self
                .control
                .write_or_buffer(ControlFrame::HandshakeDone(frame::HandshakeDone));
            if let Some(token) = self.visitor.maybe_send_address_token() {
                let _ = self.control.write_or_buffer(ControlFrame::NewToken(token));
            }
            self.drive_sends();
        }
    }

    /// Initiates a local key update.
    //= https://www.rfc-editor.org/rfc/rfc9001#section-6.1
    //# An endpoint MUST NOT initiate a subsequent key update unless it
    //# has received an acknowledgment for a packet that was sent
    //# protected with keys from the current key phase.
    pub fn initiate_key_update(
        &mut self,
        new_key: Box<dyn PacketKey>,
    ) -> Result<(), connection::Error> {
        if !self.config.support_key_update
            || !self.handshake_confirmed
            || self.discard_previous_one_rtt_timer.is_armed()
        {
            return Err(connection::Error::InvalidFrameData("key update not allowed"));
        }

        if self.one_rtt_sent_in_phase && !self.one_rtt_acked_in_phase {
            return Err(connection::Error::InvalidFrameData(
                "key update not allowed until current phase is acknowledged",
            ));
        }

        self.framer.advance_one_rtt_keys(new_key);
        self.one_rtt_sent_in_phase = false;
        self.one_rtt_acked_in_phase = false;
        self.arm_discard_previous_one_rtt_timer();

        let phase = self.framer.key_phase();
        self.subscriber.on_key_update(event::KeyUpdate {
            phase,
            remotely_initiated: false,
        });
        self.visitor.on_key_update(phase, false);
        Ok(())
    }

    fn arm_discard_previous_one_rtt_timer(&mut self) {
        let deadline = self.clock.get_time() + self.pto_delay().saturating_mul(3);
        self.discard_previous_one_rtt_timer.set(deadline);
    }

    /// The retransmission period used for timer arming
    fn pto_delay(&self) -> Duration {
        let rtt = self.latest_rtt.unwrap_or(self.config.initial_rtt);
        rtt.saturating_mul(2) + self.config.local_max_ack_delay
    }

    // === incoming ===

    /// Feeds one received UDP datagram into the connection.
    ///
    /// Re-entry is a contract violation; writes triggered by frame
    /// dispatch are queued and flushed when processing completes.
    pub fn process_udp_packet(
        &mut self,
        local_address: SocketAddr,
        peer_address: SocketAddr,
        payload: &[u8],
        ecn: ExplicitCongestionNotification,
    ) {
        assert!(
            !self.is_processing_packet,
            "process_udp_packet is not re-entrant"
        );

        if matches!(self.state, State::Closed) {
            self.respond_while_closed(peer_address);
            return;
        }

        self.is_processing_packet = true;
        let now = self.clock.get_time();
        let _ = local_address;

        // count bytes against the anti-amplification ceiling
        if self.default_path.is_peer(peer_address) {
            self.default_path.on_bytes_received(payload.len());
        } else if let Some(path) = self
            .alternative_path
            .as_mut()
            .filter(|path| path.is_peer(peer_address))
        {
            path.on_bytes_received(payload.len());
        } else {
            // an unknown peer address: a potential migration, captured and
            // committed only if the packet proves non-probing
            self.pending_migration = Some(peer_address);
        }

        self.recv_scratch.clear();
        self.recv_scratch.extend_from_slice(payload);

        let mut actions = Vec::new();
        let pto_delay = self.pto_delay();
        let result = {
            let mut scratch = core::mem::take(&mut self.recv_scratch);
            let reset_tokens = self.peer_ids.reset_tokens();

            let mut dispatch = PacketDispatch {
                received: &mut self.received,
                control: &mut self.control,
                notifier: &mut self.notifier,
                sent: &mut self.sent,
                local_ids: &mut self.local_ids,
                peer_ids: &mut self.peer_ids,
                visitor: &mut self.visitor,
                subscriber: &mut self.subscriber,
                actions: &mut actions,
                now,
                pto_delay,
                peer_ack_delay_exponent: self.framer.peer_ack_delay_exponent(),
                first_sent_packet_number: self.config.initial_packet_number,
                next_packet_number: self.next_packet_number,
                perspective: self.perspective,
                drop_incoming_retry_packets: self.config.drop_incoming_retry_packets,
                received_retry: self.received_retry,
                any_non_probing: false,
            };

            let result =
                self.framer
                    .process_datagram(&mut scratch, ecn, &reset_tokens, &mut dispatch);
            let any_non_probing = dispatch.any_non_probing;
            self.recv_scratch = scratch;

            // a packet from a new peer address only commits a migration
            // once it is proven non-probing
            if any_non_probing {
                if let Some(peer) = self.pending_migration.take() {
                    self.commit_migration(peer);
                }
            }

            result
        };

        match result {
            Ok(()) => {
                self.idle.on_packet_received(now);
            }
            Err(connection::Error::MissingKey(_)) => {
                // keys for this level may arrive shortly
                self.buffer_undecryptable(payload);
            }
            Err(connection::Error::DecryptionFailure) => {
                // an unauthenticated packet never closes the connection
                self.subscriber.on_packet_dropped(event::PacketDropped {
                    reason: "decryption failure",
                });
            }
            Err(error) => {
                actions.push(Action::Close(error));
            }
        }

        self.apply_actions(actions, now);

        self.is_processing_packet = false;

        if self.is_connected() {
            self.drive_sends();
            self.update_ping_manager();
        }
    }

    fn buffer_undecryptable(&mut self, payload: &[u8]) {
        if self.undecryptable_packets.len() >= self.config.max_undecryptable_packets {
            self.undecryptable_packets.pop_front();
            self.subscriber.on_packet_dropped(event::PacketDropped {
                reason: "undecryptable packet buffer full",
            });
        }
        self.undecryptable_packets.push_back(payload.to_vec());
    }

    fn replay_undecryptable_packets(&mut self) {
        if self.undecryptable_packets.is_empty() || !self.is_connected() {
            return;
        }

        let packets: Vec<Vec<u8>> = self.undecryptable_packets.drain(..).collect();
        let peer = self.default_path.peer_address;
        let local = self.default_path.local_address;
        for packet in packets {
            if !self.is_connected() {
                break;
            }
            self.process_udp_packet(
                local,
                peer,
                &packet,
                ExplicitCongestionNotification::NotEct,
            );
        }
    }

    fn commit_migration(&mut self, peer_address: SocketAddr) {
        //= https://www.rfc-editor.org/rfc/rfc9000#section-9.3
        //# An endpoint only changes the address to which it sends packets in
        //# response to the highest-numbered non-probing packet.
        let mut new_path = Path::new(
            self.default_path.local_address,
            peer_address,
            self.default_path.local_connection_id,
            self.default_path.peer_connection_id,
        );

        // use a fresh peer-issued connection id on the new path when one
        // is available
        if let Some((id, token)) = self.peer_ids.claim_unused_id() {
            new_path.peer_connection_id = id;
            new_path.stateless_reset_token = token;
        }

        // migration resets congestion state; a validated alternative path
        // may carry its probed state over
        if let Some(alternative) = self.alternative_path.take() {
            if alternative.peer_address == peer_address && alternative.validated {
                new_path.validated = true;
                new_path.saved_congestion_state = alternative.saved_congestion_state;
                if let Some(saved) = alternative.saved_congestion_state {
                    self.latest_rtt = saved.rtt.or(self.latest_rtt);
                }
            }
        } else {
            self.latest_rtt = None;
        }

        let previous = core::mem::replace(&mut self.default_path, new_path);
        let _ = previous;

        self.subscriber.on_migration(event::Migration { peer_address });

        // validate the new path if it didn't come pre-validated
        if !self.default_path.validated {
            self.start_path_validation_on_default();
        }
    }

    fn start_path_validation_on_default(&mut self) {
        let data = self.default_path.start_challenge(
            &mut self.random,
            self.clock.get_time(),
            self.config.initial_rtt,
        );
        self.subscriber
            .on_path_challenge_sent(event::PathChallengeSent {
                peer_address: self.default_path.peer_address,
            });
        self.send_immediate_frame(frame::PathChallenge { data }.into(), true);
    }

    fn respond_while_closed(&mut self, peer_address: SocketAddr) {
        let Some(close_state) = self.close_state.as_mut() else {
            return;
        };
        if let Some(packets) = close_state.on_datagram_received() {
            let packets: Vec<Vec<u8>> = packets.to_vec();
            for packet in packets {
                let _ = self.writer.write_datagram(peer_address, &packet);
            }
        }
    }

    fn apply_actions(&mut self, actions: Vec<Action>, now: Timestamp) {
        for action in actions {
            match action {
                Action::SendPathResponse(data) => {
                    self.pending_path_responses.push(data);
                }
                Action::PathResponseReceived(data) => {
                    if self.default_path.on_path_response(&data) {
                        self.subscriber.on_path_validated(event::PathValidated {
                            peer_address: self.default_path.peer_address,
                        });
                    } else if let Some(path) = self.alternative_path.as_mut() {
                        if path.on_path_response(&data) {
                            path.saved_congestion_state = Some(path::SavedCongestionState {
                                rtt: self.latest_rtt,
                                congestion_window: None,
                            });
                            let peer_address = path.peer_address;
                            self.multi_port_stats.alt_path_rtt = self.latest_rtt;
                            self.subscriber
                                .on_path_validated(event::PathValidated { peer_address });
                        }
                    }
                }
                Action::RttSample(rtt) => {
                    self.latest_rtt = Some(rtt);
                    self.received.on_rtt_sample(rtt);
                }
                Action::MtuProbeAcked(packet_number) => {
                    if let Some(mtu) = self.mtu.on_probe_acked(packet_number) {
                        self.subscriber.on_mtu_updated(event::MtuUpdated { mtu });
                    }
                }
                Action::MtuProbeLost(packet_number) => {
                    self.mtu.on_probe_lost(packet_number);
                }
                Action::HandshakeDone => {
                    if self.perspective.is_client() {
                        self.on_handshake_confirmed();
                    }
                }
                Action::Close(error) => {
                    self.close(error);
                }
                Action::PeerClose {
                    error,
                    error_code,
                    quic_error_code,
                } => {
                    // a peer-initiated close is not answered with
                    // CONNECTION_CLOSE
                    self.enter_closed_with_packets(
                        error,
                        true,
                        Vec::new(),
                        Some((error_code, quic_error_code)),
                    );
                }
                Action::KeyUpdateCommitted(phase) => {
                    self.one_rtt_sent_in_phase = false;
                    self.one_rtt_acked_in_phase = false;
                    self.arm_discard_previous_one_rtt_timer();
                    self.subscriber.on_key_update(event::KeyUpdate {
                        phase,
                        remotely_initiated: true,
                    });
                }
                Action::ForwardProgress => {
                    self.blackhole.on_forward_progress();
                    self.ping.on_forward_progress();
                    self.consecutive_ptos = 0;
                }
                Action::OneRttPacketAcknowledged => {
                    self.one_rtt_acked_in_phase = true;
                }
                Action::StatelessReset => {
                    self.subscriber.on_stateless_reset(event::StatelessReset {});
                    self.enter_closed(connection::Error::StatelessReset, true, true);
                }
                Action::Retry {
                    source_connection_id,
                    token,
                    packet,
                    integrity_tag,
                } => {
                    self.on_retry_packet(source_connection_id, token, packet, integrity_tag);
                }
                Action::VersionNegotiation(versions) => {
                    self.on_version_negotiation(versions);
                }
            }
        }
    }

    fn on_retry_packet(
        &mut self,
        source_connection_id: ConnectionId,
        token: Vec<u8>,
        packet: Vec<u8>,
        integrity_tag: [u8; 16],
    ) {
        //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.5.2
        //# A client MUST accept and process at most one Retry packet for
        //# each connection attempt.
        if self.received_retry || self.perspective.is_server() {
            return;
        }

        if let Some(validator) = &self.retry_validator {
            let retry = Retry {
                version: self.framer_version(),
                destination_connection_id: self.default_path.local_connection_id,
                source_connection_id,
                retry_token: &token,
                integrity_tag,
            };
            let pseudo = retry.pseudo_packet(&self.default_path.peer_connection_id, &packet);
            if !validator.validate_retry_tag(&pseudo, &integrity_tag) {
                self.subscriber.on_packet_dropped(event::PacketDropped {
                    reason: "retry integrity tag mismatch",
                });
                return;
            }
        }

        self.received_retry = true;
        self.retry_token = token;

        // adopt the server's new source connection id as our destination
        self.peer_ids = PeerIdRegistry::new(
            source_connection_id,
            self.config.active_connection_id_limit,
        );
        self.default_path.peer_connection_id = source_connection_id;

        self.subscriber.on_retry_received(event::RetryReceived {});

        // resend the initial flight with the token attached
        self.notifier.mark_crypto_lost(EncryptionLevel::Initial);
        self.sent.discard_space(PacketNumberSpace::Initial);
    }

    fn on_version_negotiation(&mut self, versions: Vec<Version>) {
        if self.perspective.is_server() || self.handshake_confirmed {
            return;
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-6.2
        //# A client MUST discard a Version Negotiation packet that lists the
        //# QUIC version selected by the client.
        if versions.contains(&self.framer_version()) {
            return;
        }

        self.subscriber
            .on_version_negotiation_received(event::VersionNegotiationReceived {});

        let Some(version) = self
            .supported_versions
            .iter()
            .find(|version| versions.contains(version))
            .copied()
        else {
            self.close(connection::Error::HandshakeFailed);
            return;
        };

        self.framer.set_version(version);
        self.notifier.mark_crypto_lost(EncryptionLevel::Initial);
        self.sent.discard_space(PacketNumberSpace::Initial);
    }

    fn framer_version(&self) -> Version {
        self.framer.version()
    }

    // === outgoing ===

    /// Queues stream bytes; returns the amount consumed and whether a fin
    /// was sent
    pub fn send_stream_data(&mut self, stream_id: VarInt, length: u64, fin: bool) -> (u64, bool) {
        if !self.is_connected() {
            return (0, false);
        }

        let (result, _) = self.with_transmission(EncryptionLevel::OneRtt, |notifier, control, tx| {
            notifier.write_or_buffer_stream_data(stream_id, length, fin, tx, control)
        });
        self.finish_sends();
        result
    }

    /// Queues crypto bytes at a level; returns the amount consumed
    pub fn send_crypto_data(&mut self, level: EncryptionLevel, length: u64) -> u64 {
        if !self.is_connected() {
            return 0;
        }

        let (result, _) = self.with_transmission(level, |notifier, _control, tx| {
            notifier.write_crypto_data(level, length, tx)
        });

        if matches!(
            level,
            EncryptionLevel::Initial | EncryptionLevel::Handshake
        ) && result > 0
        {
            self.visitor.on_handshake_packet_sent();
        }

        self.finish_sends();
        result
    }

    /// Buffers a retransmittable control frame
    pub fn send_control_frame(&mut self, control_frame: ControlFrame) -> Result<(), connection::Error> {
        if !self.is_connected() {
            return Err(connection::Error::NoError);
        }

        if let Err(error) = self.control.write_or_buffer(control_frame) {
            self.close(error);
            return Err(error);
        }
        self.drive_sends();
        Ok(())
    }

    /// Sends a MESSAGE frame; unreliable and never retransmitted
    pub fn send_message(&mut self, data: &[u8]) -> Result<(), connection::Error> {
        if !self.framer.has_key(EncryptionLevel::OneRtt) {
            return Err(connection::Error::MissingKey(EncryptionLevel::OneRtt));
        }

        let (sent, _) = self.with_transmission(EncryptionLevel::OneRtt, |_notifier, _control, tx| {
            tx.encode_frame(
                &frame::Datagram {
                    is_last_frame: false,
                    data,
                },
                SentFrame::Ping,
            )
        });
        self.finish_sends();

        if sent {
            Ok(())
        } else {
            Err(connection::Error::InvalidFrameData("message too large"))
        }
    }

    /// The writer drained after reporting blocked
    pub fn on_blocked_writer_can_write(&mut self) {
        if let Some((peer, datagram)) = self.blocked_datagram.take() {
            match self.writer.write_datagram(peer, &datagram) {
                WriteResult::Written => {}
                WriteResult::Blocked => {
                    self.blocked_datagram = Some((peer, datagram));
                    return;
                }
                WriteResult::Fatal(reason) => {
                    self.close(connection::Error::PacketWriteError(reason));
                    return;
                }
            }
        }

        self.drive_sends();
    }

    /// Closes the connection locally, emitting CONNECTION_CLOSE at the
    /// highest decryptable level and stashing termination packets
    pub fn close(&mut self, error: connection::Error) {
        if matches!(self.state, State::Closed) {
            return;
        }

        let termination_packets = self.build_termination_packets(error);
        for packet in &termination_packets {
            let _ = self
                .writer
                .write_datagram(self.default_path.peer_address, packet);
        }

        self.enter_closed_with_packets(error, false, termination_packets, None);
    }

    /// Ends the connection without emitting CONNECTION_CLOSE: peer closes,
    /// stateless resets, and pre-confirmation timeouts
    fn enter_closed(&mut self, error: connection::Error, remote: bool, _silent: bool) {
        if matches!(self.state, State::Closed) {
            return;
        }
        self.enter_closed_with_packets(error, remote, Vec::new(), None);
    }

    fn enter_closed_with_packets(
        &mut self,
        error: connection::Error,
        remote: bool,
        termination_packets: Vec<Vec<u8>>,
        peer_error: Option<(VarInt, Option<u64>)>,
    ) {
        if matches!(self.state, State::Closed) {
            return;
        }
        self.state = State::Closed;

        let mut close_state = CloseState::new(error, remote, termination_packets);
        if let Some((error_code, quic_error_code)) = peer_error {
            close_state = close_state.with_peer_error(error_code, quic_error_code);
        }
        self.close_state = Some(close_state);

        // closing permanently cancels every alarm
        self.retransmission_timer.cancel();
        self.discard_previous_one_rtt_timer.cancel();
        self.discard_zero_rtt_timer.cancel();
        self.multi_port_timer.cancel();
        self.ping.cancel();

        self.subscriber.on_connection_closed(event::ConnectionClosed {
            error,
            remotely_initiated: remote,
            peer_quic_error_code: peer_error.and_then(|(_, quic_error_code)| quic_error_code),
        });
        self.visitor.on_connection_closed(error, remote);
    }

    /// The error code the peer's CONNECTION_CLOSE carried, if the peer
    /// closed the connection
    pub fn peer_close_error_code(&self) -> Option<VarInt> {
        self.close_state
            .as_ref()
            .and_then(CloseState::peer_error_code)
    }

    /// The more specific error code the peer tunneled through its
    /// CONNECTION_CLOSE reason phrase, if any
    pub fn peer_quic_error_code(&self) -> Option<u64> {
        self.close_state
            .as_ref()
            .and_then(CloseState::peer_quic_error_code)
    }

    /// Builds one CONNECTION_CLOSE packet per decryptable space, at most
    /// two
    fn build_termination_packets(&mut self, error: connection::Error) -> Vec<Vec<u8>> {
        let close_frame = frame::ConnectionClose {
            error_code: error.close_code(),
            frame_type: Some(VarInt::ZERO),
            quic_error_code: None,
            reason: error.detail().map(|detail| detail.as_bytes()),
        };

        let mut levels: Vec<EncryptionLevel> = Vec::new();
        if self.framer.has_key(EncryptionLevel::OneRtt) {
            levels.push(EncryptionLevel::OneRtt);
        } else if self.framer.has_key(EncryptionLevel::Handshake) {
            levels.push(EncryptionLevel::Handshake);
        }
        if !self.handshake_confirmed && self.framer.has_key(EncryptionLevel::Initial) {
            levels.push(EncryptionLevel::Initial);
        }

        let mut packets = Vec::new();
        for level in levels.into_iter().take(2) {
            let mut payload = [0u8; 256];
            let payload_len = {
                let mut encoder = EncoderBuffer::new(&mut payload);
                encoder.encode(&close_frame);
                encoder.len()
            };

            if let Ok(packet) = self.seal_into_vec(level, &payload[..payload_len], &[]) {
                packets.push(packet);
            }
        }

        packets
    }

    // === timers ===

    /// The earliest deadline across every component timer
    pub fn next_timeout(&self) -> Option<Timestamp> {
        if !self.is_connected() {
            return None;
        }

        let mut deadlines: Vec<Option<Timestamp>> = alloc::vec![
            self.idle.next_timeout(),
            self.ping.next_timeout(),
            self.retransmission_timer.expiration(),
            self.discard_previous_one_rtt_timer.expiration(),
            self.discard_zero_rtt_timer.expiration(),
            self.multi_port_timer.expiration(),
            self.mtu.next_timeout(),
            self.local_ids.next_retirement_deadline(),
            self.default_path.challenge_deadline(),
        ];

        for space in PacketNumberSpace::all() {
            deadlines.push(self.received.ack_timeout(space));
        }
        if let Some(path) = &self.alternative_path {
            deadlines.push(path.challenge_deadline());
        }

        deadlines.into_iter().flatten().min()
    }

    /// Fires every expired timer. Timers firing after close are no-ops.
    pub fn on_timeout(&mut self, now: Timestamp) {
        if !self.is_connected() {
            return;
        }

        if let Some(error) = self.idle.on_timeout(now) {
            // an unconfirmed peer gets no CONNECTION_CLOSE
            if self.handshake_confirmed {
                self.close(error);
            } else {
                self.enter_closed(error, false, true);
            }
            return;
        }

        if self.discard_previous_one_rtt_timer.poll_expiration(now).is_ready() {
            self.framer.discard_previous_one_rtt_key();
        }

        if self.discard_zero_rtt_timer.poll_expiration(now).is_ready() {
            self.framer.discard_key(EncryptionLevel::ZeroRtt);
        }

        if self.retransmission_timer.poll_expiration(now).is_ready() {
            self.on_retransmission_timeout(now);
            if !self.is_connected() {
                return;
            }
        }

        if self.local_ids.on_timeout(now) > 0 {
            // retired ids drained
        }

        // path validation retries
        if self
            .default_path
            .challenge_deadline()
            .map_or(false, |deadline| deadline.has_elapsed(now))
        {
            match self
                .default_path
                .on_challenge_timeout(now, self.config.initial_rtt)
            {
                Some(data) => {
                    self.send_immediate_frame(frame::PathChallenge { data }.into(), true)
                }
                None => {
                    // validation failed with no fallback path
                    self.close(connection::Error::PathDegrading);
                    return;
                }
            }
        }

        let mut alternative_probe = None;
        let mut abandon_alternative = false;
        if let Some(path) = self.alternative_path.as_mut() {
            if path
                .challenge_deadline()
                .map_or(false, |deadline| deadline.has_elapsed(now))
            {
                match path.on_challenge_timeout(now, self.config.initial_rtt) {
                    Some(data) => alternative_probe = Some((path.peer_address, data)),
                    None => abandon_alternative = true,
                }
            }
        }
        if abandon_alternative {
            // the alternative path is abandoned
            self.alternative_path = None;
        }
        if let Some((peer, data)) = alternative_probe {
            self.send_probe_on(peer, frame::PathChallenge { data }.into());
            if self.blackhole.is_path_degrading() {
                self.multi_port_stats.probe_failures_when_path_degrading += 1;
            } else {
                self.multi_port_stats.probe_failures_when_path_not_degrading += 1;
            }
        }

        if let Some(action) = self.ping.on_timeout(now) {
            match action {
                PingAction::KeepAlive | PingAction::RetransmittableOnWire => {
                    self.pending_ping = true;
                }
            }
        }

        if let Some(probe_size) = self.mtu.on_timeout(now) {
            self.send_mtu_probe(probe_size, now);
        }

        if self.multi_port_timer.poll_expiration(now).is_ready() {
            self.run_multi_port_probe(now);
        }

        if self.is_connected() {
            self.drive_sends();
            self.update_ping_manager();
        }
    }

    fn on_retransmission_timeout(&mut self, now: Timestamp) {
        self.consecutive_ptos += 1;

        if self.blackhole.on_retransmission_timeout() {
            self.close(connection::Error::BlackholeDetected);
            return;
        }

        // resend the oldest outstanding data, preferring handshake spaces
        let mut retransmitted = false;
        for space in PacketNumberSpace::all() {
            if let Some((_, info)) = self.sent.detach_oldest_ack_eliciting(space) {
                let frames: Vec<SentFrame> = info.frames.to_vec();
                self.with_transmission(info.encryption_level, |notifier, control, tx| {
                    notifier.retransmit_frames(
                        &frames,
                        TransmissionType::PtoRetransmission,
                        tx,
                        control,
                    )
                });
                retransmitted = true;
                break;
            }
        }

        if !retransmitted {
            self.pending_ping = true;
        }

        // exponential backoff while the timeouts repeat
        let backoff = self
            .pto_delay()
            .saturating_mul(1u32 << self.consecutive_ptos.min(6) as u32);
        self.retransmission_timer.set(now + backoff);
    }

    fn run_multi_port_probe(&mut self, now: Timestamp) {
        let Some(interval) = self.config.multi_port_probing_interval else {
            return;
        };
        self.multi_port_timer.set(now + interval);

        let Some(path) = self.alternative_path.as_mut() else {
            return;
        };
        if path.challenge.is_none() && !path.validated {
            let data = path.start_challenge(&mut self.random, now, self.config.initial_rtt);
            let peer = path.peer_address;
            self.send_probe_on(peer, frame::PathChallenge { data }.into());
        }
    }

    /// Registers an alternative path and begins probing it periodically
    pub fn enable_multi_port(&mut self, local_address: SocketAddr) {
        let Some(interval) = self.config.multi_port_probing_interval else {
            return;
        };

        let (peer_connection_id, token) = self
            .peer_ids
            .claim_unused_id()
            .unwrap_or((self.default_path.peer_connection_id, None));

        let mut path = Path::new(
            local_address,
            self.default_path.peer_address,
            self.default_path.local_connection_id,
            peer_connection_id,
        );
        path.stateless_reset_token = token;
        self.alternative_path = Some(path);
        self.multi_port_timer.set(self.clock.get_time() + interval);
    }

    /// Turns on MTU discovery probing
    pub fn enable_mtu_discovery(&mut self) {
        self.mtu.enable(self.clock.get_time());
    }

    fn update_ping_manager(&mut self) {
        let now = self.clock.get_time();
        let should_keep_alive = self.visitor.should_keep_connection_alive();
        let has_retransmittable = self.sent.has_in_flight_ack_eliciting();
        self.ping.update(now, should_keep_alive, has_retransmittable);
    }
}

/// The AEAD tag length every supported cipher uses
const TAG_LEN: usize = 16;

impl<C: Context> Connection<C> {
    // === packet assembly ===

    fn header_overhead(&self, level: EncryptionLevel) -> usize {
        let dcid = self.default_path.peer_connection_id.len();
        let scid = self.default_path.local_connection_id.len();

        match level {
            EncryptionLevel::OneRtt => 1 + dcid + 4,
            EncryptionLevel::Initial => {
                let token_len = self.retry_token.len();
                let token_prefix = VarInt::from_u32(token_len as u32).encoding_size();
                1 + 4 + 1 + dcid + 1 + scid + token_prefix + token_len + 2 + 4
            }
            _ => 1 + 4 + 1 + dcid + 1 + scid + 2 + 4,
        }
    }

    fn payload_capacity(&self, level: EncryptionLevel) -> usize {
        self.packet_capacity()
            .saturating_sub(self.header_overhead(level))
            .saturating_sub(TAG_LEN)
    }

    /// Runs `f` with a frame assembly scope for one packet at `level`.
    /// A due ACK frame is attached first; if anything was encoded the
    /// packet is sealed and queued for the current datagram.
    fn with_transmission<R>(
        &mut self,
        level: EncryptionLevel,
        f: impl FnOnce(&mut SessionNotifier, &mut ControlFrameManager, &mut Transmission<C::Visitor>) -> R,
    ) -> (R, bool) {
        let now = self.clock.get_time();
        let space = level.packet_number_space();

        let mut capacity = self.payload_capacity(level);
        // servers stay under the anti-amplification ceiling until the
        // peer's address is validated
        if self.perspective.is_server() {
            let credit = self
                .default_path
                .amplification_credit(self.config.anti_amplification_factor);
            if (credit as usize) < self.packet_capacity() {
                capacity = 0;
            }
        }

        let mut scratch = core::mem::take(&mut self.send_scratch);
        if scratch.len() < capacity {
            scratch.resize(capacity, 0);
        }

        let mut tx = Transmission {
            level,
            buffer: &mut scratch[..capacity],
            position: 0,
            frames: SmallVec::new(),
            ack_eliciting: false,
            sealed: false,
            visitor: &mut self.visitor,
        };

        if capacity > 0 && self.received.ack_frame_required(space, now) {
            if let Some(data) = self.received.get_updated_ack_frame(space, now) {
                let ack = frame::Ack {
                    ack_delay: self.framer.encode_ack_delay(data.ack_delay),
                    ack_ranges: &data.ranges[..],
                    ecn_counts: data.ecn_counts,
                    receive_timestamps: data.receive_timestamps,
                };
                if !tx.encode_frame(&ack, SentFrame::Ack) {
                    // no room this time; latch so the next packet retries
                    self.received.on_immediate_ack(space, now);
                }
            }
        }

        let result = f(&mut self.notifier, &mut self.control, &mut tx);

        let mut used = tx.position;
        let frames = core::mem::take(&mut tx.frames);
        let ack_eliciting = tx.ack_eliciting;
        drop(tx);

        let mut wrote = false;
        if used > 0 {
            //= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
            //# A client MUST expand the payload of all UDP datagrams carrying
            //# Initial packets to at least the smallest allowed maximum
            //# datagram size of 1200 bytes
            if level == EncryptionLevel::Initial && self.perspective.is_client() {
                let min_payload = 1200usize
                    .saturating_sub(self.header_overhead(level))
                    .saturating_sub(TAG_LEN)
                    .min(capacity);
                if used < min_payload {
                    scratch[used..min_payload].fill(0);
                    used = min_payload;
                }
            }

            wrote = self.queue_packet(level, &scratch[..used], frames, ack_eliciting, now);
        }

        self.send_scratch = scratch;
        (result, wrote)
    }

    /// Seals a payload as the next packet in its space and appends it to
    /// the datagram being coalesced
    fn queue_packet(
        &mut self,
        level: EncryptionLevel,
        payload: &[u8],
        frames: SmallVec<[SentFrame; 4]>,
        ack_eliciting: bool,
        now: Timestamp,
    ) -> bool {
        let space = level.packet_number_space();
        let Ok(packet_number_value) = VarInt::new(self.next_packet_number[space.as_index()]) else {
            self.close(connection::Error::TooManyOutstandingPackets);
            return false;
        };
        let packet_number = space.new_packet_number(packet_number_value);
        let largest_acked = self.sent.largest_acked_packet_number(space);

        let token: &[u8] = if level == EncryptionLevel::Initial {
            &self.retry_token
        } else {
            &[]
        };
        let params = PacketParams {
            encryption_level: level,
            destination_connection_id: self.default_path.peer_connection_id,
            source_connection_id: self.default_path.local_connection_id,
            token,
            packet_number,
            largest_acked,
            spin_bit: false,
        };

        let mut out = alloc::vec![0u8; payload.len() + self.header_overhead(level) + TAG_LEN + 8];
        let len = match self.framer.seal_packet(&mut out, &params, payload) {
            Ok(len) => len,
            Err(error) => {
                self.close(error);
                return false;
            }
        };

        // coalesce while the datagram has room; a short header packet
        // always terminates the datagram it is in
        if !self.datagram_buffer.is_empty()
            && (self.datagram_has_short_packet
                || self.datagram_buffer.len() + len > self.packet_capacity())
        {
            self.flush_datagram();
        }
        self.datagram_buffer.extend_from_slice(&out[..len]);
        self.datagram_has_short_packet |= level == EncryptionLevel::OneRtt;

        self.next_packet_number[space.as_index()] += 1;
        if level == EncryptionLevel::OneRtt {
            self.one_rtt_sent_in_phase = true;
        }
        self.default_path.on_bytes_sent(len);

        let info = SentPacketInfo {
            sent_time: now,
            encryption_level: level,
            transmission_type: TransmissionType::NotRetransmission,
            size: len as u16,
            ack_eliciting,
            in_flight: true,
            frames,
        };
        if let Err(error) = self.sent.on_packet_sent(packet_number, info) {
            self.close(error);
            return false;
        }

        self.subscriber.on_packet_sent(event::PacketSent {
            packet_number: packet_number.as_u64(),
            encryption_level: level,
            len,
        });

        if ack_eliciting && !self.retransmission_timer.is_armed() {
            self.retransmission_timer.set(now + self.pto_delay());
        }

        true
    }

    fn writer_blocked(&self) -> bool {
        self.blocked_datagram.is_some() || self.writer.is_blocked()
    }

    fn flush_datagram(&mut self) -> bool {
        if self.datagram_buffer.is_empty() {
            return true;
        }

        let datagram = core::mem::take(&mut self.datagram_buffer);
        self.datagram_has_short_packet = false;
        let peer = self.default_path.peer_address;

        match self.writer.write_datagram(peer, &datagram) {
            WriteResult::Written => true,
            WriteResult::Blocked => {
                self.blocked_datagram = Some((peer, datagram));
                false
            }
            WriteResult::Fatal(reason) => {
                self.close(connection::Error::PacketWriteError(reason));
                false
            }
        }
    }

    fn ack_due(&self, level: EncryptionLevel) -> bool {
        let now = self.clock.get_time();
        self.received
            .ack_frame_required(level.packet_number_space(), now)
    }

    /// Coalesces and emits everything currently pending: handshake
    /// crypto, acks, control frames, and stream data
    fn drive_sends(&mut self) {
        if self.is_processing_packet || !self.is_connected() {
            return;
        }

        // queued connection id retirements become control frames
        if self.peer_ids.has_pending_retirements() {
            for sequence_number in self.peer_ids.pending_retirements() {
                if let Ok(sequence_number) = VarInt::new(sequence_number) {
                    let frame = ControlFrame::RetireConnectionId(frame::RetireConnectionId {
                        sequence_number,
                    });
                    if let Err(error) = self.control.write_or_buffer(frame) {
                        self.close(error);
                        return;
                    }
                }
            }
        }

        for level in [EncryptionLevel::Initial, EncryptionLevel::Handshake] {
            loop {
                if self.writer_blocked() || !self.framer.has_key(level) {
                    break;
                }
                if !self.notifier.has_crypto_work(level) && !self.ack_due(level) {
                    break;
                }
                let (_, wrote) = self.with_transmission(level, |notifier, _control, tx| {
                    notifier.drive_crypto_level(level, tx);
                });
                if !wrote {
                    break;
                }
            }
        }

        loop {
            if self.writer_blocked() || !self.framer.has_key(EncryptionLevel::OneRtt) {
                break;
            }

            let work = self.ack_due(EncryptionLevel::OneRtt)
                || self.pending_ping
                || !self.pending_path_responses.is_empty()
                || self.control.has_buffered_frames()
                || self.control.has_pending_retransmission()
                || self.notifier.has_buffered_data()
                || self.notifier.has_lost_data();
            if !work {
                break;
            }

            let responses = core::mem::take(&mut self.pending_path_responses);
            let ping = core::mem::take(&mut self.pending_ping);

            let ((unsent_responses, unsent_ping), wrote) =
                self.with_transmission(EncryptionLevel::OneRtt, move |notifier, control, tx| {
                    let mut unsent = Vec::new();
                    let mut iter = responses.into_iter();
                    for data in iter.by_ref() {
                        //= https://www.rfc-editor.org/rfc/rfc9000#section-8.2.2
                        //# A PATH_RESPONSE frame MUST be sent on the network path
                        //# where the PATH_CHALLENGE frame was received.
                        if !tx.encode_frame(&frame::PathResponse { data }, SentFrame::Ping) {
                            unsent.push(data);
                            break;
                        }
                    }
                    unsent.extend(iter);

                    let unsent_ping =
                        ping && !tx.encode_frame(&frame::Ping, SentFrame::Ping);

                    notifier.on_can_write(tx, control);
                    (unsent, unsent_ping)
                });

            self.pending_path_responses.extend(unsent_responses);
            self.pending_ping |= unsent_ping;

            if !wrote {
                break;
            }
        }

        self.flush_datagram();
        self.arm_retransmission_timer();
    }

    fn finish_sends(&mut self) {
        self.drive_sends();
    }

    fn arm_retransmission_timer(&mut self) {
        if !self.sent.has_in_flight_ack_eliciting() {
            self.retransmission_timer.cancel();
            self.consecutive_ptos = 0;
        } else if !self.retransmission_timer.is_armed() {
            self.retransmission_timer
                .set(self.clock.get_time() + self.pto_delay());
        }
    }

    /// Sends a single small frame in its own 1-RTT packet right away
    fn send_immediate_frame(&mut self, frame: frame::Frame<'static>, ack_eliciting: bool) {
        if !self.framer.has_key(EncryptionLevel::OneRtt) || !self.is_connected() {
            return;
        }

        let sent_frame = match &frame {
            frame::Frame::PathChallenge(challenge) => SentFrame::PathChallenge {
                data: challenge.data,
            },
            _ => SentFrame::Ping,
        };

        let _ = self.with_transmission(EncryptionLevel::OneRtt, |_notifier, _control, tx| {
            if ack_eliciting {
                tx.encode_frame(&frame, sent_frame)
            } else {
                tx.encode_frame(&frame, SentFrame::Ack)
            }
        });

        if !self.is_processing_packet {
            self.flush_datagram();
            self.arm_retransmission_timer();
        }
    }

    /// Seals one standalone packet; used for termination packets and
    /// off-path probes
    fn seal_into_vec(
        &mut self,
        level: EncryptionLevel,
        payload: &[u8],
        token: &[u8],
    ) -> Result<Vec<u8>, connection::Error> {
        let space = level.packet_number_space();
        let packet_number_value = VarInt::new(self.next_packet_number[space.as_index()])
            .map_err(|_| connection::Error::TooManyOutstandingPackets)?;
        let packet_number = space.new_packet_number(packet_number_value);
        let largest_acked = self.sent.largest_acked_packet_number(space);

        let params = PacketParams {
            encryption_level: level,
            destination_connection_id: self.default_path.peer_connection_id,
            source_connection_id: self.default_path.local_connection_id,
            token,
            packet_number,
            largest_acked,
            spin_bit: false,
        };

        let mut out = alloc::vec![0u8; payload.len() + self.header_overhead(level) + TAG_LEN + 8];
        let len = self.framer.seal_packet(&mut out, &params, payload)?;
        out.truncate(len);
        self.next_packet_number[space.as_index()] += 1;
        Ok(out)
    }

    /// Sends a probing frame directly to `peer`, off the default path
    fn send_probe_on(&mut self, peer: SocketAddr, frame: frame::Frame<'static>) {
        if !self.framer.has_key(EncryptionLevel::OneRtt) {
            return;
        }

        let mut payload = [0u8; 64];
        let payload_len = {
            let mut encoder = EncoderBuffer::new(&mut payload);
            encoder.encode(&frame);
            encoder.len()
        };

        if let Ok(packet) = self.seal_into_vec(EncryptionLevel::OneRtt, &payload[..payload_len], &[])
        {
            let _ = self.writer.write_datagram(peer, &packet);
        }
    }

    /// Emits an MTU probe: a PING padded to the target size, in its own
    /// datagram
    fn send_mtu_probe(&mut self, probe_size: u16, now: Timestamp) {
        if !self.framer.has_key(EncryptionLevel::OneRtt) {
            return;
        }

        self.flush_datagram();

        let overhead = self.header_overhead(EncryptionLevel::OneRtt) + TAG_LEN;
        let Some(payload_len) = (probe_size as usize).checked_sub(overhead) else {
            return;
        };

        let mut payload = alloc::vec![0u8; payload_len];
        // a PING followed by padding
        payload[0] = 0x01;

        let space = PacketNumberSpace::ApplicationData;
        let Ok(packet_number_value) = VarInt::new(self.next_packet_number[space.as_index()])
        else {
            return;
        };
        let packet_number = space.new_packet_number(packet_number_value);

        let packet = match self.seal_into_vec(EncryptionLevel::OneRtt, &payload, &[]) {
            Ok(packet) => packet,
            Err(_) => return,
        };

        match self.writer.write_datagram(self.default_path.peer_address, &packet) {
            WriteResult::Written => {
                let mut frames = SmallVec::new();
                frames.push(SentFrame::MtuProbe { size: probe_size });
                let info = SentPacketInfo {
                    sent_time: now,
                    encryption_level: EncryptionLevel::OneRtt,
                    transmission_type: TransmissionType::NotRetransmission,
                    size: packet.len() as u16,
                    ack_eliciting: true,
                    in_flight: true,
                    frames,
                };
                if self.sent.on_packet_sent(packet_number, info).is_ok() {
                    self.mtu.on_probe_sent(packet_number, now);
                }
            }
            WriteResult::Blocked => {
                // retry at the next probe interval
            }
            WriteResult::Fatal(_) => {
                //= https://www.rfc-editor.org/rfc/rfc9000#section-14.3
                //# PMTU probes MUST NOT be counted as losses by the loss
                //# detection algorithm.
                self.mtu.on_write_error();
            }
        }
    }
}

/// A frame assembly scope for one outgoing packet. Implements the write
/// hooks the managers drive data through.
struct Transmission<'a, V: Visitor> {
    level: EncryptionLevel,
    buffer: &'a mut [u8],
    position: usize,
    frames: SmallVec<[SentFrame; 4]>,
    ack_eliciting: bool,
    /// A frame without a length prefix was written; nothing may follow
    sealed: bool,
    visitor: &'a mut V,
}

impl<'a, V: Visitor> Transmission<'a, V> {
    fn remaining(&self) -> usize {
        if self.sealed {
            0
        } else {
            self.buffer.len() - self.position
        }
    }

    /// Encodes a frame if it fits, recording what the packet carries
    fn encode_frame(&mut self, value: &impl EncoderValue, sent: SentFrame) -> bool {
        let size = value.encoding_size();
        if size > self.remaining() {
            return false;
        }

        let mut encoder = EncoderBuffer::new(&mut self.buffer[self.position..]);
        encoder.encode(value);
        self.position += encoder.len();

        self.ack_eliciting |= !matches!(sent, SentFrame::Ack);
        self.frames.push(sent);
        true
    }
}

impl<'a, V: Visitor> FrameSender for Transmission<'a, V> {
    fn send_control_frame(
        &mut self,
        id: u64,
        frame: &ControlFrame,
        _transmission_type: TransmissionType,
    ) -> bool {
        if self.level != EncryptionLevel::OneRtt {
            return false;
        }
        self.encode_frame(frame, SentFrame::Control { id })
    }
}

impl<'a, V: Visitor> DataSender for Transmission<'a, V> {
    fn send_stream_data(
        &mut self,
        stream_id: VarInt,
        offset: u64,
        length: u64,
        fin: bool,
        _transmission_type: TransmissionType,
    ) -> (u64, bool) {
        if self.level != EncryptionLevel::OneRtt || self.sealed {
            return (0, false);
        }
        let Ok(offset) = VarInt::new(offset) else {
            return (0, false);
        };

        let mut probe = frame::Stream {
            stream_id,
            offset,
            is_last_frame: false,
            is_fin: fin,
            data: frame::Padding {
                length: length.min(u16::MAX as u64) as usize,
            },
        };
        let Ok(data_len) = probe.try_fit(self.remaining()) else {
            return (0, false);
        };
        if data_len == 0 && !(fin && length == 0) {
            return (0, false);
        }

        let fin_included = fin && data_len as u64 == length;

        let mut data = alloc::vec![0u8; data_len];
        self.visitor.fill_stream_data(stream_id, offset.as_u64(), &mut data);

        let frame = frame::Stream {
            stream_id,
            offset,
            is_last_frame: probe.is_last_frame,
            is_fin: fin_included,
            data: &data[..],
        };

        let sent = SentFrame::Stream {
            stream_id,
            offset: offset.as_u64(),
            length: data_len as u64,
            is_fin: fin_included,
        };
        if !self.encode_frame(&frame, sent) {
            return (0, false);
        }
        if probe.is_last_frame {
            self.sealed = true;
        }

        (data_len as u64, fin_included)
    }

    fn send_crypto_data(
        &mut self,
        level: EncryptionLevel,
        offset: u64,
        length: u64,
        _transmission_type: TransmissionType,
    ) -> u64 {
        if level != self.level || self.sealed {
            return 0;
        }
        let Ok(offset_varint) = VarInt::new(offset) else {
            return 0;
        };

        let header = 1 + offset_varint.encoding_size();
        let available = self.remaining().saturating_sub(header);
        if available <= 1 {
            return 0;
        }
        let prefix = VarInt::from_u32(available.min(u32::MAX as usize) as u32).encoding_size();
        let data_len = (length as usize).min(available.saturating_sub(prefix));
        if data_len == 0 {
            return 0;
        }

        let mut data = alloc::vec![0u8; data_len];
        self.visitor.fill_crypto_data(level, offset, &mut data);

        let frame = frame::Crypto {
            offset: offset_varint,
            data: &data[..],
        };
        let sent = SentFrame::Crypto {
            level,
            offset,
            length: data_len as u64,
        };
        if !self.encode_frame(&frame, sent) {
            return 0;
        }

        data_len as u64
    }
}

/// Borrows the managers during frame dispatch so the framer can deliver
/// without holding the whole connection mutably. Whole-connection effects
/// are queued as [`Action`]s.
struct PacketDispatch<'a, V: Visitor, S: Subscriber> {
    received: &'a mut ReceivedPacketManager,
    control: &'a mut ControlFrameManager,
    notifier: &'a mut SessionNotifier,
    sent: &'a mut SentPacketMap,
    local_ids: &'a mut LocalIdRegistry,
    peer_ids: &'a mut PeerIdRegistry,
    visitor: &'a mut V,
    subscriber: &'a mut S,
    actions: &'a mut Vec<Action>,
    now: Timestamp,
    pto_delay: Duration,
    peer_ack_delay_exponent: u8,
    first_sent_packet_number: u64,
    next_packet_number: [u64; PacketNumberSpace::COUNT],
    perspective: endpoint::Type,
    drop_incoming_retry_packets: bool,
    received_retry: bool,
    any_non_probing: bool,
}

impl<'a, V: Visitor, S: Subscriber> framer::Visitor for PacketDispatch<'a, V, S> {
    fn on_stream_frame(&mut self, frame: frame::StreamRef) -> Result<(), connection::Error> {
        self.visitor.on_stream_frame(frame)
    }

    fn on_crypto_frame(
        &mut self,
        level: EncryptionLevel,
        frame: frame::CryptoRef,
    ) -> Result<(), connection::Error> {
        self.visitor.on_crypto_frame(level, frame)
    }

    fn on_ack_frame(
        &mut self,
        space: PacketNumberSpace,
        frame: frame::Ack<frame::AckRangesDecoder>,
    ) -> Result<(), connection::Error> {
        let largest_acked = frame.largest_acknowledged().as_u64();

        if self.next_packet_number[space.as_index()] <= largest_acked {
            return Err(connection::Error::InvalidFrameData(
                "ack for a packet that was never sent",
            ));
        }

        let ack_delay = Duration::from_micros(
            frame.ack_delay.as_u64() << self.peer_ack_delay_exponent,
        );

        let mut any_newly_acked = false;

        // ranges iterate from highest to lowest
        for range in frame.ack_ranges() {
            let (start, end) = range.into_inner();

            if start.as_u64() < self.first_sent_packet_number {
                return Err(connection::Error::InvalidFrameData(
                    "ack range below the first sent packet",
                ));
            }

            let acked = self.sent.on_ack_range(space, start.as_u64()..=end.as_u64());

            for (packet_number_value, info) in acked {
                any_newly_acked = true;

                if packet_number_value == largest_acked {
                    let rtt = self
                        .now
                        .saturating_duration_since(info.sent_time)
                        .saturating_sub(ack_delay);
                    if rtt > Duration::ZERO {
                        self.actions.push(Action::RttSample(rtt));
                    }
                }

                let packet_number = VarInt::new(packet_number_value)
                    .map(|value| space.new_packet_number(value))
                    .ok();

                for sent_frame in &info.frames {
                    match sent_frame {
                        SentFrame::Stream { .. } | SentFrame::Crypto { .. } => {
                            self.notifier.on_frame_acked(sent_frame);
                        }
                        SentFrame::Control { id } => {
                            self.control.on_frame_acked(*id);
                        }
                        SentFrame::MtuProbe { .. } => {
                            if let Some(packet_number) = packet_number {
                                self.actions.push(Action::MtuProbeAcked(packet_number));
                            }
                        }
                        _ => {}
                    }
                }

                if space.is_application_data() {
                    if let Some(packet_number) = packet_number {
                        self.visitor.on_one_rtt_packet_acknowledged(packet_number);
                    }
                }
            }
        }

        if any_newly_acked {
            self.actions.push(Action::ForwardProgress);
            if space.is_application_data() {
                self.actions.push(Action::OneRttPacketAcknowledged);
            }
        }

        let lost = self.sent.on_largest_acked(space, largest_acked);
        for (packet_number_value, info) in lost {
            for sent_frame in &info.frames {
                match sent_frame {
                    SentFrame::Stream { .. } | SentFrame::Crypto { .. } => {
                        self.notifier.on_frame_lost(sent_frame);
                    }
                    SentFrame::Control { id } => {
                        self.control.on_frame_lost(*id);
                    }
                    SentFrame::MtuProbe { .. } => {
                        if let Ok(value) = VarInt::new(packet_number_value) {
                            self.actions
                                .push(Action::MtuProbeLost(space.new_packet_number(value)));
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    fn on_reset_stream_frame(
        &mut self,
        frame: frame::ResetStream,
    ) -> Result<(), connection::Error> {
        self.visitor.on_rst_stream(frame)
    }

    fn on_reset_stream_at_frame(
        &mut self,
        frame: frame::ResetStreamAt,
    ) -> Result<(), connection::Error> {
        self.visitor.on_reset_stream_at(frame)
    }

    fn on_stop_sending_frame(
        &mut self,
        frame: frame::StopSending,
    ) -> Result<(), connection::Error> {
        self.visitor.on_stop_sending_frame(frame)
    }

    fn on_max_data_frame(&mut self, frame: frame::MaxData) -> Result<(), connection::Error> {
        self.visitor.on_max_data_frame(frame)
    }

    fn on_max_stream_data_frame(
        &mut self,
        frame: frame::MaxStreamData,
    ) -> Result<(), connection::Error> {
        self.visitor.on_max_stream_data_frame(frame)
    }

    fn on_max_streams_frame(&mut self, frame: frame::MaxStreams) -> Result<(), connection::Error> {
        self.visitor.on_max_streams_frame(frame)
    }

    fn on_data_blocked_frame(
        &mut self,
        frame: frame::DataBlocked,
    ) -> Result<(), connection::Error> {
        self.visitor.on_blocked_frame(frame)
    }

    fn on_stream_data_blocked_frame(
        &mut self,
        frame: frame::StreamDataBlocked,
    ) -> Result<(), connection::Error> {
        self.visitor.on_stream_data_blocked_frame(frame)
    }

    fn on_streams_blocked_frame(
        &mut self,
        frame: frame::StreamsBlocked,
    ) -> Result<(), connection::Error> {
        self.visitor.on_streams_blocked_frame(frame)
    }

    fn on_new_connection_id_frame(
        &mut self,
        frame: frame::NewConnectionId,
    ) -> Result<(), connection::Error> {
        self.peer_ids.on_new_connection_id(&frame)
    }

    fn on_retire_connection_id_frame(
        &mut self,
        frame: frame::RetireConnectionId,
    ) -> Result<(), connection::Error> {
        self.local_ids.on_retire_connection_id(
            frame.sequence_number.as_u64(),
            self.now,
            self.pto_delay,
        )
    }

    fn on_new_token_frame(&mut self, frame: frame::NewToken) -> Result<(), connection::Error> {
        //= https://www.rfc-editor.org/rfc/rfc9000#section-19.7
        //# Servers MUST treat receipt of a NEW_TOKEN frame as a connection
        //# error of type PROTOCOL_VIOLATION.
        if self.perspective.is_server() {
            return Err(connection::Error::InvalidFrameData(
                "client sent a new token",
            ));
        }
        self.visitor.on_new_token_received(frame.token)
    }

    fn on_path_challenge_frame(
        &mut self,
        frame: frame::PathChallenge,
    ) -> Result<(), connection::Error> {
        self.actions.push(Action::SendPathResponse(frame.data));
        Ok(())
    }

    fn on_path_response_frame(
        &mut self,
        frame: frame::PathResponse,
    ) -> Result<(), connection::Error> {
        self.actions.push(Action::PathResponseReceived(frame.data));
        Ok(())
    }

    fn on_connection_close_frame(
        &mut self,
        frame: frame::ConnectionClose,
    ) -> Result<(), connection::Error> {
        let error = if frame.error_code == VarInt::ZERO && frame.frame_type.is_some() {
            connection::Error::NoError
        } else {
            connection::Error::PeerGoingAway
        };
        self.actions.push(Action::PeerClose {
            error,
            error_code: frame.error_code,
            quic_error_code: frame.quic_error_code,
        });
        Ok(())
    }

    fn on_handshake_done_frame(
        &mut self,
        _frame: frame::HandshakeDone,
    ) -> Result<(), connection::Error> {
        //= https://www.rfc-editor.org/rfc/rfc9000#section-19.20
        //# A server MUST treat receipt of a HANDSHAKE_DONE frame as a
        //# connection error of type PROTOCOL_VIOLATION.
        if self.perspective.is_server() {
            return Err(connection::Error::InvalidFrameData(
                "client sent handshake done",
            ));
        }
        self.visitor.on_handshake_done_received()?;
        self.actions.push(Action::HandshakeDone);
        Ok(())
    }

    fn on_datagram_frame(&mut self, frame: frame::DatagramRef) -> Result<(), connection::Error> {
        self.visitor.on_message_received(frame.data)
    }

    fn on_ack_frequency_frame(
        &mut self,
        frame: frame::AckFrequency,
    ) -> Result<(), connection::Error> {
        self.received.on_ack_frequency_frame(&frame);
        Ok(())
    }

    fn on_immediate_ack_frame(
        &mut self,
        _frame: frame::ImmediateAck,
    ) -> Result<(), connection::Error> {
        self.received
            .on_immediate_ack(PacketNumberSpace::ApplicationData, self.now);
        Ok(())
    }

    fn on_packet_decrypted(
        &mut self,
        level: EncryptionLevel,
        _packet_number: PacketNumber,
    ) -> Result<(), connection::Error> {
        self.visitor.on_packet_decrypted(level);
        Ok(())
    }

    fn on_packet_processed(&mut self, packet: ProcessedPacket) -> Result<(), connection::Error> {
        self.received
            .record_packet_received(packet.packet_number, self.now, packet.ecn);

        if packet.ack_elicitation.is_ack_eliciting() {
            self.received
                .maybe_update_ack_timeout(packet.packet_number, self.now);
        }

        if !packet.is_probing {
            self.any_non_probing = true;
        }

        self.subscriber.on_packet_received(event::PacketReceived {
            packet_number: packet.packet_number.as_u64(),
            encryption_level: packet.encryption_level,
            len: packet.len,
        });

        Ok(())
    }

    fn on_stateless_reset(&mut self, _token: stateless_reset::Token) {
        self.actions.push(Action::StatelessReset);
    }

    fn on_version_negotiation(
        &mut self,
        packet: &VersionNegotiation,
    ) -> Result<(), connection::Error> {
        let versions: Vec<Version> = packet.supported_versions().collect();
        self.actions.push(Action::VersionNegotiation(versions));
        Ok(())
    }

    fn on_retry(&mut self, packet: &Retry, packet_bytes: &[u8]) -> Result<(), connection::Error> {
        if self.drop_incoming_retry_packets || self.received_retry {
            return Ok(());
        }
        self.actions.push(Action::Retry {
            source_connection_id: packet.source_connection_id,
            token: packet.retry_token.to_vec(),
            packet: packet_bytes.to_vec(),
            integrity_tag: packet.integrity_tag,
        });
        Ok(())
    }

    fn create_next_one_rtt_key(&mut self) -> Option<Box<dyn PacketKey>> {
        self.visitor.advance_keys_and_create_current_one_rtt_key()
    }

    fn on_key_update(&mut self, phase: KeyPhase, remotely_initiated: bool) {
        debug_assert!(remotely_initiated);
        self.visitor.on_key_update(phase, remotely_initiated);
        self.actions.push(Action::KeyUpdateCommitted(phase));
    }

    fn is_duplicate(&self, packet_number: PacketNumber) -> bool {
        self.received.is_duplicate(packet_number)
    }

    fn on_initial_token(&mut self, token: &[u8]) -> Result<(), connection::Error> {
        if self.perspective.is_server() && !self.visitor.validate_token(token) {
            return Err(connection::Error::InvalidPacketHeader("invalid address token"));
        }
        Ok(())
    }
}
