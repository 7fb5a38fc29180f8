// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{framer::Visitor as FramerVisitor, io::testing::Writer};
use quilt_quic_core::{
    crypto::testing::PacketKey as TestKey,
    random::testing::Generator,
    time::clock::testing::Clock,
};

const CLIENT_CID: &[u8] = &[1, 1, 1, 1, 1, 1, 1, 1];
const SERVER_CID: &[u8] = &[2, 2, 2, 2, 2, 2, 2, 2];
const KEY_SEED: u8 = 0x42;

fn cid(bytes: &[u8]) -> ConnectionId {
    ConnectionId::try_from_slice(bytes).unwrap()
}

fn local_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 1111))
}

fn peer_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 2222))
}

#[derive(Default)]
struct TestVisitor {
    streams: Vec<(u64, u64, Vec<u8>, bool)>,
    crypto: Vec<(EncryptionLevel, u64, Vec<u8>)>,
    messages: Vec<Vec<u8>>,
    closed: Vec<(connection::Error, bool)>,
    acked_one_rtt: Vec<u64>,
    handshake_done: bool,
    keep_alive: bool,
    next_one_rtt_key: Option<Box<dyn PacketKey>>,
}

impl Visitor for TestVisitor {
    fn on_stream_frame(&mut self, frame: frame::StreamRef) -> Result<(), connection::Error> {
        self.streams.push((
            frame.stream_id.as_u64(),
            frame.offset.as_u64(),
            frame.data.to_vec(),
            frame.is_fin,
        ));
        Ok(())
    }

    fn on_crypto_frame(
        &mut self,
        level: EncryptionLevel,
        frame: frame::CryptoRef,
    ) -> Result<(), connection::Error> {
        self.crypto
            .push((level, frame.offset.as_u64(), frame.data.to_vec()));
        Ok(())
    }

    fn on_message_received(&mut self, data: &[u8]) -> Result<(), connection::Error> {
        self.messages.push(data.to_vec());
        Ok(())
    }

    fn on_handshake_done_received(&mut self) -> Result<(), connection::Error> {
        self.handshake_done = true;
        Ok(())
    }

    fn on_connection_closed(&mut self, error: connection::Error, remotely_initiated: bool) {
        self.closed.push((error, remotely_initiated));
    }

    fn on_one_rtt_packet_acknowledged(&mut self, packet_number: PacketNumber) {
        self.acked_one_rtt.push(packet_number.as_u64());
    }

    fn should_keep_connection_alive(&mut self) -> bool {
        self.keep_alive
    }

    fn advance_keys_and_create_current_one_rtt_key(&mut self) -> Option<Box<dyn PacketKey>> {
        self.next_one_rtt_key.take()
    }

    fn fill_stream_data(&mut self, _stream_id: VarInt, offset: u64, dest: &mut [u8]) {
        for (index, byte) in dest.iter_mut().enumerate() {
            *byte = (offset as u8).wrapping_add(index as u8);
        }
    }
}

struct TestContext;

impl Context for TestContext {
    type Visitor = TestVisitor;
    type Writer = Writer;
    type Clock = Clock;
    type Random = Generator;
    type Subscriber = event::testing::Subscriber;
}

fn client() -> Connection<TestContext> {
    let mut connection = Connection::new(ConnectionParameters {
        perspective: endpoint::Type::Client,
        config: Config::default(),
        supported_versions: alloc::vec![packet::QUIC_VERSION_1],
        local_address: local_addr(),
        peer_address: peer_addr(),
        local_connection_id: cid(CLIENT_CID),
        peer_connection_id: cid(SERVER_CID),
        local_reset_token: stateless_reset::Token::from([9; 16]),
        retry_validator: None,
        visitor: TestVisitor::default(),
        writer: Writer::default(),
        clock: Clock::default(),
        random: Generator::default(),
        subscriber: event::testing::Subscriber::default(),
    });
    connection.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(KEY_SEED)));
    connection
}

/// A framer standing in for the peer endpoint
fn peer_framer() -> Framer {
    let mut framer = Framer::new(
        endpoint::Type::Server,
        packet::QUIC_VERSION_1,
        SERVER_CID.len(),
    );
    framer.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(KEY_SEED)));
    framer
}

fn seal_from_peer(framer: &Framer, packet_number: u64, payload: &[u8]) -> Vec<u8> {
    let space = PacketNumberSpace::ApplicationData;
    let params = PacketParams {
        encryption_level: EncryptionLevel::OneRtt,
        destination_connection_id: cid(CLIENT_CID),
        source_connection_id: cid(SERVER_CID),
        token: &[],
        packet_number: space.new_packet_number(VarInt::new(packet_number).unwrap()),
        largest_acked: None,
        spin_bit: false,
    };
    let mut out = [0u8; 1500];
    let len = framer.seal_packet(&mut out, &params, payload).unwrap();
    out[..len].to_vec()
}

macro_rules! payload {
    ($($frame:expr),* $(,)?) => {{
        let mut buffer = [0u8; 1400];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        $(
            encoder.encode(&$frame);
        )*
        let len = encoder.len();
        buffer[..len].to_vec()
    }};
}

/// Collects the frames of every packet in the peer-bound datagrams
#[derive(Default)]
struct PeerDecoder {
    pings: usize,
    acks: Vec<(u64, Vec<(u64, u64)>)>,
    streams: Vec<(u64, u64, Vec<u8>, bool)>,
    path_responses: Vec<[u8; 8]>,
    path_challenges: Vec<[u8; 8]>,
    closes: Vec<u64>,
    messages: Vec<Vec<u8>>,
    handshake_done: usize,
}

impl FramerVisitor for PeerDecoder {
    fn on_ping_frame(&mut self, _frame: frame::Ping) -> Result<(), connection::Error> {
        self.pings += 1;
        Ok(())
    }

    fn on_ack_frame(
        &mut self,
        _space: PacketNumberSpace,
        frame: frame::Ack<frame::AckRangesDecoder>,
    ) -> Result<(), connection::Error> {
        let ranges = frame
            .ack_ranges()
            .map(|range| (range.start().as_u64(), range.end().as_u64()))
            .collect();
        self.acks
            .push((frame.largest_acknowledged().as_u64(), ranges));
        Ok(())
    }

    fn on_stream_frame(&mut self, frame: frame::StreamRef) -> Result<(), connection::Error> {
        self.streams.push((
            frame.stream_id.as_u64(),
            frame.offset.as_u64(),
            frame.data.to_vec(),
            frame.is_fin,
        ));
        Ok(())
    }

    fn on_path_response_frame(
        &mut self,
        frame: frame::PathResponse,
    ) -> Result<(), connection::Error> {
        self.path_responses.push(frame.data);
        Ok(())
    }

    fn on_path_challenge_frame(
        &mut self,
        frame: frame::PathChallenge,
    ) -> Result<(), connection::Error> {
        self.path_challenges.push(frame.data);
        Ok(())
    }

    fn on_connection_close_frame(
        &mut self,
        frame: frame::ConnectionClose,
    ) -> Result<(), connection::Error> {
        self.closes.push(frame.error_code.as_u64());
        Ok(())
    }

    fn on_datagram_frame(&mut self, frame: frame::DatagramRef) -> Result<(), connection::Error> {
        self.messages.push(frame.data.to_vec());
        Ok(())
    }

    fn on_handshake_done_frame(
        &mut self,
        _frame: frame::HandshakeDone,
    ) -> Result<(), connection::Error> {
        self.handshake_done += 1;
        Ok(())
    }

    fn create_next_one_rtt_key(&mut self) -> Option<Box<dyn PacketKey>> {
        None
    }
}

fn decode_peer_bound(framer: &mut Framer, writer: &mut Writer) -> PeerDecoder {
    let mut decoder = PeerDecoder::default();
    let datagrams: Vec<Vec<u8>> = writer
        .sent
        .iter()
        .map(|(_, payload)| payload.clone())
        .collect();
    for mut datagram in datagrams {
        framer
            .process_datagram(
                &mut datagram,
                ExplicitCongestionNotification::NotEct,
                &[],
                &mut decoder,
            )
            .unwrap();
    }
    writer.clear();
    decoder
}

#[test]
fn stream_frame_delivery_test() {
    let mut connection = client();
    let peer = peer_framer();

    let datagram = seal_from_peer(
        &peer,
        1,
        &payload!(frame::Stream {
            stream_id: VarInt::from_u8(4),
            offset: VarInt::ZERO,
            is_last_frame: true,
            is_fin: true,
            data: &b"hi"[..],
        }),
    );

    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );

    assert_eq!(connection.visitor().streams, vec![(4, 0, b"hi".to_vec(), true)]);
    assert!(connection.is_connected());
}

#[test]
fn every_second_packet_is_acked_test() {
    let mut connection = client();
    let mut peer = peer_framer();

    for packet_number in 1..=2u64 {
        let datagram = seal_from_peer(&peer, packet_number, &payload!(frame::Ping));
        connection.process_udp_packet(
            local_addr(),
            peer_addr(),
            &datagram,
            ExplicitCongestionNotification::NotEct,
        );
    }

    let decoded = decode_peer_bound(&mut peer, connection.writer_mut());
    assert_eq!(decoded.acks.len(), 1);
    let (largest, ranges) = &decoded.acks[0];
    assert_eq!(*largest, 2);
    assert_eq!(ranges, &alloc::vec![(1, 2)]);
}

#[test]
fn duplicate_packets_are_dropped_test() {
    let mut connection = client();
    let peer = peer_framer();

    let datagram = seal_from_peer(
        &peer,
        1,
        &payload!(frame::Stream {
            stream_id: VarInt::from_u8(4),
            offset: VarInt::ZERO,
            is_last_frame: true,
            is_fin: false,
            data: &b"once"[..],
        }),
    );

    for _ in 0..2 {
        connection.process_udp_packet(
            local_addr(),
            peer_addr(),
            &datagram.clone(),
            ExplicitCongestionNotification::NotEct,
        );
    }

    // the second delivery did not reach the session
    assert_eq!(connection.visitor().streams.len(), 1);
}

#[test]
fn stream_send_and_ack_test() {
    let mut connection = client();
    let mut peer = peer_framer();

    let (consumed, fin_sent) = connection.send_stream_data(VarInt::from_u8(4), 10, true);
    assert_eq!(consumed, 10);
    assert!(fin_sent);

    let decoded = decode_peer_bound(&mut peer, connection.writer_mut());
    assert_eq!(decoded.streams.len(), 1);
    let (stream_id, offset, data, fin) = &decoded.streams[0];
    assert_eq!((*stream_id, *offset, *fin), (4, 0, true));
    // payload bytes came from the session's data source
    assert_eq!(data, &alloc::vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

    assert!(connection
        .notifier
        .stream_is_waiting_for_acks(VarInt::from_u8(4)));

    // the peer acks packet 1
    let ranges = [VarInt::from_u8(1)..=VarInt::from_u8(1)];
    let datagram = seal_from_peer(
        &peer,
        1,
        &payload!(frame::Ack {
            ack_delay: VarInt::ZERO,
            ack_ranges: &ranges[..],
            ecn_counts: None,
            receive_timestamps: None,
        }),
    );
    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );

    assert!(!connection
        .notifier
        .stream_is_waiting_for_acks(VarInt::from_u8(4)));
    assert_eq!(connection.visitor().acked_one_rtt, alloc::vec![1]);
}

#[test]
fn ack_for_unsent_packet_closes_test() {
    let mut connection = client();
    let peer = peer_framer();

    let ranges = [VarInt::from_u8(40)..=VarInt::from_u8(41)];
    let datagram = seal_from_peer(
        &peer,
        1,
        &payload!(frame::Ack {
            ack_delay: VarInt::ZERO,
            ack_ranges: &ranges[..],
            ecn_counts: None,
            receive_timestamps: None,
        }),
    );
    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );

    assert!(!connection.is_connected());
    let (error, _) = connection.visitor().closed[0];
    assert_eq!(
        error,
        connection::Error::InvalidFrameData("ack for a packet that was never sent")
    );
}

#[test]
fn path_challenge_gets_response_test() {
    let mut connection = client();
    let mut peer = peer_framer();

    let datagram = seal_from_peer(
        &peer,
        1,
        &payload!(frame::PathChallenge { data: [7; 8] }, frame::Ping),
    );
    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );

    let decoded = decode_peer_bound(&mut peer, connection.writer_mut());
    assert_eq!(decoded.path_responses, alloc::vec![[7; 8]]);
}

#[test]
fn message_round_trip_test() {
    let mut connection = client();
    let mut peer = peer_framer();

    connection.send_message(b"unreliable").unwrap();
    let decoded = decode_peer_bound(&mut peer, connection.writer_mut());
    assert_eq!(decoded.messages, alloc::vec![b"unreliable".to_vec()]);

    let datagram = seal_from_peer(
        &peer,
        1,
        &payload!(frame::Datagram {
            is_last_frame: true,
            data: &b"inbound"[..],
        }),
    );
    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );
    assert_eq!(connection.visitor().messages, alloc::vec![b"inbound".to_vec()]);
}

#[test]
fn local_close_emits_connection_close_test() {
    let mut connection = client();
    let mut peer = peer_framer();

    connection.close(connection::Error::NoError);
    assert!(!connection.is_connected());

    let decoded = decode_peer_bound(&mut peer, connection.writer_mut());
    assert_eq!(decoded.closes.len(), 1);

    // incoming packets are answered with the stashed termination packet
    let datagram = seal_from_peer(&peer, 9, &payload!(frame::Ping));
    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );
    let decoded = decode_peer_bound(&mut peer, connection.writer_mut());
    assert_eq!(decoded.closes.len(), 1);

    // no state advanced: the visitor saw exactly one close
    assert_eq!(connection.visitor().closed.len(), 1);
}

#[test]
fn peer_close_is_silent_test() {
    let mut connection = client();
    let peer = peer_framer();

    let datagram = seal_from_peer(
        &peer,
        1,
        &payload!(frame::ConnectionClose {
            error_code: VarInt::ZERO,
            frame_type: Some(VarInt::ZERO),
            quic_error_code: None,
            reason: None,
        }),
    );
    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );

    assert!(!connection.is_connected());
    let (error, remote) = connection.visitor().closed[0];
    assert_eq!(error, connection::Error::NoError);
    assert!(remote);
    assert_eq!(connection.peer_close_error_code(), Some(VarInt::ZERO));
    assert_eq!(connection.peer_quic_error_code(), None);
    // a peer-initiated close is not answered with CONNECTION_CLOSE
    assert!(connection.writer().sent.is_empty());
}

#[test]
fn peer_close_reason_prefix_code_test() {
    let mut connection = client();
    let peer = peer_framer();

    // the peer tunnels a more specific code through the reason phrase
    let datagram = seal_from_peer(
        &peer,
        1,
        &payload!(frame::ConnectionClose {
            error_code: VarInt::from_u8(0x0c),
            frame_type: None,
            quic_error_code: Some(17),
            reason: Some(b"server overloaded"),
        }),
    );
    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );

    assert!(!connection.is_connected());
    let (error, remote) = connection.visitor().closed[0];
    assert_eq!(error, connection::Error::PeerGoingAway);
    assert!(remote);

    // both codes survive end to end
    assert_eq!(
        connection.peer_close_error_code(),
        Some(VarInt::from_u8(0x0c))
    );
    assert_eq!(connection.peer_quic_error_code(), Some(17));

    let event = connection.subscriber.closes[0];
    assert_eq!(event.peer_quic_error_code, Some(17));
}

#[test]
fn idle_timeout_test() {
    let mut connection = client();
    connection.on_handshake_confirmed();

    let deadline = connection.next_timeout().unwrap();
    connection.clock.set(deadline);
    connection.on_timeout(deadline);

    assert!(!connection.is_connected());
    let (error, _) = connection.visitor().closed[0];
    assert_eq!(error, connection::Error::IdleTimeout);
}

#[test]
fn keep_alive_ping_test() {
    let mut connection = client();
    connection.on_handshake_confirmed();
    connection.visitor_mut().keep_alive = true;
    connection.writer_mut().clear();

    // process something so the ping manager re-arms
    let mut peer = peer_framer();
    let datagram = seal_from_peer(&peer, 1, &payload!(frame::Ping));
    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );
    connection.writer_mut().clear();

    let deadline = connection.ping.next_timeout().unwrap();
    connection.clock.set(deadline);
    connection.on_timeout(deadline);

    let decoded = decode_peer_bound(&mut peer, connection.writer_mut());
    assert_eq!(decoded.pings, 1);
}

#[test]
fn key_update_gating_test() {
    let mut connection = client();

    // not allowed before the handshake is confirmed
    assert!(connection
        .initiate_key_update(Box::new(TestKey::new(KEY_SEED)))
        .is_err());

    connection.on_handshake_confirmed();

    // allowed now; the phase bit flips
    assert_eq!(connection.key_phase(), KeyPhase::Zero);
    connection
        .initiate_key_update(Box::new(TestKey::new(KEY_SEED + 1)))
        .unwrap();
    assert_eq!(connection.key_phase(), KeyPhase::One);

    // a second update is blocked until the previous keys are discarded
    assert!(connection
        .initiate_key_update(Box::new(TestKey::new(KEY_SEED + 2)))
        .is_err());
}

#[test]
fn stateless_reset_closes_silently_test() {
    let mut connection = client();
    let token = stateless_reset::Token::from([0xaa; 16]);
    connection
        .peer_ids
        .set_initial_stateless_reset_token(token);

    let mut datagram = [0u8; 38];
    datagram[0] = 0b0100_0001;
    datagram[38 - 16..].copy_from_slice(token.as_bytes());

    connection.process_udp_packet(
        local_addr(),
        peer_addr(),
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );

    assert!(!connection.is_connected());
    let (error, remote) = connection.visitor().closed[0];
    assert_eq!(error, connection::Error::StatelessReset);
    assert!(remote);
    assert!(connection.writer().sent.is_empty());
}

#[test]
fn migration_commits_on_non_probing_packet_test() {
    let mut connection = client();
    let peer = peer_framer();
    let new_peer = SocketAddr::from(([127, 0, 0, 1], 3333));

    // a probing packet from a new address does not migrate
    let datagram = seal_from_peer(&peer, 1, &payload!(frame::PathChallenge { data: [1; 8] }));
    connection.process_udp_packet(
        local_addr(),
        new_peer,
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );
    assert_eq!(connection.peer_address(), peer_addr());

    // a non-probing packet commits the migration
    let datagram = seal_from_peer(&peer, 2, &payload!(frame::Ping));
    connection.process_udp_packet(
        local_addr(),
        new_peer,
        &datagram,
        ExplicitCongestionNotification::NotEct,
    );
    assert_eq!(connection.peer_address(), new_peer);
}
