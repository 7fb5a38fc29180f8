// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use alloc::vec::Vec;
use quilt_quic_core::{
    crypto::testing::PacketKey as TestKey,
    frame::{Crypto, Ping, Stream},
    varint::VarInt,
};

const DCID: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8];
const SCID: &[u8] = &[9, 9];

fn cid(bytes: &[u8]) -> ConnectionId {
    ConnectionId::try_from_slice(bytes).unwrap()
}

fn pn(space: PacketNumberSpace, value: u64) -> PacketNumber {
    space.new_packet_number(VarInt::new(value).unwrap())
}

#[derive(Default)]
struct TestVisitor {
    streams: Vec<(u64, u64, Vec<u8>, bool)>,
    crypto: Vec<(EncryptionLevel, u64, Vec<u8>)>,
    pings: usize,
    decrypted: Vec<(EncryptionLevel, u64)>,
    processed: Vec<ProcessedPacket>,
    key_updates: Vec<(KeyPhase, bool)>,
    next_key: Option<Box<dyn PacketKey>>,
    stateless_resets: Vec<stateless_reset::Token>,
    coalesced: Vec<usize>,
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

    fn on_ping_frame(&mut self, _frame: frame::Ping) -> Result<(), connection::Error> {
        self.pings += 1;
        Ok(())
    }

    fn on_packet_decrypted(
        &mut self,
        level: EncryptionLevel,
        packet_number: PacketNumber,
    ) -> Result<(), connection::Error> {
        self.decrypted.push((level, packet_number.as_u64()));
        Ok(())
    }

    fn on_packet_processed(&mut self, packet: ProcessedPacket) -> Result<(), connection::Error> {
        self.processed.push(packet);
        Ok(())
    }

    fn on_coalesced_packet(&mut self, remaining_len: usize) {
        self.coalesced.push(remaining_len);
    }

    fn on_stateless_reset(&mut self, token: stateless_reset::Token) {
        self.stateless_resets.push(token);
    }

    fn create_next_one_rtt_key(&mut self) -> Option<Box<dyn PacketKey>> {
        self.next_key.take()
    }

    fn on_key_update(&mut self, phase: KeyPhase, remotely_initiated: bool) {
        self.key_updates.push((phase, remotely_initiated));
    }
}

fn framer() -> Framer {
    Framer::new(
        endpoint::Type::Server,
        packet::QUIC_VERSION_1,
        DCID.len(),
    )
}

macro_rules! encode_frames {
    ($($frame:expr),* $(,)?) => {{
        let mut buffer = [0u8; 1200];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        $(
            encoder.encode(&$frame);
        )*
        let len = encoder.len();
        buffer[..len].to_vec()
    }};
}

fn seal(
    framer: &Framer,
    level: EncryptionLevel,
    packet_number: u64,
    payload: &[u8],
) -> Vec<u8> {
    let space = level.packet_number_space();
    let params = PacketParams {
        encryption_level: level,
        destination_connection_id: cid(DCID),
        source_connection_id: cid(SCID),
        token: &[],
        packet_number: pn(space, packet_number),
        largest_acked: None,
        spin_bit: false,
    };

    let mut out = [0u8; 1500];
    let len = framer.seal_packet(&mut out, &params, payload).unwrap();
    out[..len].to_vec()
}

fn process(
    framer: &mut Framer,
    datagram: &mut [u8],
    visitor: &mut TestVisitor,
) -> Result<(), connection::Error> {
    framer.process_datagram(
        datagram,
        ExplicitCongestionNotification::NotEct,
        &[],
        visitor,
    )
}

#[test]
fn one_rtt_round_trip_test() {
    let mut framer = framer();
    framer.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(0x42)));

    let payload = encode_frames!(Stream {
        stream_id: VarInt::from_u8(4),
        offset: VarInt::ZERO,
        is_last_frame: true,
        is_fin: true,
        data: &b"hi"[..],
    });
    let mut datagram = seal(&framer, EncryptionLevel::OneRtt, 7, &payload);

    let mut visitor = TestVisitor::default();
    process(&mut framer, &mut datagram, &mut visitor).unwrap();

    assert_eq!(visitor.streams, vec![(4, 0, b"hi".to_vec(), true)]);
    assert_eq!(visitor.decrypted, vec![(EncryptionLevel::OneRtt, 7)]);

    let processed = &visitor.processed[0];
    assert!(processed.ack_elicitation.is_ack_eliciting());
    assert!(!processed.is_probing);
    assert_eq!(
        framer.largest_received(PacketNumberSpace::ApplicationData),
        Some(pn(PacketNumberSpace::ApplicationData, 7))
    );
}

#[test]
fn coalesced_packets_test() {
    let mut framer = framer();
    framer.install_key(EncryptionLevel::Initial, Box::new(TestKey::new(1)));
    framer.install_key(EncryptionLevel::Handshake, Box::new(TestKey::new(2)));

    let initial_payload = encode_frames!(Crypto {
        offset: VarInt::ZERO,
        data: &b"client hello"[..],
    });
    let handshake_payload = encode_frames!(Crypto {
        offset: VarInt::ZERO,
        data: &b"finished"[..],
    });

    let mut datagram = seal(&framer, EncryptionLevel::Initial, 1, &initial_payload);
    let handshake = seal(&framer, EncryptionLevel::Handshake, 1, &handshake_payload);
    let handshake_len = handshake.len();
    datagram.extend_from_slice(&handshake);

    let mut visitor = TestVisitor::default();
    process(&mut framer, &mut datagram, &mut visitor).unwrap();

    assert_eq!(visitor.coalesced, vec![handshake_len]);
    assert_eq!(visitor.crypto.len(), 2);
    assert_eq!(visitor.crypto[0].0, EncryptionLevel::Initial);
    assert_eq!(visitor.crypto[1].0, EncryptionLevel::Handshake);

    // each space tracks its own largest received packet
    assert_eq!(
        framer.largest_received(PacketNumberSpace::Initial),
        Some(pn(PacketNumberSpace::Initial, 1))
    );
    assert_eq!(
        framer.largest_received(PacketNumberSpace::Handshake),
        Some(pn(PacketNumberSpace::Handshake, 1))
    );
}

#[test]
fn frame_not_allowed_at_level_test() {
    let mut framer = framer();
    framer.install_key(EncryptionLevel::Handshake, Box::new(TestKey::new(2)));

    let payload = encode_frames!(Stream {
        stream_id: VarInt::from_u8(4),
        offset: VarInt::ZERO,
        is_last_frame: true,
        is_fin: false,
        data: &b"not allowed"[..],
    });
    let mut datagram = seal(&framer, EncryptionLevel::Handshake, 1, &payload);

    let mut visitor = TestVisitor::default();
    let error = process(&mut framer, &mut datagram, &mut visitor).unwrap_err();
    assert_eq!(
        error,
        connection::Error::InvalidFrameData("frame not allowed at encryption level")
    );
}

#[test]
fn missing_key_test() {
    let mut sealer = framer();
    sealer.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(0x42)));
    let mut receiver = framer();

    let payload = encode_frames!(Ping);
    let mut datagram = seal(&sealer, EncryptionLevel::OneRtt, 1, &payload);

    let mut visitor = TestVisitor::default();
    let error = process(&mut receiver, &mut datagram, &mut visitor).unwrap_err();
    assert_eq!(
        error,
        connection::Error::MissingKey(EncryptionLevel::OneRtt)
    );
}

//= https://www.rfc-editor.org/rfc/rfc9001#section-6
//= type=test
//# An endpoint detects a key update when processing a packet with a key
//# phase that differs from the value used to protect the last packet it
//# sent.
#[test]
fn peer_initiated_key_update_test() {
    let mut local = framer();
    local.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(0x10)));

    let mut peer = framer();
    peer.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(0x10)));

    // a packet in the original phase
    let payload = encode_frames!(Ping);
    let mut old_phase_packet = seal(&peer, EncryptionLevel::OneRtt, 3, &payload);

    // the peer rolls its keys and sends in the new phase
    peer.advance_one_rtt_keys(Box::new(TestKey::new(0x11)));
    assert_eq!(peer.key_phase(), KeyPhase::One);
    let mut new_phase_packet = seal(&peer, EncryptionLevel::OneRtt, 5, &payload);

    let mut visitor = TestVisitor {
        next_key: Some(Box::new(TestKey::new(0x11))),
        ..Default::default()
    };

    process(&mut local, &mut new_phase_packet, &mut visitor).unwrap();
    assert_eq!(visitor.key_updates, vec![(KeyPhase::One, true)]);
    assert_eq!(local.key_phase(), KeyPhase::One);

    // the reordered old-phase packet still decrypts with the retained
    // previous-phase key
    process(&mut local, &mut old_phase_packet, &mut visitor).unwrap();
    assert_eq!(visitor.decrypted, vec![
        (EncryptionLevel::OneRtt, 5),
        (EncryptionLevel::OneRtt, 3),
    ]);
    // no second key update was committed
    assert_eq!(visitor.key_updates.len(), 1);
    assert_eq!(local.key_phase(), KeyPhase::One);

    // once the previous key is discarded, old-phase packets fail
    let mut stale = seal(&peer, EncryptionLevel::OneRtt, 5, &payload);
    local.discard_previous_one_rtt_key();
    let mut old_phase_again = {
        let mut old_framer = framer();
        old_framer.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(0x10)));
        seal(&old_framer, EncryptionLevel::OneRtt, 4, &payload)
    };
    let error = process(&mut local, &mut old_phase_again, &mut visitor).unwrap_err();
    assert_eq!(error, connection::Error::MissingKey(EncryptionLevel::OneRtt));

    // new-phase packets continue to decrypt
    process(&mut local, &mut stale, &mut visitor).unwrap();
}

#[test]
fn local_key_update_keeps_old_phase_draining_test() {
    let mut local = framer();
    local.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(0x20)));

    let mut peer = framer();
    peer.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(0x20)));

    // an old-phase packet is in flight when this endpoint rolls its keys
    let payload = encode_frames!(Ping);
    let mut in_flight = seal(&peer, EncryptionLevel::OneRtt, 2, &payload);

    local.advance_one_rtt_keys(Box::new(TestKey::new(0x21)));
    assert_eq!(local.key_phase(), KeyPhase::One);

    // no packet of the new phase has been received yet, so first-received
    // is unset; the straggler must still route to the retained previous
    // key instead of fabricating a next-phase decrypter
    let mut visitor = TestVisitor::default();
    process(&mut local, &mut in_flight, &mut visitor).unwrap();

    assert_eq!(visitor.decrypted, vec![(EncryptionLevel::OneRtt, 2)]);
    assert!(visitor.key_updates.is_empty());
    assert_eq!(local.key_phase(), KeyPhase::One);

    // the peer catches up with the update; its new-phase packets commit
    // nothing further on this side since the phases now agree
    peer.advance_one_rtt_keys(Box::new(TestKey::new(0x21)));
    let mut caught_up = seal(&peer, EncryptionLevel::OneRtt, 3, &payload);
    process(&mut local, &mut caught_up, &mut visitor).unwrap();

    assert_eq!(visitor.decrypted.last(), Some(&(EncryptionLevel::OneRtt, 3)));
    assert!(visitor.key_updates.is_empty());
}

#[test]
fn stateless_reset_detection_test() {
    let mut framer = framer();
    framer.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(0x42)));

    let token = stateless_reset::Token::from([0xaa; 16]);

    // a 38 byte datagram with the fixed bit set and the token at the end
    let mut datagram = [0u8; 38];
    datagram[0] = 0b0100_0001;
    datagram[38 - 16..].copy_from_slice(token.as_bytes());

    let mut visitor = TestVisitor::default();
    framer
        .process_datagram(
            &mut datagram,
            ExplicitCongestionNotification::NotEct,
            &[token],
            &mut visitor,
        )
        .unwrap();

    assert_eq!(visitor.stateless_resets, vec![token]);
    assert!(visitor.processed.is_empty());

    // without a matching token the packet surfaces a decrypt failure
    let mut datagram = [0u8; 38];
    datagram[0] = 0b0100_0001;
    let mut visitor = TestVisitor::default();
    let error = framer
        .process_datagram(
            &mut datagram,
            ExplicitCongestionNotification::NotEct,
            &[token],
            &mut visitor,
        )
        .unwrap_err();
    assert_eq!(error, connection::Error::DecryptionFailure);
}

#[test]
fn probing_packet_detection_test() {
    let mut framer = framer();
    framer.install_key(EncryptionLevel::OneRtt, Box::new(TestKey::new(0x42)));

    let payload = encode_frames!(frame::PathChallenge { data: [7; 8] });
    let mut datagram = seal(&framer, EncryptionLevel::OneRtt, 2, &payload);

    let mut visitor = TestVisitor::default();
    process(&mut framer, &mut datagram, &mut visitor).unwrap();

    assert!(visitor.processed[0].is_probing);
}

#[test]
fn ack_delay_scaling_test() {
    let mut framer = framer();
    framer.set_ack_delay_exponents(3, 4);

    let encoded = framer.encode_ack_delay(Duration::from_micros(8000));
    assert_eq!(encoded, 1000u64);

    let decoded = framer.decode_ack_delay(VarInt::from_u16(500));
    assert_eq!(decoded, Duration::from_micros(500 << 4));
}
