// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::stateless_reset;
use quilt_codec::EncoderBuffer;

fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut buffer = [0u8; 1500];
    let mut encoder = EncoderBuffer::new(&mut buffer);
    encoder.encode(frame);
    let written = encoder.len();
    buffer[..written].to_vec()
}

fn decode_frame(bytes: &[u8]) -> Frame {
    let decoder = DecoderBuffer::new(bytes);
    let (frame, remaining) = Frame::decode(decoder).unwrap();
    assert!(remaining.is_empty(), "undecoded trailing bytes");
    frame
}

macro_rules! assert_round_trip {
    ($frame:expr) => {{
        let frame: Frame = $frame.into();
        let bytes = encode_frame(&frame);
        assert_eq!(decode_frame(&bytes), frame);
    }};
}

#[test]
fn round_trip_test() {
    assert_round_trip!(Ping);
    assert_round_trip!(HandshakeDone);
    assert_round_trip!(ImmediateAck);
    assert_round_trip!(ResetStream {
        stream_id: VarInt::from_u8(3),
        application_error_code: VarInt::from_u16(0x101),
        final_size: VarInt::from_u32(100_000),
    });
    assert_round_trip!(ResetStreamAt {
        stream_id: VarInt::from_u8(3),
        application_error_code: VarInt::from_u8(9),
        final_size: VarInt::from_u8(20),
        reliable_size: VarInt::from_u8(10),
    });
    assert_round_trip!(StopSending {
        stream_id: VarInt::from_u8(8),
        application_error_code: VarInt::from_u8(1),
    });
    assert_round_trip!(Crypto {
        offset: VarInt::from_u16(512),
        data: &b"finished"[..],
    });
    assert_round_trip!(NewToken { token: &[1, 2, 3] });
    assert_round_trip!(Stream {
        stream_id: VarInt::from_u8(4),
        offset: VarInt::from_u16(300),
        is_last_frame: false,
        is_fin: false,
        data: &b"body"[..],
    });
    assert_round_trip!(MaxData {
        maximum_data: VarInt::from_u32(1 << 20),
    });
    assert_round_trip!(MaxStreamData {
        stream_id: VarInt::from_u8(4),
        maximum_stream_data: VarInt::from_u32(1 << 16),
    });
    assert_round_trip!(MaxStreams {
        stream_type: StreamType::Bidirectional,
        maximum_streams: VarInt::from_u8(100),
    });
    assert_round_trip!(MaxStreams {
        stream_type: StreamType::Unidirectional,
        maximum_streams: VarInt::from_u8(3),
    });
    assert_round_trip!(DataBlocked {
        data_limit: VarInt::from_u32(1 << 20),
    });
    assert_round_trip!(StreamDataBlocked {
        stream_id: VarInt::from_u8(4),
        stream_data_limit: VarInt::from_u16(8192),
    });
    assert_round_trip!(StreamsBlocked {
        stream_type: StreamType::Unidirectional,
        stream_limit: VarInt::from_u8(3),
    });
    assert_round_trip!(NewConnectionId {
        sequence_number: VarInt::from_u8(2),
        retire_prior_to: VarInt::from_u8(1),
        connection_id: crate::connection::ConnectionId::try_from_slice(&[1, 2, 3, 4]).unwrap(),
        stateless_reset_token: stateless_reset::Token::from([7; 16]),
    });
    assert_round_trip!(RetireConnectionId {
        sequence_number: VarInt::from_u8(1),
    });
    assert_round_trip!(PathChallenge {
        data: [1, 2, 3, 4, 5, 6, 7, 8],
    });
    assert_round_trip!(PathResponse {
        data: [1, 2, 3, 4, 5, 6, 7, 8],
    });
    assert_round_trip!(ConnectionClose {
        error_code: VarInt::from_u8(0x0a),
        frame_type: Some(VarInt::from_u8(0x06)),
        quic_error_code: None,
        reason: Some(b"handshake failed"),
    });
    assert_round_trip!(ConnectionClose {
        error_code: VarInt::ZERO,
        frame_type: None,
        quic_error_code: Some(17),
        reason: Some(b"server overloaded"),
    });
    assert_round_trip!(Datagram {
        is_last_frame: false,
        data: &b"unreliable"[..],
    });
    assert_round_trip!(AckFrequency {
        sequence_number: VarInt::from_u8(1),
        packet_tolerance: VarInt::from_u8(2),
        update_max_ack_delay: VarInt::from_u16(25_000),
        reordering_threshold: VarInt::from_u8(1),
    });
}

#[test]
fn padding_round_trip_test() {
    let frame: Frame = Padding { length: 12 }.into();
    let bytes = encode_frame(&frame);
    assert_eq!(bytes, vec![0u8; 12]);
    assert_eq!(decode_frame(&bytes), frame);
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//= type=test
#[test]
fn ack_two_ranges_test() {
    // largest_acked = 10, ack_delay = 0, acked = {10, 8, 7, 5}
    let ranges = [
        VarInt::from_u8(10)..=VarInt::from_u8(10),
        VarInt::from_u8(7)..=VarInt::from_u8(8),
        VarInt::from_u8(5)..=VarInt::from_u8(5),
    ];
    let frame = Ack {
        ack_delay: VarInt::ZERO,
        ack_ranges: &ranges[..],
        ecn_counts: None,
        receive_timestamps: None,
    };

    let mut buffer = [0u8; 64];
    let mut encoder = EncoderBuffer::new(&mut buffer);
    encoder.encode(&frame);
    let written = encoder.len();

    assert_eq!(
        &buffer[..written],
        &[0x02, 0x0a, 0x00, 0x02, 0x00, 0x00, 0x01, 0x00, 0x00]
    );

    let decoded = decode_frame(&buffer[..written]);
    let Frame::Ack(ack) = decoded else {
        panic!("expected an ack frame");
    };

    assert_eq!(ack.largest_acknowledged(), 10u64);
    assert_eq!(ack.ack_delay, 0u64);

    let decoded_ranges: Vec<_> = ack.ack_ranges().collect();
    assert_eq!(decoded_ranges.len(), 3);
    assert_eq!(decoded_ranges[0], VarInt::from_u8(10)..=VarInt::from_u8(10));
    assert_eq!(decoded_ranges[1], VarInt::from_u8(7)..=VarInt::from_u8(8));
    assert_eq!(decoded_ranges[2], VarInt::from_u8(5)..=VarInt::from_u8(5));
}

#[test]
fn ack_ecn_round_trip_test() {
    let ranges = [VarInt::from_u8(4)..=VarInt::from_u8(9)];
    let frame = Ack {
        ack_delay: VarInt::from_u8(13),
        ack_ranges: &ranges[..],
        ecn_counts: Some(EcnCounts {
            ect_0_count: VarInt::from_u8(3),
            ect_1_count: VarInt::ZERO,
            ce_count: VarInt::from_u8(1),
        }),
        receive_timestamps: None,
    };

    let mut buffer = [0u8; 64];
    let mut encoder = EncoderBuffer::new(&mut buffer);
    encoder.encode(&frame);
    let written = encoder.len();
    assert_eq!(buffer[0], 0x03);

    let decoded = decode_frame(&buffer[..written]);
    let Frame::Ack(ack) = decoded else {
        panic!("expected an ack frame");
    };

    assert_eq!(ack.ecn_counts, frame.ecn_counts);
    assert_eq!(ack.largest_acknowledged(), 9u64);
    assert_eq!(ack.ack_ranges().next().unwrap(), ranges[0].clone());
}

#[test]
fn ack_receive_timestamps_round_trip_test() {
    let ranges = [VarInt::from_u8(4)..=VarInt::from_u8(9)];
    let timestamps = ReceiveTimestamps {
        ranges: vec![
            TimestampRange {
                gap: VarInt::ZERO,
                deltas: vec![VarInt::from_u16(1000), VarInt::from_u8(10)],
            },
            TimestampRange {
                gap: VarInt::from_u8(2),
                deltas: vec![VarInt::from_u8(5)],
            },
        ],
    };
    let frame = Ack {
        ack_delay: VarInt::ZERO,
        ack_ranges: &ranges[..],
        ecn_counts: None,
        receive_timestamps: Some(timestamps.clone()),
    };

    let mut buffer = [0u8; 128];
    let mut encoder = EncoderBuffer::new(&mut buffer);
    encoder.encode(&frame);
    let written = encoder.len();

    assert_eq!(buffer[0], 0x22);

    let decoded = decode_frame(&buffer[..written]);
    let Frame::Ack(ack) = decoded else {
        panic!("expected an ack frame");
    };
    assert_eq!(ack.receive_timestamps, Some(timestamps));
    assert_eq!(ack.ecn_counts, None);
}

#[test]
fn ack_first_range_validation_test() {
    // first ack range (11) reaches below zero with largest_acked = 10
    let bytes = [0x02u8, 0x0a, 0x00, 0x00, 0x0b];
    let decoder = DecoderBuffer::new(&bytes);
    let error = Frame::decode(decoder).unwrap_err();
    assert_eq!(
        <&'static str>::from(error),
        "first ack range larger than largest acked"
    );
}

#[test]
fn minimal_encoding_test() {
    // PING encoded with a two-byte frame type is a protocol violation
    let bytes = [0x40u8, 0x01];
    let decoder = DecoderBuffer::new(&bytes);
    let error = Frame::decode(decoder).unwrap_err();
    assert_eq!(<&'static str>::from(error), "frame type not minimally encoded");
}

#[test]
fn unknown_frame_test() {
    let bytes = [0x21u8];
    let decoder = DecoderBuffer::new(&bytes);
    assert!(Frame::decode(decoder).is_err());

    let bytes = [0x40u8, 0xae];
    let decoder = DecoderBuffer::new(&bytes);
    assert!(Frame::decode(decoder).is_err());
}

#[test]
fn level_permission_test() {
    use crate::crypto::EncryptionLevel::*;

    let crypto: Frame = Crypto {
        offset: VarInt::ZERO,
        data: &b"x"[..],
    }
    .into();
    let stream: Frame = Stream {
        stream_id: VarInt::ZERO,
        offset: VarInt::ZERO,
        is_last_frame: true,
        is_fin: false,
        data: &b"x"[..],
    }
    .into();
    let handshake_done: Frame = HandshakeDone.into();
    let path_response: Frame = PathResponse { data: [0; 8] }.into();
    let ping: Frame = Ping.into();

    for level in [Initial, Handshake] {
        assert!(crypto.is_allowed(level));
        assert!(ping.is_allowed(level));
        assert!(!stream.is_allowed(level));
        assert!(!handshake_done.is_allowed(level));
        assert!(!path_response.is_allowed(level));
    }

    assert!(stream.is_allowed(ZeroRtt));
    assert!(!handshake_done.is_allowed(ZeroRtt));
    assert!(!path_response.is_allowed(ZeroRtt));

    for frame in [&crypto, &stream, &handshake_done, &path_response, &ping] {
        assert!(frame.is_allowed(OneRtt));
    }
}

#[test]
fn ack_elicitation_test() {
    let ping: Frame = Ping.into();
    let padding: Frame = Padding { length: 4 }.into();

    assert!(ping.ack_elicitation().is_ack_eliciting());
    assert!(!padding.ack_elicitation().is_ack_eliciting());
}
