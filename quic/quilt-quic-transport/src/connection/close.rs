// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use alloc::vec::Vec;
use quilt_quic_core::{connection, varint::VarInt};

/// State kept after the connection leaves the connected state.
///
/// On a local close up to two termination datagrams are stashed (one per
/// decryptable packet number space) and retransmitted in response to
/// subsequent incoming packets, with exponential backoff so a
/// close-and-forget peer cannot turn this endpoint into a packet
/// reflector.
#[derive(Debug)]
pub struct CloseState {
    pub error: connection::Error,
    pub remotely_initiated: bool,
    termination_packets: Vec<Vec<u8>>,
    packets_received_since_close: u64,
    /// The error code the peer's CONNECTION_CLOSE carried
    peer_error_code: Option<VarInt>,
    /// The more specific code the peer tunneled through its reason
    /// phrase, when present
    peer_quic_error_code: Option<u64>,
}

impl CloseState {
    pub fn new(
        error: connection::Error,
        remotely_initiated: bool,
        termination_packets: Vec<Vec<u8>>,
    ) -> Self {
        debug_assert!(termination_packets.len() <= 2);
        Self {
            error,
            remotely_initiated,
            termination_packets,
            packets_received_since_close: 0,
            peer_error_code: None,
            peer_quic_error_code: None,
        }
    }

    /// Records the codes carried by a peer-initiated close
    #[must_use]
    pub fn with_peer_error(
        mut self,
        error_code: VarInt,
        quic_error_code: Option<u64>,
    ) -> Self {
        self.peer_error_code = Some(error_code);
        self.peer_quic_error_code = quic_error_code;
        self
    }

    pub fn peer_error_code(&self) -> Option<VarInt> {
        self.peer_error_code
    }

    pub fn peer_quic_error_code(&self) -> Option<u64> {
        self.peer_quic_error_code
    }

    /// Called for every datagram that arrives after the close. Returns
    /// the termination packets to resend, if this arrival warrants a
    /// response.
    pub fn on_datagram_received(&mut self) -> Option<&[Vec<u8>]> {
        if self.termination_packets.is_empty() {
            return None;
        }

        self.packets_received_since_close += 1;
        if self.packets_received_since_close.is_power_of_two() {
            Some(&self.termination_packets)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_test() {
        let mut state = CloseState::new(
            connection::Error::NoError,
            false,
            alloc::vec![alloc::vec![1, 2, 3]],
        );

        let mut responses = 0;
        for _ in 0..16 {
            if state.on_datagram_received().is_some() {
                responses += 1;
            }
        }
        // 1st, 2nd, 4th, 8th, 16th
        assert_eq!(responses, 5);
    }

    #[test]
    fn silent_close_test() {
        let mut state = CloseState::new(connection::Error::HandshakeTimeout, false, Vec::new());
        assert!(state.on_datagram_received().is_none());
    }

    #[test]
    fn peer_error_codes_test() {
        let state = CloseState::new(connection::Error::PeerGoingAway, true, Vec::new())
            .with_peer_error(VarInt::from_u8(0x0c), Some(17));

        assert_eq!(state.peer_error_code(), Some(VarInt::from_u8(0x0c)));
        assert_eq!(state.peer_quic_error_code(), Some(17));
    }
}
