// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quilt_quic_core::{
    connection::ConnectionId,
    random,
    stateless_reset,
    time::{Duration, Timestamp},
};
use std::net::SocketAddr;

/// Congestion state carried across a migration when the path was probed
/// ahead of time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SavedCongestionState {
    pub rtt: Option<Duration>,
    pub congestion_window: Option<u64>,
}

/// An outstanding PATH_CHALLENGE on a path under validation
#[derive(Clone, Copy, Debug)]
pub struct Challenge {
    pub data: [u8; 8],
    pub retries: u32,
    pub retry_deadline: Timestamp,
}

/// One (local address, peer address) pair and the connection IDs used on
/// it
#[derive(Clone, Debug)]
pub struct Path {
    pub local_address: SocketAddr,
    pub peer_address: SocketAddr,
    /// The connection ID the peer puts in packets it sends to us
    pub local_connection_id: ConnectionId,
    /// The connection ID we put in packets we send to the peer
    pub peer_connection_id: ConnectionId,
    pub stateless_reset_token: Option<stateless_reset::Token>,
    pub validated: bool,
    pub bytes_sent_before_validation: u64,
    pub bytes_received_before_validation: u64,
    pub challenge: Option<Challenge>,
    pub saved_congestion_state: Option<SavedCongestionState>,
}

impl Path {
    pub fn new(
        local_address: SocketAddr,
        peer_address: SocketAddr,
        local_connection_id: ConnectionId,
        peer_connection_id: ConnectionId,
    ) -> Self {
        Self {
            local_address,
            peer_address,
            local_connection_id,
            peer_connection_id,
            stateless_reset_token: None,
            validated: false,
            bytes_sent_before_validation: 0,
            bytes_received_before_validation: 0,
            challenge: None,
            saved_congestion_state: None,
        }
    }

    /// Starts validation by issuing a random 8 byte challenge
    pub fn start_challenge<G: random::Generator>(
        &mut self,
        random: &mut G,
        now: Timestamp,
        initial_rtt: Duration,
    ) -> [u8; 8] {
        let mut data = [0; 8];
        random.fill_public(&mut data);
        self.challenge = Some(Challenge {
            data,
            retries: 0,
            retry_deadline: now + initial_rtt,
        });
        data
    }

    /// Applies a PATH_RESPONSE; returns true if it answered the
    /// outstanding challenge and validated the path
    pub fn on_path_response(&mut self, data: &[u8; 8]) -> bool {
        match self.challenge {
            Some(challenge) if challenge.data == *data => {
                self.challenge = None;
                self.validated = true;
                true
            }
            _ => false,
        }
    }

    /// Advances the challenge retry schedule with exponential backoff
    /// bounded by `3 × initial_rtt`. Returns the challenge data to resend,
    /// or `None` once the validation attempt is abandoned.
    pub fn on_challenge_timeout(
        &mut self,
        now: Timestamp,
        initial_rtt: Duration,
    ) -> Option<[u8; 8]> {
        let challenge = self.challenge.as_mut()?;

        if challenge.retries >= MAX_CHALLENGE_RETRIES {
            self.challenge = None;
            return None;
        }

        challenge.retries += 1;
        let backoff = initial_rtt
            .saturating_mul(1 << challenge.retries.min(2))
            .min(initial_rtt.saturating_mul(3));
        challenge.retry_deadline = now + backoff;
        Some(challenge.data)
    }

    pub fn challenge_deadline(&self) -> Option<Timestamp> {
        self.challenge.map(|challenge| challenge.retry_deadline)
    }

    /// Returns true while the anti-amplification limit applies
    pub fn at_amplification_limit(&self, factor: u64) -> bool {
        if self.validated {
            return false;
        }
        self.bytes_sent_before_validation
            >= factor.saturating_mul(self.bytes_received_before_validation)
    }

    /// Bytes the server may still send before the peer validates
    pub fn amplification_credit(&self, factor: u64) -> u64 {
        if self.validated {
            return u64::MAX;
        }
        factor
            .saturating_mul(self.bytes_received_before_validation)
            .saturating_sub(self.bytes_sent_before_validation)
    }

    pub fn on_bytes_received(&mut self, len: usize) {
        if !self.validated {
            self.bytes_received_before_validation += len as u64;
        }
    }

    pub fn on_bytes_sent(&mut self, len: usize) {
        if !self.validated {
            self.bytes_sent_before_validation += len as u64;
        }
    }

    /// Returns true if `peer` matches this path's peer address
    pub fn is_peer(&self, peer: SocketAddr) -> bool {
        self.peer_address == peer
    }
}

const MAX_CHALLENGE_RETRIES: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_quic_core::random::testing::Generator;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn path() -> Path {
        Path::new(
            addr(4433),
            addr(9000),
            ConnectionId::try_from_slice(&[1]).unwrap(),
            ConnectionId::try_from_slice(&[2]).unwrap(),
        )
    }

    fn now() -> Timestamp {
        Timestamp::from_duration(Duration::from_secs(1))
    }

    #[test]
    fn challenge_validation_test() {
        let mut path = path();
        let mut random = Generator::default();

        let data = path.start_challenge(&mut random, now(), Duration::from_millis(100));
        assert!(!path.validated);

        // the wrong payload does not validate
        assert!(!path.on_path_response(&[0; 8]));
        assert!(!path.validated);

        assert!(path.on_path_response(&data));
        assert!(path.validated);
    }

    #[test]
    fn challenge_backoff_is_bounded_test() {
        let mut path = path();
        let mut random = Generator::default();
        let rtt = Duration::from_millis(100);

        path.start_challenge(&mut random, now(), rtt);
        let mut deadlines = alloc::vec::Vec::new();
        while let Some(_data) = path.on_challenge_timeout(now(), rtt) {
            deadlines.push(path.challenge_deadline().unwrap());
        }

        // retries are finite and every deadline is within 3 × initial_rtt
        assert_eq!(deadlines.len(), MAX_CHALLENGE_RETRIES as usize);
        for deadline in deadlines {
            assert!(deadline <= now() + rtt * 3);
        }
        assert!(path.challenge.is_none());
    }

    #[test]
    fn amplification_limit_test() {
        let mut path = path();

        // nothing received yet: nothing may be sent
        assert!(path.at_amplification_limit(3));

        path.on_bytes_received(100);
        assert_eq!(path.amplification_credit(3), 300);
        assert!(!path.at_amplification_limit(3));

        path.on_bytes_sent(300);
        assert!(path.at_amplification_limit(3));

        path.validated = true;
        assert!(!path.at_amplification_limit(3));
    }
}
