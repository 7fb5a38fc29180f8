// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quilt_quic_core::{
    connection,
    time::{Duration, Timestamp},
};

/// Closes the connection when nothing is received for the idle timeout,
/// or when the handshake exceeds its own deadline.
#[derive(Debug)]
pub struct IdleNetworkDetector {
    idle_timeout: Duration,
    /// Absolute deadline for handshake completion, armed at construction
    handshake_deadline: Option<Timestamp>,
    handshake_confirmed: bool,
    idle_deadline: Timestamp,
}

impl IdleNetworkDetector {
    pub fn new(
        idle_timeout: Duration,
        handshake_timeout: Option<Duration>,
        now: Timestamp,
    ) -> Self {
        Self {
            idle_timeout,
            handshake_deadline: handshake_timeout.map(|timeout| now + timeout),
            handshake_confirmed: false,
            idle_deadline: now + idle_timeout,
        }
    }

    /// Any received packet resets the idle deadline
    pub fn on_packet_received(&mut self, now: Timestamp) {
        self.idle_deadline = now + self.idle_timeout;
    }

    pub fn on_handshake_confirmed(&mut self) {
        self.handshake_confirmed = true;
        self.handshake_deadline = None;
    }

    pub fn next_timeout(&self) -> Option<Timestamp> {
        let mut deadline = self.idle_deadline;
        if let Some(handshake) = self.handshake_deadline {
            deadline = deadline.min(handshake);
        }
        Some(deadline)
    }

    /// Returns the close reason when a deadline has passed
    pub fn on_timeout(&self, now: Timestamp) -> Option<connection::Error> {
        if let Some(handshake) = self.handshake_deadline {
            if handshake.has_elapsed(now) {
                return Some(connection::Error::HandshakeTimeout);
            }
        }

        if self.idle_deadline.has_elapsed(now) {
            return Some(connection::Error::IdleTimeout);
        }

        None
    }

    pub fn handshake_confirmed(&self) -> bool {
        self.handshake_confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::from_duration(Duration::from_secs(1))
    }

    #[test]
    fn idle_timeout_test() {
        let mut detector =
            IdleNetworkDetector::new(Duration::from_secs(30), None, now());

        assert_eq!(detector.on_timeout(now()), None);

        detector.on_packet_received(now() + Duration::from_secs(20));
        // activity pushed the deadline out
        assert_eq!(detector.on_timeout(now() + Duration::from_secs(30)), None);
        assert_eq!(
            detector.on_timeout(now() + Duration::from_secs(50)),
            Some(connection::Error::IdleTimeout)
        );
    }

    #[test]
    fn handshake_timeout_test() {
        let mut detector = IdleNetworkDetector::new(
            Duration::from_secs(30),
            Some(Duration::from_secs(10)),
            now(),
        );

        // the handshake deadline fires before the idle deadline
        assert_eq!(detector.next_timeout(), Some(now() + Duration::from_secs(10)));
        assert_eq!(
            detector.on_timeout(now() + Duration::from_secs(10)),
            Some(connection::Error::HandshakeTimeout)
        );

        // confirmation removes the handshake deadline entirely
        detector.on_handshake_confirmed();
        assert_eq!(detector.on_timeout(now() + Duration::from_secs(10)), None);
    }
}
