// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection lifecycle events.
//!
//! A [`Subscriber`] observes the state transitions worth reporting
//! without being on the per-frame hot path. All callbacks default to
//! no-ops; `()` is the null subscriber.

use quilt_quic_core::{
    connection, crypto::EncryptionLevel, packet::KeyPhase, time::Timestamp,
};
use std::net::SocketAddr;

#[derive(Clone, Copy, Debug)]
pub struct PacketSent {
    pub packet_number: u64,
    pub encryption_level: EncryptionLevel,
    pub len: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct PacketReceived {
    pub packet_number: u64,
    pub encryption_level: EncryptionLevel,
    pub len: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct PacketDropped {
    pub reason: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub struct KeyUpdate {
    pub phase: KeyPhase,
    /// True when the peer initiated the update
    pub remotely_initiated: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct PathChallengeSent {
    pub peer_address: SocketAddr,
}

#[derive(Clone, Copy, Debug)]
pub struct PathValidated {
    pub peer_address: SocketAddr,
}

#[derive(Clone, Copy, Debug)]
pub struct Migration {
    pub peer_address: SocketAddr,
}

#[derive(Clone, Copy, Debug)]
pub struct MtuUpdated {
    pub mtu: u16,
}

#[derive(Clone, Copy, Debug)]
pub struct ConnectionClosed {
    pub error: connection::Error,
    pub remotely_initiated: bool,
    /// The error code a remote peer tunneled through its reason phrase
    pub peer_quic_error_code: Option<u64>,
}

#[derive(Clone, Copy, Debug)]
pub struct StatelessReset {}

#[derive(Clone, Copy, Debug)]
pub struct RetryReceived {}

#[derive(Clone, Copy, Debug)]
pub struct VersionNegotiationReceived {}

#[derive(Clone, Copy, Debug)]
pub struct IdleTimerReset {
    pub deadline: Timestamp,
}

pub trait Subscriber {
    fn on_packet_sent(&mut self, event: PacketSent) {
        let _ = event;
    }

    fn on_packet_received(&mut self, event: PacketReceived) {
        let _ = event;
    }

    fn on_packet_dropped(&mut self, event: PacketDropped) {
        let _ = event;
    }

    fn on_key_update(&mut self, event: KeyUpdate) {
        let _ = event;
    }

    fn on_path_challenge_sent(&mut self, event: PathChallengeSent) {
        let _ = event;
    }

    fn on_path_validated(&mut self, event: PathValidated) {
        let _ = event;
    }

    fn on_migration(&mut self, event: Migration) {
        let _ = event;
    }

    fn on_mtu_updated(&mut self, event: MtuUpdated) {
        let _ = event;
    }

    fn on_connection_closed(&mut self, event: ConnectionClosed) {
        let _ = event;
    }

    fn on_stateless_reset(&mut self, event: StatelessReset) {
        let _ = event;
    }

    fn on_retry_received(&mut self, event: RetryReceived) {
        let _ = event;
    }

    fn on_version_negotiation_received(&mut self, event: VersionNegotiationReceived) {
        let _ = event;
    }
}

/// The null subscriber
impl Subscriber for () {}

#[cfg(feature = "event-tracing")]
pub mod tracing {
    //! Emits every event as a `tracing` span-less debug record

    use super::*;

    #[derive(Clone, Copy, Debug, Default)]
    pub struct Subscriber;

    impl super::Subscriber for Subscriber {
        fn on_packet_sent(&mut self, event: PacketSent) {
            ::tracing::trace!(?event, "packet sent");
        }

        fn on_packet_received(&mut self, event: PacketReceived) {
            ::tracing::trace!(?event, "packet received");
        }

        fn on_packet_dropped(&mut self, event: PacketDropped) {
            ::tracing::debug!(?event, "packet dropped");
        }

        fn on_key_update(&mut self, event: KeyUpdate) {
            ::tracing::debug!(?event, "key update");
        }

        fn on_path_validated(&mut self, event: PathValidated) {
            ::tracing::debug!(?event, "path validated");
        }

        fn on_migration(&mut self, event: Migration) {
            ::tracing::debug!(?event, "connection migrated");
        }

        fn on_mtu_updated(&mut self, event: MtuUpdated) {
            ::tracing::debug!(?event, "mtu updated");
        }

        fn on_connection_closed(&mut self, event: ConnectionClosed) {
            ::tracing::debug!(?event, "connection closed");
        }

        fn on_stateless_reset(&mut self, event: StatelessReset) {
            ::tracing::debug!(?event, "stateless reset received");
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use alloc::vec::Vec;

    /// Records event names in arrival order
    #[derive(Debug, Default)]
    pub struct Subscriber {
        pub events: Vec<&'static str>,
        pub closes: Vec<ConnectionClosed>,
        pub key_updates: Vec<KeyUpdate>,
    }

    impl super::Subscriber for Subscriber {
        fn on_packet_sent(&mut self, _event: PacketSent) {
            self.events.push("packet_sent");
        }

        fn on_packet_received(&mut self, _event: PacketReceived) {
            self.events.push("packet_received");
        }

        fn on_packet_dropped(&mut self, _event: PacketDropped) {
            self.events.push("packet_dropped");
        }

        fn on_key_update(&mut self, event: KeyUpdate) {
            self.events.push("key_update");
            self.key_updates.push(event);
        }

        fn on_path_validated(&mut self, _event: PathValidated) {
            self.events.push("path_validated");
        }

        fn on_migration(&mut self, _event: Migration) {
            self.events.push("migration");
        }

        fn on_mtu_updated(&mut self, _event: MtuUpdated) {
            self.events.push("mtu_updated");
        }

        fn on_connection_closed(&mut self, event: ConnectionClosed) {
            self.events.push("connection_closed");
            self.closes.push(event);
        }

        fn on_stateless_reset(&mut self, _event: StatelessReset) {
            self.events.push("stateless_reset");
        }

        fn on_retry_received(&mut self, _event: RetryReceived) {
            self.events.push("retry_received");
        }

        fn on_version_negotiation_received(&mut self, _event: VersionNegotiationReceived) {
            self.events.push("version_negotiation_received");
        }
    }
}
