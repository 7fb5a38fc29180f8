// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quilt_quic_core::time::Duration;

/// Per-connection tuning, fixed at construction time.
///
/// Every field that used to be a global flag in older stacks lives here
/// instead.
#[derive(Clone, Debug)]
pub struct Config {
    /// Close the connection after this long without any received packet
    pub idle_network_timeout: Duration,

    /// Bound on the total handshake duration; `None` waits forever
    pub handshake_timeout: Option<Duration>,

    /// Keep-alive ping interval while the session wants the connection
    /// alive
    pub keep_alive_timeout: Duration,

    /// First deadline for a retransmittable-on-wire ping; `None` disables
    /// the probe
    pub initial_retransmittable_on_wire_timeout: Option<Duration>,

    /// Stop probing after this many consecutive retransmittable-on-wire
    /// pings; `None` never stops
    pub max_retransmittable_on_wire_count: Option<u64>,

    /// Probes beyond this count back off exponentially
    pub max_aggressive_retransmittable_on_wire_count: u64,

    /// Ack ranges retained per packet number space
    pub max_ack_ranges: usize,

    /// Received packets before ack decimation takes effect
    pub min_received_before_ack_decimation: u64,

    /// Send an ack after every Nth ack-eliciting packet
    pub ack_frequency: u64,

    /// Local bound on any ack delay
    pub local_max_ack_delay: Duration,

    /// Use `min_rtt / 4` as the ack delay once decimation is active
    pub ack_decimation_enabled: bool,

    /// Attach receive timestamps to outgoing acks
    pub receive_timestamps_enabled: bool,
    pub receive_timestamps_exponent: u8,
    pub max_receive_timestamps_per_ack: usize,

    /// Bytes a server may send to an unvalidated peer, as a multiple of
    /// bytes received from it
    pub anti_amplification_factor: u64,

    /// The largest datagram the connection emits
    pub max_packet_length: u16,

    /// Undecryptable packets buffered while keys are pending
    pub max_undecryptable_packets: usize,

    /// Sent packets tracked before the connection gives up
    pub max_outstanding_packets: usize,

    /// Connection IDs issued to the peer
    pub active_connection_id_limit: u64,

    /// Allow 1-RTT key updates after handshake confirmation
    pub support_key_update: bool,

    /// Probe the alternative path this often; `None` disables multi-port
    pub multi_port_probing_interval: Option<Duration>,

    /// Ignore RETRY packets entirely
    pub drop_incoming_retry_packets: bool,

    /// The first packet number used in every space; must be non-zero
    pub initial_packet_number: u64,

    /// RTT assumed before any sample exists; also bounds path validation
    /// backoff
    pub initial_rtt: Duration,

    /// Consecutive retransmission timeouts before the connection declares
    /// a blackhole
    pub blackhole_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_network_timeout: Duration::from_secs(30),
            handshake_timeout: None,
            keep_alive_timeout: Duration::from_secs(15),
            initial_retransmittable_on_wire_timeout: None,
            max_retransmittable_on_wire_count: None,
            max_aggressive_retransmittable_on_wire_count: 5,
            max_ack_ranges: 256,
            min_received_before_ack_decimation: 100,
            ack_frequency: 2,
            local_max_ack_delay: Duration::from_millis(25),
            ack_decimation_enabled: false,
            receive_timestamps_enabled: false,
            receive_timestamps_exponent: 0,
            max_receive_timestamps_per_ack: 32,
            anti_amplification_factor: 3,
            max_packet_length: 1452,
            max_undecryptable_packets: 10,
            max_outstanding_packets: 10_000,
            active_connection_id_limit: 2,
            support_key_update: true,
            multi_port_probing_interval: None,
            drop_incoming_retry_packets: false,
            initial_packet_number: 1,
            initial_rtt: Duration::from_millis(100),
            blackhole_threshold: 5,
        }
    }
}

impl Config {
    pub fn ack_settings(&self) -> crate::ack::AckSettings {
        crate::ack::AckSettings {
            max_ack_ranges: self.max_ack_ranges,
            packet_tolerance: self.ack_frequency,
            max_ack_delay: self.local_max_ack_delay,
            local_max_ack_delay: self.local_max_ack_delay,
            min_received_before_ack_decimation: self.min_received_before_ack_decimation,
            decimation_enabled: self.ack_decimation_enabled,
            ignore_order: false,
            receive_timestamps_enabled: self.receive_timestamps_enabled,
            receive_timestamps_exponent: self.receive_timestamps_exponent,
            max_receive_timestamps_per_ack: self.max_receive_timestamps_per_ack,
        }
    }
}
