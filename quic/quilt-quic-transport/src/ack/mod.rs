// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Receive-side ack state: which packets arrived, when the next ACK frame
//! must go out, and what it carries.

mod received_packet_manager;

pub use received_packet_manager::{AckFrameData, ReceivedPacketManager};

use quilt_quic_core::time::Duration;

/// Receive-side acknowledgment tuning.
///
/// The defaults match the configuration enumerated by the connection;
/// `packet_tolerance`, `max_ack_delay`, and `ignore_order` may be updated
/// mid-connection by ACK_FREQUENCY frames.
#[derive(Clone, Debug)]
pub struct AckSettings {
    /// The maximum number of ack ranges retained; the oldest ranges are
    /// trimmed once the limit is reached
    pub max_ack_ranges: usize,

    /// Every Nth ack-eliciting packet forces an immediate ack
    pub packet_tolerance: u64,

    /// The delay the peer asked us to batch acknowledgments for
    pub max_ack_delay: Duration,

    /// A local upper bound on any requested ack delay
    pub local_max_ack_delay: Duration,

    /// The number of received packets after which ack decimation takes
    /// effect
    pub min_received_before_ack_decimation: u64,

    /// When decimation is active the ack delay becomes `min_rtt / 4`,
    /// still capped by `local_max_ack_delay`
    pub decimation_enabled: bool,

    /// Suppress immediate acks on out-of-order receipt
    pub ignore_order: bool,

    /// Emit ACK_RECEIVE_TIMESTAMPS instead of plain ACK/ACK_ECN
    pub receive_timestamps_enabled: bool,

    /// The negotiated exponent timestamps are scaled by
    pub receive_timestamps_exponent: u8,

    /// The maximum number of per-packet timestamps carried per ack
    pub max_receive_timestamps_per_ack: usize,
}

impl Default for AckSettings {
    fn default() -> Self {
        Self {
            max_ack_ranges: 256,
            packet_tolerance: 2,
            max_ack_delay: Duration::from_millis(25),
            local_max_ack_delay: Duration::from_millis(25),
            min_received_before_ack_decimation: 100,
            decimation_enabled: false,
            ignore_order: false,
            receive_timestamps_enabled: false,
            receive_timestamps_exponent: 0,
            max_receive_timestamps_per_ack: 32,
        }
    }
}
