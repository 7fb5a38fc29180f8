// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quilt_quic_core::{
    packet::number::PacketNumber,
    time::{Duration, Timer, Timestamp},
};

//= https://www.rfc-editor.org/rfc/rfc9000#section-14.3
//# Endpoints SHOULD set the initial value of BASE_PLPMTU (Section 5.1 of
//# [DPLPMTUD]) to be consistent with QUIC's smallest allowed maximum
//# datagram size.

/// Probes the path MTU with padded packets and raises the packet size
/// once a probe is acknowledged.
#[derive(Debug)]
pub struct MtuDiscoverer {
    enabled: bool,
    /// The confirmed MTU every normal packet respects
    long_term_mtu: u16,
    /// The size of the next probe
    target_mtu: u16,
    max_mtu: u16,
    probe_in_flight: Option<PacketNumber>,
    probe_timer: Timer,
    probe_interval: Duration,
}

/// Step toward the ceiling by this much per successful probe
const PROBE_STEP: u16 = 80;

impl MtuDiscoverer {
    pub fn new(base_mtu: u16, max_mtu: u16, probe_interval: Duration) -> Self {
        Self {
            enabled: false,
            long_term_mtu: base_mtu,
            target_mtu: base_mtu.saturating_add(PROBE_STEP).min(max_mtu),
            max_mtu,
            probe_in_flight: None,
            probe_timer: Timer::default(),
            probe_interval,
        }
    }

    pub fn enable(&mut self, now: Timestamp) {
        if self.long_term_mtu >= self.max_mtu {
            return;
        }
        self.enabled = true;
        self.probe_timer.set(now + self.probe_interval);
    }

    /// The MTU ordinary packets must fit in
    pub fn mtu(&self) -> u16 {
        self.long_term_mtu
    }

    /// Returns the probe size when a probe is due; the caller records the
    /// packet number it was sent with
    pub fn on_timeout(&mut self, now: Timestamp) -> Option<u16> {
        if !self.enabled || self.probe_in_flight.is_some() {
            return None;
        }
        if self.probe_timer.poll_expiration(now).is_pending() {
            return None;
        }
        Some(self.target_mtu)
    }

    pub fn on_probe_sent(&mut self, packet_number: PacketNumber, now: Timestamp) {
        self.probe_in_flight = Some(packet_number);
        self.probe_timer.set(now + self.probe_interval);
    }

    /// An acked probe raises the confirmed MTU. Returns the new value
    /// when it advanced.
    pub fn on_probe_acked(&mut self, packet_number: PacketNumber) -> Option<u16> {
        if self.probe_in_flight != Some(packet_number) {
            return None;
        }
        self.probe_in_flight = None;
        self.long_term_mtu = self.target_mtu;

        if self.long_term_mtu >= self.max_mtu {
            self.enabled = false;
        } else {
            self.target_mtu = self
                .target_mtu
                .saturating_add(PROBE_STEP)
                .min(self.max_mtu);
        }

        Some(self.long_term_mtu)
    }

    /// A lost probe leaves the confirmed MTU untouched
    pub fn on_probe_lost(&mut self, packet_number: PacketNumber) {
        if self.probe_in_flight == Some(packet_number) {
            self.probe_in_flight = None;
        }
    }

    /// A writer error at the probed size reverts and disables discovery
    pub fn on_write_error(&mut self) {
        self.probe_in_flight = None;
        self.target_mtu = self.long_term_mtu;
        self.enabled = false;
        self.probe_timer.cancel();
    }

    pub fn next_timeout(&self) -> Option<Timestamp> {
        if !self.enabled || self.probe_in_flight.is_some() {
            return None;
        }
        self.probe_timer.expiration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_quic_core::{packet::number::PacketNumberSpace, varint::VarInt};

    fn pn(value: u32) -> PacketNumber {
        PacketNumberSpace::ApplicationData.new_packet_number(VarInt::from_u32(value))
    }

    fn now() -> Timestamp {
        Timestamp::from_duration(Duration::from_secs(1))
    }

    #[test]
    fn probe_raises_mtu_test() {
        let mut discoverer = MtuDiscoverer::new(1200, 1452, Duration::from_secs(10));
        discoverer.enable(now());
        assert_eq!(discoverer.mtu(), 1200);
        assert_eq!(discoverer.on_timeout(now()), None);

        let due = now() + Duration::from_secs(10);
        let probe_size = discoverer.on_timeout(due).unwrap();
        assert_eq!(probe_size, 1280);

        discoverer.on_probe_sent(pn(9), due);
        assert_eq!(discoverer.on_probe_acked(pn(9)), Some(1280));
        assert_eq!(discoverer.mtu(), 1280);
    }

    #[test]
    fn lost_probe_keeps_mtu_test() {
        let mut discoverer = MtuDiscoverer::new(1200, 1452, Duration::from_secs(10));
        discoverer.enable(now());
        let due = now() + Duration::from_secs(10);
        discoverer.on_timeout(due).unwrap();
        discoverer.on_probe_sent(pn(9), due);

        discoverer.on_probe_lost(pn(9));
        assert_eq!(discoverer.mtu(), 1200);
        // probing continues after the next interval
        assert!(discoverer.next_timeout().is_some());
    }

    #[test]
    fn write_error_disables_discovery_test() {
        let mut discoverer = MtuDiscoverer::new(1200, 1452, Duration::from_secs(10));
        discoverer.enable(now());
        discoverer.on_write_error();
        assert_eq!(discoverer.mtu(), 1200);
        assert_eq!(discoverer.next_timeout(), None);
    }
}
