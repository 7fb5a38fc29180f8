// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Keep-alive and retransmittable-on-wire probing.
//!
//! Two deadlines share one manager: a keep-alive ping that holds NATs
//! open while the session wants the connection alive, and a
//! retransmittable-on-wire probe sent when a response is expected but no
//! retransmittable bytes are in flight.

use quilt_quic_core::time::{Duration, Timer, Timestamp};

/// Which probe fired
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PingAction {
    KeepAlive,
    RetransmittableOnWire,
}

#[derive(Debug)]
pub struct PingManager {
    keep_alive_timeout: Duration,
    initial_retransmittable_on_wire_timeout: Option<Duration>,
    max_retransmittable_on_wire_count: Option<u64>,
    aggressive_retransmittable_on_wire_count: u64,

    keep_alive: Timer,
    retransmittable_on_wire: Timer,
    consecutive_retransmittable_on_wire_count: u64,
}

/// The exponential backoff stops doubling after this many shifts
const MAX_BACKOFF_SHIFT: u32 = 10;

impl PingManager {
    pub fn new(
        keep_alive_timeout: Duration,
        initial_retransmittable_on_wire_timeout: Option<Duration>,
        max_retransmittable_on_wire_count: Option<u64>,
        aggressive_retransmittable_on_wire_count: u64,
    ) -> Self {
        Self {
            keep_alive_timeout,
            initial_retransmittable_on_wire_timeout,
            max_retransmittable_on_wire_count,
            aggressive_retransmittable_on_wire_count,
            keep_alive: Timer::default(),
            retransmittable_on_wire: Timer::default(),
            consecutive_retransmittable_on_wire_count: 0,
        }
    }

    /// Re-arms both deadlines from the current session state. Called
    /// after every send and receive.
    pub fn update(
        &mut self,
        now: Timestamp,
        should_keep_alive: bool,
        has_retransmittable_in_flight: bool,
    ) {
        if !should_keep_alive {
            self.keep_alive.cancel();
            self.retransmittable_on_wire.cancel();
            return;
        }

        self.keep_alive.set(now + self.keep_alive_timeout);

        let exhausted = self
            .max_retransmittable_on_wire_count
            .map_or(false, |max| self.consecutive_retransmittable_on_wire_count >= max);

        match self.initial_retransmittable_on_wire_timeout {
            Some(initial) if !has_retransmittable_in_flight && !exhausted => {
                let shift = self
                    .consecutive_retransmittable_on_wire_count
                    .saturating_sub(self.aggressive_retransmittable_on_wire_count)
                    .min(MAX_BACKOFF_SHIFT as u64) as u32;
                let timeout = initial.saturating_mul(1 << shift);
                self.retransmittable_on_wire.set(now + timeout);
            }
            _ => self.retransmittable_on_wire.cancel(),
        }
    }

    /// Returns the probe to send when a deadline expired
    pub fn on_timeout(&mut self, now: Timestamp) -> Option<PingAction> {
        if self
            .retransmittable_on_wire
            .poll_expiration(now)
            .is_ready()
        {
            self.consecutive_retransmittable_on_wire_count += 1;
            return Some(PingAction::RetransmittableOnWire);
        }

        if self.keep_alive.poll_expiration(now).is_ready() {
            return Some(PingAction::KeepAlive);
        }

        None
    }

    /// Forward progress resets the probe backoff
    pub fn on_forward_progress(&mut self) {
        self.consecutive_retransmittable_on_wire_count = 0;
    }

    pub fn next_timeout(&self) -> Option<Timestamp> {
        [
            self.keep_alive.expiration(),
            self.retransmittable_on_wire.expiration(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn cancel(&mut self) {
        self.keep_alive.cancel();
        self.retransmittable_on_wire.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::from_duration(Duration::from_secs(10))
    }

    fn manager() -> PingManager {
        PingManager::new(
            Duration::from_secs(15),
            Some(Duration::from_millis(200)),
            None,
            2,
        )
    }

    #[test]
    fn keep_alive_test() {
        let mut manager = manager();

        manager.update(now(), true, true);
        // retransmittable bytes are in flight: only keep-alive is armed
        assert_eq!(manager.next_timeout(), Some(now() + Duration::from_secs(15)));

        assert_eq!(manager.on_timeout(now() + Duration::from_secs(15)), Some(PingAction::KeepAlive));

        manager.update(now(), false, false);
        assert_eq!(manager.next_timeout(), None);
    }

    #[test]
    fn retransmittable_on_wire_backoff_test() {
        let mut manager = manager();
        let initial = Duration::from_millis(200);

        // the first probes fire at the aggressive (constant) interval
        for _ in 0..2 {
            manager.update(now(), true, false);
            let deadline = manager.retransmittable_on_wire.expiration().unwrap();
            assert_eq!(deadline, now() + initial);
            assert_eq!(
                manager.on_timeout(deadline),
                Some(PingAction::RetransmittableOnWire)
            );
        }

        // afterwards the interval doubles
        manager.update(now(), true, false);
        assert_eq!(
            manager.retransmittable_on_wire.expiration().unwrap(),
            now() + initial
        );
        manager.on_timeout(now() + initial);

        manager.update(now(), true, false);
        assert_eq!(
            manager.retransmittable_on_wire.expiration().unwrap(),
            now() + initial * 2
        );

        // forward progress resets the schedule
        manager.on_forward_progress();
        manager.update(now(), true, false);
        assert_eq!(
            manager.retransmittable_on_wire.expiration().unwrap(),
            now() + initial
        );
    }

    #[test]
    fn probe_count_limit_test() {
        let mut manager = PingManager::new(
            Duration::from_secs(15),
            Some(Duration::from_millis(200)),
            Some(1),
            5,
        );

        manager.update(now(), true, false);
        assert!(manager.retransmittable_on_wire.is_armed());
        manager.on_timeout(now() + Duration::from_millis(200));

        // the probe budget is spent
        manager.update(now(), true, false);
        assert!(!manager.retransmittable_on_wire.is_armed());
        // keep-alive continues
        assert!(manager.keep_alive.is_armed());
    }
}
