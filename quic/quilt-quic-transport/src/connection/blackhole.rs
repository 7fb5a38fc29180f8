// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Detects a network that swallows packets: several consecutive
/// retransmission timeouts without any forward progress.
#[derive(Debug)]
pub struct BlackholeDetector {
    consecutive_timeouts: u64,
    threshold: u64,
}

/// The path is reported degrading well before the blackhole threshold so
/// multi-port probing can react
const PATH_DEGRADING_THRESHOLD: u64 = 2;

impl BlackholeDetector {
    pub fn new(threshold: u64) -> Self {
        Self {
            consecutive_timeouts: 0,
            threshold: threshold.max(1),
        }
    }

    /// Records a retransmission timeout; returns true once the blackhole
    /// threshold is reached
    pub fn on_retransmission_timeout(&mut self) -> bool {
        self.consecutive_timeouts += 1;
        self.consecutive_timeouts >= self.threshold
    }

    /// Any acked packet is forward progress
    pub fn on_forward_progress(&mut self) {
        self.consecutive_timeouts = 0;
    }

    pub fn is_path_degrading(&self) -> bool {
        self.consecutive_timeouts >= PATH_DEGRADING_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_test() {
        let mut detector = BlackholeDetector::new(5);

        for _ in 0..4 {
            assert!(!detector.on_retransmission_timeout());
        }
        assert!(detector.is_path_degrading());
        assert!(detector.on_retransmission_timeout());

        detector.on_forward_progress();
        assert!(!detector.is_path_degrading());
        assert!(!detector.on_retransmission_timeout());
    }
}
