// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The non-blocking datagram writer the connection emits packets through.
//!
//! Socket ownership and the event loop live outside the core; the writer
//! is expected to accept a datagram immediately, report `Blocked` when the
//! socket would block, or return a fatal error.

use std::net::SocketAddr;

/// The result of handing one datagram to the writer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteResult {
    /// The datagram was accepted
    Written,
    /// The writer cannot accept the datagram right now. The caller must
    /// buffer it and retry after `on_blocked_writer_can_write`.
    Blocked,
    /// The writer failed permanently; the connection must close
    Fatal(&'static str),
}

impl WriteResult {
    #[inline]
    pub fn is_written(self) -> bool {
        matches!(self, Self::Written)
    }

    #[inline]
    pub fn is_blocked(self) -> bool {
        matches!(self, Self::Blocked)
    }
}

/// A non-blocking datagram writer
pub trait PacketWriter {
    fn write_datagram(&mut self, remote_address: SocketAddr, payload: &[u8]) -> WriteResult;

    /// Returns true while the writer is unable to accept datagrams
    fn is_blocked(&self) -> bool {
        false
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use alloc::vec::Vec;

    /// A writer capturing every datagram, with scriptable blocking
    #[derive(Debug, Default)]
    pub struct Writer {
        pub sent: Vec<(SocketAddr, Vec<u8>)>,
        pub blocked: bool,
        pub fatal: Option<&'static str>,
    }

    impl Writer {
        pub fn datagrams(&self) -> impl Iterator<Item = &[u8]> {
            self.sent.iter().map(|(_, payload)| payload.as_slice())
        }

        pub fn clear(&mut self) {
            self.sent.clear();
        }
    }

    impl PacketWriter for Writer {
        fn write_datagram(&mut self, remote_address: SocketAddr, payload: &[u8]) -> WriteResult {
            if let Some(reason) = self.fatal {
                return WriteResult::Fatal(reason);
            }
            if self.blocked {
                return WriteResult::Blocked;
            }
            self.sent.push((remote_address, payload.to_vec()));
            WriteResult::Written
        }

        fn is_blocked(&self) -> bool {
            self.blocked
        }
    }
}
