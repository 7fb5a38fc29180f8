// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The per-connection QUIC state machine: framing, ack tracking,
//! retransmission bookkeeping, path management, and timers.
//!
//! The TLS handshake driver, HTTP mapping, congestion controller
//! internals, and socket glue are external collaborators reached through
//! the traits in [`connection`], [`framer`], and [`io`].

#![forbid(unsafe_code)]

extern crate alloc;

pub mod ack;
pub mod connection;
pub mod control_frame;
pub mod event;
pub mod framer;
pub mod interval_set;
pub mod io;
pub mod notifier;
pub mod sent_packet;
