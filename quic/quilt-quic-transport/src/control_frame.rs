// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tracking for retransmittable control frames.
//!
//! Every outgoing control frame is assigned a monotone 64-bit id when it
//! is buffered. The id travels with the packet that carries the frame;
//! ack and loss notifications refer back to it.

use crate::sent_packet::TransmissionType;
use alloc::collections::{BTreeSet, VecDeque};
use bytes::Bytes;
use hashbrown::HashMap;
use quilt_quic_core::{connection, frame, varint::VarInt};
use quilt_codec::{Encoder, EncoderValue};

/// Frame ids start at 1; 0 means "not trackable"
pub const INVALID_CONTROL_FRAME_ID: u64 = 0;

/// The maximum number of control frames buffered while waiting to be
/// acked or sent for the first time
pub const MAX_BUFFERED_CONTROL_FRAMES: usize = 1000;

/// An owned, retransmittable control frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlFrame {
    ResetStream(frame::ResetStream),
    ResetStreamAt(frame::ResetStreamAt),
    StopSending(frame::StopSending),
    MaxData(frame::MaxData),
    MaxStreamData(frame::MaxStreamData),
    MaxStreams(frame::MaxStreams),
    DataBlocked(frame::DataBlocked),
    StreamDataBlocked(frame::StreamDataBlocked),
    StreamsBlocked(frame::StreamsBlocked),
    NewConnectionId(frame::NewConnectionId),
    RetireConnectionId(frame::RetireConnectionId),
    NewToken(Bytes),
    HandshakeDone(frame::HandshakeDone),
    AckFrequency(frame::AckFrequency),
}

impl ControlFrame {
    /// The key used for window update deduplication: `None` for
    /// connection-level updates, the stream id otherwise
    fn window_update_key(&self) -> Option<Option<VarInt>> {
        match self {
            Self::MaxData(_) => Some(None),
            Self::MaxStreamData(frame) => Some(Some(frame.stream_id)),
            _ => None,
        }
    }
}

impl EncoderValue for ControlFrame {
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        match self {
            Self::ResetStream(frame) => buffer.encode(frame),
            Self::ResetStreamAt(frame) => buffer.encode(frame),
            Self::StopSending(frame) => buffer.encode(frame),
            Self::MaxData(frame) => buffer.encode(frame),
            Self::MaxStreamData(frame) => buffer.encode(frame),
            Self::MaxStreams(frame) => buffer.encode(frame),
            Self::DataBlocked(frame) => buffer.encode(frame),
            Self::StreamDataBlocked(frame) => buffer.encode(frame),
            Self::StreamsBlocked(frame) => buffer.encode(frame),
            Self::NewConnectionId(frame) => buffer.encode(frame),
            Self::RetireConnectionId(frame) => buffer.encode(frame),
            Self::NewToken(token) => buffer.encode(&frame::NewToken {
                token: token.as_ref(),
            }),
            Self::HandshakeDone(frame) => buffer.encode(frame),
            Self::AckFrequency(frame) => buffer.encode(frame),
        }
    }
}

/// The write hook the manager drives frames through.
///
/// Returning `false` signals the writer is currently unable to take the
/// frame; the manager stops and retries on the next `on_can_write`.
pub trait FrameSender {
    fn send_control_frame(
        &mut self,
        id: u64,
        frame: &ControlFrame,
        transmission_type: TransmissionType,
    ) -> bool;
}

/// Buffers, retransmits, and acknowledges outgoing control frames by id
#[derive(Debug)]
pub struct ControlFrameManager {
    /// Slot `i` holds the frame with id `least_unacked + i`; acked slots
    /// are tombstoned until the window slides past them
    frames: VecDeque<Option<ControlFrame>>,
    last_id: u64,
    least_unacked: u64,
    least_unsent: u64,
    pending_retransmission: BTreeSet<u64>,
    /// stream id (or `None` for MAX_DATA) -> most recent outstanding
    /// window update id
    window_updates: HashMap<Option<VarInt>, u64>,
}

impl ControlFrameManager {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            last_id: INVALID_CONTROL_FRAME_ID,
            least_unacked: 1,
            least_unsent: 1,
            pending_retransmission: BTreeSet::new(),
            window_updates: HashMap::new(),
        }
    }

    /// Assigns the next id to `frame` and appends it to the buffer.
    ///
    /// The caller drives the actual send through `on_can_write`.
    pub fn write_or_buffer(&mut self, frame: ControlFrame) -> Result<u64, connection::Error> {
        self.last_id += 1;
        let id = self.last_id;
        self.frames.push_back(Some(frame));

        if self.frames.len() > MAX_BUFFERED_CONTROL_FRAMES {
            return Err(connection::Error::TooManyBufferedControlFrames);
        }

        Ok(id)
    }

    fn slot(&self, id: u64) -> Option<&ControlFrame> {
        if id < self.least_unacked || id > self.last_id {
            return None;
        }
        self.frames
            .get((id - self.least_unacked) as usize)
            .and_then(|slot| slot.as_ref())
    }

    /// Returns true while the frame has been neither acked nor superseded
    pub fn is_outstanding(&self, id: u64) -> bool {
        id != INVALID_CONTROL_FRAME_ID && id < self.least_unsent && self.slot(id).is_some()
    }

    /// Marks `id` as sent for the first time
    pub fn on_frame_sent(&mut self, id: u64) {
        debug_assert_eq!(id, self.least_unsent, "control frames are sent in id order");
        if id == self.least_unsent {
            self.least_unsent += 1;
        }

        // sending a newer window update supersedes the outstanding one
        // for the same stream
        if let Some(key) = self.slot(id).and_then(ControlFrame::window_update_key) {
            if let Some(previous) = self.window_updates.insert(key, id) {
                if previous != id {
                    self.on_frame_acked(previous);
                }
            }
        }
    }

    /// Clears the slot for `id`. Returns true if the frame was
    /// outstanding before the call.
    pub fn on_frame_acked(&mut self, id: u64) -> bool {
        if !self.is_outstanding(id) {
            return false;
        }

        if let Some(key) = self.slot(id).and_then(ControlFrame::window_update_key) {
            if self.window_updates.get(&key) == Some(&id) {
                self.window_updates.remove(&key);
            }
        }

        self.frames[(id - self.least_unacked) as usize] = None;
        self.pending_retransmission.remove(&id);

        // slide the window past acked slots
        while self.least_unacked < self.least_unsent {
            match self.frames.front() {
                Some(None) => {
                    self.frames.pop_front();
                    self.least_unacked += 1;
                }
                _ => break,
            }
        }

        true
    }

    /// Marks `id` pending retransmission unless it was already acked
    pub fn on_frame_lost(&mut self, id: u64) {
        if self.is_outstanding(id) {
            self.pending_retransmission.insert(id);
        }
    }

    /// Re-serializes a still-outstanding frame through the sender.
    ///
    /// Returns false if the sender rejected the write; the frame stays
    /// pending.
    pub fn retransmit(
        &mut self,
        id: u64,
        transmission_type: TransmissionType,
        sender: &mut impl FrameSender,
    ) -> bool {
        let Some(frame) = self.slot(id) else {
            // already acked; nothing to resend
            self.pending_retransmission.remove(&id);
            return true;
        };
        let frame = frame.clone();

        if !self.is_outstanding(id) {
            self.pending_retransmission.remove(&id);
            return true;
        }

        if sender.send_control_frame(id, &frame, transmission_type) {
            self.pending_retransmission.remove(&id);
            true
        } else {
            false
        }
    }

    /// Drains pending retransmissions, then buffered new frames, stopping
    /// at the first writer rejection
    pub fn on_can_write(&mut self, sender: &mut impl FrameSender) {
        if self.retransmit_pending(sender) {
            self.write_buffered(sender);
        }
    }

    /// Resends every lost frame; returns false when the writer blocks
    pub fn retransmit_pending(&mut self, sender: &mut impl FrameSender) -> bool {
        while let Some(id) = self.pending_retransmission.iter().next().copied() {
            if !self.retransmit(id, TransmissionType::LossRetransmission, sender) {
                return false;
            }
        }
        true
    }

    /// Sends every buffered frame; returns false when the writer blocks
    pub fn write_buffered(&mut self, sender: &mut impl FrameSender) -> bool {
        while self.has_buffered_frames() {
            let id = self.least_unsent;
            let Some(frame) = self.slot(id).cloned() else {
                // buffered frames cannot be acked before first send
                debug_assert!(false, "unsent control frame slot is empty");
                self.least_unsent += 1;
                continue;
            };

            if !sender.send_control_frame(id, &frame, TransmissionType::NotRetransmission) {
                return false;
            }

            self.on_frame_sent(id);
        }
        true
    }

    /// Returns true while frames are waiting to be sent for the first
    /// time
    #[inline]
    pub fn has_buffered_frames(&self) -> bool {
        self.least_unsent <= self.last_id
    }

    /// Returns true while lost frames are waiting to be resent
    #[inline]
    pub fn has_pending_retransmission(&self) -> bool {
        !self.pending_retransmission.is_empty()
    }

    /// Returns true while any sent frame has not been acked
    #[inline]
    pub fn is_waiting_for_acks(&self) -> bool {
        (self.least_unacked..self.least_unsent).any(|id| self.slot(id).is_some())
    }
}
