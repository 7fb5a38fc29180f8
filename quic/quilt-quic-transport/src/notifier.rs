// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Send-side bookkeeping for stream and crypto bytes.
//!
//! Mirrors the control frame manager for byte ranges: every sent range of
//! stream or crypto data is tracked until it is acked, and lost ranges are
//! queued for retransmission. Interval arithmetic keeps retransmissions
//! from duplicating bytes acked in the meantime.

use crate::{
    control_frame::{ControlFrameManager, FrameSender},
    interval_set::IntervalSet,
    sent_packet::{SentFrame, TransmissionType},
};
use alloc::collections::BTreeMap;
use quilt_quic_core::{crypto::EncryptionLevel, varint::VarInt};

/// The write hooks the notifier drives data through. Implemented by the
/// connection's packet creator.
pub trait DataSender: FrameSender {
    /// Writes up to `length` stream bytes starting at `offset`; returns
    /// the consumed length and whether a fin was included
    fn send_stream_data(
        &mut self,
        stream_id: VarInt,
        offset: u64,
        length: u64,
        fin: bool,
        transmission_type: TransmissionType,
    ) -> (u64, bool);

    /// Writes up to `length` crypto bytes at `level` starting at
    /// `offset`; returns the consumed length
    fn send_crypto_data(
        &mut self,
        level: EncryptionLevel,
        offset: u64,
        length: u64,
        transmission_type: TransmissionType,
    ) -> u64;
}

#[derive(Debug, Default)]
struct StreamState {
    /// Bytes the application has handed over
    bytes_total: u64,
    /// Bytes handed to the packet creator at least once
    bytes_sent: u64,
    bytes_acked: IntervalSet,
    pending_retransmission: IntervalSet,
    fin_buffered: bool,
    fin_sent: bool,
    fin_outstanding: bool,
    fin_lost: bool,
    fin_acked: bool,
    /// Set by RESET_STREAM; no further retransmission happens
    reset: bool,
    /// Set by RESET_STREAM_AT; bytes at or above this offset are no
    /// longer retransmitted
    reliable_offset: Option<u64>,
}

impl StreamState {
    fn is_waiting_for_acks(&self) -> bool {
        if self.reset {
            return false;
        }
        self.fin_outstanding
            || self.fin_lost
            || !self.pending_retransmission.is_empty()
            || self.bytes_acked.count() < self.bytes_sent
    }

    fn has_buffered_data(&self) -> bool {
        if self.reset {
            return false;
        }
        self.bytes_sent < self.bytes_total || (self.fin_buffered && !self.fin_sent)
    }

    /// Drops retransmission eligibility above the reliable offset
    fn apply_reliable_offset(&mut self, reliable_offset: u64) {
        self.reliable_offset = Some(reliable_offset);
        if reliable_offset < u64::MAX {
            let _ = self
                .pending_retransmission
                .remove(reliable_offset..u64::MAX);
        }
        self.fin_lost = false;
        self.fin_outstanding = false;
        self.fin_buffered = false;
    }
}

#[derive(Debug, Default)]
struct CryptoState {
    bytes_total: u64,
    bytes_sent: u64,
    acked: IntervalSet,
    pending_retransmission: IntervalSet,
}

/// Tracks per-stream and per-level sent data and drives retransmission
#[derive(Debug, Default)]
pub struct SessionNotifier {
    streams: BTreeMap<u64, StreamState>,
    crypto: [CryptoState; 4],
}

const CRYPTO_LEVELS: [EncryptionLevel; 4] = EncryptionLevel::all();

#[inline]
fn crypto_index(level: EncryptionLevel) -> usize {
    match level {
        EncryptionLevel::Initial => 0,
        EncryptionLevel::ZeroRtt => 1,
        EncryptionLevel::Handshake => 2,
        EncryptionLevel::OneRtt => 3,
    }
}

impl SessionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&mut self, stream_id: VarInt) -> &mut StreamState {
        self.streams.entry(stream_id.as_u64()).or_default()
    }

    /// Buffers `length` new stream bytes (and optionally a fin) and sends
    /// them unless the write path is currently blocked.
    ///
    /// Returns the bytes consumed by the connection and whether the fin
    /// went out.
    pub fn write_or_buffer_stream_data(
        &mut self,
        stream_id: VarInt,
        length: u64,
        fin: bool,
        sender: &mut impl DataSender,
        control: &ControlFrameManager,
    ) -> (u64, bool) {
        let blocked = self.is_write_blocked(control);

        let state = self.stream(stream_id);
        state.bytes_total += length;
        if fin {
            state.fin_buffered = true;
        }

        if blocked {
            return (0, false);
        }

        Self::flush_stream(stream_id, state, sender)
    }

    /// Buffers `length` new crypto bytes at `level` and sends what the
    /// connection accepts. Returns the bytes consumed.
    pub fn write_crypto_data(
        &mut self,
        level: EncryptionLevel,
        length: u64,
        sender: &mut impl DataSender,
    ) -> u64 {
        let state = &mut self.crypto[crypto_index(level)];
        state.bytes_total += length;

        let offset = state.bytes_sent;
        let want = state.bytes_total - state.bytes_sent;
        let consumed = sender.send_crypto_data(
            level,
            offset,
            want,
            TransmissionType::NotRetransmission,
        );
        state.bytes_sent += consumed;
        consumed
    }

    fn flush_stream(
        stream_id: VarInt,
        state: &mut StreamState,
        sender: &mut impl DataSender,
    ) -> (u64, bool) {
        let offset = state.bytes_sent;
        let want = state.bytes_total - state.bytes_sent;
        let fin = state.fin_buffered && !state.fin_sent;

        if want == 0 && !fin {
            return (0, false);
        }

        let (consumed, fin_sent) = sender.send_stream_data(
            stream_id,
            offset,
            want,
            fin,
            TransmissionType::NotRetransmission,
        );

        state.bytes_sent += consumed;
        if fin_sent {
            state.fin_sent = true;
            state.fin_outstanding = true;
        }

        (consumed, fin_sent)
    }

    /// Applies an acknowledgment for a sent frame. Returns true if any
    /// new data (or a fin) was acked by it.
    pub fn on_frame_acked(&mut self, frame: &SentFrame) -> bool {
        match frame {
            SentFrame::Stream {
                stream_id,
                offset,
                length,
                is_fin,
            } => {
                let state = self.stream(*stream_id);
                let range = *offset..offset + length;

                let mut newly_acked = false;
                if *length > 0 && !state.bytes_acked.contains_range(range.clone()) {
                    newly_acked = true;
                }
                if *length > 0 {
                    let _ = state.bytes_acked.insert(range.clone());
                    let _ = state.pending_retransmission.remove(range);
                }
                if *is_fin && !state.fin_acked {
                    state.fin_acked = true;
                    state.fin_outstanding = false;
                    state.fin_lost = false;
                    newly_acked = true;
                }
                newly_acked
            }
            SentFrame::Crypto {
                level,
                offset,
                length,
            } => {
                let state = &mut self.crypto[crypto_index(*level)];
                let range = *offset..offset + length;

                if *length == 0 {
                    return false;
                }
                let newly_acked = !state.acked.contains_range(range.clone());
                let _ = state.acked.insert(range.clone());
                let _ = state.pending_retransmission.remove(range);
                newly_acked
            }
            _ => false,
        }
    }

    /// Queues the still-unacked parts of a lost frame for retransmission
    pub fn on_frame_lost(&mut self, frame: &SentFrame) {
        match frame {
            SentFrame::Stream {
                stream_id,
                offset,
                length,
                is_fin,
            } => {
                let state = self.stream(*stream_id);
                if state.reset {
                    return;
                }

                if *length > 0 {
                    let mut range = *offset..offset + length;
                    if let Some(reliable) = state.reliable_offset {
                        range.end = range.end.min(reliable);
                    }
                    for missing in state.bytes_acked.complement_within(range) {
                        let _ = state.pending_retransmission.insert(missing);
                    }
                }

                if *is_fin && !state.fin_acked && state.reliable_offset.is_none() {
                    state.fin_lost = true;
                    state.fin_outstanding = false;
                }
            }
            SentFrame::Crypto {
                level,
                offset,
                length,
            } => {
                if *length == 0 {
                    return;
                }
                let state = &mut self.crypto[crypto_index(*level)];
                let range = *offset..offset + length;
                for missing in state.acked.complement_within(range) {
                    let _ = state.pending_retransmission.insert(missing);
                }
            }
            _ => {}
        }
    }

    /// Resends the data carried by `frames`, honoring intervening acks.
    /// Crypto segments are resent at the level that originally carried
    /// them. Control frames are resent through the control frame manager.
    pub fn retransmit_frames(
        &mut self,
        frames: &[SentFrame],
        transmission_type: TransmissionType,
        sender: &mut impl DataSender,
        control: &mut ControlFrameManager,
    ) -> bool {
        for frame in frames {
            match frame {
                SentFrame::Stream {
                    stream_id,
                    offset,
                    length,
                    is_fin,
                } => {
                    let state = self.stream(*stream_id);
                    if state.reset {
                        continue;
                    }
                    let mut end = offset + length;
                    if let Some(reliable) = state.reliable_offset {
                        end = end.min(reliable);
                    }

                    for missing in state.bytes_acked.complement_within(*offset..end) {
                        let length = missing.end - missing.start;
                        let fin = *is_fin && missing.end == state.bytes_total;
                        let (consumed, _) = sender.send_stream_data(
                            *stream_id,
                            missing.start,
                            length,
                            fin,
                            transmission_type,
                        );
                        if consumed < length {
                            // writer blocked; track the remainder as lost
                            let _ = state
                                .pending_retransmission
                                .insert(missing.start + consumed..missing.end);
                            return false;
                        }
                    }

                    if *is_fin && !state.fin_acked && state.reliable_offset.is_none() {
                        let (_, fin_sent) = sender.send_stream_data(
                            *stream_id,
                            state.bytes_total,
                            0,
                            true,
                            transmission_type,
                        );
                        if !fin_sent {
                            state.fin_lost = true;
                            return false;
                        }
                        state.fin_outstanding = true;
                        state.fin_lost = false;
                    }
                }
                SentFrame::Crypto {
                    level,
                    offset,
                    length,
                } => {
                    let state = &mut self.crypto[crypto_index(*level)];
                    for missing in state.acked.complement_within(*offset..offset + length) {
                        let length = missing.end - missing.start;
                        let consumed = sender.send_crypto_data(
                            *level,
                            missing.start,
                            length,
                            transmission_type,
                        );
                        if consumed < length {
                            let _ = state
                                .pending_retransmission
                                .insert(missing.start + consumed..missing.end);
                            return false;
                        }
                    }
                }
                SentFrame::Control { id } => {
                    if !control.retransmit(*id, transmission_type, sender) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }

    /// The full write drive order: lost crypto, lost control, lost
    /// stream, buffered crypto, buffered control, then new stream data,
    /// stopping at the first writer rejection.
    pub fn on_can_write(
        &mut self,
        sender: &mut impl DataSender,
        control: &mut ControlFrameManager,
    ) {
        if !self.retransmit_lost_crypto(sender) {
            return;
        }
        if !control.retransmit_pending(sender) {
            return;
        }
        if !self.retransmit_lost_stream(sender) {
            return;
        }
        if !self.write_buffered_crypto(sender) {
            return;
        }
        if !control.write_buffered(sender) {
            return;
        }
        self.write_buffered_stream(sender);
    }

    fn retransmit_lost_crypto(&mut self, sender: &mut impl DataSender) -> bool {
        for level in CRYPTO_LEVELS {
            let state = &mut self.crypto[crypto_index(level)];
            while let Some(range) = state.pending_retransmission.pop_min_interval() {
                let length = range.end - range.start;
                let consumed = sender.send_crypto_data(
                    level,
                    range.start,
                    length,
                    TransmissionType::LossRetransmission,
                );
                if consumed < length {
                    let _ = state
                        .pending_retransmission
                        .insert(range.start + consumed..range.end);
                    return false;
                }
            }
        }
        true
    }

    fn retransmit_lost_stream(&mut self, sender: &mut impl DataSender) -> bool {
        for (stream_id, state) in self.streams.iter_mut() {
            let stream_id = match VarInt::new(*stream_id) {
                Ok(id) => id,
                Err(_) => continue,
            };

            while let Some(range) = state.pending_retransmission.pop_min_interval() {
                let length = range.end - range.start;
                let fin = state.fin_lost && range.end == state.bytes_total;
                let (consumed, fin_sent) = sender.send_stream_data(
                    stream_id,
                    range.start,
                    length,
                    fin,
                    TransmissionType::LossRetransmission,
                );
                if consumed < length {
                    let _ = state
                        .pending_retransmission
                        .insert(range.start + consumed..range.end);
                    return false;
                }
                if fin && fin_sent {
                    state.fin_lost = false;
                    state.fin_outstanding = true;
                }
            }

            if state.fin_lost {
                let (_, fin_sent) = sender.send_stream_data(
                    stream_id,
                    state.bytes_total,
                    0,
                    true,
                    TransmissionType::LossRetransmission,
                );
                if !fin_sent {
                    return false;
                }
                state.fin_lost = false;
                state.fin_outstanding = true;
            }
        }
        true
    }

    fn write_buffered_crypto(&mut self, sender: &mut impl DataSender) -> bool {
        for level in CRYPTO_LEVELS {
            let state = &mut self.crypto[crypto_index(level)];
            let want = state.bytes_total - state.bytes_sent;
            if want == 0 {
                continue;
            }
            let consumed = sender.send_crypto_data(
                level,
                state.bytes_sent,
                want,
                TransmissionType::NotRetransmission,
            );
            state.bytes_sent += consumed;
            if consumed < want {
                return false;
            }
        }
        true
    }

    fn write_buffered_stream(&mut self, sender: &mut impl DataSender) -> bool {
        for (stream_id, state) in self.streams.iter_mut() {
            let stream_id = match VarInt::new(*stream_id) {
                Ok(id) => id,
                Err(_) => continue,
            };
            if state.reset || !state.has_buffered_data() {
                continue;
            }
            let (consumed, _) = Self::flush_stream(stream_id, state, sender);
            let _ = consumed;
            if state.has_buffered_data() {
                return false;
            }
        }
        true
    }

    /// Returns true while crypto data at `level` is waiting to be sent or
    /// resent
    pub fn has_crypto_work(&self, level: EncryptionLevel) -> bool {
        let state = &self.crypto[crypto_index(level)];
        state.bytes_sent < state.bytes_total || !state.pending_retransmission.is_empty()
    }

    /// Drives lost and then buffered crypto data for one level; returns
    /// false when the writer blocks
    pub fn drive_crypto_level(&mut self, level: EncryptionLevel, sender: &mut impl DataSender) -> bool {
        let state = &mut self.crypto[crypto_index(level)];

        while let Some(range) = state.pending_retransmission.pop_min_interval() {
            let length = range.end - range.start;
            let consumed = sender.send_crypto_data(
                level,
                range.start,
                length,
                TransmissionType::LossRetransmission,
            );
            if consumed < length {
                let _ = state
                    .pending_retransmission
                    .insert(range.start + consumed..range.end);
                return false;
            }
        }

        let want = state.bytes_total - state.bytes_sent;
        if want > 0 {
            let consumed = sender.send_crypto_data(
                level,
                state.bytes_sent,
                want,
                TransmissionType::NotRetransmission,
            );
            state.bytes_sent += consumed;
            if consumed < want {
                return false;
            }
        }

        true
    }

    /// Requeues everything ever sent at `level` that is not acked, e.g.
    /// to rebuild the initial flight after a retry
    pub fn mark_crypto_lost(&mut self, level: EncryptionLevel) {
        let state = &mut self.crypto[crypto_index(level)];
        if state.bytes_sent == 0 {
            return;
        }
        for missing in state.acked.complement_within(0..state.bytes_sent) {
            let _ = state.pending_retransmission.insert(missing);
        }
    }

    /// Marks every byte ever sent at the initial level as acked so it
    /// drops out of retransmission eligibility once the handshake is
    /// confirmed
    pub fn neuter_unencrypted_data(&mut self) {
        let state = &mut self.crypto[crypto_index(EncryptionLevel::Initial)];
        if state.bytes_sent > 0 {
            let _ = state.acked.insert(0..state.bytes_sent);
        }
        state.pending_retransmission.clear();
    }

    /// RESET_STREAM removes all retransmission state for the stream
    pub fn on_stream_reset(&mut self, stream_id: VarInt) {
        let state = self.stream(stream_id);
        state.reset = true;
        state.pending_retransmission.clear();
        state.fin_lost = false;
        state.fin_outstanding = false;
        state.fin_buffered = false;
    }

    /// RESET_STREAM_AT keeps delivering bytes below `reliable_offset`
    /// before the reset takes effect
    pub fn on_stream_reset_at(&mut self, stream_id: VarInt, reliable_offset: u64) {
        self.stream(stream_id).apply_reliable_offset(reliable_offset);
    }

    /// Returns true while any stream or crypto data is buffered or lost,
    /// making new application writes queue instead of sending
    pub fn is_write_blocked(&self, control: &ControlFrameManager) -> bool {
        control.has_buffered_frames()
            || control.has_pending_retransmission()
            || self.has_buffered_data()
            || self.has_lost_data()
    }

    pub fn has_buffered_data(&self) -> bool {
        self.streams.values().any(StreamState::has_buffered_data)
            || self
                .crypto
                .iter()
                .any(|state| state.bytes_sent < state.bytes_total)
    }

    pub fn has_lost_data(&self) -> bool {
        self.streams
            .values()
            .any(|state| !state.reset && (!state.pending_retransmission.is_empty() || state.fin_lost))
            || self
                .crypto
                .iter()
                .any(|state| !state.pending_retransmission.is_empty())
    }

    /// Returns true while the stream has sent data or a fin that is not
    /// yet acknowledged
    pub fn stream_is_waiting_for_acks(&self, stream_id: VarInt) -> bool {
        self.streams
            .get(&stream_id.as_u64())
            .map_or(false, StreamState::is_waiting_for_acks)
    }

    /// A stream is done sending once everything through its fin is acked
    pub fn stream_bytes_acked(&self, stream_id: VarInt) -> u64 {
        self.streams
            .get(&stream_id.as_u64())
            .map_or(0, |state| state.bytes_acked.count())
    }

    pub fn has_unacked_crypto_data(&self) -> bool {
        self.crypto.iter().any(|state| {
            state.bytes_sent > state.acked.count() || !state.pending_retransmission.is_empty()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// Accepts up to `budget` bytes across all calls, recording each write
    #[derive(Default)]
    struct Sender {
        budget: u64,
        stream_writes: Vec<(u64, u64, u64, bool)>,
        crypto_writes: Vec<(EncryptionLevel, u64, u64)>,
    }

    impl FrameSender for Sender {
        fn send_control_frame(
            &mut self,
            _id: u64,
            _frame: &crate::control_frame::ControlFrame,
            _transmission_type: TransmissionType,
        ) -> bool {
            true
        }
    }

    impl DataSender for Sender {
        fn send_stream_data(
            &mut self,
            stream_id: VarInt,
            offset: u64,
            length: u64,
            fin: bool,
            _transmission_type: TransmissionType,
        ) -> (u64, bool) {
            let consumed = length.min(self.budget);
            self.budget -= consumed;
            let fin_sent = fin && consumed == length;
            if consumed > 0 || fin_sent {
                self.stream_writes
                    .push((stream_id.as_u64(), offset, consumed, fin_sent));
            }
            (consumed, fin_sent)
        }

        fn send_crypto_data(
            &mut self,
            level: EncryptionLevel,
            offset: u64,
            length: u64,
            _transmission_type: TransmissionType,
        ) -> u64 {
            let consumed = length.min(self.budget);
            self.budget -= consumed;
            if consumed > 0 {
                self.crypto_writes.push((level, offset, consumed));
            }
            consumed
        }
    }

    fn stream_frame(id: u64, offset: u64, length: u64, is_fin: bool) -> SentFrame {
        SentFrame::Stream {
            stream_id: VarInt::new(id).unwrap(),
            offset,
            length,
            is_fin,
        }
    }

    #[test]
    fn write_and_ack_test() {
        let mut notifier = SessionNotifier::new();
        let control = ControlFrameManager::new();
        let mut sender = Sender {
            budget: u64::MAX,
            ..Default::default()
        };

        let (consumed, fin_sent) = notifier.write_or_buffer_stream_data(
            VarInt::from_u8(4),
            100,
            true,
            &mut sender,
            &control,
        );
        assert_eq!(consumed, 100);
        assert!(fin_sent);
        assert!(notifier.stream_is_waiting_for_acks(VarInt::from_u8(4)));

        assert!(notifier.on_frame_acked(&stream_frame(4, 0, 100, true)));
        assert!(!notifier.stream_is_waiting_for_acks(VarInt::from_u8(4)));

        // acking the same range again reports nothing new
        assert!(!notifier.on_frame_acked(&stream_frame(4, 0, 100, true)));
    }

    #[test]
    fn blocked_write_buffers_test() {
        let mut notifier = SessionNotifier::new();
        let control = ControlFrameManager::new();
        let mut sender = Sender {
            budget: 40,
            ..Default::default()
        };

        let (consumed, fin_sent) = notifier.write_or_buffer_stream_data(
            VarInt::from_u8(4),
            100,
            true,
            &mut sender,
            &control,
        );
        assert_eq!(consumed, 40);
        assert!(!fin_sent);
        assert!(notifier.has_buffered_data());

        // while blocked, further writes only extend the buffer
        let (consumed, fin_sent) = notifier.write_or_buffer_stream_data(
            VarInt::from_u8(4),
            20,
            false,
            &mut sender,
            &control,
        );
        assert_eq!((consumed, fin_sent), (0, false));

        // the writer drains and the rest goes out
        sender.budget = u64::MAX;
        let mut control = ControlFrameManager::new();
        notifier.on_can_write(&mut sender, &mut control);
        assert!(!notifier.has_buffered_data());
        assert_eq!(sender.stream_writes.last().unwrap(), &(4, 40, 80, true));
    }

    #[test]
    fn lost_data_retransmits_unacked_only_test() {
        let mut notifier = SessionNotifier::new();
        let mut control = ControlFrameManager::new();
        let mut sender = Sender {
            budget: u64::MAX,
            ..Default::default()
        };

        notifier.write_or_buffer_stream_data(VarInt::from_u8(4), 100, false, &mut sender, &control);

        // bytes 20..40 were acked before the loss was declared
        assert!(notifier.on_frame_acked(&stream_frame(4, 20, 20, false)));
        notifier.on_frame_lost(&stream_frame(4, 0, 100, false));
        assert!(notifier.has_lost_data());

        sender.stream_writes.clear();
        notifier.on_can_write(&mut sender, &mut control);

        // only the unacked intervals are resent
        assert_eq!(
            sender.stream_writes,
            vec![(4, 0, 20, false), (4, 40, 60, false)]
        );
        assert!(!notifier.has_lost_data());
    }

    #[test]
    fn retransmit_acked_segment_is_noop_test() {
        let mut notifier = SessionNotifier::new();
        let mut control = ControlFrameManager::new();
        let mut sender = Sender {
            budget: u64::MAX,
            ..Default::default()
        };

        notifier.write_or_buffer_stream_data(VarInt::from_u8(4), 50, false, &mut sender, &control);
        notifier.on_frame_acked(&stream_frame(4, 0, 50, false));

        sender.stream_writes.clear();
        let done = notifier.retransmit_frames(
            &[stream_frame(4, 0, 50, false)],
            TransmissionType::PtoRetransmission,
            &mut sender,
            &mut control,
        );
        assert!(done);
        // no duplicate bytes were emitted
        assert!(sender.stream_writes.is_empty());
    }

    #[test]
    fn crypto_levels_are_independent_test() {
        let mut notifier = SessionNotifier::new();
        let mut sender = Sender {
            budget: u64::MAX,
            ..Default::default()
        };

        notifier.write_crypto_data(EncryptionLevel::Initial, 100, &mut sender);
        notifier.write_crypto_data(EncryptionLevel::Handshake, 50, &mut sender);

        notifier.on_frame_lost(&SentFrame::Crypto {
            level: EncryptionLevel::Initial,
            offset: 0,
            length: 100,
        });

        sender.crypto_writes.clear();
        let mut control = ControlFrameManager::new();
        notifier.on_can_write(&mut sender, &mut control);

        // the retransmission goes out at the level that carried it
        assert_eq!(
            sender.crypto_writes,
            vec![(EncryptionLevel::Initial, 0, 100)]
        );
    }

    #[test]
    fn neuter_unencrypted_data_test() {
        let mut notifier = SessionNotifier::new();
        let mut sender = Sender {
            budget: u64::MAX,
            ..Default::default()
        };

        notifier.write_crypto_data(EncryptionLevel::Initial, 100, &mut sender);
        notifier.on_frame_lost(&SentFrame::Crypto {
            level: EncryptionLevel::Initial,
            offset: 0,
            length: 100,
        });

        notifier.neuter_unencrypted_data();
        assert!(!notifier.has_lost_data());
        assert!(!notifier.has_unacked_crypto_data());
    }

    #[test]
    fn reset_stream_drops_retransmissions_test() {
        let mut notifier = SessionNotifier::new();
        let control = ControlFrameManager::new();
        let mut sender = Sender {
            budget: u64::MAX,
            ..Default::default()
        };

        notifier.write_or_buffer_stream_data(VarInt::from_u8(4), 100, true, &mut sender, &control);
        notifier.on_frame_lost(&stream_frame(4, 0, 100, true));

        notifier.on_stream_reset(VarInt::from_u8(4));
        assert!(!notifier.has_lost_data());
        assert!(!notifier.stream_is_waiting_for_acks(VarInt::from_u8(4)));
    }

    #[test]
    fn reset_stream_at_keeps_reliable_bytes_test() {
        let mut notifier = SessionNotifier::new();
        let mut control = ControlFrameManager::new();
        let mut sender = Sender {
            budget: u64::MAX,
            ..Default::default()
        };

        notifier.write_or_buffer_stream_data(VarInt::from_u8(4), 100, true, &mut sender, &control);
        notifier.on_stream_reset_at(VarInt::from_u8(4), 30);

        // a loss of everything only re-queues bytes below the reliable
        // offset
        notifier.on_frame_lost(&stream_frame(4, 0, 100, true));

        sender.stream_writes.clear();
        notifier.on_can_write(&mut sender, &mut control);
        assert_eq!(sender.stream_writes, vec![(4, 0, 30, false)]);
    }
}
