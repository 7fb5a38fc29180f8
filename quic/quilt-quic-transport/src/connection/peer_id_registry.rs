// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection IDs the peer has issued to this endpoint.

use crate::interval_set::IntervalSet;
use alloc::vec::Vec;
use quilt_quic_core::{
    connection::{self, ConnectionId},
    frame,
    stateless_reset,
};

#[derive(Clone, Debug)]
struct PeerId {
    id: ConnectionId,
    sequence_number: u64,
    token: Option<stateless_reset::Token>,
    in_use: bool,
}

/// Tracks active, unused, and to-be-retired peer connection IDs
#[derive(Debug)]
pub struct PeerIdRegistry {
    ids: Vec<PeerId>,
    /// Sequence numbers seen so far, for duplicate rejection
    seen_sequences: IntervalSet,
    retire_prior_to: u64,
    /// RETIRE_CONNECTION_ID frames waiting to be sent back
    pending_retirement_frames: Vec<u64>,
    active_limit: u64,
}

impl PeerIdRegistry {
    /// Seeds the registry with the peer's handshake connection ID at
    /// sequence 0
    pub fn new(initial_id: ConnectionId, active_limit: u64) -> Self {
        let mut seen_sequences = IntervalSet::new();
        let _ = seen_sequences.insert_value(0);

        Self {
            ids: alloc::vec![PeerId {
                id: initial_id,
                sequence_number: 0,
                token: None,
                in_use: true,
            }],
            seen_sequences,
            retire_prior_to: 0,
            pending_retirement_frames: Vec::new(),
            active_limit: active_limit.max(1),
        }
    }

    /// The server's handshake response carries the token for sequence 0
    /// in its transport parameters
    pub fn set_initial_stateless_reset_token(&mut self, token: stateless_reset::Token) {
        if let Some(id) = self
            .ids
            .iter_mut()
            .find(|peer_id| peer_id.sequence_number == 0)
        {
            id.token = Some(token);
        }
    }

    /// Handles NEW_CONNECTION_ID. Duplicates are ignored; ids below the
    /// frame's `retire_prior_to` are queued for retirement.
    pub fn on_new_connection_id(
        &mut self,
        frame: &frame::NewConnectionId,
    ) -> Result<(), connection::Error> {
        let sequence_number = frame.sequence_number.as_u64();

        if self.seen_sequences.contains(sequence_number) {
            // a retransmission; already tracked or already retired
            return Ok(());
        }
        let _ = self.seen_sequences.insert_value(sequence_number);

        if sequence_number < self.retire_prior_to {
            // arrived after a newer frame already retired it
            self.pending_retirement_frames.push(sequence_number);
            return Ok(());
        }

        self.ids.push(PeerId {
            id: frame.connection_id,
            sequence_number,
            token: Some(frame.stateless_reset_token),
            in_use: false,
        });

        let retire_prior_to = frame.retire_prior_to.as_u64();
        if retire_prior_to > self.retire_prior_to {
            self.retire_prior_to = retire_prior_to;
            let mut index = 0;
            while index < self.ids.len() {
                if self.ids[index].sequence_number < retire_prior_to {
                    let retired = self.ids.remove(index);
                    self.pending_retirement_frames.push(retired.sequence_number);
                } else {
                    index += 1;
                }
            }
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-5.1.1
        //# After processing a NEW_CONNECTION_ID frame and adding and retiring
        //# active connection IDs, if the number of active connection IDs
        //# exceeds the value advertised in its active_connection_id_limit
        //# transport parameter, an endpoint MUST close the connection with an
        //# error of type CONNECTION_ID_LIMIT_ERROR.
        if self.ids.len() as u64 > self.active_limit {
            return Err(connection::Error::InvalidFrameData(
                "active connection id limit exceeded",
            ));
        }

        Ok(())
    }

    /// Swaps an id in place when still tracked; returns true on success
    pub fn replace_connection_id(
        &mut self,
        old_id: &ConnectionId,
        new_id: ConnectionId,
    ) -> bool {
        if let Some(peer_id) = self.ids.iter_mut().find(|peer_id| peer_id.id == *old_id) {
            peer_id.id = new_id;
            true
        } else {
            false
        }
    }

    /// Drains the RETIRE_CONNECTION_ID sequence numbers that still need
    /// to go out
    pub fn pending_retirements(&mut self) -> Vec<u64> {
        core::mem::take(&mut self.pending_retirement_frames)
    }

    pub fn has_pending_retirements(&self) -> bool {
        !self.pending_retirement_frames.is_empty()
    }

    /// The id currently used to address the peer
    pub fn active_id(&self) -> Option<&ConnectionId> {
        self.ids
            .iter()
            .find(|peer_id| peer_id.in_use)
            .map(|peer_id| &peer_id.id)
    }

    /// Claims an id not yet used on any path, e.g. for a new path during
    /// migration
    pub fn claim_unused_id(&mut self) -> Option<(ConnectionId, Option<stateless_reset::Token>)> {
        let peer_id = self.ids.iter_mut().find(|peer_id| !peer_id.in_use)?;
        peer_id.in_use = true;
        Some((peer_id.id, peer_id.token))
    }

    /// Every stateless reset token associated with a tracked id
    pub fn reset_tokens(&self) -> Vec<stateless_reset::Token> {
        self.ids.iter().filter_map(|peer_id| peer_id.token).collect()
    }

    pub fn active_len(&self) -> usize {
        self.ids.len()
    }
}
