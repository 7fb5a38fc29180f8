// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The pool of connection IDs this endpoint has issued to its peer.

use alloc::vec::Vec;
use quilt_quic_core::{
    connection::{self, ConnectionId},
    frame,
    random,
    stateless_reset,
    time::{Duration, Timestamp},
    varint::VarInt,
};

#[derive(Clone, Debug)]
struct IssuedId {
    id: ConnectionId,
    sequence_number: u64,
    token: stateless_reset::Token,
}

#[derive(Clone, Copy, Debug)]
struct PendingRetirement {
    sequence_number: u64,
    deadline: Timestamp,
}

/// Issues connection IDs with sequence numbers and stateless reset
/// tokens, and retires them on request
#[derive(Debug)]
pub struct LocalIdRegistry {
    active: Vec<IssuedId>,
    pending_retirement: Vec<PendingRetirement>,
    next_sequence_number: u64,
    retire_prior_to: u64,
    id_len: usize,
    active_limit: usize,
}

impl LocalIdRegistry {
    /// Seeds the registry with the handshake connection ID at sequence 0
    pub fn new(
        initial_id: ConnectionId,
        initial_token: stateless_reset::Token,
        active_limit: usize,
    ) -> Self {
        Self {
            active: alloc::vec![IssuedId {
                id: initial_id,
                sequence_number: 0,
                token: initial_token,
            }],
            pending_retirement: Vec::new(),
            next_sequence_number: 1,
            retire_prior_to: 0,
            id_len: initial_id.len(),
            active_limit: active_limit.max(1),
        }
    }

    /// Issues a new id and returns the NEW_CONNECTION_ID frame announcing
    /// it, or `None` while the active pool is at the peer's limit
    pub fn issue<G: random::Generator>(
        &mut self,
        random: &mut G,
    ) -> Option<frame::NewConnectionId> {
        if self.active.len() >= self.active_limit {
            return None;
        }

        let mut id_bytes = [0u8; connection::id::MAX_LEN];
        let id_len = self.id_len.max(1);
        random.fill_public(&mut id_bytes[..id_len]);
        let id = ConnectionId::try_from_slice(&id_bytes[..id_len]).ok()?;

        let mut token_bytes = [0u8; stateless_reset::token::LEN];
        random.fill_private(&mut token_bytes);
        let token = stateless_reset::Token::from(token_bytes);

        let sequence_number = self.next_sequence_number;
        self.next_sequence_number += 1;

        self.active.push(IssuedId {
            id,
            sequence_number,
            token,
        });

        Some(frame::NewConnectionId {
            sequence_number: VarInt::new(sequence_number).ok()?,
            retire_prior_to: VarInt::new(self.retire_prior_to).ok()?,
            connection_id: id,
            stateless_reset_token: token,
        })
    }

    /// Handles RETIRE_CONNECTION_ID from the peer. The id is moved to a
    /// pending list and dropped after a PTO so straggler packets
    /// addressed to it still match.
    pub fn on_retire_connection_id(
        &mut self,
        sequence_number: u64,
        now: Timestamp,
        pto_delay: Duration,
    ) -> Result<(), connection::Error> {
        //= https://www.rfc-editor.org/rfc/rfc9000#section-19.16
        //# Receipt of a RETIRE_CONNECTION_ID frame containing a sequence
        //# number greater than any previously sent to the peer MUST be
        //# treated as a connection error of type PROTOCOL_VIOLATION.
        if sequence_number >= self.next_sequence_number {
            return Err(connection::Error::InvalidFrameData(
                "retired connection id was never issued",
            ));
        }

        let Some(index) = self
            .active
            .iter()
            .position(|issued| issued.sequence_number == sequence_number)
        else {
            // already retired
            return Ok(());
        };

        self.active.remove(index);
        self.pending_retirement.push(PendingRetirement {
            sequence_number,
            deadline: now + pto_delay,
        });

        Ok(())
    }

    /// Drains retirements whose deadline passed; a single timer serves
    /// every pending entry
    pub fn on_timeout(&mut self, now: Timestamp) -> usize {
        let before = self.pending_retirement.len();
        self.pending_retirement
            .retain(|pending| !pending.deadline.has_elapsed(now));
        before - self.pending_retirement.len()
    }

    pub fn next_retirement_deadline(&self) -> Option<Timestamp> {
        self.pending_retirement
            .iter()
            .map(|pending| pending.deadline)
            .min()
    }

    /// Returns true while packets addressed to `id` should still reach
    /// this connection
    pub fn is_active(&self, id: &ConnectionId) -> bool {
        self.active.iter().any(|issued| issued.id == *id)
    }

    pub fn active_ids(&self) -> impl Iterator<Item = &ConnectionId> {
        self.active.iter().map(|issued| &issued.id)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_quic_core::random::testing::Generator;

    fn now() -> Timestamp {
        Timestamp::from_duration(Duration::from_secs(1))
    }

    fn registry() -> LocalIdRegistry {
        LocalIdRegistry::new(
            ConnectionId::try_from_slice(&[1, 2, 3, 4]).unwrap(),
            stateless_reset::Token::from([0; 16]),
            2,
        )
    }

    #[test]
    fn issue_respects_limit_test() {
        let mut registry = registry();
        let mut random = Generator::default();

        let frame = registry.issue(&mut random).unwrap();
        assert_eq!(frame.sequence_number, 1u64);
        assert_eq!(frame.connection_id.len(), 4);

        // the pool is now at the peer's limit
        assert!(registry.issue(&mut random).is_none());
        assert_eq!(registry.active_len(), 2);
    }

    #[test]
    fn retire_flow_test() {
        let mut registry = registry();
        let mut random = Generator::default();
        let issued = registry.issue(&mut random).unwrap();
        let pto = Duration::from_millis(300);

        // retiring an unissued sequence number is a protocol violation
        assert!(registry
            .on_retire_connection_id(9, now(), pto)
            .is_err());

        registry
            .on_retire_connection_id(issued.sequence_number.as_u64(), now(), pto)
            .unwrap();
        assert!(!registry.is_active(&issued.connection_id));
        assert_eq!(registry.next_retirement_deadline(), Some(now() + pto));

        // the slot drains once the deadline passes
        assert_eq!(registry.on_timeout(now()), 0);
        assert_eq!(registry.on_timeout(now() + pto), 1);
        assert_eq!(registry.next_retirement_deadline(), None);

        // a duplicate retirement is ignored
        registry
            .on_retire_connection_id(issued.sequence_number.as_u64(), now(), pto)
            .unwrap();
        assert_eq!(registry.next_retirement_deadline(), None);
    }
}
