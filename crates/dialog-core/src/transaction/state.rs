use std::fmt;

use crate::errors::{DialogError, DialogResult};

/// Kind of transaction, selecting one of the four RFC 3261 §17 state machines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    InviteClient,
    NonInviteClient,
    InviteServer,
    NonInviteServer,
}

impl TransactionKind {
    pub fn is_server(&self) -> bool {
        matches!(self, TransactionKind::InviteServer | TransactionKind::NonInviteServer)
    }

    pub fn is_invite(&self) -> bool {
        matches!(self, TransactionKind::InviteClient | TransactionKind::InviteServer)
    }

    /// State a new transaction of this kind starts in
    pub fn initial_state(&self) -> TransactionState {
        match self {
            TransactionKind::InviteClient => TransactionState::Calling,
            TransactionKind::NonInviteClient | TransactionKind::NonInviteServer => TransactionState::Trying,
            TransactionKind::InviteServer => TransactionState::Proceeding,
        }
    }
}

/// State of a SIP transaction (RFC 3261 §17).
///
/// - Client INVITE: Calling → Proceeding → Completed → Terminated
/// - Client non-INVITE: Trying → Proceeding → Completed → Terminated
/// - Server INVITE: Proceeding → Completed → Confirmed → Terminated
/// - Server non-INVITE: Trying → Proceeding → Completed → Terminated
///
/// Every machine may jump straight to Terminated (2xx to INVITE, timeout,
/// transport failure). States never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Client INVITE: request sent, nothing received yet
    Calling,
    /// Non-INVITE: request sent (client) or received (server), no response yet
    Trying,
    /// A provisional response was sent or received
    Proceeding,
    /// A final response was sent or received; absorbing retransmissions
    Completed,
    /// Server INVITE: ACK received for a non-2xx final response
    Confirmed,
    /// Finished; waiting only for eviction
    Terminated,
}

impl TransactionState {
    fn rank(&self) -> u8 {
        match self {
            TransactionState::Calling | TransactionState::Trying => 0,
            TransactionState::Proceeding => 1,
            TransactionState::Completed => 2,
            TransactionState::Confirmed => 3,
            TransactionState::Terminated => 4,
        }
    }

    pub fn is_terminated(&self) -> bool {
        *self == TransactionState::Terminated
    }

    /// Whether a final response has been sent or received
    pub fn is_final(&self) -> bool {
        self.rank() >= 2
    }

    /// Validate a transition for `kind`.
    ///
    /// Staying in the same state is allowed; moving backwards, or into a state
    /// the kind's machine does not have, is not.
    pub fn validate_transition(
        from: TransactionState,
        to: TransactionState,
        kind: TransactionKind,
    ) -> DialogResult<()> {
        if from == to {
            return Ok(());
        }
        let allowed_in_kind = match to {
            TransactionState::Calling => kind == TransactionKind::InviteClient,
            TransactionState::Trying => matches!(
                kind,
                TransactionKind::NonInviteClient | TransactionKind::NonInviteServer
            ),
            TransactionState::Confirmed => kind == TransactionKind::InviteServer,
            _ => true,
        };
        if !allowed_in_kind || to.rank() <= from.rank() {
            return Err(DialogError::illegal_state(format!(
                "invalid {:?} transaction transition {} -> {}",
                kind, from, to
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        use TransactionState::*;
        let kind = TransactionKind::InviteClient;
        assert!(TransactionState::validate_transition(Calling, Proceeding, kind).is_ok());
        assert!(TransactionState::validate_transition(Calling, Terminated, kind).is_ok());
        assert!(TransactionState::validate_transition(Proceeding, Proceeding, kind).is_ok());
        assert!(TransactionState::validate_transition(Completed, Proceeding, kind).is_err());
        assert!(TransactionState::validate_transition(Terminated, Completed, kind).is_err());
        assert!(TransactionState::validate_transition(Completed, Confirmed, kind).is_err());
        assert!(TransactionState::validate_transition(
            Completed,
            Confirmed,
            TransactionKind::InviteServer
        )
        .is_ok());
    }

    #[test]
    fn test_initial_states() {
        assert_eq!(TransactionKind::InviteClient.initial_state(), TransactionState::Calling);
        assert_eq!(TransactionKind::InviteServer.initial_state(), TransactionState::Proceeding);
        assert_eq!(TransactionKind::NonInviteServer.initial_state(), TransactionState::Trying);
    }
}
