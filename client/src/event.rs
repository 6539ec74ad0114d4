//! Notifications published by the client.
//!
//! Subscribe with [`DicomClient::subscribe`](crate::DicomClient::subscribe)
//! to observe every state transition
//! and the protocol events which do not surface as errors.
use std::{fmt, time::Duration};

use crate::association::{Association, AssociationRejection};

/// The kind of lifecycle state the client is in.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum StateKind {
    Idle,
    Connecting,
    RequestingAssociation,
    SendingRequests,
    Lingering,
    ReleasingAssociation,
    Abort,
    Completed,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::Idle => "IDLE",
            StateKind::Connecting => "CONNECTING",
            StateKind::RequestingAssociation => "REQUESTING ASSOCIATION",
            StateKind::SendingRequests => "SENDING REQUESTS",
            StateKind::Lingering => "LINGERING",
            StateKind::ReleasingAssociation => "RELEASING ASSOCIATION",
            StateKind::Abort => "ABORT",
            StateKind::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// An event published by the client.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ClientEvent {
    /// The active state changed.
    StateChanged { from: StateKind, to: StateKind },
    /// The peer accepted an association.
    AssociationAccepted(Association),
    /// The peer rejected an association request.
    AssociationRejected(AssociationRejection),
    /// The peer answered a release request.
    AssociationReleased,
    /// The peer did not answer an association request in time.
    AssociationRequestTimedOut {
        timeout: Duration,
        /// number of consecutive timeouts so far
        attempt: u32,
        max_attempts: Option<u32>,
    },
    /// A request did not receive a final response in time.
    RequestTimedOut { message_id: u16, timeout: Duration },
}
