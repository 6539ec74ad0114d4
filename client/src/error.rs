//! Error types of the association lifecycle.
//!
//! Errors are only ever surfaced from [`DicomClient::send`](crate::DicomClient::send),
//! once per failed run.
//! Timeouts and cancellation resolve by state transition
//! and are reported through [`ClientEvent`](crate::ClientEvent)s instead.
use std::time::Duration;

use snafu::{Backtrace, Snafu};

use crate::association::{AssociationAbort, AssociationRejection};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// could not connect to the peer
    #[snafu(display("could not connect to {}:{}", host, port))]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// failed to send association request
    SendAssociationRequest {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// failed to send request
    #[snafu(display("failed to send request #{}", message_id))]
    SendRequest {
        message_id: u16,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// failed to send association release request
    SendReleaseRequest {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// connection closed by the peer with an error
    ConnectionClosed {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("association rejected: {}", rejection))]
    Rejected {
        rejection: AssociationRejection,
        backtrace: Backtrace,
    },

    #[snafu(display("association aborted by {}", abort))]
    Aborted {
        abort: AssociationAbort,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "association request timed out {} consecutive times (timeout {:?})",
        attempts,
        timeout
    ))]
    AssociationRequestTimedOut {
        timeout: Duration,
        attempts: u32,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// The association rejection reported by the peer,
    /// if this error is a negotiation failure.
    pub fn rejection(&self) -> Option<&AssociationRejection> {
        match self {
            Error::Rejected { rejection, .. } => Some(rejection),
            _ => None,
        }
    }

    /// The abort reported by the peer,
    /// if this error is a protocol abort.
    pub fn abort(&self) -> Option<&AssociationAbort> {
        match self {
            Error::Aborted { abort, .. } => Some(abort),
            _ => None,
        }
    }
}
