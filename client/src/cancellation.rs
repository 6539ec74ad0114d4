//! Caller-side cancellation of a send run.
use tokio_util::sync::CancellationToken;

/// How the client reacts to a cancellation
/// while an association is active.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub enum CancellationMode {
    /// Stop sending new requests
    /// and release the association gracefully.
    /// Requests not yet sent stay queued.
    #[default]
    ImmediatelyReleaseAssociation,
    /// Abort the association as soon as cancellation is observed.
    ImmediatelyAbortAssociation,
}

/// A cancellation signal threaded through every state of a send run.
///
/// Cancelling never interrupts a transition already in flight.
/// It only influences the next decision made by the active state,
/// such as not reconnecting or releasing instead of lingering.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
    mode: CancellationMode,
}

impl Cancellation {
    /// Create a cancellation signal bound to the given token.
    pub fn new(token: CancellationToken, mode: CancellationMode) -> Self {
        Cancellation { token, mode }
    }

    /// A cancellation signal which is never raised.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn mode(&self) -> CancellationMode {
        self.mode
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether a raised cancellation should abort
    /// rather than release the active association.
    pub(crate) fn aborts(&self) -> bool {
        self.mode == CancellationMode::ImmediatelyAbortAssociation
    }

    /// Resolve once cancellation is requested.
    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Cancellation {
            token,
            mode: CancellationMode::default(),
        }
    }
}
