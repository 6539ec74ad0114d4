use tracing::debug;

use super::{RunContext, Transition};
use crate::{connection::Connector, event::StateKind};

/// No connection, no association.
#[derive(Debug)]
pub(crate) struct Idle;

impl Idle {
    /// Decide whether to start connecting.
    ///
    /// Returns `None` if the client should stay idle,
    /// because there is nothing to send
    /// or the run was cancelled or aborted.
    pub fn run<C: Connector>(self, ctx: &RunContext<'_, C>) -> Option<Transition<C::Connection>> {
        if ctx.queue.is_empty() {
            debug!("[{}] No requests queued", StateKind::Idle);
            return None;
        }
        if ctx.cancellation.is_cancelled() || ctx.abort_requested() {
            debug!(
                "[{}] Cancellation requested, {} request(s) remain queued",
                StateKind::Idle,
                ctx.queue.len()
            );
            return None;
        }
        Some(Transition::Connecting)
    }
}
