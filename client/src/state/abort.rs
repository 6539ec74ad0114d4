use tracing::{debug, warn};

use super::{link_signals, Handlers, LinkReceivers, RunContext, Transition, WithConnection};
use crate::{
    association::{AbortReason, AbortSource},
    connection::{Connection, Connector},
    event::StateKind,
};

/// Forced teardown of the association.
///
/// Always ends without error:
/// whether the peer acknowledged the abort or not,
/// the connection is cleaned up next.
#[derive(Debug)]
pub(crate) struct Abort<T> {
    link: WithConnection<T>,
    peer: LinkReceivers,
}

impl<T: Connection> Abort<T> {
    pub fn new(link: WithConnection<T>) -> (Self, Handlers) {
        let (signals, peer) = link_signals();
        (Abort { link, peer }, Handlers::Abort(signals))
    }

    pub async fn run<C>(mut self, ctx: &RunContext<'_, C>) -> Transition<T>
    where
        C: Connector<Connection = T>,
    {
        let timeout = ctx.options.abort_ack_timeout();
        let timer = ctx.timers.sleep(timeout);
        let send = self
            .link
            .connection
            .send_abort(AbortSource::ServiceUser, AbortReason::NotSpecified);

        tokio::select! {
            result = send => match result {
                Ok(()) => debug!("[{}] Abort sent", StateKind::Abort),
                Err(e) => warn!("[{}] Failed to send abort: {}", StateKind::Abort, e),
            },
            abort = self.peer.aborted.fired() => {
                debug!("[{}] Peer aborted as well: {}", StateKind::Abort, abort);
            }
            _ = self.peer.closed.fired() => {
                debug!("[{}] Connection closed", StateKind::Abort);
            }
            _ = timer => {
                warn!("[{}] Abort not sent within {:?}", StateKind::Abort, timeout);
            }
        }

        Transition::completed(self.link)
    }
}
