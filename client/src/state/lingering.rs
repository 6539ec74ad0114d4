use tracing::{debug, warn};

use super::{
    link_signals, Handlers, LingeringHandlers, LinkReceivers, RunContext, Transition,
    WithAssociation,
};
use crate::{
    association::AssociationAbort,
    connection::{Connection, Connector},
    event::StateKind,
    signal::{signal, Waiter},
};

/// Keeping an idle association open for a while,
/// in case more requests are queued.
#[derive(Debug)]
pub(crate) struct Lingering<T> {
    with: WithAssociation<T>,
    peer: LinkReceivers,
    request_added: Waiter<()>,
}

enum Event {
    Abort,
    PeerAborted(AssociationAbort),
    Closed(Option<std::io::Error>),
    Cancelled,
    RequestAdded,
    Elapsed,
}

impl<T: Connection> Lingering<T> {
    pub fn new(with: WithAssociation<T>) -> (Self, Handlers) {
        let (link, peer) = link_signals();
        let (request_added, request_added_rx) = signal("request added");
        (
            Lingering {
                with,
                peer,
                request_added: request_added_rx,
            },
            Handlers::Lingering(LingeringHandlers {
                link,
                request_added,
            }),
        )
    }

    pub async fn run<C>(mut self, ctx: &RunContext<'_, C>) -> Transition<T>
    where
        C: Connector<Connection = T>,
    {
        if ctx.abort_requested() {
            return Transition::Abort(self.with.link);
        }
        if ctx.cancellation.is_cancelled() {
            return self.cancelled(ctx);
        }
        if !ctx.queue.is_empty() {
            debug!(
                "[{}] Requests already queued, reusing the association",
                StateKind::Lingering
            );
            return Transition::SendingRequests(self.with);
        }

        let linger = ctx.options.linger_timeout();
        debug!(
            "[{}] Keeping the association open for {:?}",
            StateKind::Lingering,
            linger
        );
        let timer = ctx.timers.sleep(linger);
        let event = tokio::select! {
            biased;
            _ = ctx.abort.cancelled() => Event::Abort,
            abort = self.peer.aborted.fired() => Event::PeerAborted(abort),
            error = self.peer.closed.fired() => Event::Closed(error),
            _ = ctx.cancellation.cancelled() => Event::Cancelled,
            _ = self.request_added.fired() => Event::RequestAdded,
            _ = timer => Event::Elapsed,
        };

        match event {
            Event::Abort => Transition::Abort(self.with.link),
            Event::PeerAborted(abort) => Transition::aborted(abort, self.with.link),
            Event::Closed(error) => Transition::closed(error, self.with.link),
            Event::Cancelled => self.cancelled(ctx),
            Event::RequestAdded => {
                debug!(
                    "[{}] New request queued, reusing the association",
                    StateKind::Lingering
                );
                Transition::SendingRequests(self.with)
            }
            Event::Elapsed => {
                debug!("[{}] Linger timeout elapsed", StateKind::Lingering);
                Transition::ReleasingAssociation(self.with)
            }
        }
    }

    fn cancelled<C>(self, ctx: &RunContext<'_, C>) -> Transition<T>
    where
        C: Connector<Connection = T>,
    {
        if ctx.cancellation.aborts() {
            warn!(
                "[{}] Cancellation requested, aborting the association",
                StateKind::Lingering
            );
            Transition::Abort(self.with.link)
        } else {
            warn!(
                "[{}] Cancellation requested, releasing the association",
                StateKind::Lingering
            );
            Transition::ReleasingAssociation(self.with)
        }
    }
}
