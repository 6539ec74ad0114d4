use snafu::IntoError;
use tracing::{debug, warn};

use super::{
    link_signals, Handlers, LinkReceivers, ReleasingHandlers, RunContext, Transition,
    WithAssociation,
};
use crate::{
    association::AssociationAbort,
    connection::{Connection, Connector},
    error::SendReleaseRequestSnafu,
    event::{ClientEvent, StateKind},
    signal::{signal, Waiter},
};

/// Tearing down the association gracefully.
#[derive(Debug)]
pub(crate) struct ReleaseAssociation<T> {
    with: WithAssociation<T>,
    peer: LinkReceivers,
    release_response: Waiter<()>,
}

enum Event {
    Abort,
    PeerAborted(AssociationAbort),
    Closed(Option<std::io::Error>),
    Released,
    TimedOut,
}

impl<T: Connection> ReleaseAssociation<T> {
    pub fn new(with: WithAssociation<T>) -> (Self, Handlers) {
        let (link, peer) = link_signals();
        let (release_response, release_response_rx) = signal("release response");
        (
            ReleaseAssociation {
                with,
                peer,
                release_response: release_response_rx,
            },
            Handlers::ReleasingAssociation(ReleasingHandlers {
                link,
                release_response,
            }),
        )
    }

    pub async fn run<C>(mut self, ctx: &RunContext<'_, C>) -> Transition<T>
    where
        C: Connector<Connection = T>,
    {
        let cancel_aborts = ctx.cancellation.aborts();
        if ctx.abort_requested() || (cancel_aborts && ctx.cancellation.is_cancelled()) {
            return Transition::Abort(self.with.link);
        }

        debug!(
            "[{}] Releasing association after {} request(s)",
            StateKind::ReleasingAssociation,
            self.with.sent
        );
        let sent = ctx
            .outbound(
                &mut self.peer,
                self.with.link.connection.send_association_release_request(),
            )
            .await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Transition::failed(SendReleaseRequestSnafu.into_error(e), self.with.link)
            }
            Err(interruption) => {
                return interruption.into_transition(StateKind::ReleasingAssociation, self.with.link)
            }
        }

        let timeout = ctx.options.release_timeout();
        let timer = ctx.timers.sleep(timeout);
        let event = tokio::select! {
            biased;
            _ = ctx.abort.cancelled() => Event::Abort,
            _ = ctx.cancellation.cancelled(), if cancel_aborts => Event::Abort,
            abort = self.peer.aborted.fired() => Event::PeerAborted(abort),
            error = self.peer.closed.fired() => Event::Closed(error),
            _ = self.release_response.fired() => Event::Released,
            _ = timer => Event::TimedOut,
        };

        match event {
            Event::Abort => Transition::Abort(self.with.link),
            Event::PeerAborted(abort) => Transition::aborted(abort, self.with.link),
            Event::Closed(error) => Transition::closed(error, self.with.link),
            Event::Released => {
                debug!("[{}] Association released", StateKind::ReleasingAssociation);
                ctx.emit(ClientEvent::AssociationReleased);
                if !ctx.queue.is_empty() && !ctx.cancellation.is_cancelled() {
                    debug!(
                        "[{}] {} request(s) queued, requesting a new association",
                        StateKind::ReleasingAssociation,
                        ctx.queue.len()
                    );
                    Transition::RequestingAssociation(self.with.link)
                } else {
                    Transition::completed(self.with.link)
                }
            }
            Event::TimedOut => {
                warn!(
                    "[{}] No release response within {:?}, aborting",
                    StateKind::ReleasingAssociation,
                    timeout
                );
                Transition::Abort(self.with.link)
            }
        }
    }
}
