use snafu::IntoError;
use tracing::{debug, warn};

use super::{
    link_signals, Handlers, LinkReceivers, RequestingHandlers, RunContext, Transition,
    WithAssociation, WithConnection,
};
use crate::{
    association::{Association, AssociationRejection, AssociationRequest},
    connection::{Connection, Connector, Request},
    error::{AssociationRequestTimedOutSnafu, RejectedSnafu, SendAssociationRequestSnafu},
    event::{ClientEvent, StateKind},
    signal::{signal, Waiter},
};

/// Negotiating a new association over an established connection.
#[derive(Debug)]
pub(crate) struct RequestAssociation<T> {
    link: WithConnection<T>,
    peer: LinkReceivers,
    accepted: Waiter<Association>,
    rejected: Waiter<AssociationRejection>,
}

enum Outcome {
    Abort,
    Accepted(Association),
    Rejected(AssociationRejection),
    PeerAborted(crate::association::AssociationAbort),
    Closed(Option<std::io::Error>),
    TimedOut,
}

impl<T: Connection> RequestAssociation<T> {
    pub fn new(link: WithConnection<T>) -> (Self, Handlers) {
        let (link_signals, peer) = link_signals();
        let (accepted, accepted_rx) = signal("association accepted");
        let (rejected, rejected_rx) = signal("association rejected");
        (
            RequestAssociation {
                link,
                peer,
                accepted: accepted_rx,
                rejected: rejected_rx,
            },
            Handlers::RequestingAssociation(RequestingHandlers {
                link: link_signals,
                accepted,
                rejected,
            }),
        )
    }

    pub async fn run<C>(mut self, ctx: &RunContext<'_, C>) -> Transition<T>
    where
        C: Connector<Connection = T>,
    {
        if ctx.cancellation.is_cancelled() {
            warn!(
                "[{}] Cancellation requested, not requesting an association",
                StateKind::RequestingAssociation
            );
            return Transition::completed(self.link);
        }
        if ctx.abort_requested() {
            return Transition::Abort(self.link);
        }

        let request = build_request(ctx);
        debug!(
            "[{}] Requesting association {} -> {} with {} presentation context(s)",
            StateKind::RequestingAssociation,
            request.calling_ae_title,
            request.called_ae_title,
            request.presentation_contexts.len()
        );
        let sent = ctx
            .outbound(
                &mut self.peer,
                self.link.connection.send_association_request(&request),
            )
            .await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Transition::failed(
                    SendAssociationRequestSnafu.into_error(e),
                    self.link,
                )
            }
            Err(interruption) => {
                return interruption.into_transition(StateKind::RequestingAssociation, self.link)
            }
        }

        let timeout = ctx.options.request_timeout();
        let timer = ctx.timers.sleep(timeout);
        let outcome = tokio::select! {
            biased;
            _ = ctx.abort.cancelled() => Outcome::Abort,
            _ = ctx.cancellation.cancelled(), if ctx.cancellation.aborts() => Outcome::Abort,
            abort = self.peer.aborted.fired() => Outcome::PeerAborted(abort),
            association = self.accepted.fired() => Outcome::Accepted(association),
            rejection = self.rejected.fired() => Outcome::Rejected(rejection),
            error = self.peer.closed.fired() => Outcome::Closed(error),
            _ = timer => Outcome::TimedOut,
        };

        match outcome {
            Outcome::Abort => {
                debug!(
                    "[{}] Abort requested before the association was answered",
                    StateKind::RequestingAssociation
                );
                Transition::Abort(self.link)
            }
            Outcome::Accepted(association) => {
                ctx.reset_request_timeouts();
                debug!(
                    "[{}] Association accepted, {} of {} presentation context(s) accepted",
                    StateKind::RequestingAssociation,
                    association.accepted_presentation_contexts().count(),
                    association.presentation_contexts.len()
                );
                ctx.emit(ClientEvent::AssociationAccepted(association.clone()));
                Transition::SendingRequests(WithAssociation {
                    link: self.link,
                    association,
                    sent: 0,
                })
            }
            Outcome::Rejected(rejection) => {
                ctx.reset_request_timeouts();
                warn!(
                    "[{}] Association rejected: {}",
                    StateKind::RequestingAssociation,
                    rejection
                );
                ctx.emit(ClientEvent::AssociationRejected(rejection));
                Transition::failed(RejectedSnafu { rejection }.build(), self.link)
            }
            Outcome::PeerAborted(abort) => {
                ctx.reset_request_timeouts();
                Transition::aborted(abort, self.link)
            }
            Outcome::Closed(error) => {
                debug!(
                    "[{}] Connection closed before the association was answered",
                    StateKind::RequestingAssociation
                );
                Transition::closed(error, self.link)
            }
            Outcome::TimedOut => {
                let attempt = ctx.count_request_timeout();
                let max_attempts = ctx.options.max_request_timeouts();
                warn!(
                    "[{}] Association request timed out after {:?} ({} consecutive)",
                    StateKind::RequestingAssociation,
                    timeout,
                    attempt
                );
                ctx.emit(ClientEvent::AssociationRequestTimedOut {
                    timeout,
                    attempt,
                    max_attempts,
                });
                match max_attempts {
                    Some(max) if attempt >= max => {
                        ctx.reset_request_timeouts();
                        Transition::failed(
                            AssociationRequestTimedOutSnafu {
                                timeout,
                                attempts: attempt,
                            }
                            .build(),
                            self.link,
                        )
                    }
                    _ => Transition::completed(self.link),
                }
            }
        }
    }
}

/// Collect the presentation contexts needed by the queued requests,
/// followed by the statically configured ones.
fn build_request<C: Connector>(ctx: &RunContext<'_, C>) -> AssociationRequest {
    let options = ctx.options;
    let contexts = ctx
        .queue
        .snapshot()
        .iter()
        .map(|request| request.presentation_context())
        .chain(options.presentation_contexts().iter().cloned())
        .collect::<Vec<_>>();
    AssociationRequest::from_contexts(
        options.calling_ae_title_str(),
        options.called_ae_title_str(),
        contexts,
        options.pdu_length(),
        ctx.async_ops(),
    )
}
