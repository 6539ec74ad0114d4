use std::{sync::Arc, time::Duration};

use snafu::IntoError;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace, warn};

use super::{
    link_signals, Handlers, Interruption, LinkReceivers, RunContext, SendingHandlers, Transition,
    WithAssociation,
};
use crate::{
    connection::{Connection, Connector, Request},
    error::SendRequestSnafu,
    event::{ClientEvent, StateKind},
};

/// Draining the request queue onto an active association,
/// then waiting for the requests in flight to complete.
#[derive(Debug)]
pub(crate) struct SendingRequests<T> {
    with: WithAssociation<T>,
    peer: LinkReceivers,
    send_more: Arc<Notify>,
    flushed: Arc<Notify>,
    completed: mpsc::UnboundedReceiver<u16>,
    timed_out: mpsc::UnboundedReceiver<(u16, Duration)>,
    /// message ids of the requests sent and not yet completed
    in_flight: Vec<u16>,
}

enum Event {
    Abort,
    PeerAborted(crate::association::AssociationAbort),
    Closed(Option<std::io::Error>),
    Cancelled,
    Completed(u16),
    TimedOut(u16, Duration),
    SendMore,
    Flushed,
    KeepAlive,
}

impl<T: Connection> SendingRequests<T> {
    pub fn new(with: WithAssociation<T>) -> (Self, Handlers) {
        let (link, peer) = link_signals();
        let send_more = Arc::new(Notify::new());
        let flushed = Arc::new(Notify::new());
        let (completed_tx, completed) = mpsc::unbounded_channel();
        let (timed_out_tx, timed_out) = mpsc::unbounded_channel();
        (
            SendingRequests {
                with,
                peer,
                send_more: Arc::clone(&send_more),
                flushed: Arc::clone(&flushed),
                completed,
                timed_out,
                in_flight: Vec::new(),
            },
            Handlers::SendingRequests(SendingHandlers {
                link,
                send_more,
                flushed,
                completed: completed_tx,
                timed_out: timed_out_tx,
            }),
        )
    }

    fn limit_reached(&self, max_requests: Option<usize>) -> bool {
        matches!(max_requests, Some(max) if self.with.sent >= max)
    }

    fn complete(&mut self, message_id: u16) {
        match self.in_flight.iter().position(|&id| id == message_id) {
            Some(i) => {
                self.in_flight.remove(i);
            }
            None => trace!(
                "[{}] Completion of unknown request #{}",
                StateKind::SendingRequests,
                message_id
            ),
        }
    }

    /// Hand queued requests over to the connection,
    /// in queue order,
    /// while no cancellation nor abort is requested
    /// and the association admits more concurrent operations.
    ///
    /// A request leaves the queue only once sent.
    /// Returns what interrupted a send, if anything did.
    async fn drain<C>(
        &mut self,
        ctx: &RunContext<'_, C>,
    ) -> Result<Option<Interruption>, crate::error::Error>
    where
        C: Connector<Connection = T>,
    {
        let max_requests = ctx.options.requests_per_association();
        let max_ops = self.with.association.max_concurrent_operations();
        loop {
            if ctx.cancellation.is_cancelled() || ctx.abort_requested() {
                return Ok(None);
            }
            if self.limit_reached(max_requests) {
                return Ok(None);
            }
            if matches!(max_ops, Some(max) if self.in_flight.len() >= max) {
                return Ok(None);
            }
            let Some(request) = ctx.queue.front() else {
                return Ok(None);
            };
            let message_id = request.message_id();
            // tracked before sending, the response may arrive first
            self.in_flight.push(message_id);
            trace!("[{}] Sending request #{}", StateKind::SendingRequests, message_id);
            let sent = ctx
                .outbound(
                    &mut self.peer,
                    self.with.link.connection.send_request(Arc::clone(&request)),
                )
                .await;
            match sent {
                Ok(Ok(())) => {
                    ctx.queue.remove_sent(&request);
                    self.with.sent += 1;
                }
                Ok(Err(e)) => {
                    self.complete(message_id);
                    return Err(SendRequestSnafu { message_id }.into_error(e));
                }
                Err(interruption) => {
                    self.complete(message_id);
                    debug!(
                        "[{}] Request #{} not sent, it stays queued",
                        StateKind::SendingRequests,
                        message_id
                    );
                    return Ok(Some(interruption));
                }
            }
        }
    }

    pub async fn run<C>(mut self, ctx: &RunContext<'_, C>) -> Transition<T>
    where
        C: Connector<Connection = T>,
    {
        let max_requests = ctx.options.requests_per_association();
        let keep_alive_interval = ctx.options.keep_alive();
        let mut keep_alive = ctx.timers.sleep(keep_alive_interval);

        loop {
            if ctx.abort_requested() {
                return Transition::Abort(self.with.link);
            }
            if ctx.cancellation.is_cancelled() {
                return self.cancelled(ctx);
            }

            match self.drain(ctx).await {
                Ok(None) => {}
                Ok(Some(interruption)) => {
                    return interruption.into_transition(StateKind::SendingRequests, self.with.link)
                }
                Err(e) => return Transition::failed(e, self.with.link),
            }

            if self.in_flight.is_empty() && !ctx.abort_requested() && !ctx.cancellation.is_cancelled() {
                if self.limit_reached(max_requests) {
                    debug!(
                        "[{}] Sent {} request(s), the most allowed on one association",
                        StateKind::SendingRequests,
                        self.with.sent
                    );
                    return Transition::ReleasingAssociation(self.with);
                }
                if ctx.queue.is_empty() {
                    return Transition::Lingering(self.with);
                }
            }

            let event = tokio::select! {
                biased;
                _ = ctx.abort.cancelled() => Event::Abort,
                abort = self.peer.aborted.fired() => Event::PeerAborted(abort),
                error = self.peer.closed.fired() => Event::Closed(error),
                _ = ctx.cancellation.cancelled() => Event::Cancelled,
                Some(id) = self.completed.recv() => Event::Completed(id),
                Some((id, timeout)) = self.timed_out.recv() => Event::TimedOut(id, timeout),
                _ = self.flushed.notified() => Event::Flushed,
                _ = self.send_more.notified() => Event::SendMore,
                _ = &mut keep_alive => Event::KeepAlive,
            };

            match event {
                Event::Abort => return Transition::Abort(self.with.link),
                Event::PeerAborted(abort) => return Transition::aborted(abort, self.with.link),
                Event::Closed(error) => {
                    if !self.in_flight.is_empty() {
                        warn!(
                            "[{}] Connection closed with {} request(s) in flight",
                            StateKind::SendingRequests,
                            self.in_flight.len()
                        );
                    }
                    return Transition::closed(error, self.with.link);
                }
                Event::Cancelled => return self.cancelled(ctx),
                Event::Completed(id) => self.complete(id),
                Event::TimedOut(id, timeout) => {
                    warn!(
                        "[{}] Request #{} timed out after {:?}",
                        StateKind::SendingRequests,
                        id,
                        timeout
                    );
                    self.complete(id);
                    ctx.emit(ClientEvent::RequestTimedOut {
                        message_id: id,
                        timeout,
                    });
                }
                Event::SendMore => {}
                Event::Flushed => {
                    // the connection is done with everything handed over so far
                    if !self.in_flight.is_empty() {
                        trace!(
                            "[{}] Send queue empty, {} request(s) no longer tracked",
                            StateKind::SendingRequests,
                            self.in_flight.len()
                        );
                        self.in_flight.clear();
                    }
                }
                Event::KeepAlive => {
                    if self.with.link.connection.is_send_next_message_required() {
                        debug!(
                            "[{}] Asking the connection to send pending messages",
                            StateKind::SendingRequests
                        );
                        let sent = ctx
                            .outbound(
                                &mut self.peer,
                                self.with.link.connection.send_pending_messages(),
                            )
                            .await;
                        match sent {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => warn!(
                                "[{}] Failed to send pending messages: {}",
                                StateKind::SendingRequests,
                                e
                            ),
                            Err(interruption) => {
                                return interruption
                                    .into_transition(StateKind::SendingRequests, self.with.link)
                            }
                        }
                    }
                    keep_alive.reset(keep_alive_interval);
                }
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
                StateKind::SendingRequests
            );
            Transition::Abort(self.with.link)
        } else {
            warn!(
                "[{}] Cancellation requested, releasing the association with {} request(s) still queued",
                StateKind::SendingRequests,
                ctx.queue.len()
            );
            Transition::ReleasingAssociation(self.with)
        }
    }
}
