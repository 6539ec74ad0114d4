//! The association lifecycle states.
//!
//! Each state is a struct built from the data it needs
//! (the connection, the negotiated association)
//! together with the [`Handlers`] which feed it protocol events,
//! plus a single `run` routine deciding the next [`Transition`].
//! The driver in [`crate::client`] installs the handlers,
//! runs the state, and moves on to the transition returned.
use std::{
    future::Future,
    io,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use snafu::IntoError;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    association::{Association, AssociationAbort, AssociationRejection},
    cancellation::Cancellation,
    connection::{Connector, RequestOf},
    error::{AbortedSnafu, ConnectionClosedSnafu, Error},
    event::{ClientEvent, StateKind},
    options::ClientOptions,
    queue::RequestQueue,
    signal::{signal, Signal, Waiter},
    timer::Timers,
};

mod abort;
mod completed;
mod connecting;
mod idle;
mod lingering;
mod release_association;
mod request_association;
mod sending_requests;

pub(crate) use self::abort::Abort;
pub(crate) use self::completed::Completed;
pub(crate) use self::connecting::Connecting;
pub(crate) use self::idle::Idle;
pub(crate) use self::lingering::Lingering;
pub(crate) use self::release_association::ReleaseAssociation;
pub(crate) use self::request_association::RequestAssociation;
pub(crate) use self::sending_requests::SendingRequests;

/// A state holding a live connection.
#[derive(Debug)]
pub(crate) struct WithConnection<T> {
    /// also held by the client until the connection is closed
    pub connection: Arc<T>,
    /// the epoch of the connect attempt which produced the connection
    pub epoch: u64,
}

/// A state holding a live connection and an accepted association.
#[derive(Debug)]
pub(crate) struct WithAssociation<T> {
    pub link: WithConnection<T>,
    pub association: Association,
    /// number of requests sent on this association so far
    pub sent: usize,
}

/// How a run ends.
#[derive(Debug)]
pub(crate) enum Completion<T> {
    WithoutError(Option<WithConnection<T>>),
    WithError(Error, Option<WithConnection<T>>),
}

impl<T> Completion<T> {
    pub fn epoch(&self) -> Option<u64> {
        match self {
            Completion::WithoutError(link) | Completion::WithError(_, link) => {
                link.as_ref().map(|l| l.epoch)
            }
        }
    }
}

/// The decision of a state on which state comes next.
#[derive(Debug)]
pub(crate) enum Transition<T> {
    Idle,
    Connecting,
    RequestingAssociation(WithConnection<T>),
    SendingRequests(WithAssociation<T>),
    Lingering(WithAssociation<T>),
    ReleasingAssociation(WithAssociation<T>),
    Abort(WithConnection<T>),
    Completed(Completion<T>),
}

impl<T> Transition<T> {
    pub fn completed(link: WithConnection<T>) -> Self {
        Transition::Completed(Completion::WithoutError(Some(link)))
    }

    pub fn failed(error: Error, link: WithConnection<T>) -> Self {
        Transition::Completed(Completion::WithError(error, Some(link)))
    }

    /// The transition following a connection close reported by the peer.
    pub fn closed(error: Option<io::Error>, link: WithConnection<T>) -> Self {
        match error {
            None => Transition::completed(link),
            Some(e) => Transition::failed(ConnectionClosedSnafu.into_error(e), link),
        }
    }

    /// The transition following an abort received from the peer.
    pub fn aborted(abort: AssociationAbort, link: WithConnection<T>) -> Self {
        warn!("Association aborted by the peer: {}", abort);
        Transition::failed(AbortedSnafu { abort }.build(), link)
    }
}

/// Everything a state's run routine borrows from the client
/// for the duration of a send run.
pub(crate) struct RunContext<'a, C: Connector> {
    pub connector: &'a C,
    pub options: &'a ClientOptions,
    pub queue: &'a RequestQueue<RequestOf<C>>,
    pub timers: &'a Timers,
    pub dispatch: &'a Arc<Dispatch>,
    pub events: &'a broadcast::Sender<ClientEvent>,
    pub consecutive_timeouts: &'a AtomicU32,
    pub async_ops: &'a Mutex<(u16, u16)>,
    /// the connection open in this run, if any
    pub open_connection: &'a Mutex<Option<Arc<C::Connection>>>,
    pub cancellation: &'a Cancellation,
    /// the forced abort signal of this run
    pub abort: &'a CancellationToken,
}

impl<C: Connector> RunContext<'_, C> {
    pub fn emit(&self, event: ClientEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub fn async_ops(&self) -> (u16, u16) {
        *self.async_ops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset_request_timeouts(&self) {
        self.consecutive_timeouts.store(0, Ordering::SeqCst);
    }

    /// Count one more consecutive association request timeout.
    pub fn count_request_timeout(&self) -> u32 {
        self.consecutive_timeouts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Take ownership of a newly established connection.
    pub fn open(&self, connection: C::Connection, epoch: u64) -> WithConnection<C::Connection> {
        let connection = Arc::new(connection);
        *self
            .open_connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&connection));
        WithConnection { connection, epoch }
    }

    /// Await an outbound message
    /// while watching for a forced abort and peer events.
    ///
    /// A cancellation in abort mode counts as a forced abort.
    pub async fn outbound<F>(
        &self,
        peer: &mut LinkReceivers,
        send: F,
    ) -> Result<F::Output, Interruption>
    where
        F: Future,
    {
        let aborts = self.cancellation.aborts();
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(Interruption::Abort),
            _ = self.cancellation.cancelled(), if aborts => Err(Interruption::Abort),
            abort = peer.aborted.fired() => Err(Interruption::PeerAborted(abort)),
            error = peer.closed.fired() => Err(Interruption::Closed(error)),
            output = send => Ok(output),
        }
    }
}

/// What may cut an outbound message short.
#[derive(Debug)]
pub(crate) enum Interruption {
    Abort,
    PeerAborted(AssociationAbort),
    Closed(Option<io::Error>),
}

impl Interruption {
    pub fn into_transition<T>(self, state: StateKind, link: WithConnection<T>) -> Transition<T> {
        match self {
            Interruption::Abort => {
                debug!("[{}] Abort requested while sending", state);
                Transition::Abort(link)
            }
            Interruption::PeerAborted(abort) => Transition::aborted(abort, link),
            Interruption::Closed(error) => {
                debug!("[{}] Connection closed while sending", state);
                Transition::closed(error, link)
            }
        }
    }
}

/// The peer signals observed by every state holding a connection.
#[derive(Debug)]
pub(crate) struct LinkSignals {
    aborted: Signal<AssociationAbort>,
    closed: Signal<Option<io::Error>>,
}

/// The receiving half of [`LinkSignals`].
#[derive(Debug)]
pub(crate) struct LinkReceivers {
    pub aborted: Waiter<AssociationAbort>,
    pub closed: Waiter<Option<io::Error>>,
}

pub(crate) fn link_signals() -> (LinkSignals, LinkReceivers) {
    let (aborted, aborted_rx) = signal("abort received");
    let (closed, closed_rx) = signal("connection closed");
    (
        LinkSignals { aborted, closed },
        LinkReceivers {
            aborted: aborted_rx,
            closed: closed_rx,
        },
    )
}

#[derive(Debug)]
pub(crate) struct RequestingHandlers {
    pub link: LinkSignals,
    pub accepted: Signal<Association>,
    pub rejected: Signal<AssociationRejection>,
}

#[derive(Debug)]
pub(crate) struct SendingHandlers {
    pub link: LinkSignals,
    pub send_more: Arc<Notify>,
    pub flushed: Arc<Notify>,
    pub completed: mpsc::UnboundedSender<u16>,
    pub timed_out: mpsc::UnboundedSender<(u16, Duration)>,
}

#[derive(Debug)]
pub(crate) struct LingeringHandlers {
    pub link: LinkSignals,
    pub request_added: Signal<()>,
}

#[derive(Debug)]
pub(crate) struct ReleasingHandlers {
    pub link: LinkSignals,
    pub release_response: Signal<()>,
}

/// The event handlers of the active state.
#[derive(Debug)]
pub(crate) enum Handlers {
    Idle,
    Connecting,
    RequestingAssociation(RequestingHandlers),
    SendingRequests(SendingHandlers),
    Lingering(LingeringHandlers),
    ReleasingAssociation(ReleasingHandlers),
    Abort(LinkSignals),
    Completed,
}

impl Handlers {
    pub fn kind(&self) -> StateKind {
        match self {
            Handlers::Idle => StateKind::Idle,
            Handlers::Connecting => StateKind::Connecting,
            Handlers::RequestingAssociation(_) => StateKind::RequestingAssociation,
            Handlers::SendingRequests(_) => StateKind::SendingRequests,
            Handlers::Lingering(_) => StateKind::Lingering,
            Handlers::ReleasingAssociation(_) => StateKind::ReleasingAssociation,
            Handlers::Abort(_) => StateKind::Abort,
            Handlers::Completed => StateKind::Completed,
        }
    }

    fn link(&self) -> Option<&LinkSignals> {
        match self {
            Handlers::RequestingAssociation(h) => Some(&h.link),
            Handlers::SendingRequests(h) => Some(&h.link),
            Handlers::Lingering(h) => Some(&h.link),
            Handlers::ReleasingAssociation(h) => Some(&h.link),
            Handlers::Abort(link) => Some(link),
            Handlers::Idle | Handlers::Connecting | Handlers::Completed => None,
        }
    }

    pub fn on_association_accepted(&self, association: Association) {
        match self {
            Handlers::RequestingAssociation(h) => {
                h.accepted.fire(association);
            }
            Handlers::SendingRequests(_)
            | Handlers::Lingering(_)
            | Handlers::ReleasingAssociation(_) => {
                warn!(
                    "[{}] Received association accept while already associated",
                    self.kind()
                );
            }
            Handlers::Idle | Handlers::Connecting | Handlers::Abort(_) | Handlers::Completed => {
                trace!("[{}] Ignoring association accept", self.kind());
            }
        }
    }

    pub fn on_association_rejected(&self, rejection: AssociationRejection) {
        match self {
            Handlers::RequestingAssociation(h) => {
                h.rejected.fire(rejection);
            }
            Handlers::SendingRequests(_)
            | Handlers::Lingering(_)
            | Handlers::ReleasingAssociation(_) => {
                warn!(
                    "[{}] Received association reject while already associated: {}",
                    self.kind(),
                    rejection
                );
            }
            Handlers::Idle | Handlers::Connecting | Handlers::Abort(_) | Handlers::Completed => {
                trace!("[{}] Ignoring association reject", self.kind());
            }
        }
    }

    pub fn on_release_response(&self) {
        match self {
            Handlers::ReleasingAssociation(h) => {
                h.release_response.fire(());
            }
            Handlers::RequestingAssociation(_)
            | Handlers::SendingRequests(_)
            | Handlers::Lingering(_) => {
                warn!(
                    "[{}] Received release response without a release request",
                    self.kind()
                );
            }
            Handlers::Idle | Handlers::Connecting | Handlers::Abort(_) | Handlers::Completed => {
                trace!("[{}] Ignoring release response", self.kind());
            }
        }
    }

    pub fn on_abort_received(&self, abort: AssociationAbort) {
        match self.link() {
            Some(link) => {
                link.aborted.fire(abort);
            }
            None => trace!("[{}] Ignoring abort: {}", self.kind(), abort),
        }
    }

    pub fn on_connection_closed(&self, error: Option<io::Error>) {
        match self.link() {
            Some(link) => {
                link.closed.fire(error);
            }
            None => trace!("[{}] Ignoring connection close", self.kind()),
        }
    }

    pub fn on_send_queue_empty(&self) {
        match self {
            Handlers::SendingRequests(h) => h.flushed.notify_one(),
            _ => trace!("[{}] Ignoring send queue empty", self.kind()),
        }
    }

    pub fn on_request_completed(&self, message_id: u16) {
        match self {
            Handlers::SendingRequests(h) => {
                let _ = h.completed.send(message_id);
            }
            _ => trace!("[{}] Request #{} completed", self.kind(), message_id),
        }
    }

    pub fn on_request_timed_out(&self, message_id: u16, timeout: Duration) {
        match self {
            Handlers::SendingRequests(h) => {
                let _ = h.timed_out.send((message_id, timeout));
            }
            _ => warn!(
                "[{}] Request #{} timed out after {:?}",
                self.kind(),
                message_id,
                timeout
            ),
        }
    }

    pub fn on_request_added(&self) {
        match self {
            Handlers::SendingRequests(h) => h.send_more.notify_one(),
            Handlers::Lingering(h) => {
                h.request_added.fire(());
            }
            // picked up by the next state which sends
            _ => {}
        }
    }
}

#[derive(Debug)]
struct Active {
    epoch: Option<u64>,
    handlers: Handlers,
}

/// The single active state of a client,
/// as seen by the event handles of its connections.
#[derive(Debug)]
pub(crate) struct Dispatch {
    active: Mutex<Active>,
}

impl Default for Dispatch {
    fn default() -> Self {
        Dispatch {
            active: Mutex::new(Active {
                epoch: None,
                handlers: Handlers::Idle,
            }),
        }
    }
}

impl Dispatch {
    fn lock(&self) -> MutexGuard<'_, Active> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> StateKind {
        self.lock().handlers.kind()
    }

    /// Replace the active state's handlers,
    /// returning the kind of the superseded state.
    pub fn swap(&self, epoch: Option<u64>, handlers: Handlers) -> StateKind {
        let old = {
            let mut active = self.lock();
            std::mem::replace(&mut *active, Active { epoch, handlers })
        };
        let kind = old.handlers.kind();
        // superseded signals are released outside of the lock
        drop(old);
        kind
    }

    /// Hand an event to the active state's handlers.
    ///
    /// Events tagged with an epoch other than the active one are dropped.
    pub fn deliver(&self, epoch: Option<u64>, event: &str, f: impl FnOnce(&Handlers)) {
        let active = self.lock();
        if epoch.is_some() && epoch != active.epoch {
            trace!(
                "[{}] Dropping `{}` from a superseded connection",
                active.handlers.kind(),
                event
            );
            return;
        }
        f(&active.handlers);
    }
}
