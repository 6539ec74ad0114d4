//! The client driver
//!
//! [`DicomClient`] owns the pending-request queue
//! and the single active lifecycle state.
//! A call to [`send`](DicomClient::send) drives the state machine
//! from Idle, through as many associations as needed,
//! until the queue is drained, the run is cancelled,
//! or an error occurs.
use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cancellation::Cancellation,
    connection::{Connection, Connector, RequestOf},
    error::Result,
    event::{ClientEvent, StateKind},
    options::ClientOptions,
    queue::RequestQueue,
    state::{
        Abort, Completed, Connecting, Dispatch, Handlers, Idle, Lingering, ReleaseAssociation,
        RequestAssociation, RunContext, SendingRequests, Transition,
    },
    timer::Timers,
};

const EVENT_CAPACITY: usize = 64;

struct Shared<C: Connector> {
    connector: C,
    options: ClientOptions,
    queue: RequestQueue<RequestOf<C>>,
    timers: Timers,
    dispatch: Arc<Dispatch>,
    events: broadcast::Sender<ClientEvent>,
    /// whether a send run is in progress
    sending: AtomicBool,
    /// the forced abort signal of the run in progress
    abort: Mutex<Option<CancellationToken>>,
    next_epoch: AtomicU64,
    consecutive_timeouts: AtomicU32,
    async_ops: Mutex<(u16, u16)>,
    /// the connection of the run in progress, until closed
    open_connection: Mutex<Option<Arc<C::Connection>>>,
}

/// A DICOM network client.
///
/// Requests are queued with [`add_request`](Self::add_request)
/// from any thread, and sent over one or more associations
/// once [`send`](Self::send) is called.
/// The client reuses a lingering association for requests queued
/// shortly after the previous ones were answered.
///
/// Protocol encoding and transport are provided by the [`Connector`].
pub struct DicomClient<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> std::fmt::Debug for DicomClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DicomClient")
            .field("state", &self.state())
            .field("queued_requests", &self.queued_requests())
            .finish()
    }
}

impl<C: Connector> DicomClient<C> {
    /// Create an idle client.
    pub fn new(connector: C, options: ClientOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let async_ops = options.initial_async_ops();
        DicomClient {
            shared: Arc::new(Shared {
                connector,
                options,
                queue: RequestQueue::default(),
                timers: Timers::default(),
                dispatch: Arc::new(Dispatch::default()),
                events,
                sending: AtomicBool::new(false),
                abort: Mutex::new(None),
                next_epoch: AtomicU64::new(0),
                consecutive_timeouts: AtomicU32::new(0),
                async_ops: Mutex::new(async_ops),
                open_connection: Mutex::new(None),
            }),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.shared.options
    }

    /// Queue a request to be sent.
    ///
    /// Safe to call at any time.
    /// A lingering association is reused for the new request.
    pub fn add_request(&self, request: RequestOf<C>) {
        self.shared.queue.push(request);
        self.request_added();
    }

    /// Queue several requests to be sent, in order.
    pub fn add_requests(&self, requests: impl IntoIterator<Item = RequestOf<C>>) {
        if self.shared.queue.extend(requests) > 0 {
            self.request_added();
        }
    }

    fn request_added(&self) {
        self.shared
            .dispatch
            .deliver(None, "request added", |h| h.on_request_added());
    }

    /// The number of requests not yet handed to a connection.
    pub fn queued_requests(&self) -> usize {
        self.shared.queue.len()
    }

    /// The kind of the active state.
    pub fn state(&self) -> StateKind {
        self.shared.dispatch.kind()
    }

    /// Whether requests are queued with no run in progress to send them.
    pub fn is_send_required(&self) -> bool {
        !self.shared.sending.load(Ordering::SeqCst) && !self.shared.queue.is_empty()
    }

    /// Subscribe to the events published by this client.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// The number of state timers currently alive.
    pub fn active_timers(&self) -> usize {
        self.shared.timers.active()
    }

    /// Change the maximum numbers of asynchronous operations
    /// invoked and performed, proposed on the next associations.
    /// 0 means unlimited.
    pub fn negotiate_async_ops(&self, invoked: u16, performed: u16) {
        *self
            .shared
            .async_ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = (invoked, performed);
    }

    /// Request a forced abort of the run in progress.
    ///
    /// The active association, if any, is aborted
    /// without waiting for the peer,
    /// and the run ends without error.
    /// Does nothing if no run is in progress.
    pub fn abort(&self) {
        let abort = self
            .shared
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match abort {
            Some(token) => {
                debug!("[{}] Forced abort requested", self.state());
                token.cancel();
            }
            None => debug!("[{}] No send in progress, nothing to abort", self.state()),
        }
    }

    /// Send all queued requests.
    ///
    /// Resolves once the client is idle again
    /// with nothing left to send, or once the run was cancelled,
    /// or fails with the error which prevented
    /// the association from being used.
    /// Requests which could not be sent remain queued.
    ///
    /// If a send is already in progress, returns immediately.
    ///
    /// Dropping the returned future ends the run on the spot.
    /// The client goes back to idle,
    /// and the open connection, if any, is closed in the background
    /// without releasing nor aborting the association.
    /// Prefer a [`Cancellation`] to end a run gracefully.
    pub async fn send(&self, cancellation: Cancellation) -> Result<()> {
        let shared = &*self.shared;
        let abort = CancellationToken::new();
        {
            let mut slot = shared.abort.lock().unwrap_or_else(PoisonError::into_inner);
            if shared
                .sending
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                drop(slot);
                debug!("[{}] Send already in progress", self.state());
                return Ok(());
            }
            *slot = Some(abort.clone());
        }
        let mut guard = RunGuard {
            shared,
            settled: false,
        };

        let result = self.drive(&cancellation, &abort).await;
        guard.settled = true;
        result
    }

    async fn drive(&self, cancellation: &Cancellation, abort: &CancellationToken) -> Result<()> {
        let shared = &*self.shared;
        let ctx = RunContext {
            connector: &shared.connector,
            options: &shared.options,
            queue: &shared.queue,
            timers: &shared.timers,
            dispatch: &shared.dispatch,
            events: &shared.events,
            consecutive_timeouts: &shared.consecutive_timeouts,
            async_ops: &shared.async_ops,
            open_connection: &shared.open_connection,
            cancellation,
            abort,
        };

        let mut next: Transition<C::Connection> = Transition::Idle;
        loop {
            next = match next {
                Transition::Idle => {
                    self.enter(None, Handlers::Idle);
                    match Idle.run(&ctx) {
                        Some(next) => next,
                        None => return Ok(()),
                    }
                }
                Transition::Connecting => {
                    let epoch = shared.next_epoch.fetch_add(1, Ordering::SeqCst);
                    self.enter(Some(epoch), Handlers::Connecting);
                    Connecting::new(epoch).run(&ctx).await
                }
                Transition::RequestingAssociation(link) => {
                    let epoch = link.epoch;
                    let (state, handlers) = RequestAssociation::new(link);
                    self.enter(Some(epoch), handlers);
                    state.run(&ctx).await
                }
                Transition::SendingRequests(with) => {
                    let epoch = with.link.epoch;
                    let (state, handlers) = SendingRequests::new(with);
                    self.enter(Some(epoch), handlers);
                    state.run(&ctx).await
                }
                Transition::Lingering(with) => {
                    let epoch = with.link.epoch;
                    let (state, handlers) = Lingering::new(with);
                    self.enter(Some(epoch), handlers);
                    state.run(&ctx).await
                }
                Transition::ReleasingAssociation(with) => {
                    let epoch = with.link.epoch;
                    let (state, handlers) = ReleaseAssociation::new(with);
                    self.enter(Some(epoch), handlers);
                    state.run(&ctx).await
                }
                Transition::Abort(link) => {
                    let epoch = link.epoch;
                    let (state, handlers) = Abort::new(link);
                    self.enter(Some(epoch), handlers);
                    state.run(&ctx).await
                }
                Transition::Completed(completion) => {
                    self.enter(completion.epoch(), Handlers::Completed);
                    let outcome = Completed::new(completion).run().await;
                    shared
                        .open_connection
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take();
                    outcome?
                }
            };
        }
    }

    /// Make the given handlers the active ones.
    fn enter(&self, epoch: Option<u64>, handlers: Handlers) {
        let to = handlers.kind();
        let from = self.shared.dispatch.swap(epoch, handlers);
        if from == to && to == StateKind::Idle {
            return;
        }
        debug!("[{}] --> [{}]", from, to);
        // no subscribers is fine
        let _ = self.shared.events.send(ClientEvent::StateChanged { from, to });
    }
}

/// Ends a send run, also when the send future is dropped early.
struct RunGuard<'a, C: Connector> {
    shared: &'a Shared<C>,
    settled: bool,
}

impl<C: Connector> Drop for RunGuard<'_, C> {
    fn drop(&mut self) {
        let mut slot = self
            .shared
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        if !self.settled {
            let from = self.shared.dispatch.swap(None, Handlers::Idle);
            warn!("[{}] Send interrupted, back to [{}]", from, StateKind::Idle);
        }
        let connection = self
            .shared
            .open_connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = connection {
            close_detached(connection);
        }
        self.shared.sending.store(false, Ordering::SeqCst);
        drop(slot);
    }
}

/// Close a connection left open by an interrupted run.
fn close_detached<T: Connection>(connection: Arc<T>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                match connection.close().await {
                    Ok(()) => debug!("Connection of an interrupted send closed"),
                    Err(e) => warn!("Failed to close connection of an interrupted send: {}", e),
                }
            });
        }
        Err(_) => warn!("No runtime to close the connection of an interrupted send"),
    }
}
