//! The contract between the client and the transport.
//!
//! The client does not encode PDUs nor open sockets on its own.
//! These tasks belong to a [`Connector`] and the [`Connection`]s it creates.
//! A connection reports what it receives from the peer
//! through the [`ConnectionEvents`] handle
//! given to it when connecting.
use std::{
    fmt,
    io,
    marker::PhantomData,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    association::{
        AbortReason, AbortSource, Association, AssociationAbort, AssociationRejection,
        AssociationRequest, PresentationContext,
    },
    state::Dispatch,
};

/// An application request to be sent over an association,
/// such as a C-ECHO or a C-STORE request.
pub trait Request: fmt::Debug + Send + Sync + 'static {
    /// The final response to this request.
    type Response: fmt::Debug + Send + Sync + 'static;

    /// The message identifier of this request,
    /// used to track it while in flight.
    fn message_id(&self) -> u16;

    /// The presentation context which the association
    /// must propose for this request to be sent.
    fn presentation_context(&self) -> PresentationContext;
}

/// The request type sent through the connections of a connector.
pub type RequestOf<C> = <<C as Connector>::Connection as Connection>::Request;

/// The parameters for establishing a transport connection.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub tcp_no_delay: bool,
    /// how long the connection attempt may take
    pub timeout: Duration,
}

/// Creator of transport connections to the peer.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    /// Establish a new connection.
    ///
    /// The given event handle must be used by the connection
    /// to report every protocol event received from the peer.
    async fn connect(
        &self,
        options: &ConnectOptions,
        events: ConnectionEvents<<Self::Connection as Connection>::Request>,
    ) -> io::Result<Self::Connection>;
}

/// A live transport connection to the peer.
///
/// A connection is owned by one state at a time.
/// Sending methods resolve once the message
/// was handed over for transmission.
/// Their futures are dropped unfinished
/// when a forced abort or a peer event interrupts the state.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    type Request: Request;

    async fn send_association_request(&self, request: &AssociationRequest) -> io::Result<()>;

    async fn send_association_release_request(&self) -> io::Result<()>;

    async fn send_abort(&self, source: AbortSource, reason: AbortReason) -> io::Result<()>;

    async fn send_request(&self, request: Arc<Self::Request>) -> io::Result<()>;

    /// Ask the connection to flush or retry any messages
    /// it has not managed to send yet.
    async fn send_pending_messages(&self) -> io::Result<()>;

    /// Whether the connection believes
    /// that outgoing messages are stuck.
    fn is_send_next_message_required(&self) -> bool {
        false
    }

    /// Close the connection and wait for its listener to terminate.
    ///
    /// Must be idempotent.
    async fn close(&self) -> io::Result<()>;
}

/// The handle through which a connection reports protocol events.
///
/// Events are delivered to the state active at the time.
/// Events from a connection which was superseded by a newer one
/// are discarded, as are events arriving after the client is dropped.
pub struct ConnectionEvents<R> {
    dispatch: Weak<Dispatch>,
    epoch: u64,
    _request: PhantomData<fn(&R)>,
}

impl<R> Clone for ConnectionEvents<R> {
    fn clone(&self) -> Self {
        ConnectionEvents {
            dispatch: Weak::clone(&self.dispatch),
            epoch: self.epoch,
            _request: PhantomData,
        }
    }
}

impl<R> fmt::Debug for ConnectionEvents<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEvents")
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl<R> ConnectionEvents<R>
where
    R: Request,
{
    pub(crate) fn new(dispatch: &Arc<Dispatch>, epoch: u64) -> Self {
        ConnectionEvents {
            dispatch: Arc::downgrade(dispatch),
            epoch,
            _request: PhantomData,
        }
    }

    fn deliver(&self, event: &'static str, f: impl FnOnce(&crate::state::Handlers)) {
        match self.dispatch.upgrade() {
            Some(dispatch) => dispatch.deliver(Some(self.epoch), event, f),
            None => tracing::trace!("Client dropped, ignoring `{}`", event),
        }
    }

    pub fn association_accepted(&self, association: Association) {
        self.deliver("association accepted", |h| h.on_association_accepted(association));
    }

    pub fn association_rejected(&self, rejection: AssociationRejection) {
        self.deliver("association rejected", |h| h.on_association_rejected(rejection));
    }

    pub fn association_release_response(&self) {
        self.deliver("release response", |h| h.on_release_response());
    }

    pub fn abort_received(&self, source: AbortSource, reason: AbortReason) {
        self.deliver("abort", |h| {
            h.on_abort_received(AssociationAbort { source, reason })
        });
    }

    /// Report that the connection was closed,
    /// with the transport error which caused it if any.
    pub fn connection_closed(&self, error: Option<io::Error>) {
        self.deliver("connection closed", |h| h.on_connection_closed(error));
    }

    /// Report that the connection has no more outgoing messages
    /// nor responses pending.
    pub fn send_queue_empty(&self) {
        self.deliver("send queue empty", |h| h.on_send_queue_empty());
    }

    /// Report that a request received its final response.
    pub fn request_completed(&self, request: &R, response: &R::Response) {
        let message_id = request.message_id();
        tracing::trace!("Request #{} completed: {:?}", message_id, response);
        self.deliver("request completed", |h| h.on_request_completed(message_id));
    }

    /// Report that a request did not receive
    /// its final response within the given timeout.
    pub fn request_timed_out(&self, request: &R, timeout: Duration) {
        let message_id = request.message_id();
        self.deliver("request timed out", |h| {
            h.on_request_timed_out(message_id, timeout)
        });
    }
}
