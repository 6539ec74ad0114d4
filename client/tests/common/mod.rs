//! A scripted in-memory peer,
//! answering association, release and abort messages
//! according to its current [`Behavior`].
#![allow(dead_code)]

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use dicom_client::{
    association::{PresentationContextResult, PresentationContextResultReason},
    AbortReason, AbortSource, Association, AssociationRejection, AssociationRequest,
    ConnectOptions, Connection, ConnectionEvents, Connector, PresentationContext, Request,
};

pub static VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";

/// A C-ECHO request, as far as the client is concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoRequest {
    pub message_id: u16,
}

impl EchoRequest {
    pub fn new(message_id: u16) -> Self {
        EchoRequest { message_id }
    }
}

impl Request for EchoRequest {
    /// the status code of the response
    type Response = u16;

    fn message_id(&self) -> u16 {
        self.message_id
    }

    fn presentation_context(&self) -> PresentationContext {
        PresentationContext::with_default_transfer_syntaxes(VERIFICATION_SOP_CLASS)
    }
}

/// A message received by the peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    AssociationRequest(AssociationRequest),
    Request(u16),
    ReleaseRequest,
    Abort(AbortSource, AbortReason),
    PendingMessages,
    Close,
}

/// How the peer answers an association request.
#[derive(Debug, Copy, Clone)]
pub enum OnAssociate {
    Accept,
    Reject(AssociationRejection),
    Abort(AbortSource, AbortReason),
    Ignore,
}

#[derive(Debug, Copy, Clone)]
pub struct Behavior {
    pub on_associate: OnAssociate,
    pub refuse_connection: bool,
    pub connect_delay: Option<Duration>,
    /// respond to requests as soon as they are sent
    pub answer_requests: bool,
    /// when true, sending a request never completes
    pub hang_requests: bool,
    /// when true, sending a request fails with a transport error
    pub fail_requests: bool,
    pub answer_release: bool,
    /// when false, sending an abort never completes
    pub answer_abort: bool,
    /// claim that outgoing messages are stuck
    pub stuck: bool,
    /// the maximum number of operations invoked granted to the client
    pub max_async_ops: u16,
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior {
            on_associate: OnAssociate::Accept,
            refuse_connection: false,
            connect_delay: None,
            answer_requests: true,
            hang_requests: false,
            fail_requests: false,
            answer_release: true,
            answer_abort: true,
            stuck: false,
            max_async_ops: 0,
        }
    }
}

#[derive(Debug, Default)]
struct PeerState {
    behavior: Mutex<Behavior>,
    /// received messages, tagged with the connection number
    received: Mutex<Vec<(usize, Sent)>>,
    connects: AtomicUsize,
    events: Mutex<Vec<ConnectionEvents<EchoRequest>>>,
}

/// The peer, also acting as the connector to itself.
#[derive(Debug, Clone, Default)]
pub struct Peer {
    state: Arc<PeerState>,
}

impl Peer {
    pub fn new(behavior: Behavior) -> Self {
        let peer = Peer::default();
        peer.set_behavior(|b| *b = behavior);
        peer
    }

    pub fn set_behavior(&self, f: impl FnOnce(&mut Behavior)) {
        f(&mut self.state.behavior.lock().unwrap());
    }

    fn behavior(&self) -> Behavior {
        *self.state.behavior.lock().unwrap()
    }

    fn record(&self, connection: usize, message: Sent) {
        self.state.received.lock().unwrap().push((connection, message));
    }

    /// The number of connections established so far.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Sent> {
        self.state
            .received
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// The message ids of the requests received, in order.
    pub fn received_requests(&self) -> Vec<u16> {
        self.received()
            .into_iter()
            .filter_map(|m| match m {
                Sent::Request(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn association_requests(&self) -> Vec<AssociationRequest> {
        self.received()
            .into_iter()
            .filter_map(|m| match m {
                Sent::AssociationRequest(rq) => Some(rq),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, message: &Sent) -> usize {
        self.received().iter().filter(|m| *m == message).count()
    }

    /// The event handle given to the n-th connection.
    pub fn events(&self, connection: usize) -> ConnectionEvents<EchoRequest> {
        self.state.events.lock().unwrap()[connection].clone()
    }
}

#[async_trait]
impl Connector for Peer {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        _options: &ConnectOptions,
        events: ConnectionEvents<EchoRequest>,
    ) -> io::Result<FakeConnection> {
        let behavior = self.behavior();
        if let Some(delay) = behavior.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if behavior.refuse_connection {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.events.lock().unwrap().push(events.clone());
        Ok(FakeConnection {
            id,
            peer: self.clone(),
            events,
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    id: usize,
    peer: Peer,
    events: ConnectionEvents<EchoRequest>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for FakeConnection {
    type Request = EchoRequest;

    async fn send_association_request(&self, request: &AssociationRequest) -> io::Result<()> {
        self.peer
            .record(self.id, Sent::AssociationRequest(request.clone()));
        let behavior = self.peer.behavior();
        match behavior.on_associate {
            OnAssociate::Accept => self.events.association_accepted(Association {
                calling_ae_title: request.calling_ae_title.clone(),
                called_ae_title: request.called_ae_title.clone(),
                presentation_contexts: request
                    .presentation_contexts
                    .iter()
                    .map(|pc| PresentationContextResult {
                        id: pc.id,
                        reason: PresentationContextResultReason::Acceptance,
                        transfer_syntax: pc.context.transfer_syntaxes[0].clone(),
                    })
                    .collect(),
                max_pdu_length: 16_384,
                max_async_ops_invoked: behavior.max_async_ops,
                max_async_ops_performed: behavior.max_async_ops,
            }),
            OnAssociate::Reject(rejection) => self.events.association_rejected(rejection),
            OnAssociate::Abort(source, reason) => self.events.abort_received(source, reason),
            OnAssociate::Ignore => {}
        }
        Ok(())
    }

    async fn send_association_release_request(&self) -> io::Result<()> {
        self.peer.record(self.id, Sent::ReleaseRequest);
        if self.peer.behavior().answer_release {
            self.events.association_release_response();
        }
        Ok(())
    }

    async fn send_abort(&self, source: AbortSource, reason: AbortReason) -> io::Result<()> {
        self.peer.record(self.id, Sent::Abort(source, reason));
        if !self.peer.behavior().answer_abort {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn send_request(&self, request: Arc<EchoRequest>) -> io::Result<()> {
        self.peer.record(self.id, Sent::Request(request.message_id));
        let behavior = self.peer.behavior();
        if behavior.hang_requests {
            std::future::pending::<()>().await;
        }
        if behavior.fail_requests {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        if behavior.answer_requests {
            self.events.request_completed(&request, &0x0000);
            self.events.send_queue_empty();
        }
        Ok(())
    }

    async fn send_pending_messages(&self) -> io::Result<()> {
        self.peer.record(self.id, Sent::PendingMessages);
        Ok(())
    }

    fn is_send_next_message_required(&self) -> bool {
        self.peer.behavior().stuck
    }

    async fn close(&self) -> io::Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.peer.record(self.id, Sent::Close);
        }
        Ok(())
    }
}
