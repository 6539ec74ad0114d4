//! This crate contains the association lifecycle of a DICOM network client:
//! the state machine deciding when to connect,
//! when to negotiate an association,
//! when to send queued requests,
//! and when to release or abort the association again.
//!
//! The byte-level protocol and the transport
//! are left to external collaborators,
//! which plug into the client through the traits in [`connection`].
//!
//! - The [`client`] module
//!   provides [`DicomClient`], the public façade over the state machine.
//! - The [`association`] module
//!   declares the negotiated association and the
//!   rejection and abort descriptions reported by the peer.
//! - The [`connection`] module
//!   declares the contract consumed from the transport layer,
//!   and the [`ConnectionEvents`] handle through which
//!   the transport reports protocol events back to the client.
//! - The [`options`] module
//!   holds the flat set of options passed in at construction.
//!
//! # Example
//!
//! ```no_run
//! # use dicom_client::{Cancellation, ClientOptions, DicomClient, Connector};
//! # async fn run<C: Connector>(connector: C, request: dicom_client::connection::RequestOf<C>) -> Result<(), Box<dyn std::error::Error>> {
//! let options = ClientOptions::new()
//!     .calling_ae_title("STORE-SCU")
//!     .address("STORE-SCP@10.0.0.100:104")?;
//! let client = DicomClient::new(connector, options);
//! client.add_request(request);
//! client.send(Cancellation::none()).await?;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod association;
pub mod cancellation;
pub mod client;
pub mod connection;
pub mod error;
pub mod event;
pub mod options;

mod queue;
mod signal;
mod state;
mod timer;

// re-exports

pub use address::AeAddr;
pub use association::{
    AbortReason, AbortSource, Association, AssociationAbort, AssociationRejection,
    AssociationRequest, PresentationContext,
};
pub use cancellation::{Cancellation, CancellationMode};
pub use client::DicomClient;
pub use connection::{ConnectOptions, Connection, ConnectionEvents, Connector, Request};
pub use error::{Error, Result};
pub use event::{ClientEvent, StateKind};
pub use options::ClientOptions;
