//! Association data types
//!
//! The types in this module describe what is negotiated with the peer
//! ([`AssociationRequest`] and [`Association`]),
//! and why an association could not be used
//! ([`AssociationRejection`] and [`AssociationAbort`]).
//! Their wire encoding belongs to the connection collaborator.
use std::fmt::{self, Display};

/// A presentation context required by a request,
/// or configured statically to be proposed on every association.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct PresentationContext {
    /// the abstract syntax UID
    /// (commonly referring to the expected SOP class)
    pub abstract_syntax: String,
    /// the transfer syntax UIDs admitted for this abstract syntax
    pub transfer_syntaxes: Vec<String>,
}

impl PresentationContext {
    /// Create a presentation context from an abstract syntax
    /// and a list of transfer syntaxes.
    pub fn new<T>(abstract_syntax: T, transfer_syntaxes: impl IntoIterator<Item = T>) -> Self
    where
        T: Into<String>,
    {
        PresentationContext {
            abstract_syntax: trim_uid(abstract_syntax.into()),
            transfer_syntaxes: transfer_syntaxes
                .into_iter()
                .map(|ts| trim_uid(ts.into()))
                .collect(),
        }
    }

    /// Create a presentation context for this abstract syntax
    /// with the default transfer syntaxes
    /// _Explicit VR Little Endian_ and _Implicit VR Little Endian_.
    pub fn with_default_transfer_syntaxes(abstract_syntax: impl Into<String>) -> Self {
        PresentationContext {
            abstract_syntax: trim_uid(abstract_syntax.into()),
            transfer_syntaxes: vec![
                "1.2.840.10008.1.2.1".to_string(),
                "1.2.840.10008.1.2".to_string(),
            ],
        }
    }
}

/// UIDs may carry a trailing null padding character.
fn trim_uid(mut uid: String) -> String {
    let len = uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0').len();
    uid.truncate(len);
    uid
}

/// A presentation context proposed in an association request.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct PresentationContextProposed {
    /// the presentation context identifier (always odd)
    pub id: u8,
    /// the proposed abstract syntax and transfer syntaxes
    pub context: PresentationContext,
}

/// The outcome of negotiating one proposed presentation context.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct PresentationContextResult {
    /// the presentation context identifier
    pub id: u8,
    /// whether the context was accepted, and why not
    pub reason: PresentationContextResultReason,
    /// the transfer syntax chosen by the acceptor
    pub transfer_syntax: String,
}

#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum PresentationContextResultReason {
    Acceptance,
    UserRejection,
    NoReason,
    AbstractSyntaxNotSupported,
    TransferSyntaxesNotSupported,
}

/// The association parameters sent to the peer
/// when requesting a new association.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AssociationRequest {
    /// the AE title of this node
    pub calling_ae_title: String,
    /// the AE title of the target node
    pub called_ae_title: String,
    /// the proposed presentation contexts, in proposal order
    pub presentation_contexts: Vec<PresentationContextProposed>,
    /// the maximum PDU length this node admits
    pub max_pdu_length: u32,
    /// the maximum number of outstanding operations this node invokes
    pub max_async_ops_invoked: u16,
    /// the maximum number of outstanding operations this node performs
    pub max_async_ops_performed: u16,
}

impl AssociationRequest {
    /// Assemble an association request proposing each given context once,
    /// in order of first appearance,
    /// assigning odd identifiers starting at 1.
    pub(crate) fn from_contexts<I>(
        calling_ae_title: &str,
        called_ae_title: &str,
        contexts: I,
        max_pdu_length: u32,
        (max_async_ops_invoked, max_async_ops_performed): (u16, u16),
    ) -> Self
    where
        I: IntoIterator<Item = PresentationContext>,
    {
        let mut proposed: Vec<PresentationContextProposed> = Vec::new();
        for context in contexts {
            if proposed.iter().any(|p| p.context == context) {
                continue;
            }
            // identifiers are odd integers between 1 and 255
            if proposed.len() >= 128 {
                tracing::warn!(
                    "Too many presentation contexts, ignoring `{}`",
                    context.abstract_syntax
                );
                continue;
            }
            proposed.push(PresentationContextProposed {
                id: (proposed.len() * 2 + 1) as u8,
                context,
            });
        }

        AssociationRequest {
            calling_ae_title: calling_ae_title.to_string(),
            called_ae_title: called_ae_title.to_string(),
            presentation_contexts: proposed,
            max_pdu_length,
            max_async_ops_invoked,
            max_async_ops_performed,
        }
    }
}

/// An association accepted by the peer.
///
/// Owned by the state which currently holds the active association,
/// and moved along with the connection on every transition.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Association {
    /// the AE title of this node
    pub calling_ae_title: String,
    /// the AE title of the peer
    pub called_ae_title: String,
    /// the presentation contexts answered by the peer,
    /// including the rejected ones
    pub presentation_contexts: Vec<PresentationContextResult>,
    /// the maximum PDU length admitted by the peer
    pub max_pdu_length: u32,
    /// the negotiated maximum number of operations invoked
    /// (0 means unlimited)
    pub max_async_ops_invoked: u16,
    /// the negotiated maximum number of operations performed
    /// (0 means unlimited)
    pub max_async_ops_performed: u16,
}

impl Association {
    /// Iterate over the presentation contexts accepted by the peer.
    pub fn accepted_presentation_contexts(
        &self,
    ) -> impl Iterator<Item = &PresentationContextResult> {
        self.presentation_contexts
            .iter()
            .filter(|pc| pc.reason == PresentationContextResultReason::Acceptance)
    }

    /// The maximum number of requests which may be outstanding
    /// at the same time on this association,
    /// or `None` if the peer did not impose a limit.
    pub fn max_concurrent_operations(&self) -> Option<usize> {
        match self.max_async_ops_invoked {
            0 => None,
            n => Some(usize::from(n)),
        }
    }
}

/// Whether a rejection is permanent or transient.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum RejectResult {
    Permanent,
    Transient,
}

impl Display for RejectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectResult::Permanent => f.write_str("permanent"),
            RejectResult::Transient => f.write_str("transient"),
        }
    }
}

/// The party which rejected the association, and its reason.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum RejectSource {
    ServiceUser(ServiceUserReason),
    ServiceProviderAcse(ServiceProviderAcseReason),
    ServiceProviderPresentation(ServiceProviderPresentationReason),
}

impl Display for RejectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectSource::ServiceUser(r) => write!(f, "service user, {}", r),
            RejectSource::ServiceProviderAcse(r) => write!(f, "service provider (ACSE), {}", r),
            RejectSource::ServiceProviderPresentation(r) => {
                write!(f, "service provider (presentation), {}", r)
            }
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum ServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAeNotRecognized,
    CalledAeNotRecognized,
    Reserved(u8),
}

impl Display for ServiceUserReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceUserReason::NoReasonGiven => f.write_str("no reason given"),
            ServiceUserReason::ApplicationContextNameNotSupported => {
                f.write_str("application context name not supported")
            }
            ServiceUserReason::CallingAeNotRecognized => f.write_str("calling AE title not recognized"),
            ServiceUserReason::CalledAeNotRecognized => f.write_str("called AE title not recognized"),
            ServiceUserReason::Reserved(code) => write!(f, "reserved code {}", code),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum ServiceProviderAcseReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

impl Display for ServiceProviderAcseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceProviderAcseReason::NoReasonGiven => f.write_str("no reason given"),
            ServiceProviderAcseReason::ProtocolVersionNotSupported => {
                f.write_str("protocol version not supported")
            }
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum ServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

impl Display for ServiceProviderPresentationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceProviderPresentationReason::TemporaryCongestion => {
                f.write_str("temporary congestion")
            }
            ServiceProviderPresentationReason::LocalLimitExceeded => {
                f.write_str("local limit exceeded")
            }
            ServiceProviderPresentationReason::Reserved(code) => {
                write!(f, "reserved code {}", code)
            }
        }
    }
}

/// A rejection of an association request, as answered by the peer.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AssociationRejection {
    pub result: RejectResult,
    pub source: RejectSource,
}

impl Display for AssociationRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rejection by {}", self.result, self.source)
    }
}

/// The party which issued an abort.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum AbortSource {
    ServiceUser,
    Reserved,
    ServiceProvider,
}

impl Display for AbortSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortSource::ServiceUser => f.write_str("service user"),
            AbortSource::Reserved => f.write_str("reserved source"),
            AbortSource::ServiceProvider => f.write_str("service provider"),
        }
    }
}

/// The reason given for an abort.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum AbortReason {
    NotSpecified,
    UnrecognizedPdu,
    UnexpectedPdu,
    UnrecognizedPduParameter,
    UnexpectedPduParameter,
    InvalidPduParameter,
}

impl Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AbortReason::NotSpecified => "reason not specified",
            AbortReason::UnrecognizedPdu => "unrecognized PDU",
            AbortReason::UnexpectedPdu => "unexpected PDU",
            AbortReason::UnrecognizedPduParameter => "unrecognized PDU parameter",
            AbortReason::UnexpectedPduParameter => "unexpected PDU parameter",
            AbortReason::InvalidPduParameter => "invalid PDU parameter",
        };
        f.write_str(msg)
    }
}

/// An abort of an association, with its source and reason.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AssociationAbort {
    pub source: AbortSource,
    pub reason: AbortReason,
}

impl Display for AssociationAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source, self.reason)
    }
}
