//! Client configuration
//!
//! See [`ClientOptions`] for the full list of options and their defaults.
use std::time::Duration;

use crate::{
    address::{AeAddr, ParseAeAddressError},
    association::PresentationContext,
};

/// The maximum PDU length admitted by default.
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// The flat set of options passed to a [`DicomClient`](crate::DicomClient)
/// at construction.
///
/// # Example
///
/// ```
/// # use dicom_client::ClientOptions;
/// # use std::time::Duration;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let options = ClientOptions::new()
///     .calling_ae_title("MY-SCU")
///     .address("STORE-SCP@10.0.0.100:11112")?
///     .association_linger_timeout(Duration::from_millis(200))
///     .with_abstract_syntax("1.2.840.10008.1.1");
///
/// assert_eq!(options.called_ae_title_str(), "STORE-SCP");
/// assert_eq!(options.port_number(), 11112);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// the calling AE title
    calling_ae_title: String,
    /// the called AE title
    called_ae_title: String,
    /// the host name of the peer
    host: String,
    /// the TCP port of the peer
    port: u16,
    /// whether to negotiate TLS on the transport
    use_tls: bool,
    /// whether to disable Nagle's algorithm on the transport
    tcp_no_delay: bool,
    association_request_timeout: Duration,
    association_release_timeout: Duration,
    association_linger_timeout: Duration,
    abort_timeout: Duration,
    keep_alive_interval: Duration,
    max_requests_per_association: Option<usize>,
    max_consecutive_association_request_timeouts: Option<u32>,
    /// the maximum PDU length requested for receiving PDUs
    max_pdu_length: u32,
    /// the maximum numbers of operations invoked and performed
    async_ops: (u16, u16),
    /// presentation contexts proposed on every association
    additional_presentation_contexts: Vec<PresentationContext>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            calling_ae_title: "THIS-SCU".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            host: "localhost".to_string(),
            port: 104,
            use_tls: false,
            tcp_no_delay: true,
            association_request_timeout: Duration::from_secs(5),
            association_release_timeout: Duration::from_secs(10),
            association_linger_timeout: Duration::from_millis(50),
            abort_timeout: Duration::from_millis(100),
            keep_alive_interval: Duration::from_secs(1),
            max_requests_per_association: None,
            max_consecutive_association_request_timeouts: None,
            max_pdu_length: DEFAULT_MAX_PDU,
            async_ops: (1, 1),
            additional_presentation_contexts: Vec::new(),
        }
    }
}

impl ClientOptions {
    /// Create a new set of options with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title,
    /// which refers to this DICOM node.
    ///
    /// The default is `THIS-SCU`.
    pub fn calling_ae_title(mut self, calling_ae_title: impl Into<String>) -> Self {
        self.calling_ae_title = calling_ae_title.into();
        self
    }

    /// Define the called application entity title,
    /// which refers to the target DICOM node.
    ///
    /// The default is `ANY-SCP`.
    /// Passing an empty string resets the AE title to the default.
    pub fn called_ae_title(mut self, called_ae_title: impl Into<String>) -> Self {
        let cae = called_ae_title.into();
        self.called_ae_title = if cae.is_empty() {
            "ANY-SCP".to_string()
        } else {
            cae
        };
        self
    }

    /// Define the host name of the target node.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Define the TCP port of the target node.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Define the target node from an address in the form
    /// `«ae_title»@«host»:«port»`.
    ///
    /// The AE title part is optional.
    /// When present, it replaces the called AE title.
    pub fn address(self, address: &str) -> Result<Self, ParseAeAddressError> {
        let address: AeAddr = address.parse()?;
        Ok(self.ae_address(address))
    }

    /// Define the target node from a parsed address.
    pub fn ae_address(mut self, address: AeAddr) -> Self {
        if let Some(ae_title) = address.ae_title() {
            self.called_ae_title = ae_title.to_string();
        }
        self.host = address.host().to_string();
        self.port = address.port();
        self
    }

    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn tcp_no_delay(mut self, tcp_no_delay: bool) -> Self {
        self.tcp_no_delay = tcp_no_delay;
        self
    }

    /// Override how long to wait for the peer
    /// to answer an association request.
    /// Also applies to establishing the connection.
    ///
    /// The default is 5 seconds.
    pub fn association_request_timeout(mut self, timeout: Duration) -> Self {
        self.association_request_timeout = timeout;
        self
    }

    /// Override how long to wait for the peer
    /// to answer a release request, before aborting.
    ///
    /// The default is 10 seconds.
    pub fn association_release_timeout(mut self, timeout: Duration) -> Self {
        self.association_release_timeout = timeout;
        self
    }

    /// Override how long an idle association is kept open
    /// in case more requests arrive.
    ///
    /// The default is 50 milliseconds.
    pub fn association_linger_timeout(mut self, timeout: Duration) -> Self {
        self.association_linger_timeout = timeout;
        self
    }

    /// Override how long to wait for an abort to be sent.
    ///
    /// The default is 100 milliseconds.
    pub fn abort_timeout(mut self, timeout: Duration) -> Self {
        self.abort_timeout = timeout;
        self
    }

    /// Override the interval at which the connection
    /// is asked to flush pending messages
    /// while requests are in flight.
    ///
    /// The default is 1 second.
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Limit the number of requests sent on a single association.
    /// Remaining requests are sent on a new association
    /// once the current one is released.
    pub fn max_requests_per_association(mut self, max: Option<usize>) -> Self {
        self.max_requests_per_association = max.filter(|&n| n > 0);
        self
    }

    /// Fail with an error once the association request
    /// times out this many times in a row.
    ///
    /// By default, association request timeouts never fail a send.
    pub fn max_consecutive_association_request_timeouts(mut self, max: Option<u32>) -> Self {
        self.max_consecutive_association_request_timeouts = max.filter(|&n| n > 0);
        self
    }

    /// Override the maximum PDU length
    /// that this application entity will admit.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override the maximum numbers of asynchronous operations
    /// invoked and performed, proposed on new associations.
    /// 0 means unlimited.
    ///
    /// The default is 1 for both.
    pub fn async_ops(mut self, invoked: u16, performed: u16) -> Self {
        self.async_ops = (invoked, performed);
        self
    }

    /// Include this presentation context in every association request,
    /// next to the ones required by the queued requests.
    pub fn with_presentation_context<T>(
        mut self,
        abstract_syntax_uid: T,
        transfer_syntax_uids: Vec<T>,
    ) -> Self
    where
        T: Into<String>,
    {
        self.additional_presentation_contexts
            .push(PresentationContext::new(abstract_syntax_uid, transfer_syntax_uids));
        self
    }

    /// Helper to include this abstract syntax
    /// with the default transfer syntaxes
    /// in every association request.
    pub fn with_abstract_syntax(mut self, abstract_syntax_uid: impl Into<String>) -> Self {
        self.additional_presentation_contexts
            .push(PresentationContext::with_default_transfer_syntaxes(
                abstract_syntax_uid,
            ));
        self
    }

    pub fn calling_ae_title_str(&self) -> &str {
        &self.calling_ae_title
    }

    pub fn called_ae_title_str(&self) -> &str {
        &self.called_ae_title
    }

    pub fn host_name(&self) -> &str {
        &self.host
    }

    pub fn port_number(&self) -> u16 {
        self.port
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.use_tls
    }

    pub(crate) fn is_tcp_no_delay(&self) -> bool {
        self.tcp_no_delay
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.association_request_timeout
    }

    pub(crate) fn release_timeout(&self) -> Duration {
        self.association_release_timeout
    }

    pub(crate) fn linger_timeout(&self) -> Duration {
        self.association_linger_timeout
    }

    pub(crate) fn abort_ack_timeout(&self) -> Duration {
        self.abort_timeout
    }

    pub(crate) fn keep_alive(&self) -> Duration {
        self.keep_alive_interval
    }

    pub(crate) fn requests_per_association(&self) -> Option<usize> {
        self.max_requests_per_association
    }

    pub(crate) fn max_request_timeouts(&self) -> Option<u32> {
        self.max_consecutive_association_request_timeouts
    }

    pub(crate) fn pdu_length(&self) -> u32 {
        self.max_pdu_length
    }

    pub(crate) fn initial_async_ops(&self) -> (u16, u16) {
        self.async_ops
    }

    pub(crate) fn presentation_contexts(&self) -> &[PresentationContext] {
        &self.additional_presentation_contexts
    }
}

#[cfg(test)]
mod tests {
    use super::ClientOptions;
    use std::time::Duration;

    #[test]
    fn default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.calling_ae_title_str(), "THIS-SCU");
        assert_eq!(options.called_ae_title_str(), "ANY-SCP");
        assert_eq!(options.host_name(), "localhost");
        assert_eq!(options.port_number(), 104);
        assert!(!options.is_tls());
        assert!(options.is_tcp_no_delay());
        assert_eq!(options.request_timeout(), Duration::from_secs(5));
        assert_eq!(options.release_timeout(), Duration::from_secs(10));
        assert_eq!(options.linger_timeout(), Duration::from_millis(50));
        assert_eq!(options.abort_ack_timeout(), Duration::from_millis(100));
        assert_eq!(options.keep_alive(), Duration::from_secs(1));
        assert_eq!(options.requests_per_association(), None);
        assert_eq!(options.max_request_timeouts(), None);
        assert_eq!(options.pdu_length(), 16_384);
        assert!(options.presentation_contexts().is_empty());
    }

    #[test]
    fn address_overrides_called_ae_title() {
        let options = ClientOptions::new()
            .called_ae_title("FIRST")
            .address("SECOND@[::1]:4242")
            .unwrap();
        assert_eq!(options.called_ae_title_str(), "SECOND");
        assert_eq!(options.host_name(), "::1");
        assert_eq!(options.port_number(), 4242);

        // no AE title: keep the previous one
        let options = options.address("127.0.0.1:104").unwrap();
        assert_eq!(options.called_ae_title_str(), "SECOND");

        assert!(ClientOptions::new().address("nowhere").is_err());
    }

    #[test]
    fn zero_limits_mean_unlimited() {
        let options = ClientOptions::new()
            .max_requests_per_association(Some(0))
            .max_consecutive_association_request_timeouts(Some(0));
        assert_eq!(options.requests_per_association(), None);
        assert_eq!(options.max_request_timeouts(), None);

        let options = options.max_requests_per_association(Some(3));
        assert_eq!(options.requests_per_association(), Some(3));
    }

    #[test]
    fn empty_called_ae_title_resets_default() {
        let options = ClientOptions::new().called_ae_title("PACS").called_ae_title("");
        assert_eq!(options.called_ae_title_str(), "ANY-SCP");
    }
}
