//! Addresses of target application entities.
//!
//! The syntax is `«ae_title»@«host»:«port»`,
//! where the AE title part is optional.
//! The host can be a domain name, an IPv4 address,
//! or an IPv6 address in square brackets.
use std::{fmt, str::FromStr};

use snafu::{ensure, OptionExt, ResultExt, Snafu};

/// A error which occurred when parsing an AE address.
#[derive(Debug, Clone, Eq, PartialEq, Snafu)]
#[non_exhaustive]
pub enum ParseAeAddressError {
    /// Empty AE title before `@`
    MissingAeTitle,

    /// Missing `:` between host and port
    MissingPort,

    /// Missing host name
    MissingHost,

    #[snafu(display("invalid port number `{}`", value))]
    InvalidPort {
        value: String,
        source: std::num::ParseIntError,
    },
}

/// The address of a target node:
/// an optional application entity title,
/// plus the host name and TCP port of the node.
///
/// # Example
///
/// ```
/// # use dicom_client::AeAddr;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let addr: AeAddr = "SCP-STORAGE@127.0.0.1:104".parse()?;
/// assert_eq!(addr.ae_title(), Some("SCP-STORAGE"));
/// assert_eq!(addr.host(), "127.0.0.1");
/// assert_eq!(addr.port(), 104);
///
/// let addr: AeAddr = "pacs.example.org:11112".parse()?;
/// assert_eq!(addr.ae_title(), None);
/// assert_eq!(&addr.to_string(), "pacs.example.org:11112");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct AeAddr {
    ae_title: Option<String>,
    host: String,
    port: u16,
}

impl AeAddr {
    /// Create an address without an AE title.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        AeAddr {
            ae_title: None,
            host: host.into(),
            port,
        }
    }

    /// Create an address with an AE title.
    pub fn with_ae_title(ae_title: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        AeAddr {
            ae_title: Some(ae_title.into()),
            host: host.into(),
            port,
        }
    }

    /// Retrieve the application entity title portion, if present.
    pub fn ae_title(&self) -> Option<&str> {
        self.ae_title.as_deref()
    }

    /// Retrieve the host name portion.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Retrieve the TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for AeAddr {
    type Err = ParseAeAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ae_title, address) = match s.split_once('@') {
            Some((ae_title, address)) => {
                ensure!(!ae_title.is_empty(), MissingAeTitleSnafu);
                (Some(ae_title.to_string()), address)
            }
            None => (None, s),
        };

        let (host, port) = address.rsplit_once(':').context(MissingPortSnafu)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        ensure!(!host.is_empty(), MissingHostSnafu);
        let port = port
            .parse()
            .context(InvalidPortSnafu { value: port })?;

        Ok(AeAddr {
            ae_title,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for AeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ae_title) = &self.ae_title {
            write!(f, "{}@", ae_title)?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
