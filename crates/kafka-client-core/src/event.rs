//! Events published by the client.
//!
//! Every outcome the connection manager produces, successful or not, reaches
//! the consumer as a [`ClientEvent`] on an unbounded channel.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use crate::broker::ConnectionId;
use crate::protocol::TopicInformation;

/// What went wrong, for [`ErrorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// None of the bootstrap servers used a supported scheme.
    NoValidBootstrapServerGiven,
    /// A hostname could not be resolved.
    DnsResolveFailed,
    /// The broker actively refused the TCP connection.
    TcpConnectionRefused,
    /// Any other transport failure.
    UnknownTcpError,
    /// The configuration handed to the manager failed validation.
    InvalidConfiguration,
}

impl ErrorKind {
    /// Map an I/O error from connecting or reading to an event kind.
    #[must_use]
    pub fn from_io_error(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionRefused => Self::TcpConnectionRefused,
            _ => Self::UnknownTcpError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoValidBootstrapServerGiven => "no valid bootstrap server given",
            Self::DnsResolveFailed => "dns resolve failed",
            Self::TcpConnectionRefused => "tcp connection refused",
            Self::UnknownTcpError => "unknown tcp error",
            Self::InvalidConfiguration => "invalid configuration",
        };
        f.write_str(name)
    }
}

/// A component ran into a problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Human readable description.
    pub reason: String,
    pub kind: ErrorKind,
}

impl ErrorEvent {
    #[must_use]
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            kind,
        }
    }
}

/// A bootstrap address was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEvent {
    /// The configured `host:port`.
    pub address: String,
    pub socket_addr: SocketAddr,
}

/// A transport finished connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectedEvent {
    pub connection: ConnectionId,
    pub address: SocketAddr,
}

/// Metadata for a subscribed topic arrived.
///
/// The topic's error code is zero, or a non-zero code that will not be
/// retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTopicInformationEvent {
    pub topic: TopicInformation,
}

/// Everything the client reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Error(ErrorEvent),
    Resolved(ResolvedEvent),
    Connected(ConnectedEvent),
    UpdateTopicInformation(UpdateTopicInformationEvent),
}

impl ClientEvent {
    /// Shorthand for an [`ClientEvent::Error`].
    #[must_use]
    pub fn error(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self::Error(ErrorEvent::new(kind, reason))
    }

    /// The error kind, if this is an error event.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error(event) => Some(event.kind),
            _ => None,
        }
    }
}
