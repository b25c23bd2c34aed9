//! Domain error types for the Kafka client.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.

use thiserror::Error;

/// Errors raised by the wire buffer when a read or write breaks its bounds.
///
/// These are contract violations: a correctly sized request never produces
/// them, and a well-formed response never produces them either.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A write would go past the allocated capacity.
    #[error("buffer overflow: writing {needed} bytes at offset {offset} exceeds capacity {capacity}")]
    Overflow {
        offset: usize,
        needed: usize,
        capacity: usize,
    },

    /// A read would go past the write cursor.
    #[error("buffer underflow: reading {needed} bytes at offset {offset} but only {written} bytes written")]
    Underflow {
        offset: usize,
        needed: usize,
        written: usize,
    },

    /// An overwrite targets bytes that were never written.
    #[error("overwrite of {needed} bytes at offset {offset} is outside the {written} written bytes")]
    OverwriteOutOfBounds {
        offset: usize,
        needed: usize,
        written: usize,
    },

    /// Strings are length-prefixed with an i16.
    #[error("string of {0} bytes does not fit an i16 length prefix")]
    StringTooLong(usize),

    /// Only -1 is a valid negative string length.
    #[error("invalid string length: {0}")]
    InvalidStringLength(i16),

    /// String bytes were not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors related to configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Bootstrap URL is missing the `plaintext://` scheme.
    #[error("unsupported bootstrap url '{0}' (expected 'plaintext://host[:port]')")]
    UnsupportedScheme(String),

    /// Bootstrap URL has no hostname.
    #[error("bootstrap url '{0}' has no hostname")]
    MissingHostname(String),

    /// Topic names must be non-empty and fit an i16 length prefix.
    #[error("invalid topic name: {0:?}")]
    InvalidTopicName(String),

    /// Retry backoff must be positive.
    #[error("metadata retry backoff must be greater than zero")]
    ZeroRetryBackoff,

    /// The frame limit must at least fit a response header.
    #[error("max_frame_size must be at least 8 bytes, got {0}")]
    FrameSizeTooSmall(usize),
}

/// Errors that occur while talking to brokers.
#[derive(Error, Debug)]
pub enum ClientError {
    /// TCP/IO connection error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Encoding or decoding a packet broke the buffer contract.
    #[error("protocol error: {0}")]
    Buffer(#[from] BufferError),

    /// Hostname resolution failed.
    #[error("could not resolve {host}:{port}: {message}")]
    Resolve {
        host: String,
        port: String,
        message: String,
    },

    /// The transport is not in the connected state.
    #[error("connection {connection} is not connected")]
    NotConnected { connection: u64 },

    /// The transport was closed before the response arrived.
    #[error("connection {connection} closed while waiting for correlation id {correlation_id}")]
    ResponseDropped {
        connection: u64,
        correlation_id: i32,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The connection manager is no longer running.
    #[error("connection manager shut down")]
    Shutdown,
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for buffer operations.
pub type BufferResult<T> = std::result::Result<T, BufferError>;
