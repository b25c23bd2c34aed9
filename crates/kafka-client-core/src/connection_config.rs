//! Bootstrap URL parsing.
//!
//! Only plaintext connections exist, written as `plaintext://host[:port]`.
//! A missing port or a trailing colon falls back to [`DEFAULT_PORT`].

use crate::address::Address;
use crate::error::{ConfigError, ConfigResult};

/// URL scheme for plaintext connections.
pub const PLAINTEXT_SCHEME: &str = "plaintext://";

/// Port used when the URL does not name one.
pub const DEFAULT_PORT: &str = "9092";

/// Wire security of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    #[default]
    Plaintext,
}

/// Where and how to connect to one broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub address: Address,
    pub connection_type: ConnectionType,
}

impl ConnectionConfig {
    /// Plaintext config for an address taken from broker metadata.
    #[must_use]
    pub fn plaintext(hostname: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            address: Address::new(hostname, port),
            connection_type: ConnectionType::Plaintext,
        }
    }

    /// Whether `url` uses a scheme this client can connect with.
    #[must_use]
    pub fn is_supported_url(url: &str) -> bool {
        url.starts_with(PLAINTEXT_SCHEME)
    }

    /// Parse a `plaintext://host[:port]` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not `plaintext://` or the hostname
    /// is empty.
    pub fn parse_from_url(url: &str) -> ConfigResult<Self> {
        let host_and_port = url
            .strip_prefix(PLAINTEXT_SCHEME)
            .ok_or_else(|| ConfigError::UnsupportedScheme(url.to_string()))?;

        let (hostname, port) = match host_and_port.split_once(':') {
            None => (host_and_port, DEFAULT_PORT),
            Some((hostname, "")) => (hostname, DEFAULT_PORT),
            Some((hostname, port)) => (hostname, port),
        };

        if hostname.is_empty() {
            return Err(ConfigError::MissingHostname(url.to_string()));
        }

        Ok(Self::plaintext(hostname, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_port() {
        let config = ConnectionConfig::parse_from_url("plaintext://localhost:9093").unwrap();
        assert_eq!(config.connection_type, ConnectionType::Plaintext);
        assert_eq!(config.address.hostname(), "localhost");
        assert_eq!(config.address.port(), "9093");
    }

    #[test]
    fn test_parse_with_trailing_colon() {
        let config = ConnectionConfig::parse_from_url("plaintext://localhost:").unwrap();
        assert_eq!(config.address.hostname(), "localhost");
        assert_eq!(config.address.port(), "9092");
    }

    #[test]
    fn test_parse_without_port() {
        let config = ConnectionConfig::parse_from_url("plaintext://localhost").unwrap();
        assert_eq!(config.address.hostname(), "localhost");
        assert_eq!(config.address.port(), "9092");
    }

    #[test]
    fn test_parse_unsupported_scheme() {
        let result = ConnectionConfig::parse_from_url("ssl://localhost:9093");
        assert!(matches!(result, Err(ConfigError::UnsupportedScheme(_))));
        assert!(!ConnectionConfig::is_supported_url("ssl://localhost:9093"));
        assert!(ConnectionConfig::is_supported_url("plaintext://localhost"));
    }

    #[test]
    fn test_parse_missing_hostname() {
        let result = ConnectionConfig::parse_from_url("plaintext://:9092");
        assert!(matches!(result, Err(ConfigError::MissingHostname(_))));
    }

    #[test]
    fn test_parse_keeps_non_numeric_port() {
        // Rejected later, when the address is resolved.
        let config = ConnectionConfig::parse_from_url("plaintext://broker:abc").unwrap();
        assert_eq!(config.address.port(), "abc");
    }
}
