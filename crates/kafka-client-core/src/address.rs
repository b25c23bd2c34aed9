//! Broker addresses and hostname resolution.
//!
//! An [`Address`] starts out [`ResolveState::Unresolved`] and is resolved at
//! most once through a [`Resolver`]. The default [`DnsResolver`] goes through
//! tokio's resolver; tests plug in their own implementation.

use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Outcome of resolving an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveState {
    /// Not resolved yet.
    Unresolved,
    /// Resolved to a socket address.
    Resolved(SocketAddr),
    /// Resolution failed with the given reason.
    Failed(String),
}

/// Hostname resolution seam.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `hostname:port` to a single socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Resolve`] if the port is not a number or the
    /// host has no addresses.
    async fn resolve(&self, hostname: &str, port: &str) -> Result<SocketAddr>;
}

/// Resolver backed by the runtime's `getaddrinfo` lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, hostname: &str, port: &str) -> Result<SocketAddr> {
        let resolve_error = |message: String| ClientError::Resolve {
            host: hostname.to_string(),
            port: port.to_string(),
            message,
        };

        let port: u16 = port
            .parse()
            .map_err(|_| resolve_error(format!("invalid port '{port}'")))?;

        let mut addrs = tokio::net::lookup_host((hostname, port))
            .await
            .map_err(|e| resolve_error(e.to_string()))?;

        addrs
            .next()
            .ok_or_else(|| resolve_error("no addresses found".to_string()))
    }
}

/// A broker endpoint as configured, plus its resolution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    hostname: String,
    port: String,
    state: ResolveState,
}

impl Address {
    /// Create an unresolved address.
    #[must_use]
    pub fn new(hostname: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: port.into(),
            state: ResolveState::Unresolved,
        }
    }

    /// The configured hostname.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The configured port, as text.
    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Current resolution state.
    #[must_use]
    pub fn state(&self) -> &ResolveState {
        &self.state
    }

    /// The resolved socket address, if resolution succeeded.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self.state {
            ResolveState::Resolved(addr) => Some(addr),
            _ => None,
        }
    }

    /// Whether this address names the given broker endpoint.
    #[must_use]
    pub fn matches(&self, host: &str, port: i32) -> bool {
        self.hostname == host && self.port.parse::<i32>().is_ok_and(|p| p == port)
    }

    /// Resolve the address. Only the first call does any work; later calls
    /// return the state reached by the first.
    pub async fn resolve(&mut self, resolver: &dyn Resolver) -> &ResolveState {
        if self.state == ResolveState::Unresolved {
            self.state = match resolver.resolve(&self.hostname, &self.port).await {
                Ok(addr) => {
                    debug!(address = %self, resolved = %addr, "address resolved");
                    ResolveState::Resolved(addr)
                }
                Err(e) => {
                    debug!(address = %self, error = %e, "address resolution failed");
                    ResolveState::Failed(e.to_string())
                }
            };
        }
        &self.state
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Resolver for CountingResolver {
        async fn resolve(&self, _hostname: &str, port: &str) -> Result<SocketAddr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SocketAddr::from(([10, 0, 0, 1], port.parse().unwrap_or(0))))
        }
    }

    #[test]
    fn test_address_new() {
        let address = Address::new("localhost", "9092");
        assert_eq!(address.hostname(), "localhost");
        assert_eq!(address.port(), "9092");
        assert_eq!(address.state(), &ResolveState::Unresolved);
        assert_eq!(address.to_string(), "localhost:9092");
    }

    #[test]
    fn test_address_matches() {
        let address = Address::new("broker-1", "9093");
        assert!(address.matches("broker-1", 9093));
        assert!(!address.matches("broker-1", 9092));
        assert!(!address.matches("broker-2", 9093));
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let mut address = Address::new("localhost", "9092");
        let state = address.resolve(&DnsResolver).await.clone();

        match state {
            ResolveState::Resolved(addr) => assert_eq!(addr.port(), 9092),
            other => panic!("expected resolved, got {other:?}"),
        }
        assert!(address.socket_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_resolve_invalid_port_fails() {
        let mut address = Address::new("localhost", "not-a-port");
        let state = address.resolve(&DnsResolver).await;
        assert!(matches!(state, ResolveState::Failed(reason) if reason.contains("invalid port")));
    }

    #[tokio::test]
    async fn test_resolve_unknown_host_fails() {
        let mut address = Address::new("does-not-exist.invalid", "9092");
        let state = address.resolve(&DnsResolver).await;
        assert!(matches!(state, ResolveState::Failed(_)));
        assert!(address.socket_addr().is_none());
    }

    #[tokio::test]
    async fn test_resolve_happens_once() {
        let resolver = CountingResolver {
            calls: AtomicUsize::new(0),
        };
        let mut address = Address::new("anything", "1234");

        address.resolve(&resolver).await;
        address.resolve(&resolver).await;

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            address.socket_addr(),
            Some(SocketAddr::from(([10, 0, 0, 1], 1234)))
        );
    }
}
