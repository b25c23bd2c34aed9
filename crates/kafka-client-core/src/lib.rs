//! Kafka Client Core Library
//!
//! This library bootstraps a connection to a Kafka cluster: it resolves the
//! seed brokers, opens TCP transports, runs the metadata handshake and keeps
//! the broker and topic topology it learns. It also provides the binary
//! codec for the Metadata API.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Wire buffer, packet framing and the Metadata API
//! - [`network`] - Kafka frame codec for inbound responses
//! - [`address`] - Broker addresses and hostname resolution
//! - [`connection_config`] - Bootstrap URL parsing
//! - [`broker`] - Broker transports and the connection manager
//! - [`event`] - Events published to the consumer
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Domain-specific error types
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_client_core::{ClientConfig, ClientEvent, ConnectionManager};
//!
//! let config = ClientConfig::new(vec!["plaintext://localhost:9092".to_string()]);
//! let (handle, mut events) = ConnectionManager::builder(config)
//!     .subscribe("test")
//!     .bootstrap();
//!
//! while let Some(event) = events.recv().await {
//!     if let ClientEvent::UpdateTopicInformation(update) = event {
//!         println!("{} has {} partitions", update.topic.name, update.topic.partitions.len());
//!     }
//! }
//! ```

#![forbid(unsafe_code)]

pub mod address;
pub mod broker;
pub mod config;
pub mod connection_config;
pub mod error;
pub mod event;
pub mod network;
pub mod protocol;
pub mod util;

/// Test utilities for integration testing.
///
/// This module is only available when compiling tests or when the `testing` feature is enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use address::{Address, DnsResolver, ResolveState, Resolver};
pub use broker::{ClusterTopology, ConnectionId, ConnectionManager, ManagerHandle};
pub use config::{ClientConfig, CorrelationMode, LoggingConfig, MetadataRetryConfig};
pub use connection_config::{ConnectionConfig, ConnectionType};
pub use error::{BufferError, ClientError, ConfigError, Result};
pub use event::{
    ClientEvent, ConnectedEvent, ErrorEvent, ErrorKind, ResolvedEvent,
    UpdateTopicInformationEvent,
};
