//! Broker connection management.
//!
//! This module provides:
//! - Per-broker transports with request/response correlation
//! - The bootstrap and metadata handshake
//! - Retry of metadata requests on transient errors
//! - A shared view of the cluster topology

pub mod manager;
pub mod pending;
pub mod retry;
pub mod topology;
pub mod transport;

pub use manager::{
    ConnectionManager, ConnectionManagerBuilder, ManagerHandle, ManagerSnapshot,
    TransportSnapshot,
};
pub use pending::PendingRequests;
pub use retry::{MetadataRetryTask, RetryPolicy};
pub use topology::ClusterTopology;
pub use transport::{
    BrokerTransport, ConnectionId, PendingResponse, TransportEvent, TransportOptions,
    TransportState,
};
