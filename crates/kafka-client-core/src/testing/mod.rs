//! Test utilities for the Kafka client.
//!
//! This module provides infrastructure for integration testing:
//!
//! - [`MockBroker`] - A lightweight mock Kafka broker for testing
//! - [`ClientTestHarness`] - A mock broker plus a client configuration pointing at it
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_client_core::testing::{next_event, responses, ClientTestHarness};
//!
//! #[tokio::test]
//! async fn test_metadata_handshake() {
//!     let harness = ClientTestHarness::new().await;
//!     harness
//!         .on_metadata(responses::metadata_response(1, "127.0.0.1", harness.broker_port(), "test", 3))
//!         .await;
//!
//!     let (handle, mut events) = harness.bootstrap();
//!     let update = next_event(&mut events, |e| matches!(e, ClientEvent::UpdateTopicInformation(_))).await;
//!     assert!(update.is_some());
//! }
//! ```

pub mod harness;
pub mod mock_broker;

pub use harness::{collect_events, next_event, ClientTestHarness};
pub use mock_broker::{api_keys, responses, BrokerCall, MockBroker, ResponseGenerator};
