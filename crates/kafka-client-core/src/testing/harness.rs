//! Test harness for integration testing of the Kafka client.
//!
//! Provides a complete test environment with:
//! - Mock Kafka broker
//! - Client configuration pointing at it
//! - Helpers for starting a connection manager and collecting its events

use std::time::Duration;

use tokio::sync::mpsc;

use crate::broker::{ConnectionManager, ManagerHandle};
use crate::config::ClientConfig;
use crate::event::ClientEvent;

use super::mock_broker::{api_keys, BrokerCall, MockBroker, ResponseGenerator};

/// Default wait for a single event.
const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Test harness for integration testing.
pub struct ClientTestHarness {
    /// The mock broker
    mock_broker: MockBroker,
    /// The mock broker address
    mock_broker_addr: String,
    /// Client configuration pointing at the mock broker
    pub config: ClientConfig,
}

impl ClientTestHarness {
    /// Create a new test harness subscribed to the `test` topic.
    ///
    /// Retries back off by 10ms so retry tests stay fast.
    pub async fn new() -> Self {
        let mut mock_broker = MockBroker::new("127.0.0.1:0");
        let mock_broker_addr = mock_broker
            .start()
            .await
            .expect("Failed to start mock broker");

        let mut config = ClientConfig::new(vec![format!("plaintext://{mock_broker_addr}")]);
        config.topics = vec!["test".to_string()];
        config.connection_timeout_ms = 1000;
        config.metadata_retry.backoff_ms = 10;

        Self {
            mock_broker,
            mock_broker_addr,
            config,
        }
    }

    /// Get the mock broker address.
    #[must_use]
    pub fn broker_address(&self) -> &str {
        &self.mock_broker_addr
    }

    /// Host the mock broker listens on.
    #[must_use]
    pub fn broker_host(&self) -> &str {
        self.mock_broker_addr
            .rsplit_once(':')
            .map_or(self.mock_broker_addr.as_str(), |(host, _)| host)
    }

    /// Port the mock broker listens on.
    #[must_use]
    pub fn broker_port(&self) -> i32 {
        self.mock_broker_addr
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or_default()
    }

    /// The mock broker.
    #[must_use]
    pub fn mock_broker(&self) -> &MockBroker {
        &self.mock_broker
    }

    /// Register a custom response handler for an API key.
    pub async fn register_handler(&self, api_key: i16, handler: ResponseGenerator) {
        self.mock_broker.register_handler(api_key, handler).await;
    }

    /// Register a metadata handler.
    pub async fn on_metadata(&self, handler: ResponseGenerator) {
        self.register_handler(api_keys::METADATA, handler).await;
    }

    /// Metadata requests the mock broker received.
    pub async fn metadata_calls(&self) -> Vec<BrokerCall> {
        self.mock_broker.get_calls_for_api(api_keys::METADATA).await
    }

    /// Start a connection manager with the harness configuration.
    #[must_use]
    pub fn bootstrap(&self) -> (ManagerHandle, mpsc::UnboundedReceiver<ClientEvent>) {
        ConnectionManager::builder(self.config.clone()).bootstrap()
    }

    /// Shutdown the test harness.
    pub async fn shutdown(&mut self) {
        self.mock_broker.stop().await;
    }
}

/// Wait for the next event matching `predicate`, skipping others.
///
/// Returns `None` on timeout or when the channel closes.
pub async fn next_event<F>(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    mut predicate: F,
) -> Option<ClientEvent>
where
    F: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(DEFAULT_EVENT_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Collect every event published within `window`.
pub async fn collect_events(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    window: Duration,
) -> Vec<ClientEvent> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        collected.push(event);
    }
    collected
}
