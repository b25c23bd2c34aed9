//! Mock Kafka broker for integration testing.
//!
//! A lightweight mock broker that:
//! - Accepts Kafka protocol connections
//! - Records all requests received
//! - Returns configurable responses, or none at all

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tokio_util::codec::Framed;

use crate::network::codec::KafkaCodec;
use crate::protocol::packet::{end_frame, RESPONSE_HEADER_SIZE};
use crate::protocol::{Buffer, RequestHeader, ResponseHeader};

/// API keys for Kafka protocol
pub mod api_keys {
    pub const METADATA: i16 = crate::protocol::METADATA_API_KEY;
}

/// A recorded broker call.
#[derive(Debug, Clone)]
pub struct BrokerCall {
    /// Which accepted connection the request arrived on, in accept order.
    pub connection: usize,
    /// The API key of the request.
    pub api_key: i16,
    /// The API version of the request.
    pub api_version: i16,
    /// The correlation ID.
    pub correlation_id: i32,
    /// The raw request bytes, length prefix included.
    pub request_bytes: Bytes,
    /// When the broker decoded the request.
    pub received_at: Instant,
}

impl BrokerCall {
    /// The request as a [`Buffer`] with the read cursor at the size field.
    #[must_use]
    pub fn buffer(&self) -> Buffer {
        Buffer::from_received(&self.request_bytes)
    }
}

/// Response generator function type.
///
/// Returns a complete frame, length prefix included, or `None` to leave the
/// request unanswered.
pub type ResponseGenerator = Arc<dyn Fn(&BrokerCall) -> Option<Bytes> + Send + Sync>;

/// Mock Kafka broker for testing.
pub struct MockBroker {
    address: String,
    shutdown_tx: Option<broadcast::Sender<()>>,
    call_log: Arc<RwLock<Vec<BrokerCall>>>,
    response_handlers: Arc<RwLock<HashMap<i16, ResponseGenerator>>>,
    connections: Arc<AtomicUsize>,
}

impl MockBroker {
    /// Create a new mock broker that will bind to the given address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            shutdown_tx: None,
            call_log: Arc::new(RwLock::new(Vec::new())),
            response_handlers: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start the mock broker.
    ///
    /// Returns the actual address the broker is listening on.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn start(&mut self) -> std::io::Result<String> {
        let listener = TcpListener::bind(&self.address).await?;
        let actual_address = listener.local_addr()?.to_string();
        self.address = actual_address.clone();

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        let call_log = self.call_log.clone();
        let response_handlers = self.response_handlers.clone();
        let connections = self.connections.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        // Spawn the accept loop
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _addr)) => {
                                let connection = connections.fetch_add(1, Ordering::SeqCst);
                                let call_log = call_log.clone();
                                let response_handlers = response_handlers.clone();
                                let shutdown_rx = shutdown_tx.subscribe();

                                tokio::spawn(async move {
                                    Self::handle_connection(connection, stream, call_log, response_handlers, shutdown_rx).await;
                                });
                            }
                            Err(_) => break,
                        }
                    }
                }
            }
        });

        Ok(actual_address)
    }

    /// Stop the mock broker. Open connections are closed.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Register a response handler for a specific API key.
    pub async fn register_handler(&self, api_key: i16, handler: ResponseGenerator) {
        self.response_handlers
            .write()
            .await
            .insert(api_key, handler);
    }

    /// Get all recorded calls.
    pub async fn get_calls(&self) -> Vec<BrokerCall> {
        self.call_log.read().await.clone()
    }

    /// Get calls filtered by API key.
    pub async fn get_calls_for_api(&self, api_key: i16) -> Vec<BrokerCall> {
        self.call_log
            .read()
            .await
            .iter()
            .filter(|c| c.api_key == api_key)
            .cloned()
            .collect()
    }

    /// Clear the call log.
    pub async fn clear_calls(&self) {
        self.call_log.write().await.clear();
    }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Get the broker address. After [`MockBroker::start`] this is the bound
    /// address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Handle a single client connection.
    async fn handle_connection(
        connection: usize,
        stream: TcpStream,
        call_log: Arc<RwLock<Vec<BrokerCall>>>,
        response_handlers: Arc<RwLock<HashMap<i16, ResponseGenerator>>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut framed = Framed::new(stream, KafkaCodec::requests());

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = framed.next() => {
                    let frame = match result {
                        Some(Ok(frame)) => frame,
                        Some(Err(_)) | None => break,
                    };

                    let mut buffer = Buffer::from_received(&frame.bytes);
                    let Ok((_, header)) = RequestHeader::read(&mut buffer) else {
                        continue;
                    };

                    let call = BrokerCall {
                        connection,
                        api_key: header.api_key,
                        api_version: header.api_version,
                        correlation_id: header.correlation_id,
                        request_bytes: frame.bytes.freeze(),
                        received_at: Instant::now(),
                    };

                    // Record the call
                    call_log.write().await.push(call.clone());

                    // Generate response
                    let response = {
                        let handlers = response_handlers.read().await;
                        match handlers.get(&call.api_key) {
                            Some(handler) => handler(&call),
                            None => Some(Self::default_response(&call)),
                        }
                    };

                    if let Some(response) = response {
                        if framed.send(response).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Generate a default response (correlation ID only).
    fn default_response(call: &BrokerCall) -> Bytes {
        let header = ResponseHeader {
            size: 0,
            correlation_id: call.correlation_id,
        };
        let mut buffer = Buffer::with_capacity(RESPONSE_HEADER_SIZE);
        // The buffer is sized for exactly this header.
        if let Ok(size_offset) = header.write(&mut buffer) {
            let _ = end_frame(&mut buffer, size_offset);
        }
        buffer.freeze()
    }
}

/// Default response generators for common API types.
pub mod responses {
    use super::*;
    use crate::protocol::{
        encode, BrokerNodeInformation, MetadataResponse, PartitionInformation, TopicInformation,
    };

    /// Encode `response` as an answer to `call`, echoing its correlation id
    /// shifted by `correlation_offset`.
    fn encode_for(call: &BrokerCall, response: &MetadataResponse, correlation_offset: i32) -> Option<Bytes> {
        let mut response = response.clone();
        response.header.correlation_id = call.correlation_id.wrapping_add(correlation_offset);
        encode(&response).ok().map(Buffer::freeze)
    }

    /// A broker record.
    #[must_use]
    pub fn broker(node_id: i32, host: &str, port: i32) -> BrokerNodeInformation {
        BrokerNodeInformation {
            node_id,
            host: host.to_string(),
            port,
            rack: String::new(),
        }
    }

    /// A topic record with `partition_count` partitions led by `leader_id`.
    #[must_use]
    pub fn topic(name: &str, error_code: i16, partition_count: i32, leader_id: i32) -> TopicInformation {
        TopicInformation {
            error_code,
            name: name.to_string(),
            is_internal: false,
            partitions: (0..partition_count)
                .map(|partition_index| PartitionInformation {
                    error_code: 0,
                    partition_index,
                    leader_id,
                    leader_epoch: 0,
                    replicas: vec![leader_id],
                    isr: vec![leader_id],
                    offline_replicas: Vec::new(),
                })
                .collect(),
            topic_authorized_operations: i32::MIN,
        }
    }

    /// A metadata response listing `brokers` and `topics`, with the first
    /// broker as controller.
    #[must_use]
    pub fn cluster(brokers: Vec<BrokerNodeInformation>, topics: Vec<TopicInformation>) -> MetadataResponse {
        MetadataResponse {
            controller_id: brokers.first().map_or(-1, |b| b.node_id),
            brokers,
            cluster_id: "mock-cluster".to_string(),
            topics,
            cluster_authorized_operations: i32::MIN,
            ..Default::default()
        }
    }

    /// Answer every request with `response`.
    #[must_use]
    pub fn metadata(response: MetadataResponse) -> ResponseGenerator {
        Arc::new(move |call: &BrokerCall| encode_for(call, &response, 0))
    }

    /// Create a simple metadata response for testing.
    ///
    /// Returns a response with:
    /// - One broker at the given address
    /// - One topic with the specified number of partitions
    #[must_use]
    pub fn metadata_response(
        broker_id: i32,
        broker_host: &str,
        broker_port: i32,
        topic_name: &str,
        partition_count: i32,
    ) -> ResponseGenerator {
        metadata(cluster(
            vec![broker(broker_id, broker_host, broker_port)],
            vec![topic(topic_name, 0, partition_count, broker_id)],
        ))
    }

    /// Answer with `response` but a correlation id that is off by
    /// `correlation_offset`.
    #[must_use]
    pub fn metadata_with_correlation_offset(
        response: MetadataResponse,
        correlation_offset: i32,
    ) -> ResponseGenerator {
        Arc::new(move |call: &BrokerCall| encode_for(call, &response, correlation_offset))
    }

    /// Never answer.
    #[must_use]
    pub fn no_reply() -> ResponseGenerator {
        Arc::new(|_: &BrokerCall| None)
    }

    /// Use the generators in turn, one per call. The last one answers every
    /// call after the list runs out.
    #[must_use]
    pub fn sequence(generators: Vec<ResponseGenerator>) -> ResponseGenerator {
        let next = AtomicUsize::new(0);
        Arc::new(move |call: &BrokerCall| {
            let index = next.fetch_add(1, Ordering::SeqCst);
            generators
                .get(index)
                .or_else(|| generators.last())
                .and_then(|generator| generator(call))
        })
    }
}
