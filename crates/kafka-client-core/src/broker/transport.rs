//! Single Kafka broker transport.
//!
//! Owns one TCP connection to a broker and multiplexes concurrent requests
//! over it. Every request gets a correlation id and a pending entry; a
//! background reader matches inbound frames against the pending queue.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, instrument, warn};

use crate::config::CorrelationMode;
use crate::connection_config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crate::event::{ErrorEvent, ErrorKind};
use crate::network::codec::{KafkaCodec, KafkaFrame, DEFAULT_MAX_FRAME_SIZE};
use crate::protocol::{BrokerNodeInformation, Buffer, CORRELATION_ID_OFFSET};
use crate::util::hex_dump;

use super::pending::PendingRequests;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Node id stored while the transport is not bound to a broker.
const UNBOUND: i32 = -1;

/// Opaque handle of a transport inside the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a transport. `Closed` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    Unconnected,
    Connecting,
    Connected,
    Closed,
    Error(String),
}

/// Reported by the reader task when a connected transport stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker closed the connection.
    Closed { connection: ConnectionId },
    /// Reading failed.
    Failed {
        connection: ConnectionId,
        error: ErrorEvent,
    },
}

/// Tunables for a transport.
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub correlation: CorrelationMode,
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            correlation: CorrelationMode::Fifo,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// The response to one request, once it arrives.
#[derive(Debug)]
pub struct PendingResponse {
    connection: ConnectionId,
    correlation_id: i32,
    rx: oneshot::Receiver<Buffer>,
}

impl PendingResponse {
    /// Correlation id the request was sent with.
    #[must_use]
    pub fn correlation_id(&self) -> i32 {
        self.correlation_id
    }

    /// Wait for the response. The returned buffer holds the whole frame with
    /// the read cursor at the size field.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ResponseDropped`] if the transport went away
    /// before the response arrived.
    pub async fn recv(self) -> Result<Buffer> {
        self.rx.await.map_err(|_| ClientError::ResponseDropped {
            connection: self.connection.0,
            correlation_id: self.correlation_id,
        })
    }
}

/// A TCP connection to a single broker.
pub struct BrokerTransport {
    id: ConnectionId,
    config: ConnectionConfig,
    options: TransportOptions,
    broker_id: AtomicI32,
    correlation_id: AtomicI32,
    writer: Mutex<Option<OwnedWriteHalf>>,
    pending: Mutex<PendingRequests>,
    state: watch::Sender<TransportState>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl BrokerTransport {
    /// Create a transport for an already resolved address (not yet connected).
    #[must_use]
    pub fn new(id: ConnectionId, config: ConnectionConfig, options: TransportOptions) -> Self {
        Self {
            id,
            config,
            options,
            broker_id: AtomicI32::new(UNBOUND),
            correlation_id: AtomicI32::new(0),
            writer: Mutex::new(None),
            pending: Mutex::new(PendingRequests::new(options.correlation)),
            state: watch::Sender::new(TransportState::Unconnected),
            reader: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Node id this transport was bound to by metadata.
    #[must_use]
    pub fn broker_id(&self) -> Option<i32> {
        match self.broker_id.load(Ordering::Acquire) {
            UNBOUND => None,
            id => Some(id),
        }
    }

    /// Bind to a node id without waiting for metadata.
    pub fn bind(&self, node_id: i32) {
        self.broker_id.store(node_id, Ordering::Release);
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state.borrow().clone()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == TransportState::Connected
    }

    /// Whether the transport reached `Closed` or `Error` and can no longer
    /// carry requests.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        matches!(
            *self.state.borrow(),
            TransportState::Closed | TransportState::Error(_)
        )
    }

    /// Number of requests awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Next correlation id. Wraps around on overflow.
    pub fn next_correlation_id(&self) -> i32 {
        self.correlation_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Bind this transport to `broker` if it points at the same host and
    /// port. Returns whether it matched.
    pub fn consume_from_metadata(&self, broker: &BrokerNodeInformation) -> bool {
        if self.config.address.matches(&broker.host, broker.port) {
            self.bind(broker.node_id);
            true
        } else {
            false
        }
    }

    /// Connect to the broker and start reading responses.
    ///
    /// `events` receives a [`TransportEvent`] once the connection stops after
    /// having been established.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not resolved, the connection fails
    /// or it times out. The transport is left in the `Error` state.
    #[instrument(skip(self, events), fields(connection = %self.id, address = %self.config.address))]
    pub async fn connect(
        self: &Arc<Self>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<SocketAddr> {
        let address = self.config.address.socket_addr().ok_or_else(|| ClientError::Resolve {
            host: self.config.address.hostname().to_string(),
            port: self.config.address.port().to_string(),
            message: "address not resolved".to_string(),
        })?;

        self.state.send_replace(TransportState::Connecting);

        let stream = match timeout(self.options.connect_timeout, TcpStream::connect(address)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to connect to broker");
                self.state.send_replace(TransportState::Error(e.to_string()));
                return Err(ClientError::Connection(e));
            }
            Err(_) => {
                warn!("connection timeout");
                let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timeout");
                self.state.send_replace(TransportState::Error(e.to_string()));
                return Err(ClientError::Connection(e));
            }
        };

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        self.state.send_replace(TransportState::Connected);

        let transport = Arc::clone(self);
        let handle = tokio::spawn(async move { transport.read_loop(read_half, events).await });
        *self.reader.lock().await = Some(handle);

        debug!("connected to broker");
        Ok(address)
    }

    /// Send an encoded request.
    ///
    /// Assigns the next correlation id, writes it into the request at
    /// [`CORRELATION_ID_OFFSET`] and queues the request before writing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not connected, the buffer is too
    /// short to hold a request header, or the write fails.
    #[instrument(skip(self, request), fields(connection = %self.id, size = request.len()))]
    pub async fn send(&self, mut request: Buffer) -> Result<PendingResponse> {
        // Held across enqueue and write so queue order is wire order.
        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or(ClientError::NotConnected {
            connection: self.id.0,
        })?;

        let correlation_id = self.next_correlation_id();
        request.overwrite::<i32>(CORRELATION_ID_OFFSET, correlation_id)?;

        let rx = self.pending.lock().await.push(correlation_id);

        let written = async {
            stream.write_all(request.as_slice()).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!(correlation_id, error = %e, "failed to write request");
            writer.take();
            self.pending.lock().await.clear();
            self.state.send_replace(TransportState::Error(e.to_string()));
            return Err(ClientError::Connection(e));
        }

        debug!(correlation_id, "request sent");
        Ok(PendingResponse {
            connection: self.id,
            correlation_id,
            rx,
        })
    }

    /// Close the connection. Pending requests are dropped.
    pub async fn close(&self) {
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.pending.lock().await.clear();
        self.state.send_if_modified(|state| {
            if matches!(state, TransportState::Closed | TransportState::Error(_)) {
                false
            } else {
                *state = TransportState::Closed;
                true
            }
        });
        debug!(connection = %self.id, "transport closed");
    }

    async fn read_loop(
        self: Arc<Self>,
        reader: OwnedReadHalf,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let codec = KafkaCodec::responses().with_max_frame_size(self.options.max_frame_size);
        let mut frames = FramedRead::new(reader, codec);

        let outcome = loop {
            match frames.next().await {
                Some(Ok(frame)) => self.dispatch(frame).await,
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            }
        };

        self.writer.lock().await.take();
        self.pending.lock().await.clear();

        let event = match outcome {
            Ok(()) => {
                info!(connection = %self.id, "broker closed the connection");
                self.state.send_replace(TransportState::Closed);
                TransportEvent::Closed {
                    connection: self.id,
                }
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "failed to read from broker");
                self.state.send_replace(TransportState::Error(e.to_string()));
                TransportEvent::Failed {
                    connection: self.id,
                    error: ErrorEvent::new(ErrorKind::UnknownTcpError, e.to_string()),
                }
            }
        };
        let _ = events.send(event);
    }

    /// Hand a frame to the request it answers, or drop it.
    async fn dispatch(&self, frame: KafkaFrame) {
        let correlation_id = frame.correlation_id;
        let (responder, head) = {
            let mut pending = self.pending.lock().await;
            let head = pending.head();
            (pending.take(correlation_id), head)
        };

        match responder {
            Some(responder) => {
                if responder.send(frame.into_buffer()).is_err() {
                    debug!(connection = %self.id, correlation_id, "response receiver dropped");
                }
            }
            None => {
                warn!(
                    connection = %self.id,
                    correlation_id,
                    expected = ?head,
                    frame = %hex_dump(&frame.bytes),
                    "dropping response that matches no pending request"
                );
            }
        }
    }
}

impl fmt::Debug for BrokerTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerTransport")
            .field("id", &self.id)
            .field("address", &self.config.address.to_string())
            .field("broker_id", &self.broker_id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::DnsResolver;
    use crate::protocol::{encode, MetadataRequest};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn resolved(url: &str) -> ConnectionConfig {
        let mut config = ConnectionConfig::parse_from_url(url).unwrap();
        config.address.resolve(&DnsResolver).await;
        config
    }

    #[test]
    fn test_transport_new() {
        let config = ConnectionConfig::plaintext("localhost", "9092");
        let transport = BrokerTransport::new(ConnectionId(3), config, TransportOptions::default());
        assert_eq!(transport.id(), ConnectionId(3));
        assert_eq!(transport.state(), TransportState::Unconnected);
        assert_eq!(transport.broker_id(), None);
        assert!(!transport.is_connected());
        assert!(!transport.is_terminated());
    }

    #[test]
    fn test_correlation_id_generation() {
        let config = ConnectionConfig::plaintext("localhost", "9092");
        let transport = BrokerTransport::new(ConnectionId(0), config, TransportOptions::default());

        assert_eq!(transport.next_correlation_id(), 0);
        assert_eq!(transport.next_correlation_id(), 1);
        assert_eq!(transport.next_correlation_id(), 2);
    }

    #[test]
    fn test_correlation_id_wraps() {
        let config = ConnectionConfig::plaintext("localhost", "9092");
        let transport = BrokerTransport::new(ConnectionId(0), config, TransportOptions::default());
        transport.correlation_id.store(i32::MAX, Ordering::Relaxed);

        assert_eq!(transport.next_correlation_id(), i32::MAX);
        assert_eq!(transport.next_correlation_id(), i32::MIN);
    }

    #[test]
    fn test_consume_from_metadata() {
        let config = ConnectionConfig::plaintext("broker-1", "9092");
        let transport = BrokerTransport::new(ConnectionId(0), config, TransportOptions::default());

        let other = BrokerNodeInformation {
            node_id: 2,
            host: "broker-2".to_string(),
            port: 9092,
            rack: String::new(),
        };
        assert!(!transport.consume_from_metadata(&other));
        assert_eq!(transport.broker_id(), None);

        let same = BrokerNodeInformation {
            node_id: 1,
            host: "broker-1".to_string(),
            port: 9092,
            rack: String::new(),
        };
        assert!(transport.consume_from_metadata(&same));
        assert_eq!(transport.broker_id(), Some(1));
    }

    #[tokio::test]
    async fn test_send_when_not_connected() {
        let config = ConnectionConfig::plaintext("localhost", "9092");
        let transport = BrokerTransport::new(ConnectionId(5), config, TransportOptions::default());
        let request = encode(&MetadataRequest::new(vec![], false)).unwrap();

        let result = transport.send(request).await;
        assert!(matches!(
            result,
            Err(ClientError::NotConnected { connection: 5 })
        ));
    }

    #[tokio::test]
    async fn test_connect_unresolved_address() {
        let config = ConnectionConfig::plaintext("localhost", "9092");
        let transport = Arc::new(BrokerTransport::new(
            ConnectionId(0),
            config,
            TransportOptions::default(),
        ));
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = transport.connect(tx).await;
        assert!(matches!(result, Err(ClientError::Resolve { .. })));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = resolved(&format!("plaintext://127.0.0.1:{port}")).await;
        let transport = Arc::new(BrokerTransport::new(
            ConnectionId(0),
            config,
            TransportOptions::default(),
        ));
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = transport.connect(tx).await;
        match result {
            Err(ClientError::Connection(e)) => assert_eq!(
                ErrorKind::from_io_error(&e),
                ErrorKind::TcpConnectionRefused
            ),
            other => panic!("expected connection error, got {other:?}"),
        }
        assert!(matches!(transport.state(), TransportState::Error(_)));
        assert!(transport.is_terminated());
    }

    #[tokio::test]
    async fn test_send_backpatches_correlation_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = resolved(&format!("plaintext://127.0.0.1:{port}")).await;
        let transport = Arc::new(BrokerTransport::new(
            ConnectionId(0),
            config,
            TransportOptions::default(),
        ));
        let (tx, _rx) = mpsc::unbounded_channel();

        let (accepted, connected) = tokio::join!(listener.accept(), transport.connect(tx));
        let (mut server, _) = accepted.unwrap();
        connected.unwrap();
        assert!(transport.is_connected());

        transport.next_correlation_id();
        let request = encode(&MetadataRequest::new(vec!["test".to_string()], false)).unwrap();
        let expected_len = request.len();
        let pending = transport.send(request).await.unwrap();
        assert_eq!(pending.correlation_id(), 1);
        assert_eq!(transport.pending_count().await, 1);

        let mut received = vec![0u8; expected_len];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[CORRELATION_ID_OFFSET..CORRELATION_ID_OFFSET + 4], &[0, 0, 0, 1]);

        transport.close().await;
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(pending.recv().await.is_err());
    }
}
