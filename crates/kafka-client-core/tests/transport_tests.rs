//! Integration tests for broker transports.
//!
//! Drives a single transport against the mock broker to check how responses
//! are matched to in-flight requests.

use std::sync::Arc;
use std::time::Duration;

use kafka_client_core::broker::{
    BrokerTransport, ConnectionId, TransportEvent, TransportOptions, TransportState,
};
use kafka_client_core::protocol::{decode, encode, MetadataRequest, MetadataResponse};
use kafka_client_core::testing::{responses, ClientTestHarness};
use kafka_client_core::{ClientError, ConnectionConfig, CorrelationMode, DnsResolver};
use tokio::sync::mpsc;

async fn connected_transport(
    harness: &ClientTestHarness,
    correlation: CorrelationMode,
) -> (Arc<BrokerTransport>, mpsc::UnboundedReceiver<TransportEvent>) {
    let mut config =
        ConnectionConfig::parse_from_url(&format!("plaintext://{}", harness.broker_address()))
            .unwrap();
    config.address.resolve(&DnsResolver).await;

    let options = TransportOptions {
        correlation,
        ..Default::default()
    };
    let transport = Arc::new(BrokerTransport::new(ConnectionId(0), config, options));
    let (tx, rx) = mpsc::unbounded_channel();
    transport.connect(tx).await.unwrap();
    (transport, rx)
}

fn metadata_request() -> kafka_client_core::protocol::Buffer {
    encode(&MetadataRequest::new(vec!["test".to_string()], false)).unwrap()
}

async fn wait_for_calls(harness: &ClientTestHarness, count: usize) {
    for _ in 0..100 {
        if harness.metadata_calls().await.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("mock broker did not receive {count} calls");
}

#[tokio::test]
async fn test_responses_route_to_their_requests() {
    let mut harness = ClientTestHarness::new().await;
    harness
        .on_metadata(responses::metadata_response(1, "127.0.0.1", 9092, "test", 1))
        .await;
    let (transport, _events) = connected_transport(&harness, CorrelationMode::Fifo).await;

    let first = transport.send(metadata_request()).await.unwrap();
    let second = transport.send(metadata_request()).await.unwrap();
    assert_eq!(first.correlation_id(), 0);
    assert_eq!(second.correlation_id(), 1);

    let mut first_response = first.recv().await.unwrap();
    let mut second_response = second.recv().await.unwrap();

    let first_response: MetadataResponse = decode(&mut first_response).unwrap();
    let second_response: MetadataResponse = decode(&mut second_response).unwrap();
    assert_eq!(first_response.header.correlation_id, 0);
    assert_eq!(second_response.header.correlation_id, 1);
    assert_eq!(transport.pending_count().await, 0);

    let calls = harness.metadata_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].correlation_id, 0);
    assert_eq!(calls[1].correlation_id, 1);

    transport.close().await;
    harness.shutdown().await;
}

#[tokio::test]
async fn test_fifo_drops_response_that_is_not_for_head() {
    let mut harness = ClientTestHarness::new().await;
    harness
        .on_metadata(responses::sequence(vec![
            responses::no_reply(),
            responses::metadata_response(1, "127.0.0.1", 9092, "test", 1),
        ]))
        .await;
    let (transport, _events) = connected_transport(&harness, CorrelationMode::Fifo).await;

    let first = transport.send(metadata_request()).await.unwrap();
    let second = transport.send(metadata_request()).await.unwrap();
    wait_for_calls(&harness, 2).await;

    // The reply to the second request arrives while the first is at the head.
    let second_result = tokio::time::timeout(Duration::from_millis(200), second.recv()).await;
    assert!(second_result.is_err(), "response must not be misrouted");
    assert_eq!(transport.pending_count().await, 2);
    assert!(transport.is_connected());

    transport.close().await;
    assert!(matches!(
        first.recv().await,
        Err(ClientError::ResponseDropped {
            correlation_id: 0,
            ..
        })
    ));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_keyed_delivers_out_of_order_response() {
    let mut harness = ClientTestHarness::new().await;
    harness
        .on_metadata(responses::sequence(vec![
            responses::no_reply(),
            responses::metadata_response(1, "127.0.0.1", 9092, "test", 1),
        ]))
        .await;
    let (transport, _events) = connected_transport(&harness, CorrelationMode::Keyed).await;

    let _first = transport.send(metadata_request()).await.unwrap();
    let second = transport.send(metadata_request()).await.unwrap();

    let mut response = tokio::time::timeout(Duration::from_secs(5), second.recv())
        .await
        .unwrap()
        .unwrap();
    let response: MetadataResponse = decode(&mut response).unwrap();
    assert_eq!(response.header.correlation_id, 1);
    assert_eq!(transport.pending_count().await, 1);

    transport.close().await;
    harness.shutdown().await;
}

#[tokio::test]
async fn test_unknown_correlation_id_is_dropped() {
    let mut harness = ClientTestHarness::new().await;
    let template = responses::cluster(vec![], vec![]);
    harness
        .on_metadata(responses::metadata_with_correlation_offset(template, 100))
        .await;
    let (transport, _events) = connected_transport(&harness, CorrelationMode::Keyed).await;

    let pending = transport.send(metadata_request()).await.unwrap();
    wait_for_calls(&harness, 1).await;

    let result = tokio::time::timeout(Duration::from_millis(200), pending.recv()).await;
    assert!(result.is_err());
    assert_eq!(transport.pending_count().await, 1);

    transport.close().await;
    harness.shutdown().await;
}

#[tokio::test]
async fn test_broker_close_drops_pending_requests() {
    let mut harness = ClientTestHarness::new().await;
    harness.on_metadata(responses::no_reply()).await;
    let (transport, mut events) = connected_transport(&harness, CorrelationMode::Fifo).await;

    let pending = transport.send(metadata_request()).await.unwrap();
    wait_for_calls(&harness, 1).await;

    harness.shutdown().await;

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        TransportEvent::Closed {
            connection: ConnectionId(0)
        }
    );
    assert_eq!(transport.state(), TransportState::Closed);
    assert!(matches!(
        pending.recv().await,
        Err(ClientError::ResponseDropped { .. })
    ));
    assert!(matches!(
        transport.send(metadata_request()).await,
        Err(ClientError::NotConnected { .. })
    ));
}
