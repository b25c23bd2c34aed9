//! In-flight requests of one transport.
//!
//! Entries are appended in wire order. In [`CorrelationMode::Fifo`] only the
//! head may be answered; in [`CorrelationMode::Keyed`] any entry can be.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::config::CorrelationMode;
use crate::protocol::Buffer;

/// A request waiting for its response.
#[derive(Debug)]
struct PendingRequest {
    correlation_id: i32,
    responder: oneshot::Sender<Buffer>,
}

/// Queue of requests awaiting a response.
#[derive(Debug)]
pub struct PendingRequests {
    mode: CorrelationMode,
    queue: VecDeque<PendingRequest>,
}

impl PendingRequests {
    #[must_use]
    pub fn new(mode: CorrelationMode) -> Self {
        Self {
            mode,
            queue: VecDeque::new(),
        }
    }

    /// Track a request that was just written. The receiver resolves with the
    /// response, or errors if the entry is dropped.
    pub fn push(&mut self, correlation_id: i32) -> oneshot::Receiver<Buffer> {
        let (responder, rx) = oneshot::channel();
        self.queue.push_back(PendingRequest {
            correlation_id,
            responder,
        });
        rx
    }

    /// Remove and return the responder a response with `correlation_id`
    /// belongs to, if any.
    pub fn take(&mut self, correlation_id: i32) -> Option<oneshot::Sender<Buffer>> {
        let index = match self.mode {
            CorrelationMode::Fifo => self
                .queue
                .front()
                .filter(|head| head.correlation_id == correlation_id)
                .map(|_| 0),
            CorrelationMode::Keyed => self
                .queue
                .iter()
                .position(|entry| entry.correlation_id == correlation_id),
        }?;

        self.queue.remove(index).map(|entry| entry.responder)
    }

    /// Correlation id of the oldest in-flight request.
    #[must_use]
    pub fn head(&self) -> Option<i32> {
        self.queue.front().map(|entry| entry.correlation_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every entry. Waiters see their channel close.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(correlation_id: i32) -> Buffer {
        let mut buffer = Buffer::with_capacity(8);
        buffer.write::<i32>(4).unwrap();
        buffer.write::<i32>(correlation_id).unwrap();
        buffer
    }

    #[tokio::test]
    async fn test_fifo_routes_head() {
        let mut pending = PendingRequests::new(CorrelationMode::Fifo);
        let rx_a = pending.push(1);
        let rx_b = pending.push(2);

        pending.take(1).unwrap().send(response(1)).unwrap();
        assert_eq!(pending.head(), Some(2));

        let mut received = rx_a.await.unwrap();
        received.read::<i32>().unwrap();
        assert_eq!(received.read::<i32>().unwrap(), 1);

        pending.take(2).unwrap().send(response(2)).unwrap();
        assert!(rx_b.await.is_ok());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_fifo_rejects_non_head() {
        let mut pending = PendingRequests::new(CorrelationMode::Fifo);
        let _rx_a = pending.push(1);
        let _rx_b = pending.push(2);

        assert!(pending.take(2).is_none());
        assert!(pending.take(99).is_none());
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.head(), Some(1));
    }

    #[test]
    fn test_keyed_routes_any_entry() {
        let mut pending = PendingRequests::new(CorrelationMode::Keyed);
        let _rx_a = pending.push(1);
        let _rx_b = pending.push(2);

        assert!(pending.take(2).is_some());
        assert!(pending.take(2).is_none());
        assert_eq!(pending.head(), Some(1));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_closes_waiters() {
        let mut pending = PendingRequests::new(CorrelationMode::Fifo);
        let rx = pending.push(7);

        pending.clear();
        assert!(rx.await.is_err());
        assert!(pending.head().is_none());
    }
}
