//! Ordered event output for one request.

use tokio::sync::mpsc;
use tracing::trace;

use voyage_core::events::StreamEvent;

use crate::error::ChatError;

/// Sending half of a request's event channel.
///
/// Events are delivered in the order they are emitted. Once the receiver is
/// gone every emit fails with [`ChatError::Cancelled`], which unwinds the
/// request.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub async fn emit(&self, event: StreamEvent) -> Result<(), ChatError> {
        trace!(kind = %event.kind(), "emit");
        self.tx.send(event).await.map_err(|_| ChatError::Cancelled)
    }

    pub async fn text(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.emit(StreamEvent::TextDelta(text.into())).await
    }

    /// Resolves once the receiver has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel(8);
        sink.emit(StreamEvent::Start).await.unwrap();
        sink.text("hello").await.unwrap();
        sink.emit(StreamEvent::End).await.unwrap();
        drop(sink);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                StreamEvent::Start,
                StreamEvent::TextDelta("hello".to_string()),
                StreamEvent::End
            ]
        );
    }

    #[tokio::test]
    async fn test_closed_receiver_cancels() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        sink.closed().await;
        assert!(matches!(
            sink.text("lost").await,
            Err(ChatError::Cancelled)
        ));
    }
}
