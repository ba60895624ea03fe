use crate::{ChatEvent, Error};
use std::future::Future;
use tokio::sync::mpsc;

/// The message broker the engine publishes through.
///
/// Connection management and retry belong to the implementor; the engine
/// assumes a connected channel.
pub trait Transport {
    fn publish(
        &self,
        destination: &str,
        event: &ChatEvent,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

/// An event handed to a [`ChannelTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub destination: String,
    pub event: ChatEvent,
}

/// In-process transport that forwards every publish into an mpsc channel.
///
/// The receiving half is typically bridged to a real broker, or drained
/// directly by a peer pipeline in tests.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Transport for ChannelTransport {
    async fn publish(&self, destination: &str, event: &ChatEvent) -> Result<(), Error> {
        self.sender
            .send(Outbound {
                destination: destination.to_string(),
                event: event.clone(),
            })
            .map_err(|_| Error::Transport("outbound channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_forwards_event() {
        let (transport, mut outbound) = ChannelTransport::new();
        let event = ChatEvent::join("alice");

        transport.publish("/app/chat.addUser", &event).await.unwrap();

        let published = outbound.recv().await.unwrap();
        assert_eq!(published.destination, "/app/chat.addUser");
        assert_eq!(published.event, event);
    }

    #[tokio::test]
    async fn test_closed_channel_is_transport_error() {
        let (transport, outbound) = ChannelTransport::new();
        drop(outbound);

        assert!(matches!(
            transport.publish("/anywhere", &ChatEvent::join("alice")).await,
            Err(Error::Transport(_))
        ));
    }
}
