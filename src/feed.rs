//! Change feed: in-process broadcast for SSE subscribers, mirrored to NATS
//! when a client is configured.

use tokio::sync::broadcast;

use crate::domain::events::DomainEvent;

const FEED_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<DomainEvent>,
    nats: Option<async_nats::Client>,
}

impl ChangeFeed {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx, nats }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> { self.tx.subscribe() }

    /// Delivery is best effort; a failed publish is logged, never returned.
    pub async fn publish(&self, event: DomainEvent) {
        if let Some(client) = &self.nats {
            match serde_json::to_vec(&event) {
                Ok(bytes) => {
                    if let Err(e) = client.publish(event.subject(), bytes.into()).await {
                        tracing::warn!(subject = %event.subject(), error = %e, "nats publish failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "could not encode change event"),
            }
        }
        // No receivers is the common case and not an error.
        let _ = self.tx.send(event);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self { Self::new(None) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::CartChange;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();
        feed.publish(DomainEvent::Cart { user_id: "u1".into(), change: CartChange::Cleared }).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_id(), Some("u1"));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        ChangeFeed::default().publish(DomainEvent::Cart { user_id: "u1".into(), change: CartChange::Cleared }).await;
    }
}
