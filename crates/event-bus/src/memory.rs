//! In-memory event channel for tests and single-process runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::{ChannelError, EventChannel, Message, Result, Subscription};

#[derive(Debug, Default)]
struct InMemoryChannelState {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Message>>>,
    published: Vec<Message>,
    fail_on_publish: bool,
    fail_next: usize,
    publish_delay: Option<Duration>,
}

/// In-memory pub/sub channel.
///
/// - Fan-out: every subscriber of a subject gets its own copy
/// - Messages published with no subscriber are recorded but not delivered
/// - Dead subscribers are dropped while publishing
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventChannel {
    state: Arc<Mutex<InMemoryChannelState>>,
}

impl InMemoryEventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every message accepted on `subject`, in publish order.
    pub async fn published(&self, subject: &str) -> Vec<Message> {
        self.state
            .lock()
            .await
            .published
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Returns the number of messages accepted across all subjects.
    pub async fn publish_count(&self) -> usize {
        self.state.lock().await.published.len()
    }

    /// Makes every publish fail until switched off.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.lock().await.fail_on_publish = fail;
    }

    /// Makes the next `n` publishes fail.
    pub async fn fail_next_publishes(&self, n: usize) {
        self.state.lock().await.fail_next = n;
    }

    /// Delays every publish before it is accepted.
    pub async fn set_publish_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.publish_delay = delay;
    }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let delay = self.state.lock().await.publish_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;

        if state.fail_on_publish || state.fail_next > 0 {
            state.fail_next = state.fail_next.saturating_sub(1);
            return Err(ChannelError::Publish {
                subject: subject.to_string(),
                reason: "publish disabled".to_string(),
            });
        }

        let message = Message::new(subject, payload);
        let mut delivered = 0;
        if let Some(subs) = state.subscribers.get_mut(subject) {
            subs.retain(|tx| tx.send(message.clone()).is_ok());
            delivered = subs.len();
        }
        tracing::trace!(subject, delivered, "message published");
        state.published.push(message);
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .await
            .subscribers
            .entry(subject.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(subject, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let channel = InMemoryEventChannel::new();
        let mut a = channel.subscribe("order.created").await.unwrap();
        let mut b = channel.subscribe("order.created").await.unwrap();

        channel
            .publish("order.created", b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(a.next().await.unwrap().payload, b"hello");
        assert_eq!(b.recv().await.unwrap().payload, b"hello");
    }

    #[tokio::test]
    async fn test_subjects_are_isolated() {
        let channel = InMemoryEventChannel::new();
        let mut other = channel.subscribe("order.cancelled").await.unwrap();

        channel
            .publish("order.created", b"x".to_vec())
            .await
            .unwrap();

        channel
            .publish("order.cancelled", b"y".to_vec())
            .await
            .unwrap();

        assert_eq!(other.recv().await.unwrap().payload, b"y");
        assert_eq!(channel.published("order.created").await.len(), 1);
        assert!(channel.published("order.cancelled").await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_next_publishes() {
        let channel = InMemoryEventChannel::new();
        channel.fail_next_publishes(1).await;

        assert!(channel.publish("s", b"1".to_vec()).await.is_err());
        assert!(channel.publish("s", b"2".to_vec()).await.is_ok());
        assert_eq!(channel.publish_count().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let channel = InMemoryEventChannel::new();
        let sub = channel.subscribe("s").await.unwrap();
        drop(sub);

        channel.publish("s", b"1".to_vec()).await.unwrap();
        let state = channel.state.lock().await;
        assert!(state.subscribers.get("s").unwrap().is_empty());
    }
}
