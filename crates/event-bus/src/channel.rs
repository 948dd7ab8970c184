use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::mpsc;

use crate::{Message, Result};

/// A live subscription to one subject.
///
/// Yields messages as a [`Stream`]; ends when the channel drops its sender.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl Subscription {
    pub fn new(subject: impl Into<String>, receiver: mpsc::UnboundedReceiver<Message>) -> Self {
        Self {
            subject: subject.into(),
            receiver,
        }
    }

    /// The subject this subscription listens on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Waits for the next message. Returns None once the channel is closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Publish/subscribe transport with named subjects.
///
/// Implementations deliver at-least-once with no ordering guarantee between
/// publishers. `publish` returning Ok means the transport accepted the
/// message, not that any subscriber processed it.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Publishes a payload on a subject.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;

    /// Subscribes to a subject.
    async fn subscribe(&self, subject: &str) -> Result<Subscription>;
}

#[async_trait]
impl<T: EventChannel + ?Sized> EventChannel for Arc<T> {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        (**self).publish(subject, payload).await
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        (**self).subscribe(subject).await
    }
}
