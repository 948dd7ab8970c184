//! Redis pub/sub-backed event channel.
//!
//! Redis pub/sub is not durable: a message published while no subscriber is
//! connected is dropped. Such a publish is reported as a failure so the
//! discovery feed keeps the order on its retry list.

use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use redis::Commands;
use tokio::sync::{mpsc, oneshot};

use crate::{ChannelError, EventChannel, Message, Result, Subscription};

/// How often a subscriber thread wakes up to check whether it was dropped.
const SUBSCRIBER_POLL: Duration = Duration::from_millis(500);

/// Event channel over Redis PUBLISH/SUBSCRIBE.
#[derive(Debug, Clone)]
pub struct RedisEventChannel {
    client: redis::Client,
}

impl RedisEventChannel {
    /// Opens a client for `redis_url`. No connection is made until first use.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(|e| {
            ChannelError::Subscribe {
                subject: String::new(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventChannel for RedisEventChannel {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let client = self.client.clone();
        let channel = subject.to_string();

        let result = tokio::task::spawn_blocking(move || -> redis::RedisResult<i64> {
            let mut conn = client.get_connection()?;
            conn.publish(channel, payload)
        })
        .await
        .map_err(|e| ChannelError::Publish {
            subject: subject.to_string(),
            reason: e.to_string(),
        })?;

        let receivers = result.map_err(|e| ChannelError::Publish {
            subject: subject.to_string(),
            reason: e.to_string(),
        })?;
        // Nobody heard it, and Redis keeps nothing for later subscribers.
        if receivers == 0 {
            return Err(ChannelError::Publish {
                subject: subject.to_string(),
                reason: "no subscribers".to_string(),
            });
        }

        tracing::trace!(subject, receivers, "Published to redis");
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<(), String>>();

        let client = self.client.clone();
        let channel = subject.to_string();

        // Background thread that receives pub/sub messages and forwards them.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(e) = pubsub
                .subscribe(&channel)
                .and_then(|_| pubsub.set_read_timeout(Some(SUBSCRIBER_POLL)))
            {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(e) if e.is_timeout() => {
                        if tx.is_closed() {
                            return;
                        }
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(subject = %channel, error = %e, "Redis subscription ended");
                        return;
                    }
                };

                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                if tx.send(Message::new(channel.clone(), payload)).is_err() {
                    return;
                }
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Subscription::new(subject, rx)),
            Ok(Err(reason)) => Err(ChannelError::Subscribe {
                subject: subject.to_string(),
                reason,
            }),
            Err(_) => Err(ChannelError::Closed),
        }
    }
}
