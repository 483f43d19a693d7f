//! In-process message broker.
//!
//! One `Broker` value is constructed at startup and shared by reference
//! across the stages. Topics are lossy broadcast channels: a message
//! published while nobody is subscribed is gone, exactly like the pub/sub
//! channel this protocol is written against. The response store is the
//! only state genuinely shared across stages, and it is shared through
//! keyed writes and TTL expiry rather than locking protocols.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration, Instant};
use uuid::Uuid;

use ragline_core::{AppError, AppResult};

use crate::envelope::{QuestionEnvelope, ResponseRecord};

/// A blocking pull handle on one topic.
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<String>,
}

impl Subscription {
    /// Next payload in publish order, or `None` once the topic is closed.
    ///
    /// A subscriber that fell behind the channel capacity skips the
    /// overwritten messages and keeps going; the loss is logged, not fatal.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Subscriber lagged on '{}'; {} messages lost",
                        self.topic,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// A stored value with its expiry deadline.
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Pub/sub topics plus the keyed, TTL-bound record stores.
pub struct Broker {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
    responses: Mutex<HashMap<Uuid, Expiring<ResponseRecord>>>,
    requests: Mutex<HashMap<Uuid, Expiring<QuestionEnvelope>>>,
}

impl Broker {
    /// Create a broker whose topics retain `capacity` messages for slow
    /// subscribers.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<String> {
        let mut topics = self.topics.lock().unwrap();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to a topic. Must happen before upstream publishes;
    /// nothing is replayed.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        Subscription {
            topic: topic.to_string(),
            receiver: self.sender(topic).subscribe(),
        }
    }

    /// Broadcast a message to every current subscriber of `topic`.
    ///
    /// Returns how many subscribers received it. Zero subscribers means
    /// the message is lost; that is the contract, not an error.
    pub fn publish<T: Serialize>(&self, topic: &str, message: &T) -> AppResult<usize> {
        let payload = serde_json::to_string(message)?;

        match self.sender(topic).send(payload) {
            Ok(receivers) => {
                tracing::debug!("Published to '{}' ({} subscribers)", topic, receivers);
                Ok(receivers)
            }
            Err(_) => {
                tracing::debug!("Published to '{}' with no subscriber; message lost", topic);
                Ok(0)
            }
        }
    }

    /// Write the terminal record for a request id. Last write wins; the
    /// record expires after `ttl` whether or not anyone reads it.
    pub fn store_response(&self, record: ResponseRecord, ttl: Duration) {
        let mut responses = self.responses.lock().unwrap();
        responses.retain(|_, entry| entry.fresh());
        responses.insert(
            record.id,
            Expiring {
                value: record,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Read the record for `id` if present and not expired.
    pub fn get_response(&self, id: Uuid) -> Option<ResponseRecord> {
        let mut responses = self.responses.lock().unwrap();
        match responses.get(&id) {
            Some(entry) if entry.fresh() => Some(entry.value.clone()),
            Some(_) => {
                responses.remove(&id);
                None
            }
            None => None,
        }
    }

    /// Keep a bookkeeping copy of the original envelope, expiring on its
    /// own TTL. Nothing in the pipeline depends on it; it exists for
    /// operators inspecting in-flight requests.
    pub fn store_request(&self, envelope: &QuestionEnvelope, ttl: Duration) {
        let mut requests = self.requests.lock().unwrap();
        requests.retain(|_, entry| entry.fresh());
        requests.insert(
            envelope.id,
            Expiring {
                value: envelope.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Read the bookkeeping envelope for `id` if present and not expired.
    pub fn get_request(&self, id: Uuid) -> Option<QuestionEnvelope> {
        let mut requests = self.requests.lock().unwrap();
        match requests.get(&id) {
            Some(entry) if entry.fresh() => Some(entry.value.clone()),
            Some(_) => {
                requests.remove(&id);
                None
            }
            None => None,
        }
    }

    /// The originator's wait loop: sleep `interval`, check, repeat up to
    /// `max_attempts` times, returning the record the first time it
    /// appears.
    ///
    /// The timeout does not propagate anywhere; downstream stages may
    /// still complete a request nobody is waiting for.
    pub async fn poll_response(
        &self,
        id: Uuid,
        interval: Duration,
        max_attempts: u32,
    ) -> AppResult<ResponseRecord> {
        for attempt in 1..=max_attempts {
            sleep(interval).await;
            if let Some(record) = self.get_response(id) {
                tracing::debug!("Response for {} found on attempt {}", id, attempt);
                return Ok(record);
            }
        }

        Err(AppError::Timeout {
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::RequestStatus;

    fn record(id: Uuid, answer: &str) -> ResponseRecord {
        ResponseRecord::completed(id, "q", vec![], answer, 0.1)
    }

    #[tokio::test]
    async fn test_publish_then_subscribe_loses_message() {
        let broker = Broker::new(8);
        let delivered = broker.publish("questions", &"hello").unwrap();
        assert_eq!(delivered, 0);

        // Subscribing afterwards sees nothing; the channel holds no history
        let broker2 = Broker::new(8);
        broker2.publish("questions", &"lost").unwrap();
        let mut sub = broker2.subscribe("questions");
        broker2.publish("questions", &"seen").unwrap();
        assert_eq!(sub.next().await.unwrap(), "\"seen\"");
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_publish_order() {
        let broker = Broker::new(8);
        let mut sub = broker.subscribe("topic");

        broker.publish("topic", &1u32).unwrap();
        broker.publish("topic", &2u32).unwrap();
        broker.publish("topic", &3u32).unwrap();

        assert_eq!(sub.next().await.unwrap(), "1");
        assert_eq!(sub.next().await.unwrap(), "2");
        assert_eq!(sub.next().await.unwrap(), "3");
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_each_message() {
        let broker = Broker::new(8);
        let mut a = broker.subscribe("topic");
        let mut b = broker.subscribe("topic");

        let delivered = broker.publish("topic", &"x").unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(a.next().await.unwrap(), "\"x\"");
        assert_eq!(b.next().await.unwrap(), "\"x\"");
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_expires_after_ttl() {
        let broker = Broker::new(8);
        let id = Uuid::new_v4();

        broker.store_response(record(id, "answer"), Duration::from_secs(1));
        assert!(broker.get_response(id).is_some());

        sleep(Duration::from_secs(2)).await;
        assert!(broker.get_response(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_without_record() {
        let broker = Broker::new(8);

        let err = broker
            .poll_response(Uuid::new_v4(), Duration::from_secs(1), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout { attempts: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_record_when_it_appears() {
        let broker = std::sync::Arc::new(Broker::new(8));
        let id = Uuid::new_v4();

        let writer = broker.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1500)).await;
            writer.store_response(record(id, "late answer"), Duration::from_secs(60));
        });

        let found = broker
            .poll_response(id, Duration::from_secs(1), 5)
            .await
            .unwrap();
        assert_eq!(found.answer, "late answer");
        assert_eq!(found.status, RequestStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_ids_are_isolated() {
        let broker = Broker::new(8);
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();

        broker.store_response(record(id_a, "answer A"), Duration::from_secs(60));

        let found = broker
            .poll_response(id_a, Duration::from_millis(10), 3)
            .await
            .unwrap();
        assert_eq!(found.id, id_a);
        assert_eq!(found.answer, "answer A");

        let err = broker
            .poll_response(id_b, Duration::from_millis(10), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_response_last_write_wins() {
        let broker = Broker::new(8);
        let id = Uuid::new_v4();

        broker.store_response(record(id, "first"), Duration::from_secs(60));
        broker.store_response(record(id, "second"), Duration::from_secs(60));

        assert_eq!(broker.get_response(id).unwrap().answer, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_bookkeeping_expires_independently() {
        let broker = Broker::new(8);
        let envelope = QuestionEnvelope::new("q", 3);
        let id = envelope.id;

        broker.store_request(&envelope, Duration::from_secs(1));
        broker.store_response(record(id, "a"), Duration::from_secs(10));

        sleep(Duration::from_secs(2)).await;
        assert!(broker.get_request(id).is_none());
        assert!(broker.get_response(id).is_some());
    }
}
