//! Outbound lifecycle notifications.
//!
//! The engine publishes strictly after a successful commit and never waits
//! for, or acts on, delivery. A failed publish is logged and dropped.
//!
//! Publishers:
//!
//! - [`EventBus`] - in-process broadcast for relays to the message broker
//! - [`NoopPublisher`] - discards everything; used by reconciliation
//! - [`RecordingPublisher`] - keeps every event in memory for assertions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Topic for successful tag resolutions.
pub const TOPIC_RESOLVED: &str = "nfc.resolved";

/// Topic for tag assignments.
pub const TOPIC_ASSIGNED: &str = "nfc.assigned";

/// Errors from a publisher.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The payload could not be serialized.
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The publisher has shut down.
    #[error("publisher closed")]
    Closed,

    /// The transport rejected the event.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Sink for outbound lifecycle events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `payload` under `topic`. Best-effort.
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError>;
}

/// Payload of `nfc.resolved` and `nfc.assigned`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEvent {
    /// The topic, repeated in the body for consumers that ignore routing keys.
    pub event: String,
    /// Unique per publish; lets consumers drop redeliveries.
    pub event_id: Uuid,
    /// The tag.
    pub tag_id: String,
    /// The patient the tag resolved to or was bound to.
    pub patient_id: String,
    /// The tenant.
    pub organization_id: String,
    /// Who assigned the tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
    /// Who scanned the tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caregiver_id: Option<String>,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
}

impl TagEvent {
    /// Builds an `nfc.resolved` event.
    pub fn resolved(
        tag_id: impl Into<String>,
        patient_id: impl Into<String>,
        organization_id: impl Into<String>,
        caregiver_id: Option<String>,
    ) -> Self {
        Self {
            event: TOPIC_RESOLVED.to_string(),
            event_id: Uuid::new_v4(),
            tag_id: tag_id.into(),
            patient_id: patient_id.into(),
            organization_id: organization_id.into(),
            assigned_by: None,
            caregiver_id,
            timestamp: Utc::now(),
        }
    }

    /// Builds an `nfc.assigned` event.
    pub fn assigned(
        tag_id: impl Into<String>,
        patient_id: impl Into<String>,
        organization_id: impl Into<String>,
        assigned_by: impl Into<String>,
    ) -> Self {
        Self {
            event: TOPIC_ASSIGNED.to_string(),
            event_id: Uuid::new_v4(),
            tag_id: tag_id.into(),
            patient_id: patient_id.into(),
            organization_id: organization_id.into(),
            assigned_by: Some(assigned_by.into()),
            caregiver_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Returns the topic to publish under.
    pub fn topic(&self) -> &str {
        &self.event
    }
}

/// A published event as seen by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    /// Routing topic.
    pub topic: String,
    /// JSON body.
    pub payload: Value,
}

/// In-process broadcast bus.
///
/// Publishing with no subscribers succeeds; the event is simply dropped.
/// Slow subscribers that fall more than `capacity` events behind lose the
/// oldest ones.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError> {
        let event = PublishedEvent {
            topic: topic.to_string(),
            payload,
        };
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::trace!(topic, receivers, "Published event");
            }
            Err(_) => {
                tracing::debug!(topic, "No subscribers for event");
            }
        }
        Ok(())
    }
}

/// Publisher that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _topic: &str, _payload: Value) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Publisher that records every event in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl RecordingPublisher {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event, oldest first.
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().clone()
    }

    /// Returns the recorded topics, oldest first.
    pub fn topics(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.topic.clone()).collect()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError> {
        self.events.lock().push(PublishedEvent {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}
