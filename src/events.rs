//! Real-time events pushed to connected clients

use crate::recorder::types::{NotificationType, RecordingStatus};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Events the recorder pushes to a user's sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    /// Recording status changed
    StatusUpdate {
        recording_id: String,
        status: RecordingStatus,
    },
    /// Elapsed recording time in whole seconds
    Progress { recording_id: String, duration: u64 },
    /// A notification row was created
    NotificationNew {
        kind: NotificationType,
        stream_id: String,
    },
}

impl RealtimeEvent {
    /// Event name on the push channel
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::StatusUpdate { .. } => "recording:statusUpdate",
            RealtimeEvent::Progress { .. } => "recording:progress",
            RealtimeEvent::NotificationNew { .. } => "notification:new",
        }
    }

    /// JSON payload as the client expects it
    pub fn payload(&self) -> Value {
        match self {
            RealtimeEvent::StatusUpdate {
                recording_id,
                status,
            } => json!({ "recordingId": recording_id, "status": status }),
            RealtimeEvent::Progress {
                recording_id,
                duration,
            } => json!({ "recordingId": recording_id, "duration": duration }),
            RealtimeEvent::NotificationNew { kind, stream_id } => {
                json!({ "type": kind, "streamId": stream_id })
            }
        }
    }
}

/// An event addressed to one user
#[derive(Debug, Clone, Serialize)]
pub struct UserEvent {
    pub user_id: String,
    pub event: &'static str,
    pub payload: Value,
    #[serde(skip)]
    pub raw: RealtimeEvent,
}

/// Pushes events to a user's connected sessions
///
/// Best effort: delivery is never confirmed and failures are not reported.
pub trait Publisher: Send + Sync {
    fn publish_to_user(&self, user_id: &str, event: RealtimeEvent);
}

/// Publisher backed by a broadcast channel
///
/// The socket layer subscribes and forwards each event to the sessions of
/// `user_id`.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<UserEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to every published event
    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Publisher for BroadcastPublisher {
    fn publish_to_user(&self, user_id: &str, event: RealtimeEvent) {
        tracing::trace!("Publishing {} to user {}", event.name(), user_id);
        // No subscriber means nobody is connected
        let _ = self.tx.send(UserEvent {
            user_id: user_id.to_string(),
            event: event.name(),
            payload: event.payload(),
            raw: event,
        });
    }
}
