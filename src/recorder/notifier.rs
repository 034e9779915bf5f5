//! Notification fan-out
//!
//! Turns lifecycle transitions into a persisted notification plus a
//! `notification:new` push.

use crate::events::{Publisher, RealtimeEvent};
use crate::recorder::types::{NewNotification, NotificationType, Stream};
use crate::store::RecordingStore;
use std::sync::Arc;

pub struct Notifier {
    store: Arc<dyn RecordingStore>,
    publisher: Arc<dyn Publisher>,
}

impl Notifier {
    pub fn new(store: Arc<dyn RecordingStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    /// Persist and push a notification about `stream`
    ///
    /// Store failures are logged; they never fail the caller.
    pub async fn notify(&self, kind: NotificationType, stream: &Stream, user_id: &str) {
        let notification = NewNotification {
            kind,
            message: message_for(kind, &stream.name),
            stream_id: Some(stream.id.clone()),
            user_id: user_id.to_string(),
        };

        if let Err(e) = self.store.create_notification(notification).await {
            tracing::error!("Failed to store {:?} notification for {}: {}", kind, stream.id, e);
        }

        self.publisher.publish_to_user(
            user_id,
            RealtimeEvent::NotificationNew {
                kind,
                stream_id: stream.id.clone(),
            },
        );
    }
}

fn message_for(kind: NotificationType, stream_name: &str) -> String {
    match kind {
        NotificationType::RecordingStarted => format!("Recording started: {}", stream_name),
        NotificationType::RecordingCompleted => format!("Recording completed: {}", stream_name),
        NotificationType::RecordingFailed => format!("Recording failed: {}", stream_name),
        NotificationType::StreamOnline => format!("Stream is online: {}", stream_name),
        NotificationType::StreamOffline => format!("Stream went offline: {}", stream_name),
        NotificationType::System => stream_name.to_string(),
    }
}
