//! In-process store
//!
//! Backs the command line recorder and the tests.

use super::RecordingStore;
use crate::recorder::types::{
    NewNotification, Notification, Recording, RecordingStatus, RecordingUpdate, Stream,
};
use crate::utils::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryStore {
    streams: RwLock<HashMap<String, Stream>>,
    recordings: RwLock<HashMap<String, Recording>>,
    notifications: RwLock<Vec<Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_stream(&self, stream: Stream) {
        self.streams.write().insert(stream.id.clone(), stream);
    }

    pub fn insert_recording(&self, recording: Recording) {
        self.recordings
            .write()
            .insert(recording.id.clone(), recording);
    }

    /// Snapshot of a recording
    pub fn recording(&self, id: &str) -> Option<Recording> {
        self.recordings.read().get(id).cloned()
    }

    /// Every notification created so far, oldest first
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().clone()
    }
}

#[async_trait]
impl RecordingStore for MemoryStore {
    async fn find_recording(&self, id: &str) -> Result<Option<Recording>, StoreError> {
        Ok(self.recording(id))
    }

    async fn find_stream(&self, id: &str) -> Result<Option<Stream>, StoreError> {
        Ok(self.streams.read().get(id).cloned())
    }

    async fn update_recording(
        &self,
        id: &str,
        update: RecordingUpdate,
    ) -> Result<Recording, StoreError> {
        let mut recordings = self.recordings.write();
        let recording = recordings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        update.apply(recording);
        Ok(recording.clone())
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        let created = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            kind: notification.kind,
            message: notification.message,
            stream_id: notification.stream_id,
            user_id: notification.user_id,
            is_read: false,
            created_at: Utc::now(),
        };
        self.notifications.write().push(created.clone());
        Ok(created)
    }

    async fn find_due_recordings(&self, now: DateTime<Utc>) -> Result<Vec<Recording>, StoreError> {
        let mut due: Vec<Recording> = self
            .recordings
            .read()
            .values()
            .filter(|r| r.status == RecordingStatus::Scheduled)
            .filter(|r| r.scheduled_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|r| r.scheduled_at);
        Ok(due)
    }
}
