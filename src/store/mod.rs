//! Data-access seam for recordings, streams and notifications

pub mod memory;

use crate::recorder::types::{NewNotification, Notification, Recording, RecordingUpdate, Stream};
use crate::utils::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;

/// Persistent storage consumed by the recorder
#[async_trait]
pub trait RecordingStore: Send + Sync {
    async fn find_recording(&self, id: &str) -> Result<Option<Recording>, StoreError>;

    async fn find_stream(&self, id: &str) -> Result<Option<Stream>, StoreError>;

    /// Apply a partial update; unset fields keep their stored value
    async fn update_recording(
        &self,
        id: &str,
        update: RecordingUpdate,
    ) -> Result<Recording, StoreError>;

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError>;

    /// Scheduled recordings whose start time is at or before `now`
    async fn find_due_recordings(&self, now: DateTime<Utc>) -> Result<Vec<Recording>, StoreError>;
}
