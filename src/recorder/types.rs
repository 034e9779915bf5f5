//! Recording domain types
//!
//! Persisted entities the supervisor reads and mutates, plus the status
//! state machine for a single recording.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a persisted recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordingStatus {
    /// Created, waiting for a manual start
    Pending,
    /// Waiting for `scheduled_at`
    Scheduled,
    /// A transcoder process is running for it
    Recording,
    Completed,
    Failed,
    Cancelled,
}

impl RecordingStatus {
    /// Whether no further transition can leave this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordingStatus::Completed | RecordingStatus::Failed | RecordingStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Pending => "PENDING",
            RecordingStatus::Scheduled => "SCHEDULED",
            RecordingStatus::Recording => "RECORDING",
            RecordingStatus::Completed => "COMPLETED",
            RecordingStatus::Failed => "FAILED",
            RecordingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output container for a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    Mp4,
    Mkv,
}

impl OutputFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mkv => "mkv",
        }
    }

    /// Get the FFmpeg muxer name for this format
    pub fn muxer(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mkv => "matroska",
        }
    }
}

/// Transport protocol of a registered stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Srt,
    Rtmp,
    Rtmps,
    Rtsp,
    Hls,
}

/// Where the finished file is meant to end up
///
/// Only `Local` is finalized here; remote uploads happen elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageType {
    Local,
    S3,
    GoogleDrive,
}

/// A registered source stream (read-only for the supervisor)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: String,

    /// Display name, also used to build output filenames
    pub name: String,

    pub url: String,

    pub protocol: Protocol,

    pub user_id: String,
}

/// A persisted recording row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub id: String,
    pub stream_id: String,
    pub user_id: String,
    pub status: RecordingStatus,
    pub format: OutputFormat,
    pub storage_type: StorageType,
    pub file_path: Option<String>,

    /// Output size in bytes, known once the process has exited
    pub file_size: Option<u64>,

    /// Whole seconds between start and end
    pub duration: Option<u64>,

    pub error: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Recording {
    /// Create a pending recording for a stream
    pub fn new(id: impl Into<String>, stream: &Stream, format: OutputFormat) -> Self {
        Self {
            id: id.into(),
            stream_id: stream.id.clone(),
            user_id: stream.user_id.clone(),
            status: RecordingStatus::Pending,
            format,
            storage_type: StorageType::Local,
            file_path: None,
            file_size: None,
            duration: None,
            error: None,
            scheduled_at: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Mark the recording as scheduled for a later start
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.status = RecordingStatus::Scheduled;
        self.scheduled_at = Some(at);
        self
    }
}

/// Partial update of a recording
///
/// `None` leaves a field untouched. Nullable columns take `Some(None)` to
/// clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingUpdate {
    pub status: Option<RecordingStatus>,
    pub file_path: Option<Option<String>>,
    pub file_size: Option<Option<u64>>,
    pub duration: Option<Option<u64>>,
    pub error: Option<Option<String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub ended_at: Option<Option<DateTime<Utc>>>,
}

impl RecordingUpdate {
    /// Transition into RECORDING
    pub fn started(file_path: String, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(RecordingStatus::Recording),
            file_path: Some(Some(file_path)),
            started_at: Some(Some(at)),
            ..Default::default()
        }
    }

    /// Transition into COMPLETED
    pub fn completed(at: DateTime<Utc>, file_size: Option<u64>, duration: u64) -> Self {
        Self {
            status: Some(RecordingStatus::Completed),
            ended_at: Some(Some(at)),
            file_size: Some(file_size),
            duration: Some(Some(duration)),
            ..Default::default()
        }
    }

    /// Transition into FAILED with a diagnostic message
    pub fn failed(at: Option<DateTime<Utc>>, error: String) -> Self {
        Self {
            status: Some(RecordingStatus::Failed),
            ended_at: at.map(Some),
            error: Some(Some(error)),
            ..Default::default()
        }
    }

    /// Apply the set fields onto a recording
    pub fn apply(self, recording: &mut Recording) {
        if let Some(status) = self.status {
            recording.status = status;
        }
        if let Some(file_path) = self.file_path {
            recording.file_path = file_path;
        }
        if let Some(file_size) = self.file_size {
            recording.file_size = file_size;
        }
        if let Some(duration) = self.duration {
            recording.duration = duration;
        }
        if let Some(error) = self.error {
            recording.error = error;
        }
        if let Some(started_at) = self.started_at {
            recording.started_at = started_at;
        }
        if let Some(ended_at) = self.ended_at {
            recording.ended_at = ended_at;
        }
    }
}

/// Kind of a user notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    StreamOnline,
    StreamOffline,
    RecordingStarted,
    RecordingCompleted,
    RecordingFailed,
    System,
}

/// Fields for a notification row about to be created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub stream_id: Option<String>,
    pub user_id: String,
}

/// A persisted notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub stream_id: Option<String>,
    pub user_id: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Stream {
        Stream {
            id: "s1".to_string(),
            name: "Camera 1".to_string(),
            url: "srt://h:9000".to_string(),
            protocol: Protocol::Srt,
            user_id: "u1".to_string(),
        }
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&RecordingStatus::Recording).unwrap();
        assert_eq!(json, "\"RECORDING\"");
        assert_eq!(RecordingStatus::Completed.to_string(), "COMPLETED");
        let parsed: StorageType = serde_json::from_str("\"GOOGLE_DRIVE\"").unwrap();
        assert_eq!(parsed, StorageType::GoogleDrive);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RecordingStatus::Recording.is_terminal());
        assert!(!RecordingStatus::Scheduled.is_terminal());
        assert!(RecordingStatus::Failed.is_terminal());
        assert!(RecordingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_update_leaves_unset_fields() {
        let mut recording = Recording::new("r1", &stream(), OutputFormat::Mkv);
        let started = Utc::now();
        RecordingUpdate::started("/rec/a.mkv".to_string(), started).apply(&mut recording);

        RecordingUpdate::completed(Utc::now(), None, 12).apply(&mut recording);

        assert_eq!(recording.status, RecordingStatus::Completed);
        assert_eq!(recording.file_path.as_deref(), Some("/rec/a.mkv"));
        assert_eq!(recording.started_at, Some(started));
        assert_eq!(recording.duration, Some(12));
        assert_eq!(recording.file_size, None);
    }

    #[test]
    fn test_failed_without_end_time_keeps_ended_at() {
        let mut recording = Recording::new("r1", &stream(), OutputFormat::Mp4);
        RecordingUpdate::failed(None, "boom".to_string()).apply(&mut recording);
        assert_eq!(recording.status, RecordingStatus::Failed);
        assert_eq!(recording.error.as_deref(), Some("boom"));
        assert!(recording.ended_at.is_none());
    }

    #[test]
    fn test_notification_type_field_name() {
        let n = NewNotification {
            kind: NotificationType::RecordingStarted,
            message: "x".to_string(),
            stream_id: Some("s1".to_string()),
            user_id: "u1".to_string(),
        };
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "RECORDING_STARTED");
        assert_eq!(value["streamId"], "s1");
    }
}
