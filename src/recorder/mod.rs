//! Recording lifecycle
//!
//! - Supervisor owning one transcoder process per active recording
//! - Notifier persisting and pushing lifecycle notifications
//! - Scheduler starting recordings whose scheduled time has passed

pub mod notifier;
pub mod scheduler;
pub mod supervisor;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use notifier::Notifier;
pub use scheduler::Scheduler;
pub use supervisor::Supervisor;
pub use types::{
    NewNotification, Notification, NotificationType, OutputFormat, Protocol, Recording,
    RecordingStatus, RecordingUpdate, StorageType, Stream,
};
