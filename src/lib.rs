//! Multiview recorder
//!
//! Recording lifecycle orchestration for multi-stream video monitoring:
//! one FFmpeg process per recording, progress pushed to the owning user,
//! exit outcomes reconciled with the persisted recording.

pub mod config;
pub mod events;
pub mod recorder;
pub mod store;
pub mod transcoder;
pub mod utils;

pub use config::RecorderConfig;
pub use events::{BroadcastPublisher, Publisher, RealtimeEvent, UserEvent};
pub use recorder::{Notifier, Scheduler, Supervisor};
pub use store::{MemoryStore, RecordingStore};
pub use transcoder::{FfmpegHost, ProcessHost, TranscoderProcess};
pub use utils::{ErrorResponse, RecorderError, RecorderResult, StoreError};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the built-in filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multiview_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting multiview recorder v{}", env!("CARGO_PKG_VERSION"));
}
