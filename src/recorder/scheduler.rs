//! Scheduled recordings
//!
//! Polls the store for SCHEDULED recordings whose start time has passed and
//! hands them to the supervisor.

use super::supervisor::Supervisor;
use crate::store::RecordingStore;
use crate::utils::{RecorderError, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

pub struct Scheduler {
    supervisor: Supervisor,
    store: Arc<dyn RecordingStore>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(supervisor: Supervisor, store: Arc<dyn RecordingStore>, interval: Duration) -> Self {
        Self {
            supervisor,
            store,
            interval,
        }
    }

    /// Start every recording due at `now`
    ///
    /// Returns how many now have a running process.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let due = self.store.find_due_recordings(now).await?;
        if due.is_empty() {
            return Ok(0);
        }

        tracing::debug!("{} scheduled recording(s) due", due.len());

        let mut started = 0;
        for recording in due {
            match self.supervisor.launch(&recording.id).await {
                Ok(true) => started += 1,
                // FAILED is already recorded and announced
                Ok(false) => {}
                Err(RecorderError::AlreadyRunning(id)) => {
                    tracing::debug!("Scheduled recording {} is already running", id);
                }
                Err(e) => {
                    tracing::error!("Failed to start scheduled recording {}: {}", recording.id, e);
                    self.supervisor
                        .fail_unstarted(&recording, format!("Failed to start: {}", e))
                        .await;
                }
            }
        }

        Ok(started)
    }

    /// Poll until `shutdown` turns true or its sender goes away
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("Scheduler polling every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        tracing::error!("Scheduler tick failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::events::UserEvent;
    use crate::recorder::testing::{events_until_status, publisher, CountingStore, FakeHost};
    use crate::recorder::types::{
        NotificationType, OutputFormat, Protocol, Recording, RecordingStatus, Stream,
    };
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    struct Fixture {
        scheduler: Scheduler,
        supervisor: Supervisor,
        store: Arc<CountingStore>,
        host: Arc<FakeHost>,
        events: broadcast::Receiver<UserEvent>,
        _dir: TempDir,
    }

    fn setup() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        setup_in(dir.path().to_path_buf(), dir)
    }

    fn setup_in(recordings_path: PathBuf, dir: TempDir) -> Fixture {
        let config = RecorderConfig {
            recordings_path,
            ..Default::default()
        };
        let store = CountingStore::new();
        let host = FakeHost::new();
        let publisher = publisher();
        let events = publisher.subscribe();
        let supervisor = Supervisor::new(config, store.clone(), publisher, host.clone());
        let scheduler = Scheduler::new(supervisor.clone(), store.clone(), Duration::from_secs(60));

        store.inner.insert_stream(gate("s1"));

        Fixture {
            scheduler,
            supervisor,
            store,
            host,
            events,
            _dir: dir,
        }
    }

    fn gate(stream_id: &str) -> Stream {
        Stream {
            id: stream_id.to_string(),
            name: "Gate".to_string(),
            url: "rtmp://h/live".to_string(),
            protocol: Protocol::Rtmp,
            user_id: "u1".to_string(),
        }
    }

    fn scheduled(store: &CountingStore, id: &str, stream_id: &str, at: DateTime<Utc>) {
        store.inner.insert_recording(
            Recording::new(id, &gate(stream_id), OutputFormat::Mp4).scheduled_for(at),
        );
    }

    fn failed_notifications(store: &CountingStore) -> usize {
        store
            .inner
            .notifications()
            .iter()
            .filter(|n| n.kind == NotificationType::RecordingFailed)
            .count()
    }

    #[tokio::test]
    async fn test_tick_starts_due_recordings() {
        let f = setup();
        let now = Utc::now();
        scheduled(&f.store, "due", "s1", now - chrono::Duration::minutes(1));
        scheduled(&f.store, "later", "s1", now + chrono::Duration::minutes(1));

        assert_eq!(f.scheduler.tick(now).await.unwrap(), 1);
        assert_eq!(f.supervisor.list_active(), vec!["due".to_string()]);
        assert_eq!(f.host.spawn_count(), 1);
        assert_eq!(
            f.store.inner.recording("later").unwrap().status,
            RecordingStatus::Scheduled
        );

        // Started recordings are no longer SCHEDULED
        assert_eq!(f.scheduler.tick(now).await.unwrap(), 0);
        assert_eq!(f.host.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_tick_fails_recording_without_stream() {
        let mut f = setup();
        let now = Utc::now();
        scheduled(&f.store, "orphan", "deleted-stream", now);

        assert_eq!(f.scheduler.tick(now).await.unwrap(), 0);

        let recording = f.store.inner.recording("orphan").unwrap();
        assert_eq!(recording.status, RecordingStatus::Failed);
        assert!(recording.error.unwrap().starts_with("Failed to start: "));
        assert!(f.supervisor.list_active().is_empty());

        // Status is still pushed; there is no stream to notify about
        events_until_status(&mut f.events, "orphan", RecordingStatus::Failed).await;
        assert_eq!(failed_notifications(&f.store), 0);
    }

    #[tokio::test]
    async fn test_tick_notifies_when_start_errors() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the recordings directory should be
        let blocked = dir.path().join("recordings");
        std::fs::write(&blocked, b"").unwrap();
        let mut f = setup_in(blocked, dir);
        let now = Utc::now();
        scheduled(&f.store, "r1", "s1", now);

        assert_eq!(f.scheduler.tick(now).await.unwrap(), 0);

        let events = events_until_status(&mut f.events, "r1", RecordingStatus::Failed).await;
        assert!(events.iter().any(|e| matches!(
            e,
            crate::events::RealtimeEvent::NotificationNew {
                kind: NotificationType::RecordingFailed,
                ..
            }
        )));
        let recording = f.store.inner.recording("r1").unwrap();
        assert_eq!(recording.status, RecordingStatus::Failed);
        assert!(recording.error.unwrap().starts_with("Failed to start: "));
        assert_eq!(failed_notifications(&f.store), 1);
        assert_eq!(f.host.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_tick_does_not_count_launch_failures() {
        let mut f = setup();
        let now = Utc::now();
        scheduled(&f.store, "r1", "s1", now);
        f.host.fail_next_spawn();

        assert_eq!(f.scheduler.tick(now).await.unwrap(), 0);

        events_until_status(&mut f.events, "r1", RecordingStatus::Failed).await;
        let recording = f.store.inner.recording("r1").unwrap();
        assert_eq!(recording.status, RecordingStatus::Failed);
        assert!(!recording.error.unwrap().starts_with("Failed to start: "));
        assert_eq!(failed_notifications(&f.store), 1);
        assert_eq!(f.store.terminal_updates("r1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let f = setup();
        scheduled(&f.store, "due", "s1", Utc::now() - chrono::Duration::seconds(1));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(f.scheduler.run(shutdown_rx));

        // The first tick fires immediately
        while !f.supervisor.is_active("due") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("scheduler stopped")
            .unwrap();
    }
}
