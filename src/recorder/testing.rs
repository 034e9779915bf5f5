//! Test doubles for the process host and the store

use crate::events::{BroadcastPublisher, RealtimeEvent, UserEvent};
use crate::recorder::types::{
    NewNotification, Notification, Recording, RecordingStatus, RecordingUpdate, Stream,
};
use crate::store::{MemoryStore, RecordingStore};
use crate::transcoder::{ProcessHost, ProcessInput, ProcessOutput, TranscoderProcess};
use crate::utils::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum FakeExit {
    Code(Option<i32>),
    Error(String),
}

/// Test-side end of a fake transcoder
pub struct FakeHandle {
    pub args: Vec<String>,
    pub stderr: Option<DuplexStream>,
    pub stdin: DuplexStream,
    exit: Arc<watch::Sender<Option<FakeExit>>>,
    killed_at: Arc<Mutex<Option<Instant>>>,
}

impl FakeHandle {
    pub async fn write_stderr(&mut self, text: &str) {
        if let Some(stderr) = self.stderr.as_mut() {
            stderr.write_all(text.as_bytes()).await.unwrap();
        }
    }

    /// Close stderr and exit with `code`
    pub fn exit(&mut self, code: Option<i32>) {
        self.stderr = None;
        self.exit.send_if_modified(|state| set_once(state, FakeExit::Code(code)));
    }

    /// Make `wait` fail after launch
    pub fn fail(&mut self, message: &str) {
        self.stderr = None;
        self.exit
            .send_if_modified(|state| set_once(state, FakeExit::Error(message.to_string())));
    }

    /// Read one byte from the process input
    pub async fn read_stdin_byte(&mut self) -> u8 {
        self.stdin.read_u8().await.unwrap()
    }

    pub fn killed_at(&self) -> Option<Instant> {
        *self.killed_at.lock()
    }
}

fn set_once(state: &mut Option<FakeExit>, exit: FakeExit) -> bool {
    if state.is_some() {
        return false;
    }
    *state = Some(exit);
    true
}

struct FakeProcess {
    stdin: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    exit: Arc<watch::Sender<Option<FakeExit>>>,
    exit_rx: watch::Receiver<Option<FakeExit>>,
    killed_at: Arc<Mutex<Option<Instant>>>,
}

#[async_trait]
impl TranscoderProcess for FakeProcess {
    fn take_stdin(&mut self) -> Option<ProcessInput> {
        self.stdin.take().map(|s| Box::new(s) as ProcessInput)
    }

    fn take_stderr(&mut self) -> Option<ProcessOutput> {
        self.stderr.take().map(|s| Box::new(s) as ProcessOutput)
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let state = self
            .exit_rx
            .wait_for(|state| state.is_some())
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let exit = (*state).clone();
        drop(state);
        match exit {
            Some(FakeExit::Code(code)) => Ok(code),
            Some(FakeExit::Error(message)) => Err(io::Error::new(io::ErrorKind::Other, message)),
            None => unreachable!(),
        }
    }

    fn start_kill(&mut self) -> io::Result<()> {
        let mut killed_at = self.killed_at.lock();
        if killed_at.is_none() {
            *killed_at = Some(Instant::now());
        }
        self.exit
            .send_if_modified(|state| set_once(state, FakeExit::Code(None)));
        Ok(())
    }
}

/// Process host handing out scripted fake processes
#[derive(Default)]
pub struct FakeHost {
    handles: Mutex<VecDeque<FakeHandle>>,
    spawn_count: Mutex<usize>,
    fail_spawn: AtomicBool,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_spawn(&self) {
        self.fail_spawn.store(true, Ordering::SeqCst);
    }

    pub fn spawn_count(&self) -> usize {
        *self.spawn_count.lock()
    }

    /// Take the handle of the oldest unclaimed process
    pub fn take_handle(&self) -> FakeHandle {
        self.handles
            .lock()
            .pop_front()
            .expect("no process was spawned")
    }
}

impl ProcessHost for FakeHost {
    fn spawn(&self, _program: &str, args: &[String]) -> io::Result<Box<dyn TranscoderProcess>> {
        if self.fail_spawn.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory (os error 2)",
            ));
        }
        *self.spawn_count.lock() += 1;

        let (stdin_process, stdin_test) = tokio::io::duplex(64);
        let (stderr_process, stderr_test) = tokio::io::duplex(4096);
        let (exit_tx, exit_rx) = watch::channel(None);
        let exit = Arc::new(exit_tx);
        let killed_at = Arc::new(Mutex::new(None));

        self.handles.lock().push_back(FakeHandle {
            args: args.to_vec(),
            stderr: Some(stderr_test),
            stdin: stdin_test,
            exit: exit.clone(),
            killed_at: killed_at.clone(),
        });

        Ok(Box::new(FakeProcess {
            stdin: Some(stdin_process),
            stderr: Some(stderr_process),
            exit,
            exit_rx,
            killed_at,
        }))
    }
}

/// Store wrapper that records every write
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    updates: Mutex<Vec<(String, RecordingUpdate)>>,
    fail_updates: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<(String, RecordingUpdate)> {
        self.updates.lock().clone()
    }

    /// Updates that moved `id` into a terminal status
    pub fn terminal_updates(&self, id: &str) -> usize {
        self.updates
            .lock()
            .iter()
            .filter(|(rid, u)| rid == id && u.status.is_some_and(|s| s.is_terminal()))
            .count()
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordingStore for CountingStore {
    async fn find_recording(&self, id: &str) -> Result<Option<Recording>, StoreError> {
        self.inner.find_recording(id).await
    }

    async fn find_stream(&self, id: &str) -> Result<Option<Stream>, StoreError> {
        self.inner.find_stream(id).await
    }

    async fn update_recording(
        &self,
        id: &str,
        update: RecordingUpdate,
    ) -> Result<Recording, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("database unavailable".to_string()));
        }
        self.updates.lock().push((id.to_string(), update.clone()));
        self.inner.update_recording(id, update).await
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        self.inner.create_notification(notification).await
    }

    async fn find_due_recordings(&self, now: DateTime<Utc>) -> Result<Vec<Recording>, StoreError> {
        self.inner.find_due_recordings(now).await
    }
}

/// Collect events until `recording_id` reaches `status`
pub async fn events_until_status(
    rx: &mut broadcast::Receiver<UserEvent>,
    recording_id: &str,
    status: RecordingStatus,
) -> Vec<RealtimeEvent> {
    let mut seen = Vec::new();
    let deadline = Duration::from_secs(30);
    loop {
        let event = tokio::time::timeout(deadline, rx.recv())
            .await
            .expect("timed out waiting for status")
            .expect("publisher closed");
        let done = matches!(
            &event.raw,
            RealtimeEvent::StatusUpdate { recording_id: id, status: s } if id == recording_id && *s == status
        );
        seen.push(event.raw);
        if done {
            return seen;
        }
    }
}

pub fn publisher() -> Arc<BroadcastPublisher> {
    Arc::new(BroadcastPublisher::new(256))
}
