//! Recording supervisor
//!
//! Owns the registry of running recording jobs. Each job is a tokio task
//! that owns its transcoder process, turns stderr into progress events and
//! reconciles the exit outcome with the persisted recording.

use super::notifier::Notifier;
use super::types::{NotificationType, Recording, RecordingStatus, RecordingUpdate, Stream};
use crate::config::RecorderConfig;
use crate::events::{Publisher, RealtimeEvent};
use crate::store::RecordingStore;
use crate::transcoder::{
    build_args, output_file_name, parse_elapsed_seconds, ProcessHost, ProcessInput, ProcessOutput,
    ProgressSplitter, TranscoderProcess,
};
use crate::utils::{RecorderError, RecorderResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;

/// How long to keep reading stderr after the process has exited
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Exit codes that count as a clean stop; `q` usually yields 255
const CLEAN_EXIT_CODES: [i32; 2] = [0, 255];

/// Commands delivered to a running job
#[derive(Debug)]
enum JobCommand {
    /// Ask the process to finalize and exit, then arm the kill timer
    Quit { written: oneshot::Sender<()> },
    /// Kill right away
    Kill,
}

/// Registry entry for a recording
enum JobSlot {
    /// `start` is loading records or spawning
    Starting,
    Running(RecordingJob),
}

/// A supervised, currently running recording
struct RecordingJob {
    user_id: String,
    started_at: DateTime<Utc>,
    commands: mpsc::UnboundedSender<JobCommand>,
}

/// What a job needs to report on its recording
#[derive(Debug, Clone)]
struct JobContext {
    recording_id: String,
    user_id: String,
    stream: Stream,
    file_path: PathBuf,
    started_at: DateTime<Utc>,
}

struct Inner {
    config: RecorderConfig,
    store: Arc<dyn RecordingStore>,
    publisher: Arc<dyn Publisher>,
    notifier: Notifier,
    host: Arc<dyn ProcessHost>,
    jobs: Mutex<HashMap<String, JobSlot>>,
    /// Signalled whenever a slot is committed or removed
    changed: Notify,
}

/// Starts, stops and monitors recording processes
///
/// Cloning is cheap; every clone drives the same registry.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(
        config: RecorderConfig,
        store: Arc<dyn RecordingStore>,
        publisher: Arc<dyn Publisher>,
        host: Arc<dyn ProcessHost>,
    ) -> Self {
        let notifier = Notifier::new(store.clone(), publisher.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                publisher,
                notifier,
                host,
                jobs: Mutex::new(HashMap::new()),
                changed: Notify::new(),
            }),
        }
    }

    /// Start recording `recording_id`
    ///
    /// Returns once the process runs and RECORDING is persisted; the
    /// outcome arrives later through the store and the publisher. A process
    /// that cannot be launched is recorded as FAILED and is not an error
    /// for the caller.
    pub async fn start(&self, recording_id: &str) -> RecorderResult<()> {
        self.launch(recording_id).await.map(|_| ())
    }

    /// Like `start`, but reports whether a process is now running
    ///
    /// `Ok(false)` means the launch failed and FAILED was recorded.
    pub(crate) async fn launch(&self, recording_id: &str) -> RecorderResult<bool> {
        let mut reservation = Reservation::acquire(&self.inner, recording_id)?;

        let (recording, stream) = self.load(recording_id).await?;

        let recordings_dir = &self.inner.config.recordings_path;
        tokio::fs::create_dir_all(recordings_dir).await?;

        let started_at = Utc::now();
        let file_path =
            recordings_dir.join(output_file_name(&stream.name, started_at, recording.format));
        let file_path_str = file_path.to_string_lossy().into_owned();
        let args = build_args(&stream.url, stream.protocol, &file_path_str, recording.format);

        let job = JobContext {
            recording_id: recording_id.to_string(),
            user_id: recording.user_id.clone(),
            stream,
            file_path,
            started_at,
        };

        tracing::info!(
            "Starting recording {}: {} {}",
            recording_id,
            self.inner.config.ffmpeg_path,
            args.join(" ")
        );

        let mut process = match self.inner.host.spawn(&self.inner.config.ffmpeg_path, &args) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!("FFmpeg failed to launch for recording {}: {}", recording_id, e);
                drop(reservation);
                self.inner.fail(&job, e.to_string()).await;
                return Ok(false);
            }
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        reservation.commit(RecordingJob {
            user_id: job.user_id.clone(),
            started_at,
            commands: commands_tx,
        });

        let update = RecordingUpdate::started(file_path_str, started_at);
        if let Err(e) = self.inner.store.update_recording(recording_id, update).await {
            tracing::error!("Could not mark recording {} as started: {}", recording_id, e);
            if let Err(kill_err) = process.start_kill() {
                tracing::warn!("Failed to kill FFmpeg for {}: {}", recording_id, kill_err);
            }
            let _ = process.wait().await;
            return Err(e.into());
        }
        reservation.release();

        self.inner.publisher.publish_to_user(
            &job.user_id,
            RealtimeEvent::StatusUpdate {
                recording_id: job.recording_id.clone(),
                status: RecordingStatus::Recording,
            },
        );
        self.inner
            .notifier
            .notify(NotificationType::RecordingStarted, &job.stream, &job.user_id)
            .await;

        tokio::spawn(self.inner.clone().supervise(job, process, commands_rx));
        Ok(true)
    }

    /// Ask a running recording to stop
    ///
    /// Returns once the quit keystroke has been written, or at the stop
    /// timeout when the process is not reading its input. The process is
    /// killed if it is still running after the stop timeout; the final
    /// status is published when it exits.
    pub async fn stop(&self, recording_id: &str) -> RecorderResult<()> {
        let commands = match self.inner.jobs.lock().get(recording_id) {
            Some(JobSlot::Running(job)) => job.commands.clone(),
            _ => return Err(RecorderError::NotActive(recording_id.to_string())),
        };

        tracing::info!("Stopping recording {}", recording_id);

        let (written_tx, written_rx) = oneshot::channel();
        commands
            .send(JobCommand::Quit {
                written: written_tx,
            })
            .map_err(|_| RecorderError::NotActive(recording_id.to_string()))?;

        // Dropped unanswered if the job exits first
        let _ = written_rx.await;
        Ok(())
    }

    /// Ids of recordings with a running process, sorted
    pub fn list_active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .jobs
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, JobSlot::Running(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_active(&self, recording_id: &str) -> bool {
        matches!(
            self.inner.jobs.lock().get(recording_id),
            Some(JobSlot::Running(_))
        )
    }

    /// Owner and start time of a running recording
    pub fn job_info(&self, recording_id: &str) -> Option<(String, DateTime<Utc>)> {
        match self.inner.jobs.lock().get(recording_id) {
            Some(JobSlot::Running(job)) => Some((job.user_id.clone(), job.started_at)),
            _ => None,
        }
    }

    /// Kill every running job and wait until the registry is empty
    pub async fn shutdown(&self) {
        loop {
            let changed = self.inner.changed.notified();
            let running: Vec<mpsc::UnboundedSender<JobCommand>> = {
                let jobs = self.inner.jobs.lock();
                if jobs.is_empty() {
                    break;
                }
                jobs.values()
                    .filter_map(|slot| match slot {
                        JobSlot::Running(job) => Some(job.commands.clone()),
                        JobSlot::Starting => None,
                    })
                    .collect()
            };

            tracing::info!("Shutting down {} running recording(s)", running.len());
            for commands in running {
                let _ = commands.send(JobCommand::Kill);
            }
            changed.await;
        }
        tracing::info!("All recordings stopped");
    }

    /// Record a start that failed before any job existed
    ///
    /// The notification needs the stream, so it is skipped when the stream
    /// is gone; the status event always goes out.
    pub(crate) async fn fail_unstarted(&self, recording: &Recording, error: String) {
        let update = RecordingUpdate::failed(None, error);
        if let Err(e) = self.inner.store.update_recording(&recording.id, update).await {
            tracing::error!("Could not mark recording {} as failed: {}", recording.id, e);
        }

        match self.inner.store.find_stream(&recording.stream_id).await {
            Ok(Some(stream)) => {
                self.inner
                    .notifier
                    .notify(NotificationType::RecordingFailed, &stream, &recording.user_id)
                    .await;
            }
            Ok(None) => tracing::debug!(
                "Stream {} is gone, no failure notification for {}",
                recording.stream_id,
                recording.id
            ),
            Err(e) => tracing::warn!("Could not load stream {}: {}", recording.stream_id, e),
        }

        self.inner.publisher.publish_to_user(
            &recording.user_id,
            RealtimeEvent::StatusUpdate {
                recording_id: recording.id.clone(),
                status: RecordingStatus::Failed,
            },
        );
    }

    async fn load(&self, recording_id: &str) -> RecorderResult<(Recording, Stream)> {
        let not_found = || RecorderError::NotFound(recording_id.to_string());

        let recording = self
            .inner
            .store
            .find_recording(recording_id)
            .await?
            .ok_or_else(not_found)?;
        let stream = self
            .inner
            .store
            .find_stream(&recording.stream_id)
            .await?
            .ok_or_else(not_found)?;

        Ok((recording, stream))
    }
}

impl Inner {
    /// Drive one job from launch to its terminal event
    async fn supervise(
        self: Arc<Self>,
        job: JobContext,
        mut process: Box<dyn TranscoderProcess>,
        mut commands: mpsc::UnboundedReceiver<JobCommand>,
    ) {
        let mut stdin = process.take_stdin();
        let mut stderr = process.take_stderr();
        let mut splitter = ProgressSplitter::new();
        let mut buf = vec![0u8; 4096];

        let kill_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(kill_timer);
        // Set by the first stop and never moved
        let mut kill_deadline: Option<Instant> = None;
        let mut kill_armed = false;

        let outcome = loop {
            tokio::select! {
                result = process.wait() => break result,
                read = read_chunk(&mut stderr, &mut buf), if stderr.is_some() => match read {
                    Ok(0) => stderr = None,
                    Ok(n) => self.report_progress(&job, splitter.push(&buf[..n])),
                    Err(e) => {
                        tracing::warn!("Lost FFmpeg stderr for {}: {}", job.recording_id, e);
                        stderr = None;
                    }
                },
                Some(command) = commands.recv() => match command {
                    JobCommand::Quit { written } => {
                        let deadline = match kill_deadline {
                            Some(deadline) => deadline,
                            None => {
                                let deadline = Instant::now() + self.config.stop_timeout();
                                kill_timer.as_mut().reset(deadline);
                                kill_deadline = Some(deadline);
                                kill_armed = true;
                                deadline
                            }
                        };
                        // A process that stopped reading its input must not hold off the kill
                        if tokio::time::timeout_at(deadline, send_quit(&job, &mut stdin))
                            .await
                            .is_err()
                        {
                            tracing::warn!(
                                "FFmpeg for {} is not reading its input, giving up on quit",
                                job.recording_id
                            );
                            stdin = None;
                        }
                        let _ = written.send(());
                    }
                    JobCommand::Kill => kill(&job, process.as_mut()),
                },
                () = &mut kill_timer, if kill_armed => {
                    kill_armed = false;
                    tracing::warn!(
                        "Recording {} still running {:?} after quit, killing FFmpeg",
                        job.recording_id,
                        self.config.stop_timeout()
                    );
                    kill(&job, process.as_mut());
                }
            }
        };

        // Progress written just before exit may still be in the pipe
        if let Some(mut rest) = stderr.take() {
            let drain = async {
                loop {
                    match rest.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => self.report_progress(&job, splitter.push(&buf[..n])),
                    }
                }
            };
            let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, drain).await;
        }
        if let Some(tail) = splitter.finish() {
            self.report_progress(&job, vec![tail]);
        }

        drop(commands);
        self.finalize(job, outcome).await;
    }

    fn report_progress(&self, job: &JobContext, segments: Vec<String>) {
        for segment in segments {
            tracing::trace!("ffmpeg[{}]: {}", job.recording_id, segment);
            if let Some(duration) = parse_elapsed_seconds(&segment) {
                self.publisher.publish_to_user(
                    &job.user_id,
                    RealtimeEvent::Progress {
                        recording_id: job.recording_id.clone(),
                        duration,
                    },
                );
            }
        }
    }

    /// Terminal handling, runs exactly once per job
    async fn finalize(&self, job: JobContext, outcome: io::Result<Option<i32>>) {
        self.deregister(&job.recording_id);

        let code = match outcome {
            Ok(code) => code,
            Err(e) => {
                tracing::error!("FFmpeg error for recording {}: {}", job.recording_id, e);
                self.fail(&job, e.to_string()).await;
                return;
            }
        };

        if !code.is_some_and(|c| CLEAN_EXIT_CODES.contains(&c)) {
            let error = match code {
                Some(c) => format!("FFmpeg exited with code {}", c),
                None => "FFmpeg was terminated by a signal".to_string(),
            };
            tracing::warn!("Recording {} failed: {}", job.recording_id, error);
            self.fail(&job, error).await;
            return;
        }

        let ended_at = Utc::now();
        let file_size = tokio::fs::metadata(&job.file_path).await.ok().map(|m| m.len());
        let duration = (ended_at - job.started_at).num_seconds().max(0) as u64;

        tracing::info!(
            "Recording {} completed: {}s, {:?} bytes at {:?}",
            job.recording_id,
            duration,
            file_size,
            job.file_path
        );

        let update = RecordingUpdate::completed(ended_at, file_size, duration);
        if let Err(e) = self.store.update_recording(&job.recording_id, update).await {
            tracing::error!("Could not mark recording {} as completed: {}", job.recording_id, e);
        }
        self.notifier
            .notify(NotificationType::RecordingCompleted, &job.stream, &job.user_id)
            .await;
        self.publish_status(&job, RecordingStatus::Completed);
    }

    /// Persist FAILED and tell the owner
    async fn fail(&self, job: &JobContext, error: String) {
        let update = RecordingUpdate::failed(Some(Utc::now()), error);
        if let Err(e) = self.store.update_recording(&job.recording_id, update).await {
            tracing::error!("Could not mark recording {} as failed: {}", job.recording_id, e);
        }
        self.notifier
            .notify(NotificationType::RecordingFailed, &job.stream, &job.user_id)
            .await;
        self.publish_status(job, RecordingStatus::Failed);
    }

    fn publish_status(&self, job: &JobContext, status: RecordingStatus) {
        self.publisher.publish_to_user(
            &job.user_id,
            RealtimeEvent::StatusUpdate {
                recording_id: job.recording_id.clone(),
                status,
            },
        );
    }

    fn deregister(&self, recording_id: &str) {
        self.jobs.lock().remove(recording_id);
        self.changed.notify_waiters();
    }
}

/// Holds a registry slot while `start` runs
///
/// The slot is removed on drop unless released, so every early return
/// from `start` deregisters.
struct Reservation<'a> {
    inner: &'a Inner,
    recording_id: String,
    armed: bool,
}

impl<'a> Reservation<'a> {
    fn acquire(inner: &'a Inner, recording_id: &str) -> RecorderResult<Self> {
        let mut jobs = inner.jobs.lock();
        if jobs.contains_key(recording_id) {
            return Err(RecorderError::AlreadyRunning(recording_id.to_string()));
        }
        jobs.insert(recording_id.to_string(), JobSlot::Starting);

        Ok(Self {
            inner,
            recording_id: recording_id.to_string(),
            armed: true,
        })
    }

    fn commit(&mut self, job: RecordingJob) {
        self.inner
            .jobs
            .lock()
            .insert(self.recording_id.clone(), JobSlot::Running(job));
        self.inner.changed.notify_waiters();
    }

    /// Hand the slot over to the job task
    fn release(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.deregister(&self.recording_id);
        }
    }
}

async fn read_chunk(stderr: &mut Option<ProcessOutput>, buf: &mut [u8]) -> io::Result<usize> {
    match stderr {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Send the interactive quit keystroke
async fn send_quit(job: &JobContext, stdin: &mut Option<ProcessInput>) {
    let Some(writer) = stdin.as_mut() else {
        tracing::warn!("No stdin for recording {}, waiting for kill", job.recording_id);
        return;
    };
    let result = async {
        writer.write_all(b"q").await?;
        writer.flush().await
    }
    .await;
    if let Err(e) = result {
        tracing::warn!("Failed to send quit to FFmpeg for {}: {}", job.recording_id, e);
    }
}

fn kill(job: &JobContext, process: &mut dyn TranscoderProcess) {
    if let Err(e) = process.start_kill() {
        tracing::warn!("Failed to kill FFmpeg for {}: {}", job.recording_id, e);
    }
}
