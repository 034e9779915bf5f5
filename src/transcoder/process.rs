//! Spawning and controlling the external transcoder

use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

pub type ProcessInput = Box<dyn AsyncWrite + Send + Unpin>;
pub type ProcessOutput = Box<dyn AsyncRead + Send + Unpin>;

/// A running transcoder process
///
/// Owned exclusively by the supervisor task that spawned it.
#[async_trait]
pub trait TranscoderProcess: Send {
    /// Take the input channel used for the graceful quit keystroke
    fn take_stdin(&mut self) -> Option<ProcessInput>;

    /// Take the diagnostic output channel
    fn take_stderr(&mut self) -> Option<ProcessOutput>;

    /// Wait for exit; `None` means the process was terminated by a signal
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Send a non-catchable kill without waiting for the exit
    fn start_kill(&mut self) -> io::Result<()>;
}

/// Launches transcoder processes
pub trait ProcessHost: Send + Sync {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Box<dyn TranscoderProcess>>;
}

/// Runs the real FFmpeg binary through `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct FfmpegHost;

impl ProcessHost for FfmpegHost {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Box<dyn TranscoderProcess>> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        Ok(Box::new(FfmpegProcess { child }))
    }
}

struct FfmpegProcess {
    child: Child,
}

#[async_trait]
impl TranscoderProcess for FfmpegProcess {
    fn take_stdin(&mut self) -> Option<ProcessInput> {
        self.child
            .stdin
            .take()
            .map(|stdin| Box::new(stdin) as ProcessInput)
    }

    fn take_stderr(&mut self) -> Option<ProcessOutput> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as ProcessOutput)
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }
}
