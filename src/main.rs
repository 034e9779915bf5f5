use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use multiview_recorder::recorder::{OutputFormat, Protocol, Recording, RecordingStatus, Stream};
use multiview_recorder::{
    BroadcastPublisher, FfmpegHost, MemoryStore, RealtimeEvent, RecorderConfig, RecorderError,
    Supervisor,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Record live video streams with FFmpeg
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record one stream until Ctrl-C or until the source ends
    Record {
        /// Source URL
        url: String,

        /// Transport of the source
        #[arg(short, long, value_enum, default_value_t = ProtocolArg::Srt)]
        protocol: ProtocolArg,

        /// Container of the output file
        #[arg(short, long, value_enum, default_value_t = FormatArg::Mp4)]
        format: FormatArg,

        /// Stream name used in the output filename
        #[arg(short, long, default_value = "stream")]
        name: String,

        /// Output directory, overrides RECORDINGS_PATH
        #[arg(short, long, env = "RECORDINGS_PATH")]
        output_dir: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProtocolArg {
    Srt,
    Rtmp,
    Rtmps,
    Rtsp,
    Hls,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Srt => Protocol::Srt,
            ProtocolArg::Rtmp => Protocol::Rtmp,
            ProtocolArg::Rtmps => Protocol::Rtmps,
            ProtocolArg::Rtsp => Protocol::Rtsp,
            ProtocolArg::Hls => Protocol::Hls,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Mp4,
    Mkv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Mp4 => OutputFormat::Mp4,
            FormatArg::Mkv => OutputFormat::Mkv,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    multiview_recorder::init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Record {
            url,
            protocol,
            format,
            name,
            output_dir,
        } => {
            let mut config = RecorderConfig::from_env();
            if let Some(dir) = output_dir {
                config.recordings_path = dir;
            }
            record(config, url, protocol.into(), format.into(), name).await
        }
    }
}

async fn record(
    config: RecorderConfig,
    url: String,
    protocol: Protocol,
    format: OutputFormat,
    name: String,
) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let stream = Stream {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        url,
        protocol,
        user_id: "local".to_string(),
    };
    let recording = Recording::new(uuid::Uuid::new_v4().to_string(), &stream, format);
    let recording_id = recording.id.clone();
    store.insert_stream(stream);
    store.insert_recording(recording);

    let publisher = Arc::new(BroadcastPublisher::default());
    let mut events = publisher.subscribe();
    let supervisor = Supervisor::new(config, store.clone(), publisher, Arc::new(FfmpegHost));

    supervisor
        .start(&recording_id)
        .await
        .context("Failed to start recording")?;

    let mut stopping = false;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !stopping => {
                signal.context("Failed to listen for Ctrl-C")?;
                stopping = true;
                match supervisor.stop(&recording_id).await {
                    Ok(()) | Err(RecorderError::NotActive(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    tracing::info!("{} {}", event.event, event.payload);
                    if let RealtimeEvent::StatusUpdate { status, .. } = event.raw {
                        if status.is_terminal() {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    supervisor.shutdown().await;

    let Some(recording) = store.recording(&recording_id) else {
        bail!("Recording {} disappeared", recording_id);
    };
    match recording.status {
        RecordingStatus::Completed => {
            println!(
                "Saved {} ({} bytes, {}s)",
                recording.file_path.unwrap_or_default(),
                recording.file_size.unwrap_or(0),
                recording.duration.unwrap_or(0)
            );
            Ok(())
        }
        status => bail!(
            "Recording ended as {}: {}",
            status,
            recording.error.unwrap_or_default()
        ),
    }
}
