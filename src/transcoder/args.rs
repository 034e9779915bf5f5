//! FFmpeg command line construction for stream recording

use crate::recorder::types::{OutputFormat, Protocol};
use chrono::{DateTime, SecondsFormat, Utc};

/// User agent sent to HLS origins; some reject FFmpeg's default one
pub const HLS_USER_AGENT: &str = "User-Agent: Mozilla/5.0";

/// Build the FFmpeg arguments that record `url` into `output_path`
///
/// Streams are copied without re-encoding. The output is always
/// overwritten without prompting.
pub fn build_args(
    url: &str,
    protocol: Protocol,
    output_path: &str,
    format: OutputFormat,
) -> Vec<String> {
    let mut args = vec!["-y".to_string()];

    match protocol {
        Protocol::Rtsp => {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        }
        Protocol::Hls => {
            args.extend(["-headers".to_string(), HLS_USER_AGENT.to_string()]);
        }
        Protocol::Srt | Protocol::Rtmp | Protocol::Rtmps => {}
    }
    args.extend(["-i".to_string(), url.to_string()]);

    args.extend([
        "-c".to_string(),
        "copy".to_string(),
        // Move the moov atom up front so the file plays before it is closed
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        format.muxer().to_string(),
        output_path.to_string(),
    ]);

    args
}

/// Replace everything outside `[A-Za-z0-9]` with `_`
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Output filename: `<sanitized name>_<ISO-8601 with ':' and '.' as '-'>.<ext>`
pub fn output_file_name(stream_name: &str, at: DateTime<Utc>, format: OutputFormat) -> String {
    let timestamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!(
        "{}_{}.{}",
        sanitize_name(stream_name),
        timestamp,
        format.extension()
    )
}
