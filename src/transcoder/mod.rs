//! External transcoder integration
//!
//! Argument building, stderr progress parsing and the process seam the
//! supervisor drives.

pub mod args;
pub mod process;
pub mod progress;

pub use args::{build_args, output_file_name, sanitize_name};
pub use process::{FfmpegHost, ProcessHost, ProcessInput, ProcessOutput, TranscoderProcess};
pub use progress::{parse_elapsed_seconds, ProgressSplitter};
