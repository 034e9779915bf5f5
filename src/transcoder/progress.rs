//! Progress extraction from FFmpeg's stderr

/// Longest unterminated segment kept between reads
const MAX_PENDING: usize = 4096;

/// Find a `time=HH:MM:SS.hh` token and return it as whole seconds
///
/// Returns `None` when the line carries no progress; that is not an error.
pub fn parse_elapsed_seconds(line: &str) -> Option<u64> {
    let mut rest = line;
    while let Some(idx) = rest.find("time=") {
        let candidate = &rest[idx + 5..];
        if let Some(secs) = parse_timestamp(candidate) {
            return Some(secs);
        }
        rest = candidate;
    }
    None
}

/// Parse a leading `HH:MM:SS.hh`
fn parse_timestamp(s: &str) -> Option<u64> {
    let bytes = s.as_bytes();
    if bytes.len() < 11 {
        return None;
    }
    let digits = |range: std::ops::Range<usize>| -> Option<u64> {
        let part = &bytes[range];
        if !part.iter().all(u8::is_ascii_digit) {
            return None;
        }
        part.iter()
            .try_fold(0u64, |acc, d| Some(acc * 10 + u64::from(d - b'0')))
    };

    if bytes[2] != b':' || bytes[5] != b':' || bytes[8] != b'.' {
        return None;
    }
    let hours = digits(0..2)?;
    let minutes = digits(3..5)?;
    let seconds = digits(6..8)?;
    digits(9..11)?;

    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Splits raw stderr chunks into complete segments
///
/// FFmpeg ends its status line with `\r`, everything else with `\n`; both
/// terminate a segment here.
#[derive(Debug, Default)]
pub struct ProgressSplitter {
    pending: Vec<u8>,
}

impl ProgressSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the segments it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut segments = Vec::new();
        for &byte in chunk {
            if byte == b'\r' || byte == b'\n' {
                if !self.pending.is_empty() {
                    segments.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else if self.pending.len() < MAX_PENDING {
                self.pending.push(byte);
            }
        }
        segments
    }

    /// Drain whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(tail)
    }
}
