//! In-memory log capture for tests.

use serde_json::Value;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

/// A cloneable writer that keeps everything written to it.
///
/// Pass it to [`build_subscriber`](crate::build_subscriber) and read the
/// output back once the code under test has run.
///
/// # Example
///
/// ```
/// use trellis_telemetry::{build_subscriber, LogCapture, LogConfig};
///
/// let capture = LogCapture::new();
/// let subscriber = build_subscriber(&LogConfig::default(), capture.clone()).unwrap();
/// tracing::subscriber::with_default(subscriber, || tracing::info!(answer = 42, "hello"));
///
/// assert_eq!(capture.json_lines()[0]["fields"]["answer"], 42);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Parses each line written so far as JSON, skipping lines that are not.
    #[must_use]
    pub fn json_lines(&self) -> Vec<Value> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Discards everything written so far.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
