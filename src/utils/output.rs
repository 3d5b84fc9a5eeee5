/// Bounded output collection for child process streams
///
/// Each stream is drained on its own thread so a chatty child never blocks on
/// a full pipe. Bytes past the configured limit are discarded and the stream
/// is flagged as truncated; the child keeps running.
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

const READ_BUFFER_BYTES: usize = 8 * 1024;

/// Which child stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Raw bytes read from one stream, in production order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: Stream,
    pub data: Vec<u8>,
}

/// Push-based consumer of live output. Returns `false` once it stops listening.
pub type ChunkSink = Arc<dyn Fn(OutputChunk) -> bool + Send + Sync>;

/// Per-stream storage limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputLimits {
    pub stdout_limit_bytes: usize,
    pub stderr_limit_bytes: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        OutputLimits {
            stdout_limit_bytes: 8 * 1024 * 1024, // 8 MB stdout
            stderr_limit_bytes: 2 * 1024 * 1024, // 2 MB stderr
        }
    }
}

impl OutputLimits {
    pub fn limit_for(&self, stream: Stream) -> usize {
        match stream {
            Stream::Stdout => self.stdout_limit_bytes,
            Stream::Stderr => self.stderr_limit_bytes,
        }
    }
}

/// Everything stored for one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStream {
    pub data: Vec<u8>,
    pub truncated: bool,
}

impl CapturedStream {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Background reader for one child stream
pub struct StreamCollector {
    stream: Stream,
    captured: Arc<Mutex<CapturedStream>>,
    done: Receiver<io::Result<()>>,
}

impl StreamCollector {
    /// Start draining `reader` on a dedicated thread.
    ///
    /// When `sink` is set, every stored chunk is also pushed to it as soon as
    /// it is read.
    pub fn spawn<R>(
        reader: R,
        stream: Stream,
        limit: usize,
        sink: Option<ChunkSink>,
    ) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let captured = Arc::new(Mutex::new(CapturedStream::default()));
        let (done_tx, done) = bounded(1);
        let shared = Arc::clone(&captured);

        thread::Builder::new()
            .name(format!("coderun-{stream}"))
            .spawn(move || {
                let result = drain(reader, stream, limit, sink, &shared);
                let _ = done_tx.send(result);
            })?;

        Ok(Self {
            stream,
            captured,
            done,
        })
    }

    /// Wait until `deadline` for end-of-stream and return what was stored.
    ///
    /// Both streams of a phase share one deadline. A process that escaped
    /// termination can hold the pipe open; in that case the reader thread is
    /// left behind and the bytes read so far are returned.
    pub fn finish(self, deadline: Instant) -> CapturedStream {
        match self.done.recv_deadline(deadline) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Reading {} failed: {}", self.stream, e),
            Err(RecvTimeoutError::Timeout) => log::warn!(
                "{} still open after process exit, returning partial capture",
                self.stream
            ),
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("{} collector thread exited without reporting", self.stream)
            }
        }

        let mut guard = self
            .captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *guard)
    }
}

fn drain<R: Read>(
    mut reader: R,
    stream: Stream,
    limit: usize,
    mut sink: Option<ChunkSink>,
    captured: &Mutex<CapturedStream>,
) -> io::Result<()> {
    let mut buf = [0u8; READ_BUFFER_BYTES];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        let stored = {
            let mut guard = captured
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let room = limit.saturating_sub(guard.data.len());
            let take = room.min(n);
            guard.data.extend_from_slice(&buf[..take]);
            if take < n {
                guard.truncated = true;
            }
            take
        };

        if stored == 0 {
            // Keep reading so the child never blocks on a full pipe.
            continue;
        }

        if let Some(push) = &sink {
            let chunk = OutputChunk {
                stream,
                data: buf[..stored].to_vec(),
            };
            if !push(chunk) {
                sink = None;
            }
        }
    }
}
