//! Capture of a child's stdout/stderr into shared buffers.
//!
//! Reader tasks append whole chunks as they arrive and bump a watch counter,
//! so observers wake on new data instead of polling.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct Buffers {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    open_streams: usize,
}

/// Output of a subject process, shared between its reader tasks and observers
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    buffers: Arc<Mutex<Buffers>>,
    version: Arc<watch::Sender<u64>>,
}

impl Default for CapturedOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl CapturedOutput {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            buffers: Arc::new(Mutex::new(Buffers::default())),
            version: Arc::new(version),
        }
    }

    /// Spawns a task copying `reader` into the `stream` buffer until EOF.
    ///
    /// The stream counts as open from the moment this returns, so observers
    /// never mistake a stream that has not produced output yet for a closed one.
    pub fn capture<R>(&self, stream: OutputStream, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.lock().open_streams += 1;

        let output = self.clone();
        tokio::spawn(async move {
            let mut frames = FramedRead::new(reader, BytesCodec::new());
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(chunk) => output.append(stream, &chunk),
                    Err(e) => {
                        warn!("error reading subject {:?}: {}", stream, e);
                        break;
                    }
                }
            }
            debug!("subject {:?} closed", stream);
            output.close_stream();
        })
    }

    /// A receiver that changes whenever output is appended or a stream closes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// True once every captured stream has reached EOF.
    pub fn is_closed(&self) -> bool {
        self.lock().open_streams == 0
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.lock().stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.lock().stderr).into_owned()
    }

    pub fn snapshot(&self) -> OutputSnapshot {
        let buffers = self.lock();
        OutputSnapshot {
            stdout: String::from_utf8_lossy(&buffers.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&buffers.stderr).into_owned(),
        }
    }

    /// Runs `f` over the raw stdout bytes accumulated so far.
    pub(crate) fn with_stdout<T>(&self, f: impl FnOnce(&[u8]) -> T) -> T {
        f(&self.lock().stdout)
    }

    pub(crate) fn append(&self, stream: OutputStream, chunk: &[u8]) {
        {
            let mut buffers = self.lock();
            match stream {
                OutputStream::Stdout => buffers.stdout.extend_from_slice(chunk),
                OutputStream::Stderr => buffers.stderr.extend_from_slice(chunk),
            }
        }
        self.version.send_modify(|v| *v += 1);
    }

    fn close_stream(&self) {
        {
            let mut buffers = self.lock();
            buffers.open_streams = buffers.open_streams.saturating_sub(1);
        }
        self.version.send_modify(|v| *v += 1);
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time copy of captured output, attached to startup errors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSnapshot {
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for OutputSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- stdout ---")?;
        writeln!(f, "{}", self.stdout.trim_end())?;
        writeln!(f, "--- stderr ---")?;
        write!(f, "{}", self.stderr.trim_end())
    }
}
