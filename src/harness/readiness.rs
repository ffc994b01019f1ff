//! Readiness gate: blocks until the subject announces it is serving.

use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::{HarnessError, HarnessResult};
use super::launcher::{SubjectProcess, SubjectState};
use super::output::CapturedOutput;

/// Waits until `marker` appears on the subject's stdout.
///
/// Wakes only when output arrives, so there is no polling loop. The marker
/// scan and the timeout race; whichever finishes first decides the result and
/// the other is dropped. The scan runs over all stdout accumulated so far,
/// so a marker split across chunks is still found.
pub async fn await_ready(
    subject: &mut SubjectProcess,
    marker: &str,
    limit: Duration,
) -> HarnessResult<()> {
    match subject.state() {
        SubjectState::Ready => return Ok(()),
        SubjectState::Starting => {}
        other => return Err(HarnessError::NotReady(other)),
    }

    debug!("waiting up to {:?} for marker {:?}", limit, marker);
    let started = Instant::now();
    let output = subject.output().clone();

    match timeout(limit, wait_for_marker(&output, marker)).await {
        Ok(MarkerWait::Found) => {
            subject.mark_ready();
            info!("subject ready after {:?}", started.elapsed());
            Ok(())
        }
        Ok(MarkerWait::StreamsClosed) => {
            // Output closes slightly before the exit is reapable.
            let status = match subject.try_exit_status() {
                Some(status) => Some(status),
                None => timeout(Duration::from_millis(500), subject.wait_for_exit())
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .flatten(),
            };
            warn!("subject closed its output before becoming ready: {:?}", status);
            Err(HarnessError::SubjectExited {
                status,
                output: output.snapshot(),
            })
        }
        Err(_) => {
            warn!("subject not ready after {:?}", limit);
            Err(HarnessError::StartupTimeout {
                timeout: limit,
                output: output.snapshot(),
            })
        }
    }
}

enum MarkerWait {
    Found,
    StreamsClosed,
}

async fn wait_for_marker(output: &CapturedOutput, marker: &str) -> MarkerWait {
    let mut changes = output.subscribe();
    let mut scanner = MarkerScanner::new(marker);

    loop {
        // Mark the current version seen before looking, so nothing appended
        // after this point can be missed.
        changes.borrow_and_update();

        // Read before scanning: once closed, all output is already buffered.
        let closed = output.is_closed();
        if output.with_stdout(|buf| scanner.scan(buf)) {
            return MarkerWait::Found;
        }
        if closed {
            return MarkerWait::StreamsClosed;
        }

        if changes.changed().await.is_err() {
            return MarkerWait::StreamsClosed;
        }
    }
}

/// Incremental substring search over a growing buffer.
#[derive(Debug)]
pub(crate) struct MarkerScanner {
    marker: Vec<u8>,
    scanned: usize,
}

impl MarkerScanner {
    pub(crate) fn new(marker: &str) -> Self {
        Self {
            marker: marker.as_bytes().to_vec(),
            scanned: 0,
        }
    }

    /// Scans the part of `buf` not seen before, plus enough overlap to catch
    /// a marker that straddles the previous end.
    pub(crate) fn scan(&mut self, buf: &[u8]) -> bool {
        if self.marker.is_empty() {
            return true;
        }

        let start = self.scanned.saturating_sub(self.marker.len() - 1);
        let found = buf[start..]
            .windows(self.marker.len())
            .any(|window| window == self.marker.as_slice());
        self.scanned = buf.len();
        found
    }
}
