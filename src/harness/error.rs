//! Error types for the harness

use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use super::launcher::SubjectState;
use super::output::OutputSnapshot;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to bind fixture server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn subject {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("subject did not report readiness within {timeout:?}\n{output}")]
    StartupTimeout {
        timeout: Duration,
        output: OutputSnapshot,
    },

    #[error("subject exited before reporting readiness (status: {status:?})\n{output}")]
    SubjectExited {
        status: Option<ExitStatus>,
        output: OutputSnapshot,
    },

    #[error("subject is {0:?}, expected it to be ready")]
    NotReady(SubjectState),

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("invalid harness configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("suite exceeded its time limit of {0:?}")]
    SuiteTimeout(Duration),
}

impl HarnessError {
    /// Captured subject output attached to startup failures, if any.
    pub fn output(&self) -> Option<&OutputSnapshot> {
        match self {
            HarnessError::StartupTimeout { output, .. }
            | HarnessError::SubjectExited { output, .. } => Some(output),
            _ => None,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// A cleanup step that did not go as planned. Collected, logged, never raised.
#[derive(Error, Debug)]
pub enum TeardownWarning {
    #[error("failed to send {signal} to subject process group: {source}")]
    Signal {
        signal: nix::sys::signal::Signal,
        #[source]
        source: nix::Error,
    },

    #[error("subject ignored SIGTERM for {0:?}, escalating to SIGKILL")]
    GracefulTimeout(Duration),

    #[error("subject still running {0:?} after SIGKILL")]
    KillTimeout(Duration),

    #[error("error waiting for subject exit: {0}")]
    Wait(#[source] std::io::Error),

    #[error("fixture server did not stop within {0:?}")]
    FixtureTimeout(Duration),

    #[error("fixture server failed while stopping: {0}")]
    Fixture(String),
}
