//! Teardown coordinator.
//!
//! Stops the subject (SIGTERM, bounded wait, SIGKILL) and then the fixture
//! server. Every step runs whatever happened in the previous ones; problems
//! are collected into a [`TeardownReport`] and logged, never returned as errors.

use std::process::ExitStatus;
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::time::timeout;
use tracing::{info, warn};

use super::error::TeardownWarning;
use super::fixture::FixtureServer;
use super::launcher::{SubjectProcess, SubjectState};

/// Time bounds for each teardown step
#[derive(Debug, Clone)]
pub struct TeardownConfig {
    /// How long the subject gets to exit after SIGTERM
    pub graceful_timeout: Duration,
    /// How long to wait for the exit after SIGKILL
    pub kill_timeout: Duration,
    /// How long the fixture server gets to drain
    pub fixture_timeout: Duration,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(2),
            fixture_timeout: Duration::from_secs(2),
        }
    }
}

/// Outcome of a teardown
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Exit status of the subject, if it was reaped
    pub exit_status: Option<ExitStatus>,
    /// Whether SIGKILL was needed
    pub forced_kill: bool,
    pub warnings: Vec<TeardownWarning>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn record(&mut self, warning: TeardownWarning) {
        warn!("teardown: {}", warning);
        self.warnings.push(warning);
    }
}

/// Terminates the subject, then stops the fixture server.
pub async fn teardown(
    subject: &mut SubjectProcess,
    fixture: &mut FixtureServer,
    config: &TeardownConfig,
) -> TeardownReport {
    let mut report = terminate_subject(subject, config).await;

    if let Err(warning) = fixture.stop(config.fixture_timeout).await {
        report.record(warning);
    }

    if report.is_clean() {
        info!("teardown complete (subject exit: {:?})", report.exit_status);
    } else {
        warn!("teardown finished with {} warning(s)", report.warnings.len());
    }
    report
}

/// Stops the subject: SIGTERM to its process group, a bounded wait, then
/// SIGKILL if it is still around.
pub async fn terminate_subject(subject: &mut SubjectProcess, config: &TeardownConfig) -> TeardownReport {
    let mut report = TeardownReport::default();

    match subject.state() {
        SubjectState::Unstarted => return report,
        SubjectState::Exited => {
            report.exit_status = subject.exit_status();
            return report;
        }
        _ => {}
    }

    if let Some(status) = subject.try_exit_status() {
        info!("subject already exited with {:?}", status);
        report.exit_status = Some(status);
        return report;
    }

    subject.begin_termination();
    info!("Initiating graceful shutdown of subject {:?}", subject.pid());

    if let Err(source) = subject.signal_group(Signal::SIGTERM) {
        report.record(TeardownWarning::Signal {
            signal: Signal::SIGTERM,
            source,
        });
    }

    match timeout(config.graceful_timeout, subject.wait_for_exit()).await {
        Ok(Ok(status)) => {
            report.exit_status = status;
            return report;
        }
        Ok(Err(e)) => report.record(TeardownWarning::Wait(e)),
        Err(_) => report.record(TeardownWarning::GracefulTimeout(config.graceful_timeout)),
    }

    report.forced_kill = true;
    if let Err(source) = subject.signal_group(Signal::SIGKILL) {
        report.record(TeardownWarning::Signal {
            signal: Signal::SIGKILL,
            source,
        });
    }

    match timeout(config.kill_timeout, subject.wait_for_exit()).await {
        Ok(Ok(status)) => report.exit_status = status,
        Ok(Err(e)) => {
            report.record(TeardownWarning::Wait(e));
            subject.abandon();
        }
        Err(_) => {
            report.record(TeardownWarning::KillTimeout(config.kill_timeout));
            subject.abandon();
        }
    }

    report
}
