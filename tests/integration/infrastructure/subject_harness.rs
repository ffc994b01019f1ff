use anyhow::{Context, Result};
use faleproxy::harness::{HarnessConfig, HarnessContext, TeardownReport};
use std::time::Duration;
use tempfile::TempDir;

/// The faleproxy binary built for this test run
pub const SUBJECT_BINARY: &str = env!("CARGO_BIN_EXE_faleproxy");

/// Route test tracing output through the test writer
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Harness configuration for the real binary, with test-friendly bounds.
///
/// `FALEPROXY_HARNESS_*` variables set in the test environment take precedence.
pub fn harness_config() -> HarnessConfig {
    let mut config = HarnessConfig::new(SUBJECT_BINARY);
    config.subject.environment.set("RUST_LOG", "faleproxy=debug");
    config.startup_timeout = Duration::from_secs(15);
    config.teardown.graceful_timeout = Duration::from_secs(5);
    config
        .with_env_overrides()
        .expect("invalid FALEPROXY_HARNESS_* override")
}

/// A started harness plus the scratch directory the subject runs in
///
/// Running the subject from an empty directory shows it depends on nothing
/// but its arguments and environment.
pub struct SubjectTestRun {
    pub ctx: HarnessContext,
    _scratch: TempDir,
}

impl SubjectTestRun {
    pub async fn start() -> Result<Self> {
        Self::start_with(harness_config()).await
    }

    pub async fn start_with(mut config: HarnessConfig) -> Result<Self> {
        init_tracing();

        let scratch = TempDir::new().context("Failed to create temporary directory")?;
        config.subject.working_directory = Some(scratch.path().to_path_buf());

        let ctx = HarnessContext::setup(config)
            .await
            .context("Failed to bring up faleproxy")?;

        Ok(Self {
            ctx,
            _scratch: scratch,
        })
    }

    pub async fn teardown(self) -> TeardownReport {
        self.ctx.teardown().await
    }
}
