use std::env::VarError;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use super::client::AssertionClient;
use super::error::{HarnessError, HarnessResult};
use super::fixture::FixtureServer;
use super::launcher::{SubjectConfig, SubjectProcess};
use super::readiness::await_ready;
use super::teardown::{teardown, TeardownConfig, TeardownReport};
use crate::proxy::READY_MARKER;

/// Everything needed to bring up one subject and its fixture
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// How to start the subject
    pub subject: SubjectConfig,
    /// Port for the fixture server; 0 picks a free one
    pub fixture_port: u16,
    /// Substring of the subject's stdout that signals readiness
    pub ready_marker: String,
    /// Upper bound on the readiness wait
    pub startup_timeout: Duration,
    /// Per-request timeout of the assertion client
    pub request_timeout: Duration,
    /// Bounds for the teardown steps
    pub teardown: TeardownConfig,
    /// Ceiling for a whole test body, see [`run_bounded`]
    pub suite_timeout: Duration,
}

impl HarnessConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            subject: SubjectConfig::new(program),
            fixture_port: 0,
            ready_marker: READY_MARKER.to_string(),
            startup_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            teardown: TeardownConfig::default(),
            suite_timeout: Duration::from_secs(60),
        }
    }

    /// Like [`HarnessConfig::new`], with overrides taken from the environment.
    pub fn from_env(program: impl Into<PathBuf>) -> HarnessResult<Self> {
        Self::new(program).with_env_overrides()
    }

    /// Applies
    /// `FALEPROXY_HARNESS_{SUBJECT_PORT,FIXTURE_PORT,STARTUP_TIMEOUT_MS,SUITE_TIMEOUT_SECS}`
    /// on top of `self`. Unset variables leave the current value alone.
    pub fn with_env_overrides(self) -> HarnessResult<Self> {
        self.with_overrides(|name| std::env::var(name))
    }

    fn with_overrides<F>(mut self, lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        if let Some(port) = override_value(&lookup, "FALEPROXY_HARNESS_SUBJECT_PORT")? {
            self.subject.port = port;
        }
        if let Some(port) = override_value(&lookup, "FALEPROXY_HARNESS_FIXTURE_PORT")? {
            self.fixture_port = port;
        }
        if let Some(ms) = override_value(&lookup, "FALEPROXY_HARNESS_STARTUP_TIMEOUT_MS")? {
            self.startup_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = override_value(&lookup, "FALEPROXY_HARNESS_SUITE_TIMEOUT_SECS")? {
            self.suite_timeout = Duration::from_secs(secs);
        }

        Ok(self)
    }
}

fn override_value<T, F>(lookup: &F, name: &str) -> HarnessResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Result<String, VarError>,
{
    match lookup(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| HarnessError::Config(format!("{}={:?}: {}", name, raw, e))),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(HarnessError::Config(format!(
            "{}={:?}: not valid unicode",
            name, raw
        ))),
    }
}

/// A running fixture server and a ready subject, with a client bound to it
///
/// Built by [`HarnessContext::setup`] and consumed by
/// [`HarnessContext::teardown`], so one value owns every resource of a run.
pub struct HarnessContext {
    fixture: FixtureServer,
    subject: SubjectProcess,
    client: AssertionClient,
    teardown: TeardownConfig,
}

impl HarnessContext {
    /// Starts the fixture, launches the subject and waits for it to be ready.
    ///
    /// If a step fails, whatever was already started is torn down before the
    /// error is returned.
    pub async fn setup(config: HarnessConfig) -> HarnessResult<Self> {
        let mut fixture = FixtureServer::start(config.fixture_port).await?;

        let mut subject = SubjectProcess::new(config.subject.clone());
        let ready = match subject.start() {
            Ok(()) => await_ready(&mut subject, &config.ready_marker, config.startup_timeout).await,
            Err(e) => Err(e),
        };
        let client = ready.and_then(|()| AssertionClient::for_subject(&subject, config.request_timeout));

        match client {
            Ok(client) => {
                info!(
                    "harness ready: subject on {}, fixture on port {}",
                    subject.base_url(),
                    fixture.port()
                );
                Ok(Self {
                    fixture,
                    subject,
                    client,
                    teardown: config.teardown,
                })
            }
            Err(e) => {
                warn!("harness setup failed: {}", e);
                teardown(&mut subject, &mut fixture, &config.teardown).await;
                Err(e)
            }
        }
    }

    pub fn client(&self) -> &AssertionClient {
        &self.client
    }

    pub fn fixture(&self) -> &FixtureServer {
        &self.fixture
    }

    pub fn subject(&self) -> &SubjectProcess {
        &self.subject
    }

    pub fn subject_mut(&mut self) -> &mut SubjectProcess {
        &mut self.subject
    }

    /// URL of `path` on the fixture server, for use as a `/fetch` target.
    pub fn fixture_url(&self, path: &str) -> String {
        self.fixture.url(path)
    }

    /// Tears down the subject and the fixture. Never fails; see [`TeardownReport`].
    pub async fn teardown(mut self) -> TeardownReport {
        teardown(&mut self.subject, &mut self.fixture, &self.teardown).await
    }
}

/// Runs `fut` under a hard ceiling.
pub async fn run_bounded<F>(limit: Duration, fut: F) -> HarnessResult<F::Output>
where
    F: Future,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| HarnessError::SuiteTimeout(limit))
}
