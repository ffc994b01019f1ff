use crate::infrastructure::{harness_config, init_tracing, SubjectTestRun};
use anyhow::Result;
use faleproxy::harness::{run_bounded, FixtureServer, HarnessContext, HarnessError, SubjectState};
use faleproxy::proxy::READY_MARKER;
use nix::sys::signal::{kill, Signal};
use std::os::unix::process::ExitStatusExt;
use std::time::{Duration, Instant};
use tracing::debug;

/// The subject announces readiness on stdout with the port it was given
#[tokio::test]
async fn test_ready_marker_and_port_override() -> Result<()> {
    let run = SubjectTestRun::start().await?;
    let subject = run.ctx.subject();

    assert_eq!(subject.state(), SubjectState::Ready);
    assert_ne!(subject.port(), faleproxy::proxy::DEFAULT_PORT);

    let stdout = subject.output().stdout();
    debug!("subject stdout: {}", stdout);
    assert!(stdout.contains(READY_MARKER));
    assert!(stdout.contains(&format!("localhost:{}", subject.port())));

    run.teardown().await;
    Ok(())
}

/// SIGTERM drains and exits cleanly, without escalation
#[tokio::test]
async fn test_graceful_teardown_of_real_subject() -> Result<()> {
    let run = SubjectTestRun::start().await?;
    let started = Instant::now();

    let report = run.teardown().await;

    assert!(report.is_clean(), "teardown warnings: {:?}", report.warnings);
    assert!(!report.forced_kill, "subject needed SIGKILL");
    assert_eq!(report.exit_status.and_then(|s| s.code()), Some(0));
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

/// Teardown copes with a subject that already died abnormally
#[tokio::test]
async fn test_teardown_after_subject_crash() -> Result<()> {
    let mut run = SubjectTestRun::start().await?;

    let pid = run.ctx.subject().pid().expect("running subject has a pid");
    kill(pid, Signal::SIGKILL)?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!run.ctx.subject_mut().is_running());

    let report = run.teardown().await;

    assert!(!report.forced_kill);
    assert_eq!(report.exit_status.and_then(|s| s.signal()), Some(Signal::SIGKILL as i32));
    Ok(())
}

/// A marker that never appears fails setup within the startup bound
#[tokio::test]
async fn test_startup_timeout_with_wrong_marker() -> Result<()> {
    init_tracing();

    let mut config = harness_config();
    config.ready_marker = "this line is never printed".to_string();
    config.startup_timeout = Duration::from_millis(1500);

    let started = Instant::now();
    let err = HarnessContext::setup(config).await.err().expect("setup should fail");
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(10), "setup took {:?}", elapsed);
    match err {
        HarnessError::StartupTimeout { timeout, output } => {
            assert_eq!(timeout, Duration::from_millis(1500));
            // The diagnostics carry what the subject did print
            assert!(output.stdout.contains(READY_MARKER), "output: {}", output);
        }
        other => panic!("expected StartupTimeout, got {other:?}"),
    }
    Ok(())
}

/// A subject that cannot bind its port exits, and setup reports why
#[tokio::test]
async fn test_subject_port_in_use() -> Result<()> {
    init_tracing();

    let occupied = std::net::TcpListener::bind("127.0.0.1:0")?;
    let mut config = harness_config();
    config.subject.port = occupied.local_addr()?.port();

    let err = HarnessContext::setup(config).await.err().expect("setup should fail");
    match err {
        HarnessError::SubjectExited { status, output } => {
            assert!(status.map_or(true, |s| !s.success()));
            assert!(output.stderr.contains("failed to bind"), "output: {}", output);
        }
        other => panic!("expected SubjectExited, got {other:?}"),
    }
    Ok(())
}

/// An occupied fixture port aborts setup before any process is started
#[tokio::test]
async fn test_fixture_port_in_use() -> Result<()> {
    init_tracing();

    let mut existing = FixtureServer::start(0).await?;
    let mut config = harness_config();
    config.fixture_port = existing.port();

    let err = HarnessContext::setup(config).await.err().expect("setup should fail");
    assert!(matches!(err, HarnessError::Bind { .. }), "got {err:?}");

    existing.stop(Duration::from_secs(2)).await?;
    Ok(())
}

/// A whole test body runs under the suite ceiling
#[tokio::test]
async fn test_suite_ceiling() -> Result<()> {
    let config = harness_config();
    let limit = config.suite_timeout;

    let report = run_bounded(limit, async {
        let run = SubjectTestRun::start_with(config).await?;
        let status = run.ctx.client().get("/health").await?;
        assert!(status.is_success());
        anyhow::Ok(run.teardown().await)
    })
    .await??;

    assert!(report.is_clean(), "teardown warnings: {:?}", report.warnings);
    Ok(())
}
