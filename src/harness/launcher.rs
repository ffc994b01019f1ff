use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{HarnessError, HarnessResult};
use super::output::{CapturedOutput, OutputStream};
use crate::environment::Environment;

/// Environment variable carrying the port override, in addition to the CLI flag
pub const PORT_ENV: &str = "FALEPROXY_PORT";

/// CLI flag used to pass the port override
pub const DEFAULT_PORT_ARG: &str = "--port";

/// How to start the subject under test
#[derive(Debug, Clone)]
pub struct SubjectConfig {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments placed before the port override
    pub args: Vec<String>,
    /// Port the subject should listen on; 0 picks a free one at start
    pub port: u16,
    /// Flag used to pass `port`, or `None` to pass it only through `PORT_ENV`
    pub port_arg: Option<String>,
    /// Extra environment variables
    pub environment: Environment,
    /// Working directory for the process
    pub working_directory: Option<PathBuf>,
}

impl SubjectConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            port: 0,
            port_arg: Some(DEFAULT_PORT_ARG.to_string()),
            environment: Environment::new(),
            working_directory: None,
        }
    }

    /// Looks for a built binary called `name` in the usual cargo output
    /// locations under the current directory.
    pub fn locate_binary(name: &str) -> Option<PathBuf> {
        Self::locate_binary_in(Path::new("."), name)
    }

    /// Like [`SubjectConfig::locate_binary`], relative to `root`.
    pub fn locate_binary_in(root: &Path, name: &str) -> Option<PathBuf> {
        [
            root.join("target").join("debug").join(name),
            root.join("target").join("release").join(name),
            root.join(name),
        ]
        .into_iter()
        .find(|path| path.is_file())
    }
}

/// Lifecycle of a subject process
///
/// `Starting → Ready` happens only through the readiness gate,
/// `→ Terminating` only through teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectState {
    Unstarted,
    Starting,
    Ready,
    Terminating,
    Exited,
}

/// Handle to the subject process
///
/// Owns the OS child, its captured output and its lifecycle state. The child
/// runs in its own process group so that teardown can signal the whole tree.
pub struct SubjectProcess {
    config: SubjectConfig,
    state: SubjectState,
    port: u16,
    pid: Option<Pid>,
    child: Option<Child>,
    output: CapturedOutput,
    readers: Vec<JoinHandle<()>>,
    exit_status: Option<ExitStatus>,
    start_time: Instant,
}

impl SubjectProcess {
    pub fn new(config: SubjectConfig) -> Self {
        Self {
            port: config.port,
            config,
            state: SubjectState::Unstarted,
            pid: None,
            child: None,
            output: CapturedOutput::new(),
            readers: Vec::new(),
            exit_status: None,
            start_time: Instant::now(),
        }
    }

    /// Creates and starts a subject in one step.
    pub fn launch(config: SubjectConfig) -> HarnessResult<Self> {
        let mut subject = Self::new(config);
        subject.start()?;
        Ok(subject)
    }

    /// Spawns the subject with stdout/stderr captured and its port overridden.
    pub fn start(&mut self) -> HarnessResult<()> {
        if self.state != SubjectState::Unstarted {
            return Err(HarnessError::Config(format!(
                "subject already started (state: {:?})",
                self.state
            )));
        }

        if self.port == 0 {
            self.port = free_port().map_err(|source| HarnessError::Bind { port: 0, source })?;
        }

        let program = self.config.program.display().to_string();
        info!("Spawning subject: {} {:?} on port {}", program, self.config.args, self.port);

        let mut command = Command::new(&self.config.program);
        command.args(&self.config.args);
        if let Some(ref flag) = self.config.port_arg {
            command.arg(flag).arg(self.port.to_string());
        }
        command.env(PORT_ENV, self.port.to_string());
        self.config.environment.apply(&mut command);

        if let Some(ref work_dir) = self.config.working_directory {
            command.current_dir(work_dir);
        }

        // New group with the child as leader, so pgid == pid
        command.process_group(0);
        command.kill_on_drop(true);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
            program: program.clone(),
            source,
        })?;

        let pid = child.id().ok_or_else(|| HarnessError::Spawn {
            program: program.clone(),
            source: std::io::Error::other("process exited before its pid could be read"),
        })?;

        if let Some(stdout) = child.stdout.take() {
            self.readers.push(self.output.capture(OutputStream::Stdout, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            self.readers.push(self.output.capture(OutputStream::Stderr, stderr));
        }

        self.pid = Some(Pid::from_raw(pid as i32));
        self.child = Some(child);
        self.start_time = Instant::now();
        self.state = SubjectState::Starting;

        info!("Subject spawned with PID: {}", pid);
        Ok(())
    }

    pub fn state(&self) -> SubjectState {
        self.state
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// The port the subject was told to listen on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn output(&self) -> &CapturedOutput {
        &self.output
    }

    /// Exit status, once the process has been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub fn runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Reaps the process if it has already exited, without blocking.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        if let Some(ref mut child) = self.child {
            match child.try_wait() {
                Ok(Some(status)) => self.record_exit(status),
                Ok(None) => {}
                Err(e) => warn!("error polling subject status: {}", e),
            }
        }
        self.exit_status
    }

    pub fn is_running(&mut self) -> bool {
        self.child.is_some() && self.try_exit_status().is_none()
    }

    pub(crate) fn mark_ready(&mut self) {
        if self.state == SubjectState::Starting {
            self.state = SubjectState::Ready;
        }
    }

    pub(crate) fn begin_termination(&mut self) {
        if matches!(self.state, SubjectState::Starting | SubjectState::Ready) {
            self.state = SubjectState::Terminating;
        }
    }

    /// Marks a process that was SIGKILLed but could not be reaped in time as gone.
    pub(crate) fn abandon(&mut self) {
        self.state = SubjectState::Exited;
    }

    /// Waits for the process to exit. Cancel safe.
    pub(crate) async fn wait_for_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        let Some(ref mut child) = self.child else {
            return Ok(self.exit_status);
        };

        let status = child.wait().await?;
        self.record_exit(status);
        Ok(Some(status))
    }

    /// Sends `signal` to the subject's process group.
    pub(crate) fn signal_group(&self, signal: Signal) -> nix::Result<()> {
        match self.pid {
            Some(pid) => {
                debug!("Sending signal {:?} to process group {}", signal, pid);
                kill(Pid::from_raw(-pid.as_raw()), signal)
            }
            None => Err(nix::Error::ESRCH),
        }
    }

    fn record_exit(&mut self, status: ExitStatus) {
        info!("Subject exited with status: {:?} after {:?}", status, self.runtime());
        self.exit_status = Some(status);
        self.state = SubjectState::Exited;
        self.child = None;
    }
}

impl Drop for SubjectProcess {
    fn drop(&mut self) {
        // Only reached with a live child when teardown was skipped, e.g. a panicking test.
        if self.child.is_some() && self.state != SubjectState::Exited {
            warn!("SubjectProcess dropped with running child, killing process group");
            match self.signal_group(Signal::SIGKILL) {
                Ok(()) | Err(nix::Error::ESRCH) => {}
                Err(e) => warn!("Failed to kill subject process group: {}", e),
            }
        }
        for reader in &self.readers {
            reader.abort();
        }
    }
}

/// Asks the OS for a currently free loopback port.
fn free_port() -> std::io::Result<u16> {
    Ok(TcpListener::bind("127.0.0.1:0")?.local_addr()?.port())
}
