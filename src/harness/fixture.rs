use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::Html;
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use super::error::{HarnessError, HarnessResult, TeardownWarning};

/// The page the fixture serves by default.
pub const SAMPLE_HTML_WITH_YALE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Yale University Test Page</title>
</head>
<body>
  <h1>Welcome to Yale University</h1>
  <p>Yale University is a private Ivy League research university in New Haven, Connecticut.</p>
  <p>Founded in 1701, Yale is the third-oldest institution of higher education in the United States.</p>
  <a href="https://yale.edu/about">About Yale</a>
  <a href="https://yale.edu/admissions">Yale Admissions</a>
</body>
</html>
"#;

/// In-process origin server answering every request with one fixed HTML page.
pub struct FixtureServer {
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl FixtureServer {
    /// Serves [`SAMPLE_HTML_WITH_YALE`] on `127.0.0.1:port` (0 for any free port).
    pub async fn start(port: u16) -> HarnessResult<Self> {
        Self::start_with(port, SAMPLE_HTML_WITH_YALE).await
    }

    /// Serves `body` on `127.0.0.1:port`.
    pub async fn start_with(port: u16, body: impl Into<String>) -> HarnessResult<Self> {
        let listener = bind_listener(port).map_err(|source| HarnessError::Bind { port, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| HarnessError::Bind { port, source })?
            .port();

        let body: Arc<str> = Arc::from(body.into());
        let app = Router::new().fallback(serve_fixture).with_state(body);

        let (shutdown, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await
        });

        info!("fixture server listening on 127.0.0.1:{}", port);
        Ok(Self {
            port,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Absolute URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the server, waiting at most `limit` for open connections to drain.
    ///
    /// Idempotent: stopping a stopped server does nothing.
    pub async fn stop(&mut self, limit: Duration) -> Result<(), TeardownWarning> {
        let Some(mut task) = self.task.take() else {
            debug!("fixture server on port {} already stopped", self.port);
            return Ok(());
        };

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        match timeout(limit, &mut task).await {
            Ok(Ok(Ok(()))) => {
                info!("fixture server on port {} stopped", self.port);
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(TeardownWarning::Fixture(e.to_string())),
            Ok(Err(join_error)) => Err(TeardownWarning::Fixture(join_error.to_string())),
            Err(_) => {
                task.abort();
                Err(TeardownWarning::FixtureTimeout(limit))
            }
        }
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn serve_fixture(State(body): State<Arc<str>>) -> Html<String> {
    Html(body.to_string())
}

/// Binds without SO_REUSEADDR so an occupied port fails here.
fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;

    TcpListener::from_std(socket.into())
}
