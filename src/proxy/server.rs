use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use eyre::{Result, WrapErr};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::rewrite::{extract_title, rewrite_html};
use super::types::{ErrorResponse, FetchRequest, FetchResponse};
use super::DEFAULT_PORT;

/// Configuration of the proxy listener and its upstream client
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to bind to
    pub bind_address: IpAddr,
    /// Port to listen on; 0 lets the OS choose
    pub port: u16,
    /// Upper bound on a single upstream fetch
    pub fetch_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Errors surfaced to callers of `POST /fetch`
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("URL is required")]
    MissingUrl,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Failed to fetch content: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl FetchError {
    pub fn status(&self) -> StatusCode {
        match self {
            FetchError::MissingUrl | FetchError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            FetchError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FetchError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("fetch failed: {}", self);
        } else {
            warn!("rejected fetch request: {}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct ProxyState {
    client: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(concat!("faleproxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .wrap_err("failed to build upstream HTTP client")?;

        Ok(Self { client })
    }
}

/// Routes served by the proxy
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/fetch", post(fetch_handler))
        .with_state(state)
}

/// A bound, not yet serving, proxy
///
/// Binding and serving are split so that the caller can announce readiness
/// between the two, once connections are guaranteed to be accepted.
pub struct ProxyServer {
    listener: TcpListener,
    router: Router,
}

impl ProxyServer {
    pub async fn bind(config: &ProxyConfig) -> Result<Self> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let listener = TcpListener::bind(addr)
            .await
            .wrap_err_with(|| format!("failed to bind {}", addr))?;

        let state = ProxyState::new(config)?;
        info!("proxy listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router: router(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("proxy stopped");
        Ok(())
    }
}

async fn fetch_handler(
    State(state): State<ProxyState>,
    payload: std::result::Result<Json<FetchRequest>, JsonRejection>,
) -> std::result::Result<Json<FetchResponse>, FetchError> {
    let request = match payload {
        Ok(Json(request)) => request,
        // A bodiless POST carries no content type; it is just a request without a URL.
        Err(JsonRejection::MissingJsonContentType(_)) => FetchRequest::default(),
        Err(rejection) => return Err(FetchError::InvalidBody(rejection.body_text())),
    };

    let url = request
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(FetchError::MissingUrl)?;

    info!("fetching {}", url);
    let upstream = state.client.get(&url).send().await?.error_for_status()?;
    let html = upstream.text().await?;
    debug!("fetched {} bytes from {}", html.len(), url);

    let content = rewrite_html(&html);
    let title = extract_title(&content).unwrap_or_default();

    Ok(Json(FetchResponse {
        success: true,
        content,
        title,
        original_url: url,
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Faleproxy</title></head>
<body>
  <h1>Faleproxy</h1>
  <p>POST a JSON body <code>{"url": "https://..."}</code> to <code>/fetch</code>.</p>
</body>
</html>
"#;
