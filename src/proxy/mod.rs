//! The faleproxy HTTP service.

pub mod rewrite;
pub mod server;
pub mod types;

pub use server::{FetchError, ProxyConfig, ProxyServer};
pub use types::{ErrorResponse, FetchRequest, FetchResponse};

/// Port used when neither `--port` nor `FALEPROXY_PORT` is given.
pub const DEFAULT_PORT: u16 = 3000;

/// Substring of the startup announcement that tells a supervisor the listener is bound.
pub const READY_MARKER: &str = "Faleproxy server running";

/// The full line printed on stdout once the proxy accepts connections.
pub fn ready_announcement(port: u16) -> String {
    format!("{READY_MARKER} at http://localhost:{port}")
}
