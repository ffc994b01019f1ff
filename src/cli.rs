use clap::Parser;
use eyre::eyre;
use std::net::IpAddr;
use std::time::Duration;

use faleproxy::proxy::{ProxyConfig, DEFAULT_PORT};

type Result<T> = color_eyre::eyre::Result<T>;

/// An HTTP proxy that rewrites "Yale" to "Fale" in fetched pages
#[derive(Parser, Debug)]
#[command(name = "faleproxy")]
#[command(about = "An HTTP proxy that rewrites \"Yale\" to \"Fale\" in fetched pages")]
#[command(version)]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "FALEPROXY_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind to
    #[arg(long, env = "FALEPROXY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Timeout for fetching the upstream page (ms)
    #[arg(long, env = "FALEPROXY_FETCH_TIMEOUT_MS", default_value = "10000")]
    pub fetch_timeout_ms: u64,

    /// Time allowed for in-flight requests after SIGTERM (seconds)
    #[arg(long, default_value = "10")]
    pub graceful_timeout_secs: u64,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener and upstream client settings
    pub proxy: ProxyConfig,
    /// Upper bound on draining requests during shutdown
    pub graceful_timeout: Duration,
}

impl Config {
    /// Parse command line arguments into configuration
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let bind_address: IpAddr = cli
            .host
            .parse()
            .map_err(|e| eyre!("Invalid bind address '{}': {}", cli.host, e))?;

        if cli.fetch_timeout_ms == 0 {
            return Err(eyre!("--fetch-timeout-ms must be greater than zero"));
        }

        Ok(Config {
            proxy: ProxyConfig {
                bind_address,
                port: cli.port,
                fetch_timeout: Duration::from_millis(cli.fetch_timeout_ms),
            },
            graceful_timeout: Duration::from_secs(cli.graceful_timeout_secs),
        })
    }
}
