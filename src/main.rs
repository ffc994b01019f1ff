type Result<T> = color_eyre::eyre::Result<T>;

mod cli;
mod signals;

use clap::Parser;
use tokio::select;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Config};
use faleproxy::proxy::{ready_announcement, ProxyServer};
use signals::Signals;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;

    // Logs go to stderr; stdout carries only the readiness announcement
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;

    info!("faleproxy starting");

    let mut signals = Signals::new()?;
    let server = ProxyServer::bind(&config.proxy).await?;
    let addr = server.local_addr()?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut serving = tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    println!("{}", ready_announcement(addr.port()));

    select! {
        result = &mut serving => {
            result??;
            return Ok(());
        }
        _ = signals.next() => {
            info!("shutdown signal received, draining connections");
        }
    }

    let _ = stop_tx.send(());
    match timeout(config.graceful_timeout, &mut serving).await {
        Ok(result) => result??,
        Err(_) => {
            warn!("graceful shutdown timed out after {:?}", config.graceful_timeout);
            serving.abort();
        }
    }

    info!("faleproxy exiting");
    Ok(())
}
